use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;

use crate::{
    ledger::{LedgerStore, NewStudent, StudentRemoval, StudentUpdate},
    models::{FeeStatus, Student},
    state::AppState,
};

use super::error::{ApiError, JsonBody};

#[derive(Serialize)]
pub struct StudentView {
    #[serde(flatten)]
    pub student: Student,
    pub fee_status: FeeStatus,
    pub outstanding: f64,
}

impl From<Student> for StudentView {
    fn from(student: Student) -> Self {
        StudentView {
            fee_status: student.fee_structure.fee_status(),
            outstanding: student.fee_structure.outstanding(),
            student,
        }
    }
}

pub async fn students_index<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<StudentView>>, ApiError> {
    let students = state
        .store()
        .list_students()
        .await
        .map_err(|err| ApiError(err.into()))?;
    Ok(Json(students.into_iter().map(StudentView::from).collect()))
}

pub async fn students_show<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<StudentView>, ApiError> {
    let student = state.ledger.student(&id).await?;
    Ok(Json(student.into()))
}

pub async fn students_create<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(form): JsonBody<NewStudent>,
) -> Result<(StatusCode, Json<StudentView>), ApiError> {
    let student = state.ledger.create_student(form).await?;
    Ok((StatusCode::CREATED, Json(student.into())))
}

pub async fn students_update<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    JsonBody(form): JsonBody<StudentUpdate>,
) -> Result<Json<StudentView>, ApiError> {
    let student = state.ledger.update_student(&id, form).await?;
    Ok(Json(student.into()))
}

pub async fn students_delete<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<StudentRemoval>, ApiError> {
    Ok(Json(state.ledger.delete_student(&id).await?))
}
