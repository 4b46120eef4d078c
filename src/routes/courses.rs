use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    ledger::{LedgerError, LedgerStore},
    models::{Course, CourseSemester},
    state::AppState,
};

use super::error::ApiError;

pub async fn courses_index<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Course>>, ApiError> {
    let courses = state
        .store()
        .list_courses()
        .await
        .map_err(|err| ApiError(err.into()))?;
    Ok(Json(courses))
}

/// Subject list and fee of one semester, used to pre-fill result forms.
pub async fn courses_semester<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((name, semester)): Path<(String, u32)>,
) -> Result<Json<CourseSemester>, ApiError> {
    let course = state
        .store()
        .find_course(&name)
        .await
        .map_err(|err| ApiError(err.into()))?
        .ok_or_else(|| LedgerError::not_found("course", name.as_str()))?;
    let semester = course
        .semester(semester)
        .cloned()
        .ok_or_else(|| LedgerError::not_found("semester", format!("{name}/{semester}")))?;
    Ok(Json(semester))
}
