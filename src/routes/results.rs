use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{
    ledger::{LedgerStore, PublishResult, ResultOutcome, ResultRemoval, ReviseResult},
    models::ExamResult,
    state::AppState,
};

use super::{
    StudentFilter,
    error::{ApiError, JsonBody},
};

#[derive(Deserialize)]
pub struct ClearParams {
    #[serde(default)]
    cleared_on: Option<NaiveDate>,
}

pub async fn results_index<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(filter): Query<StudentFilter>,
) -> Result<Json<Vec<ExamResult>>, ApiError> {
    let results = state
        .store()
        .list_results(filter.student_id())
        .await
        .map_err(|err| ApiError(err.into()))?;
    Ok(Json(results))
}

pub async fn results_show<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ExamResult>, ApiError> {
    Ok(Json(state.ledger.result(&id).await?))
}

pub async fn results_create<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(form): JsonBody<PublishResult>,
) -> Result<(StatusCode, Json<ResultOutcome>), ApiError> {
    let outcome = state.ledger.publish_result(form).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn results_update<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    JsonBody(form): JsonBody<ReviseResult>,
) -> Result<Json<ResultOutcome>, ApiError> {
    Ok(Json(state.ledger.revise_result(&id, form).await?))
}

pub async fn results_delete<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ResultRemoval>, ApiError> {
    Ok(Json(state.ledger.delete_result(&id).await?))
}

pub async fn results_clear_back_subject<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, code)): Path<(String, String)>,
    Query(params): Query<ClearParams>,
) -> Result<Json<ExamResult>, ApiError> {
    let result = state
        .ledger
        .clear_back_subject(&id, &code, params.cleared_on)
        .await?;
    Ok(Json(result))
}
