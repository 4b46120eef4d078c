use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{
    ledger::{
        LedgerStore,
        reports::{FeeSummary, ResultSummary, fee_summary, result_summary},
    },
    state::AppState,
};

use super::error::ApiError;

pub async fn reports_fees<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<FeeSummary>, ApiError> {
    let students = state
        .store()
        .list_students()
        .await
        .map_err(|err| ApiError(err.into()))?;
    Ok(Json(fee_summary(&students)))
}

pub async fn reports_results<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ResultSummary>, ApiError> {
    let results = state
        .store()
        .list_results(None)
        .await
        .map_err(|err| ApiError(err.into()))?;
    Ok(Json(result_summary(&results)))
}
