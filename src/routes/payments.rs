use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    ledger::{LedgerStore, Receipt, RecordPayment},
    models::{FeeStructure, Payment},
    state::AppState,
};

use super::{
    StudentFilter,
    error::{ApiError, JsonBody},
};

pub async fn payments_index<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(filter): Query<StudentFilter>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    let payments = state
        .store()
        .list_payments(filter.student_id())
        .await
        .map_err(|err| ApiError(err.into()))?;
    Ok(Json(payments))
}

pub async fn payments_show<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(state.ledger.payment(&id).await?))
}

pub async fn payments_create<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(form): JsonBody<RecordPayment>,
) -> Result<(StatusCode, Json<Receipt>), ApiError> {
    let receipt = state.ledger.record_payment(form).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn payments_delete<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<FeeStructure>, ApiError> {
    Ok(Json(state.ledger.delete_payment(&id).await?))
}
