// routes/mod.rs
// JSON API: router construction plus re-exports of all handlers.

use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ledger::LedgerStore, state::AppState};

pub mod courses;
pub mod error;
pub mod payments;
pub mod reports;
pub mod results;
pub mod students;

pub use courses::*;
pub use payments::*;
pub use reports::*;
pub use results::*;
pub use students::*;

#[derive(Debug, Default, Deserialize)]
pub struct StudentFilter {
    #[serde(default)]
    pub student_id: Option<String>,
}

impl StudentFilter {
    pub fn student_id(&self) -> Option<&str> {
        self.student_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router<S: LedgerStore>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/courses", get(courses_index::<S>))
        .route(
            "/api/courses/{name}/semesters/{semester}",
            get(courses_semester::<S>),
        )
        .route(
            "/api/students",
            get(students_index::<S>).post(students_create::<S>),
        )
        .route(
            "/api/students/{id}",
            get(students_show::<S>)
                .put(students_update::<S>)
                .delete(students_delete::<S>),
        )
        .route(
            "/api/results",
            get(results_index::<S>).post(results_create::<S>),
        )
        .route(
            "/api/results/{id}",
            get(results_show::<S>)
                .put(results_update::<S>)
                .delete(results_delete::<S>),
        )
        .route(
            "/api/results/{id}/back-subjects/{code}/clear",
            post(results_clear_back_subject::<S>),
        )
        .route(
            "/api/payments",
            get(payments_index::<S>).post(payments_create::<S>),
        )
        .route(
            "/api/payments/{id}",
            get(payments_show::<S>).delete(payments_delete::<S>),
        )
        .route("/api/reports/fees", get(reports_fees::<S>))
        .route("/api/reports/results", get(reports_results::<S>))
        .with_state(state)
}
