#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt; // for oneshot

use coachdesk::{ledger::MemoryStore, routes, state::AppState};

async fn send(app: Router, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(path);
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let res = app.oneshot(req).await.expect("request failed");
    let status = res.status();
    let bytes = to_bytes(res.into_body(), 1024 * 1024)
        .await
        .expect("body read failed");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response is JSON")
    };
    (status, value)
}

fn app(state: &Arc<AppState<MemoryStore>>) -> Router {
    routes::router(Arc::clone(state))
}

fn result_body(student_id: &str, outcomes: &[&str]) -> Value {
    let subjects: Vec<Value> = outcomes
        .iter()
        .enumerate()
        .map(|(i, outcome)| {
            json!({
                "name": format!("Paper 2{:02}", i + 1),
                "code": format!("PGDCA2{:02}", i + 1),
                "max_marks": 100.0,
                "result": outcome,
            })
        })
        .collect();
    json!({
        "student_id": student_id,
        "semester": 2,
        "exam_date": "2026-03-15",
        "subjects": subjects,
    })
}

#[tokio::test]
async fn fee_and_result_flow_over_http() {
    let (_store, state) = common::memory_state();
    let state = Arc::new(state);

    let (status, body) = send(app(&state), "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, student) = send(
        app(&state),
        "POST",
        "/api/students",
        Some(json!({
            "name": "Farah",
            "course": "PGDCA",
            "joining_date": "2026-01-10",
            "number_of_installments": 2,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(student["student_id"], "STU20260001");
    assert_eq!(student["fee_status"], "Pending");
    assert_eq!(student["fee_structure"]["total_course_fee"], 10_000.0);
    let student_id = student["student_id"].as_str().unwrap().to_string();

    let (status, receipt) = send(
        app(&state),
        "POST",
        "/api/payments",
        Some(json!({
            "student_id": student_id,
            "fee_type": "Installment",
            "amount": 10_000.0,
            "payment_mode": "Upi",
            "payment_date": "2026-02-01",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["payment"]["receipt_no"], "RCP2026020100001");
    assert_eq!(receipt["remaining_amount"], 0.0);

    let (status, outcome) = send(
        app(&state),
        "POST",
        "/api/results",
        Some(result_body(&student_id, &["Fail", "Pass", "Fail", "Pass", "Pass"])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(outcome["overall_result"], "Fail");
    assert_eq!(outcome["back_subjects_count"], 2);
    assert_eq!(outcome["back_subject_fee_added"], 1_000.0);
    assert_eq!(outcome["total_course_fee"], 11_000.0);
    assert_eq!(outcome["remaining_amount"], 1_000.0);
    let result_id = outcome["result_id"].as_str().unwrap().to_string();

    let (status, student) = send(app(&state), "GET", &format!("/api/students/{student_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(student["fee_status"], "Partial");
    assert_eq!(student["outstanding"], 1_000.0);

    let (status, results) = send(
        app(&state),
        "GET",
        &format!("/api/results?student_id={student_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results.as_array().unwrap().len(), 1);

    let (status, cleared) = send(
        app(&state),
        "POST",
        &format!("/api/results/{result_id}/back-subjects/PGDCA201/clear?cleared_on=2026-04-20"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["back_subjects"][0]["is_cleared"], true);

    let (status, summary) = send(app(&state), "GET", "/api/reports/results", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["failed"], 1);
    assert_eq!(summary["open_back_subjects"], 1);
    assert_eq!(summary["cleared_back_subjects"], 1);

    let (status, removal) = send(app(&state), "DELETE", &format!("/api/results/{result_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removal["back_subject_fee_removed"], 500.0);
    assert_eq!(removal["total_course_fee"], 10_500.0);

    let (status, fees) = send(app(&state), "GET", "/api/reports/fees", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fees["students"], 1);
    assert_eq!(fees["partial"], 1);
    assert_eq!(fees["total_outstanding"], 500.0);
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let (store, state) = common::memory_state();
    let state = Arc::new(state);

    let (status, body) = send(app(&state), "GET", "/api/students/STU20269999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = send(
        app(&state),
        "POST",
        "/api/students",
        Some(json!({ "name": "Gaurav", "course": "MBA", "number_of_installments": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, student) = send(
        app(&state),
        "POST",
        "/api/students",
        Some(json!({ "name": "Gaurav", "course": "PGDCA", "number_of_installments": 1 })),
    )
    .await;
    let student_id = student["student_id"].as_str().unwrap().to_string();

    let mut missing = result_body(&student_id, &["Fail", "Pass"]);
    missing["subjects"][0]
        .as_object_mut()
        .unwrap()
        .remove("result");
    let (status, body) = send(app(&state), "POST", "/api/results", Some(missing)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert_eq!(body["field"], "subjects[0].result");

    let (status, body) = send(
        app(&state),
        "POST",
        "/api/payments",
        Some(json!({ "student_id": student_id, "fee_type": "Installment", "amount": 100.0, "discount": 200.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "discount");

    store.fail_student_writes(1);
    store.fail_result_deletes(1);
    let (status, body) = send(
        app(&state),
        "POST",
        "/api/results",
        Some(result_body(&student_id, &["Fail"])),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "consistency");
    assert_eq!(body["message"], routes::error::SUPPORT_MESSAGE);

    store.fail_payment_inserts(1);
    let (status, body) = send(
        app(&state),
        "POST",
        "/api/payments",
        Some(json!({ "student_id": student_id, "fee_type": "Installment", "amount": 100.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "storage");
}

#[tokio::test]
async fn course_catalog_is_served() {
    let (_store, state) = common::memory_state();
    let state = Arc::new(state);

    let (status, courses) = send(app(&state), "GET", "/api/courses", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(courses[0]["slug"], "pgdca");

    let (status, semester) = send(app(&state), "GET", "/api/courses/pgdca/semesters/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(semester["subjects"].as_array().unwrap().len(), 5);
    assert_eq!(semester["subjects"][0]["code"], "PGDCA201");

    let (status, _) = send(app(&state), "GET", "/api/courses/pgdca/semesters/9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_bodies_are_validation_errors() {
    let (_store, state) = common::memory_state();
    let state = Arc::new(state);

    let (status, body) = send(
        app(&state),
        "POST",
        "/api/results",
        Some(json!({ "student_id": "STU20260001", "semester": 1, "subjects": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert_eq!(body["field"], "body");
    assert!(body["message"].as_str().unwrap().contains("exam_date"));

    let mut unknown_outcome = result_body("STU20260001", &["Fail"]);
    unknown_outcome["subjects"][0]["result"] = json!("Withheld");
    let (status, body) = send(app(&state), "POST", "/api/results", Some(unknown_outcome)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "body");

    let req = Request::builder()
        .method("POST")
        .uri("/api/students")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let res = app(&state).oneshot(req).await.expect("request failed");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn transient_failures_ask_clients_to_retry() {
    let (store, state) = common::memory_state();
    let state = Arc::new(state);
    let (_, student) = send(
        app(&state),
        "POST",
        "/api/students",
        Some(json!({ "name": "Hema", "course": "PGDCA", "number_of_installments": 1 })),
    )
    .await;

    store.fail_payment_inserts(1);
    let payment = json!({
        "student_id": student["student_id"],
        "fee_type": "Installment",
        "amount": 100.0,
    });
    let req = Request::builder()
        .method("POST")
        .uri("/api/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payment.to_string()))
        .unwrap();
    let res = app(&state).oneshot(req).await.expect("request failed");
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.headers()[header::RETRY_AFTER], routes::error::RETRY_AFTER_SECS);

    let (status, _) = send(app(&state), "GET", "/api/students/STU20269999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
