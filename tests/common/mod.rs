#![allow(dead_code)]

use std::{
    env,
    sync::{Mutex, MutexGuard, OnceLock},
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::NaiveDate;
use mongodb::Client;

use coachdesk::{
    config::Config,
    ledger::{
        MemoryStore, NewStudent, PublishResult, RecordPayment, Reconciler, SubjectInput,
    },
    models::{CatalogSubject, Course, CourseSemester, FeeType, PaymentMode, Student, SubjectOutcome},
    state::{AppState, MongoStore, init_state},
};

/// Global lock so integration tests that mutate the DB run one-at-a-time.
static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn pgdca() -> Course {
    let semester = |n: u32| CourseSemester {
        semester_number: n,
        fee: 5_000.0,
        subjects: (1..=5)
            .map(|i| CatalogSubject {
                name: format!("Paper {n}{i:02}"),
                code: format!("PGDCA{n}{i:02}"),
                max_marks: Some(100.0),
            })
            .collect(),
    };
    Course {
        name: "PGDCA".into(),
        slug: String::new(),
        total_fee: 10_000.0,
        total_semesters: 2,
        semesters: vec![semester(1), semester(2)],
    }
}

pub fn memory_store() -> MemoryStore {
    MemoryStore::with_courses(vec![pgdca()])
}

pub fn reconciler(store: &MemoryStore) -> Reconciler<MemoryStore> {
    Reconciler::new(store.clone())
}

pub fn memory_state() -> (MemoryStore, AppState<MemoryStore>) {
    let store = memory_store();
    let state = AppState::new(store.clone(), 5);
    (store, state)
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

pub fn new_student(name: &str) -> NewStudent {
    NewStudent {
        name: name.into(),
        phone: Some("9800000000".into()),
        email: None,
        course: "PGDCA".into(),
        joining_date: Some(NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()),
        number_of_installments: 2,
        total_course_fee: None,
    }
}

/// One subject per outcome, coded after the PGDCA semester papers.
pub fn subjects(semester: u32, outcomes: &[SubjectOutcome]) -> Vec<SubjectInput> {
    pgdca()
        .semester(semester)
        .unwrap()
        .subjects
        .iter()
        .zip(outcomes)
        .map(|(s, outcome)| SubjectInput {
            name: s.name.clone(),
            code: s.code.clone(),
            max_marks: s.max_marks,
            obtained_marks: None,
            result: Some(*outcome),
        })
        .collect()
}

pub fn publish(student: &Student, semester: u32, outcomes: &[SubjectOutcome]) -> PublishResult {
    PublishResult {
        student_id: student.student_id.clone(),
        semester: Some(semester),
        exam_date: day(15),
        subjects: subjects(semester, outcomes),
        remarks: None,
    }
}

pub fn payment(student: &Student, amount: f64, discount: f64) -> RecordPayment {
    RecordPayment {
        student_id: student.student_id.clone(),
        fee_type: FeeType::Installment,
        amount,
        discount,
        payment_mode: PaymentMode::Cash,
        payment_date: Some(day(1)),
        installment_number: None,
        back_subjects: Vec::new(),
        result_id: None,
        remarks: None,
    }
}

pub struct TestContext {
    pub state: AppState<MongoStore>,
    pub db_name: String,
    _guard: MutexGuard<'static, ()>,
}

pub async fn setup_mongo() -> Option<TestContext> {
    let guard = TEST_DB_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(err) => {
            eprintln!("Skipping test; bad config: {err:?}");
            return None;
        }
    };
    config.mongodb_db = format!(
        "coachdesktest_{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis()
    );
    config.courses_file = "./data/courses.json".into();

    let client = match Client::with_uri_str(&config.mongodb_uri).await {
        Ok(c) => c,
        Err(err) => {
            eprintln!("Skipping test; cannot connect to MongoDB: {err:?}");
            return None;
        }
    };
    if let Err(err) = client.database(&config.mongodb_db).drop().await {
        eprintln!("Skipping test; cannot drop test DB: {err:?}");
        return None;
    }

    match init_state(&config).await {
        Ok(state) => Some(TestContext {
            state,
            db_name: config.mongodb_db,
            _guard: guard,
        }),
        Err(err) => {
            eprintln!("Skipping test; init_state failed: {err:?}");
            None
        }
    }
}

pub async fn teardown(ctx: Option<TestContext>) {
    if let Some(ctx) = ctx {
        let uri =
            env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        if let Ok(client) = Client::with_uri_str(&uri).await {
            let _ = client.database(&ctx.db_name).drop().await;
        }
        drop(ctx);
    }
}
