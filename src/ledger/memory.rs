// In-process LedgerStore. Backs the test-suite and can be told to fail
// specific writes so rollback paths get exercised.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
};

use anyhow::{Result, bail};
use slug::slugify;

use crate::models::{Course, ExamResult, FeeType, Payment, Student};

use super::store::{LedgerStore, StudentRemoval};

#[derive(Default)]
struct Tables {
    counters: HashMap<String, i64>,
    courses: Vec<Course>,
    students: Vec<Student>,
    results: Vec<ExamResult>,
    payments: Vec<Payment>,
}

#[derive(Default)]
struct Faults {
    student_writes: AtomicU32,
    stale_student_writes: AtomicU32,
    result_inserts: AtomicU32,
    result_replaces: AtomicU32,
    result_deletes: AtomicU32,
    payment_inserts: AtomicU32,
    payment_deletes: AtomicU32,
    orphan_flags: AtomicU32,
    student_deletes: AtomicU32,
}

/// Consumes one pending fault, if any.
fn trip(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn with_courses(courses: Vec<Course>) -> Self {
        let store = MemoryStore::default();
        store.tables().courses = courses
            .into_iter()
            .map(|mut c| {
                if c.slug.is_empty() {
                    c.slug = slugify(&c.name);
                }
                c
            })
            .collect();
        store
    }

    /// The next `n` student writes fail with a storage error.
    pub fn fail_student_writes(&self, n: u32) {
        self.faults.student_writes.store(n, Ordering::SeqCst);
    }

    /// The next `n` student writes lose the version check, as if another
    /// process had written first.
    pub fn stale_student_writes(&self, n: u32) {
        self.faults.stale_student_writes.store(n, Ordering::SeqCst);
    }

    pub fn fail_result_inserts(&self, n: u32) {
        self.faults.result_inserts.store(n, Ordering::SeqCst);
    }

    pub fn fail_result_replaces(&self, n: u32) {
        self.faults.result_replaces.store(n, Ordering::SeqCst);
    }

    pub fn fail_result_deletes(&self, n: u32) {
        self.faults.result_deletes.store(n, Ordering::SeqCst);
    }

    pub fn fail_payment_inserts(&self, n: u32) {
        self.faults.payment_inserts.store(n, Ordering::SeqCst);
    }

    pub fn fail_payment_deletes(&self, n: u32) {
        self.faults.payment_deletes.store(n, Ordering::SeqCst);
    }

    pub fn fail_orphan_flags(&self, n: u32) {
        self.faults.orphan_flags.store(n, Ordering::SeqCst);
    }

    /// The next `n` student deletes fail after the student's results and
    /// payments are gone, leaving the student document in place.
    pub fn fail_student_deletes(&self, n: u32) {
        self.faults.student_deletes.store(n, Ordering::SeqCst);
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LedgerStore for MemoryStore {
    async fn next_sequence(&self, name: &str) -> Result<i64> {
        let mut tables = self.tables();
        let seq = tables.counters.entry(name.to_string()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn find_course(&self, name: &str) -> Result<Option<Course>> {
        let slug = slugify(name);
        Ok(self
            .tables()
            .courses
            .iter()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        Ok(self.tables().courses.clone())
    }

    async fn get_student(&self, student_id: &str) -> Result<Option<Student>> {
        Ok(self
            .tables()
            .students
            .iter()
            .find(|s| s.student_id == student_id)
            .cloned())
    }

    async fn list_students(&self) -> Result<Vec<Student>> {
        Ok(self.tables().students.clone())
    }

    async fn insert_student(&self, student: &Student) -> Result<()> {
        let mut tables = self.tables();
        if tables
            .students
            .iter()
            .any(|s| s.student_id == student.student_id)
        {
            bail!("duplicate student_id {}", student.student_id);
        }
        tables.students.push(student.clone());
        Ok(())
    }

    async fn replace_student(&self, student: &Student, expected_version: i64) -> Result<bool> {
        if trip(&self.faults.student_writes) {
            bail!("injected failure writing student {}", student.student_id);
        }
        if trip(&self.faults.stale_student_writes) {
            return Ok(false);
        }
        let mut tables = self.tables();
        match tables
            .students
            .iter_mut()
            .find(|s| s.student_id == student.student_id)
        {
            Some(stored) if stored.version == expected_version => {
                *stored = Student {
                    version: expected_version + 1,
                    ..student.clone()
                };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_student(&self, student_id: &str) -> Result<StudentRemoval> {
        let mut tables = self.tables();
        let payments_before = tables.payments.len();
        tables.payments.retain(|p| p.student_id != student_id);
        let results_before = tables.results.len();
        tables.results.retain(|r| r.student_id != student_id);
        let removal = StudentRemoval {
            results_removed: (results_before - tables.results.len()) as u64,
            payments_removed: (payments_before - tables.payments.len()) as u64,
        };
        if trip(&self.faults.student_deletes) {
            bail!("injected failure deleting student {student_id}");
        }
        tables.students.retain(|s| s.student_id != student_id);
        Ok(removal)
    }

    async fn insert_result(&self, result: &ExamResult) -> Result<()> {
        if trip(&self.faults.result_inserts) {
            bail!("injected failure inserting result {}", result.id);
        }
        let mut tables = self.tables();
        if tables
            .results
            .iter()
            .any(|r| r.student_id == result.student_id && r.semester == result.semester)
        {
            bail!(
                "duplicate result for {} semester {}",
                result.student_id,
                result.semester
            );
        }
        tables.results.push(result.clone());
        Ok(())
    }

    async fn get_result(&self, id: &str) -> Result<Option<ExamResult>> {
        Ok(self.tables().results.iter().find(|r| r.id == id).cloned())
    }

    async fn find_result(&self, student_id: &str, semester: u32) -> Result<Option<ExamResult>> {
        Ok(self
            .tables()
            .results
            .iter()
            .find(|r| r.student_id == student_id && r.semester == semester)
            .cloned())
    }

    async fn list_results(&self, student_id: Option<&str>) -> Result<Vec<ExamResult>> {
        Ok(self
            .tables()
            .results
            .iter()
            .filter(|r| student_id.is_none_or(|id| r.student_id == id))
            .cloned()
            .collect())
    }

    async fn replace_result(&self, result: &ExamResult) -> Result<bool> {
        if trip(&self.faults.result_replaces) {
            bail!("injected failure replacing result {}", result.id);
        }
        let mut tables = self.tables();
        match tables.results.iter_mut().find(|r| r.id == result.id) {
            Some(stored) => {
                *stored = result.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_result(&self, id: &str) -> Result<bool> {
        if trip(&self.faults.result_deletes) {
            bail!("injected failure deleting result {id}");
        }
        let mut tables = self.tables();
        let before = tables.results.len();
        tables.results.retain(|r| r.id != id);
        Ok(tables.results.len() < before)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        if trip(&self.faults.payment_inserts) {
            bail!("injected failure inserting payment {}", payment.receipt_no);
        }
        let mut tables = self.tables();
        if tables
            .payments
            .iter()
            .any(|p| p.receipt_no == payment.receipt_no)
        {
            bail!("duplicate receipt_no {}", payment.receipt_no);
        }
        tables.payments.push(payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: &str) -> Result<Option<Payment>> {
        Ok(self.tables().payments.iter().find(|p| p.id == id).cloned())
    }

    async fn list_payments(&self, student_id: Option<&str>) -> Result<Vec<Payment>> {
        Ok(self
            .tables()
            .payments
            .iter()
            .filter(|p| student_id.is_none_or(|id| p.student_id == id))
            .cloned()
            .collect())
    }

    async fn delete_payment(&self, id: &str) -> Result<bool> {
        if trip(&self.faults.payment_deletes) {
            bail!("injected failure deleting payment {id}");
        }
        let mut tables = self.tables();
        let before = tables.payments.len();
        tables.payments.retain(|p| p.id != id);
        Ok(tables.payments.len() < before)
    }

    async fn flag_orphaned_payments(&self, result_id: &str) -> Result<u64> {
        if trip(&self.faults.orphan_flags) {
            bail!("injected failure flagging payments of result {result_id}");
        }
        let mut flagged = 0;
        for payment in self.tables().payments.iter_mut() {
            if payment.fee_type == FeeType::BackSubject
                && payment.result_id.as_deref() == Some(result_id)
                && !payment.orphaned
            {
                payment.orphaned = true;
                flagged += 1;
            }
        }
        Ok(flagged)
    }
}
