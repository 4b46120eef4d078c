// Persistence collaborator used by the reconciler. Implemented over MongoDB
// for the service and in memory for tests.

use std::future::Future;

use anyhow::Result;
use serde::Serialize;

use crate::models::{Course, ExamResult, Payment, Student};

/// Records removed together with a student.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StudentRemoval {
    pub results_removed: u64,
    pub payments_removed: u64,
}

pub trait LedgerStore: Send + Sync + 'static {
    /// Atomically increments and returns the named counter (starts at 1).
    fn next_sequence(&self, name: &str) -> impl Future<Output = Result<i64>> + Send;

    fn find_course(&self, name: &str) -> impl Future<Output = Result<Option<Course>>> + Send;
    fn list_courses(&self) -> impl Future<Output = Result<Vec<Course>>> + Send;

    fn get_student(&self, student_id: &str)
    -> impl Future<Output = Result<Option<Student>>> + Send;
    fn list_students(&self) -> impl Future<Output = Result<Vec<Student>>> + Send;
    fn insert_student(&self, student: &Student) -> impl Future<Output = Result<()>> + Send;
    /// Writes `student` only if the stored version still equals
    /// `expected_version`; the stored version is bumped by one. Returns false
    /// when another writer got there first.
    fn replace_student(
        &self,
        student: &Student,
        expected_version: i64,
    ) -> impl Future<Output = Result<bool>> + Send;
    /// Removes the student's payments, then its results, then the student
    /// itself. A failure part-way leaves the student in place.
    fn delete_student(&self, student_id: &str)
    -> impl Future<Output = Result<StudentRemoval>> + Send;

    fn insert_result(&self, result: &ExamResult) -> impl Future<Output = Result<()>> + Send;
    fn get_result(&self, id: &str) -> impl Future<Output = Result<Option<ExamResult>>> + Send;
    fn find_result(
        &self,
        student_id: &str,
        semester: u32,
    ) -> impl Future<Output = Result<Option<ExamResult>>> + Send;
    fn list_results(
        &self,
        student_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<ExamResult>>> + Send;
    fn replace_result(&self, result: &ExamResult) -> impl Future<Output = Result<bool>> + Send;
    fn delete_result(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;

    fn insert_payment(&self, payment: &Payment) -> impl Future<Output = Result<()>> + Send;
    fn get_payment(&self, id: &str) -> impl Future<Output = Result<Option<Payment>>> + Send;
    fn list_payments(
        &self,
        student_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Payment>>> + Send;
    fn delete_payment(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;
    /// Marks back-subject payments collected against `result_id` as orphaned
    /// and returns how many were flagged.
    fn flag_orphaned_payments(&self, result_id: &str) -> impl Future<Output = Result<u64>> + Send;
}
