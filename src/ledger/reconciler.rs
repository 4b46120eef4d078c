// Ledger reconciler: applies the fee side effects of results and payments to
// the owning student, one student at a time, and undoes the first write when
// the second one fails.

use std::future::Future;

use bson::oid::ObjectId;
use chrono::{Datelike, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::models::{
    AcademicInfo, ExamResult, FeeStructure, FeeType, OverallResult, Payment, PaymentMode,
    Student, StudentStatus,
};

use super::{
    error::{LedgerError, Result},
    evaluator::{SubjectInput, carry_cleared, evaluate},
    fees::{BACK_SUBJECT_FEE, round2},
    locks::StudentLocks,
    store::{LedgerStore, StudentRemoval},
};

pub const DEFAULT_WRITE_RETRIES: u32 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct NewStudent {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub course: String,
    #[serde(default)]
    pub joining_date: Option<NaiveDate>,
    pub number_of_installments: u32,
    /// Overrides the catalog fee for this student.
    #[serde(default)]
    pub total_course_fee: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: Option<StudentStatus>,
    #[serde(default)]
    pub current_semester: Option<u32>,
    #[serde(default)]
    pub total_course_fee: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishResult {
    pub student_id: String,
    #[serde(default)]
    pub semester: Option<u32>,
    pub exam_date: NaiveDate,
    #[serde(default)]
    pub subjects: Vec<SubjectInput>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviseResult {
    #[serde(default)]
    pub exam_date: Option<NaiveDate>,
    pub subjects: Vec<SubjectInput>,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Answer to publishing or revising a result. On revision
/// `back_subject_fee_added` is negative when fees were taken off.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResultOutcome {
    pub result_id: String,
    pub overall_result: OverallResult,
    pub back_subjects_count: usize,
    pub back_subject_fee_added: f64,
    pub total_course_fee: f64,
    pub remaining_amount: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResultRemoval {
    pub result_id: String,
    pub back_subject_fee_removed: f64,
    pub orphaned_payments: u64,
    pub total_course_fee: f64,
    pub remaining_amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordPayment {
    pub student_id: String,
    pub fee_type: FeeType,
    pub amount: f64,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub payment_mode: PaymentMode,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub installment_number: Option<u32>,
    #[serde(default)]
    pub back_subjects: Vec<String>,
    #[serde(default)]
    pub result_id: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub payment: Payment,
    pub total_paid: f64,
    pub remaining_amount: f64,
}

pub struct Reconciler<S> {
    store: S,
    locks: StudentLocks,
    write_retries: u32,
    unit_fee: f64,
}

fn new_record_id() -> String {
    ObjectId::new().to_hex()
}

fn clean_opt(input: Option<String>) -> Option<String> {
    input.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

impl<S: LedgerStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Reconciler {
            store,
            locks: StudentLocks::default(),
            write_retries: DEFAULT_WRITE_RETRIES,
            unit_fee: BACK_SUBJECT_FEE,
        }
    }

    pub fn with_write_retries(mut self, retries: u32) -> Self {
        self.write_retries = retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn student(&self, student_id: &str) -> Result<Student> {
        self.store
            .get_student(student_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("student", student_id))
    }

    pub async fn result(&self, id: &str) -> Result<ExamResult> {
        self.store
            .get_result(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("result", id))
    }

    pub async fn payment(&self, id: &str) -> Result<Payment> {
        self.store
            .get_payment(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("payment", id))
    }

    pub async fn create_student(&self, req: NewStudent) -> Result<Student> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(LedgerError::validation("name", "student name is required"));
        }
        let course = self
            .store
            .find_course(&req.course)
            .await?
            .ok_or_else(|| LedgerError::not_found("course", req.course.trim()))?;

        let total = req.total_course_fee.unwrap_or(course.total_fee);
        let fee_structure = FeeStructure::initialize(
            total,
            req.number_of_installments,
            &course.semester_fee_template(),
        )?;

        let joining_date = req.joining_date.unwrap_or_else(|| Local::now().date_naive());
        let seq = self.store.next_sequence("student").await?;
        let now = Utc::now();
        let student = Student {
            student_id: format!("STU{}{:04}", joining_date.year(), seq),
            name: name.to_string(),
            phone: clean_opt(req.phone),
            email: clean_opt(req.email),
            academic_info: AcademicInfo {
                course: course.name.clone(),
                current_semester: 1,
                total_semesters: course.total_semesters,
                joining_date,
            },
            fee_structure,
            status: StudentStatus::Active,
            version: 0,
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.store.insert_student(&student).await?;
        info!(
            student_id = %student.student_id,
            course = %student.academic_info.course,
            total_course_fee = student.fee_structure.total_course_fee,
            "student enrolled"
        );
        Ok(student)
    }

    pub async fn update_student(&self, student_id: &str, update: StudentUpdate) -> Result<Student> {
        let _guard = self.locks.lock(student_id).await;
        let student = self
            .mutate_student(student_id, |student| {
                if let Some(name) = update.name.as_deref() {
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(LedgerError::validation("name", "student name is required"));
                    }
                    student.name = name.to_string();
                }
                if update.phone.is_some() {
                    student.phone = clean_opt(update.phone.clone());
                }
                if update.email.is_some() {
                    student.email = clean_opt(update.email.clone());
                }
                if let Some(status) = update.status {
                    student.status = status;
                }
                if let Some(semester) = update.current_semester {
                    let total = student.academic_info.total_semesters;
                    if semester == 0 || semester > total {
                        return Err(LedgerError::validation(
                            "current_semester",
                            format!("current semester must be between 1 and {total}"),
                        ));
                    }
                    student.academic_info.current_semester = semester;
                }
                if let Some(total) = update.total_course_fee {
                    student.fee_structure.change_course_fee(total)?;
                }
                Ok(())
            })
            .await?;
        info!(student_id, status = student.status.as_str(), "student updated");
        Ok(student)
    }

    pub async fn change_course_fee(&self, student_id: &str, new_total: f64) -> Result<Student> {
        self.update_student(
            student_id,
            StudentUpdate {
                total_course_fee: Some(new_total),
                ..StudentUpdate::default()
            },
        )
        .await
    }

    pub async fn delete_student(&self, student_id: &str) -> Result<StudentRemoval> {
        let _guard = self.locks.lock(student_id).await;
        self.student(student_id).await?;
        let removal = self.store.delete_student(student_id).await?;
        info!(
            student_id,
            results_removed = removal.results_removed,
            payments_removed = removal.payments_removed,
            "student deleted"
        );
        Ok(removal)
    }

    pub async fn publish_result(&self, req: PublishResult) -> Result<ResultOutcome> {
        let evaluation = evaluate(req.semester, &req.subjects, self.unit_fee)?;
        let semester = evaluation.semester;
        let count = evaluation.back_subjects_count();

        let _guard = self.locks.lock(&req.student_id).await;
        let student = self.student(&req.student_id).await?;
        let total_semesters = student.academic_info.total_semesters;
        if semester > total_semesters {
            return Err(LedgerError::validation(
                "semester",
                format!("semester {semester} is beyond the {total_semesters} semesters of the course"),
            ));
        }
        self.check_catalog(&student.academic_info.course, semester, &req.subjects)
            .await?;
        if self
            .store
            .find_result(&student.student_id, semester)
            .await?
            .is_some()
        {
            return Err(LedgerError::validation(
                "semester",
                format!("a result for semester {semester} is already published"),
            ));
        }
        student
            .fee_structure
            .clone()
            .add_back_subject_fees(semester, count, self.unit_fee)?;

        let now = Utc::now();
        let result = ExamResult {
            id: new_record_id(),
            student_id: student.student_id.clone(),
            course: student.academic_info.course.clone(),
            semester,
            exam_date: req.exam_date,
            subjects: evaluation.subjects,
            overall_result: evaluation.overall_result,
            back_subjects: evaluation.back_subjects,
            remarks: clean_opt(req.remarks),
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.store.insert_result(&result).await?;

        let fees = if count > 0 {
            let updated = self
                .mutate_fees(&student.student_id, |fees| {
                    fees.add_back_subject_fees(semester, count, self.unit_fee)
                        .map(|_| ())
                })
                .await;
            match updated {
                Ok(student) => student.fee_structure,
                Err(err) => {
                    let undo = async {
                        self.store.delete_result(&result.id).await.map(|_| ())
                    };
                    return Err(self
                        .rollback(err, &student.student_id, "publishing result", undo)
                        .await);
                }
            }
        } else {
            student.fee_structure
        };

        info!(
            student_id = %result.student_id,
            result_id = %result.id,
            semester,
            overall = result.overall_result.as_str(),
            back_subjects = count,
            fee_added = evaluation.back_subject_fee_total,
            "result published"
        );
        Ok(ResultOutcome {
            result_id: result.id,
            overall_result: result.overall_result,
            back_subjects_count: count,
            back_subject_fee_added: evaluation.back_subject_fee_total,
            total_course_fee: fees.total_course_fee,
            remaining_amount: fees.remaining_amount,
        })
    }

    /// Re-evaluates a published result. Only the change in uncleared back
    /// subjects moves money.
    pub async fn revise_result(&self, result_id: &str, req: ReviseResult) -> Result<ResultOutcome> {
        let student_id = self.result(result_id).await?.student_id;
        let _guard = self.locks.lock(&student_id).await;
        let existing = self.result(result_id).await?;

        let evaluation = evaluate(Some(existing.semester), &req.subjects, self.unit_fee)?;
        self.check_catalog(&existing.course, existing.semester, &req.subjects)
            .await?;
        let back_subjects = carry_cleared(&existing.back_subjects, evaluation.back_subjects);
        let revised = ExamResult {
            exam_date: req.exam_date.unwrap_or(existing.exam_date),
            subjects: evaluation.subjects,
            overall_result: evaluation.overall_result,
            back_subjects,
            remarks: clean_opt(req.remarks).or_else(|| existing.remarks.clone()),
            updated_at: Some(Utc::now()),
            ..existing.clone()
        };

        let before = existing.uncleared_back_subjects();
        let after = revised.uncleared_back_subjects();
        let semester = existing.semester;
        let unit_fee = self.unit_fee;
        let apply = move |fees: &mut FeeStructure| -> Result<f64> {
            if after >= before {
                fees.add_back_subject_fees(semester, after - before, unit_fee)
            } else {
                fees.remove_back_subject_fees(semester, before - after, unit_fee)
                    .map(|removed| -removed)
            }
        };

        let student = self.student(&student_id).await?;
        let delta = apply(&mut student.fee_structure.clone())?;

        if !self.store.replace_result(&revised).await? {
            return Err(LedgerError::not_found("result", result_id));
        }

        let fees = if after != before {
            match self
                .mutate_fees(&student_id, |fees| apply(fees).map(|_| ()))
                .await
            {
                Ok(student) => student.fee_structure,
                Err(err) => {
                    let undo = async { self.store.replace_result(&existing).await.map(|_| ()) };
                    return Err(self
                        .rollback(err, &student_id, "revising result", undo)
                        .await);
                }
            }
        } else {
            student.fee_structure
        };

        info!(
            student_id = %student_id,
            result_id,
            back_subjects_before = before,
            back_subjects_after = after,
            fee_delta = delta,
            "result revised"
        );
        Ok(ResultOutcome {
            result_id: revised.id,
            overall_result: revised.overall_result,
            back_subjects_count: revised.back_subjects.len(),
            back_subject_fee_added: delta,
            total_course_fee: fees.total_course_fee,
            remaining_amount: fees.remaining_amount,
        })
    }

    /// Deletes a result and takes its uncleared back-subject fees off the
    /// student. Back-subject payments collected for it are kept and flagged
    /// as orphaned.
    pub async fn delete_result(&self, result_id: &str) -> Result<ResultRemoval> {
        let student_id = self.result(result_id).await?.student_id;
        let _guard = self.locks.lock(&student_id).await;
        let existing = self.result(result_id).await?;
        let open = existing.uncleared_back_subjects();
        let semester = existing.semester;

        let student = self.student(&student_id).await?;
        let removed = student
            .fee_structure
            .clone()
            .remove_back_subject_fees(semester, open, self.unit_fee)?;

        if !self.store.delete_result(result_id).await? {
            return Err(LedgerError::not_found("result", result_id));
        }

        let fees = if open > 0 {
            match self
                .mutate_fees(&student_id, |fees| {
                    fees.remove_back_subject_fees(semester, open, self.unit_fee)
                        .map(|_| ())
                })
                .await
            {
                Ok(student) => student.fee_structure,
                Err(err) => {
                    let undo = async { self.store.insert_result(&existing).await };
                    return Err(self
                        .rollback(err, &student_id, "deleting result", undo)
                        .await);
                }
            }
        } else {
            student.fee_structure
        };

        let orphaned_payments = match self.store.flag_orphaned_payments(result_id).await {
            Ok(n) => n,
            Err(err) => {
                error!(
                    student_id = %student_id,
                    result_id,
                    semester,
                    fee_removed = removed,
                    error = %format!("{err:#}"),
                    "result deleted but its back-subject payments were not flagged"
                );
                return Err(LedgerError::Consistency {
                    context: format!(
                        "result {result_id} of student {student_id} was deleted but flagging its back-subject payments failed ({err:#})"
                    ),
                });
            }
        };
        if orphaned_payments > 0 {
            warn!(
                student_id = %student_id,
                result_id,
                orphaned_payments,
                "deleted result had back-subject payments; flagged for review"
            );
        }

        info!(student_id = %student_id, result_id, fee_removed = removed, "result deleted");
        Ok(ResultRemoval {
            result_id: result_id.to_string(),
            back_subject_fee_removed: removed,
            orphaned_payments,
            total_course_fee: fees.total_course_fee,
            remaining_amount: fees.remaining_amount,
        })
    }

    /// Marks one back subject as cleared after a successful re-exam. The
    /// charge stays on the student.
    pub async fn clear_back_subject(
        &self,
        result_id: &str,
        code: &str,
        cleared_on: Option<NaiveDate>,
    ) -> Result<ExamResult> {
        let student_id = self.result(result_id).await?.student_id;
        let _guard = self.locks.lock(&student_id).await;
        let mut result = self.result(result_id).await?;

        let back = result
            .back_subjects
            .iter_mut()
            .find(|b| b.code == code)
            .ok_or_else(|| LedgerError::not_found("back subject", code))?;
        if back.is_cleared {
            return Err(LedgerError::validation(
                "code",
                format!("back subject {code} is already cleared"),
            ));
        }
        back.is_cleared = true;
        back.cleared_on = Some(cleared_on.unwrap_or_else(|| Local::now().date_naive()));
        result.updated_at = Some(Utc::now());

        if !self.store.replace_result(&result).await? {
            return Err(LedgerError::not_found("result", result_id));
        }
        info!(student_id = %student_id, result_id, code, "back subject cleared");
        Ok(result)
    }

    pub async fn record_payment(&self, req: RecordPayment) -> Result<Receipt> {
        let back_subjects: Vec<String> = req
            .back_subjects
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if req.fee_type == FeeType::BackSubject && back_subjects.is_empty() {
            return Err(LedgerError::validation(
                "back_subjects",
                "back-subject payments must name at least one subject",
            ));
        }

        let _guard = self.locks.lock(&req.student_id).await;
        let student = self.student(&req.student_id).await?;
        student
            .fee_structure
            .clone()
            .apply_payment(req.amount, req.discount)?;

        if let Some(n) = req.installment_number {
            let max = student.fee_structure.number_of_installments;
            if n == 0 || n > max {
                return Err(LedgerError::validation(
                    "installment_number",
                    format!("installment number must be between 1 and {max}"),
                ));
            }
        }
        let result_id = clean_opt(req.result_id);
        if let Some(id) = result_id.as_deref() {
            let result = self.result(id).await?;
            if result.student_id != student.student_id {
                return Err(LedgerError::validation(
                    "result_id",
                    format!("result {id} belongs to another student"),
                ));
            }
            if let Some(code) = back_subjects
                .iter()
                .find(|code| !result.back_subjects.iter().any(|b| b.code == **code))
            {
                return Err(LedgerError::validation(
                    "back_subjects",
                    format!("{code} is not a back subject of result {id}"),
                ));
            }
        }

        let payment_date = req.payment_date.unwrap_or_else(|| Local::now().date_naive());
        let seq = self.store.next_sequence("receipt").await?;

        let mut allocations = Vec::new();
        let updated = self
            .mutate_fees(&student.student_id, |fees| {
                allocations = fees.apply_payment(req.amount, req.discount)?;
                Ok(())
            })
            .await?;

        let payment = Payment {
            id: new_record_id(),
            receipt_no: format!("RCP{}{:05}", payment_date.format("%Y%m%d"), seq),
            student_id: student.student_id.clone(),
            fee_type: req.fee_type,
            amount: req.amount,
            discount: req.discount,
            final_amount: round2(req.amount - req.discount),
            payment_mode: req.payment_mode,
            payment_date,
            installment_number: req.installment_number,
            back_subjects,
            result_id,
            allocations,
            orphaned: false,
            remarks: clean_opt(req.remarks),
            created_at: Some(Utc::now()),
        };

        if let Err(err) = self.store.insert_payment(&payment).await {
            let undo = async {
                self.mutate_fees(&payment.student_id, |fees| {
                    fees.reverse_payment(payment.amount, payment.discount, &payment.allocations)
                })
                .await
                .map(|_| ())
                .map_err(anyhow::Error::from)
            };
            return Err(self
                .rollback(err.into(), &payment.student_id, "recording payment", undo)
                .await);
        }

        info!(
            student_id = %payment.student_id,
            receipt_no = %payment.receipt_no,
            fee_type = payment.fee_type.as_str(),
            final_amount = payment.final_amount,
            "payment recorded"
        );
        Ok(Receipt {
            total_paid: updated.fee_structure.total_paid,
            remaining_amount: updated.fee_structure.remaining_amount,
            payment,
        })
    }

    /// Reverses a payment on the ledger, then removes the record.
    pub async fn delete_payment(&self, payment_id: &str) -> Result<FeeStructure> {
        let student_id = self.payment(payment_id).await?.student_id;
        let _guard = self.locks.lock(&student_id).await;
        let payment = self.payment(payment_id).await?;

        let updated = self
            .mutate_fees(&student_id, |fees| {
                fees.reverse_payment(payment.amount, payment.discount, &payment.allocations)
            })
            .await?;

        let deleted = self.store.delete_payment(payment_id).await;
        if !matches!(deleted, Ok(true)) {
            let err = match deleted {
                Err(err) => LedgerError::Storage(err),
                _ => LedgerError::not_found("payment", payment_id),
            };
            let undo = async {
                self.mutate_fees(&student_id, |fees| {
                    fees.restore_payment(payment.amount, payment.discount, &payment.allocations)
                })
                .await
                .map(|_| ())
                .map_err(anyhow::Error::from)
            };
            return Err(self
                .rollback(err, &student_id, "deleting payment", undo)
                .await);
        }

        info!(
            student_id = %student_id,
            receipt_no = %payment.receipt_no,
            final_amount = payment.final_amount,
            "payment deleted"
        );
        Ok(updated.fee_structure)
    }

    /// Rejects a semester the course catalog lists no subjects for, and
    /// subject codes the catalog does not know for that semester.
    async fn check_catalog(
        &self,
        course: &str,
        semester: u32,
        subjects: &[SubjectInput],
    ) -> Result<()> {
        let catalog = self.store.find_course(course).await?;
        let listed = catalog
            .as_ref()
            .and_then(|c| c.semester(semester))
            .map(|s| s.subjects.as_slice())
            .unwrap_or_default();
        if listed.is_empty() {
            return Err(LedgerError::validation(
                "semester",
                format!("no subjects exist for {course} semester {semester}"),
            ));
        }
        if let Some((idx, subject)) = subjects
            .iter()
            .enumerate()
            .find(|(_, s)| !listed.iter().any(|c| c.code == s.code.trim()))
        {
            return Err(LedgerError::validation(
                format!("subjects[{idx}].code"),
                format!(
                    "{} is not a subject of {course} semester {semester}",
                    subject.code.trim()
                ),
            ));
        }
        Ok(())
    }

    async fn mutate_fees<F>(&self, student_id: &str, mut mutate: F) -> Result<Student>
    where
        F: FnMut(&mut FeeStructure) -> Result<()> + Send,
    {
        self.mutate_student(student_id, |student| mutate(&mut student.fee_structure))
            .await
    }

    /// Read-modify-write on one student guarded by the version check. On a
    /// lost race the student is reloaded and `mutate` runs again.
    async fn mutate_student<F>(&self, student_id: &str, mut mutate: F) -> Result<Student>
    where
        F: FnMut(&mut Student) -> Result<()> + Send,
    {
        for attempt in 0..=self.write_retries {
            let mut student = self.student(student_id).await?;
            let expected = student.version;
            mutate(&mut student)?;
            debug_assert!(student.fee_structure.is_consistent());
            student.updated_at = Some(Utc::now());
            if self.store.replace_student(&student, expected).await? {
                student.version = expected + 1;
                return Ok(student);
            }
            warn!(student_id, attempt, "student changed concurrently, retrying");
        }
        Err(LedgerError::Conflict {
            student_id: student_id.to_string(),
        })
    }

    /// Runs `undo` after the second write of an operation failed. Returns
    /// the original error when the undo worked, a consistency error when it
    /// did not.
    async fn rollback<U>(
        &self,
        cause: LedgerError,
        student_id: &str,
        operation: &str,
        undo: U,
    ) -> LedgerError
    where
        U: Future<Output = anyhow::Result<()>>,
    {
        match undo.await {
            Ok(()) => {
                warn!(student_id, operation, error = %cause, "rolled back partial write");
                cause
            }
            Err(undo_err) => {
                error!(
                    student_id,
                    operation,
                    error = %cause,
                    rollback_error = %undo_err,
                    "ledger left inconsistent; manual reconciliation required"
                );
                LedgerError::Consistency {
                    context: format!(
                        "{operation} for student {student_id} failed ({cause}) and rollback failed ({undo_err:#})"
                    ),
                }
            }
        }
    }
}
