// models.rs
// Documents stored in MongoDB plus the closed enums shared by the ledger and the API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Enrollment status. Students are normally retired through a status change
/// rather than deleted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StudentStatus {
    #[default]
    Active,
    Inactive,
    Completed,
    Dropped,
    Suspended,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "Active",
            StudentStatus::Inactive => "Inactive",
            StudentStatus::Completed => "Completed",
            StudentStatus::Dropped => "Dropped",
            StudentStatus::Suspended => "Suspended",
        }
    }
}

/// Outcome of one subject in an exam sitting, as entered by staff.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubjectOutcome {
    Pass,
    Fail,
    Absent,
}

impl SubjectOutcome {
    /// Fail and Absent both leave the subject to be re-attempted.
    pub fn is_failing(&self) -> bool {
        matches!(self, SubjectOutcome::Fail | SubjectOutcome::Absent)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OverallResult {
    Pass,
    Fail,
}

impl OverallResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallResult::Pass => "Pass",
            OverallResult::Fail => "Fail",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FeeType {
    #[serde(rename = "Course_Fee")]
    CourseFee,
    Installment,
    #[serde(rename = "Back_Subject")]
    BackSubject,
    #[serde(rename = "Late_Fee")]
    LateFee,
    Other,
}

impl FeeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeType::CourseFee => "Course_Fee",
            FeeType::Installment => "Installment",
            FeeType::BackSubject => "Back_Subject",
            FeeType::LateFee => "Late_Fee",
            FeeType::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PaymentMode {
    #[default]
    Cash,
    Upi,
    Card,
    #[serde(rename = "Bank_Transfer")]
    BankTransfer,
    Cheque,
}

/// Derived payment standing of a student.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FeeStatus {
    Paid,
    Partial,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcademicInfo {
    pub course: String,
    pub current_semester: u32,
    pub total_semesters: u32,
    pub joining_date: NaiveDate,
}

/// Per-semester slice of a fee structure. `total_amount` includes the
/// back-subject surcharges attributed to the semester.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemesterFee {
    pub semester_number: u32,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub remaining_amount: f64,
    #[serde(default)]
    pub back_subject_fees: f64,
}

/// Money a payment put into each semester, kept so deleting the payment
/// unwinds exactly the same slices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SemesterAllocation {
    pub semester_number: u32,
    pub amount: f64,
}

/// Embedded in [`Student`]; never stored on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeeStructure {
    pub total_course_fee: f64,
    pub total_paid: f64,
    pub remaining_amount: f64,
    pub number_of_installments: u32,
    pub installment_amount: f64,
    #[serde(default)]
    pub semester_fees: Vec<SemesterFee>,
}

/// Student document. `student_id` is the stable business key; `version`
/// guards read-modify-write cycles on the fee structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Student {
    pub student_id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub academic_info: AcademicInfo,
    pub fee_structure: FeeStructure,
    #[serde(default)]
    pub status: StudentStatus,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubjectResult {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub max_marks: Option<f64>,
    #[serde(default)]
    pub obtained_marks: Option<f64>,
    pub result: SubjectOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackSubject {
    pub name: String,
    pub code: String,
    pub fee: f64,
    #[serde(default)]
    pub is_cleared: bool,
    #[serde(default)]
    pub cleared_on: Option<NaiveDate>,
}

/// One exam sitting per (student, semester).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExamResult {
    pub id: String,
    pub student_id: String,
    pub course: String,
    pub semester: u32,
    pub exam_date: NaiveDate,
    pub subjects: Vec<SubjectResult>,
    pub overall_result: OverallResult,
    #[serde(default)]
    pub back_subjects: Vec<BackSubject>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExamResult {
    pub fn uncleared_back_subjects(&self) -> usize {
        self.back_subjects.iter().filter(|b| !b.is_cleared).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: String,
    pub receipt_no: String,
    pub student_id: String,
    pub fee_type: FeeType,
    pub amount: f64,
    #[serde(default)]
    pub discount: f64,
    pub final_amount: f64,
    #[serde(default)]
    pub payment_mode: PaymentMode,
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub installment_number: Option<u32>,
    /// Codes of the back subjects this payment covers.
    #[serde(default)]
    pub back_subjects: Vec<String>,
    #[serde(default)]
    pub result_id: Option<String>,
    #[serde(default)]
    pub allocations: Vec<SemesterAllocation>,
    /// Set when the result this payment was collected for has been deleted.
    #[serde(default)]
    pub orphaned: bool,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogSubject {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub max_marks: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseSemester {
    pub semester_number: u32,
    pub fee: f64,
    #[serde(default)]
    pub subjects: Vec<CatalogSubject>,
}

/// Course catalog entry, seeded from courses.json and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub name: String,
    #[serde(default)]
    pub slug: String,
    pub total_fee: f64,
    pub total_semesters: u32,
    #[serde(default)]
    pub semesters: Vec<CourseSemester>,
}

impl Course {
    /// Per-semester base fees indexed by semester number - 1. Semesters
    /// missing from the catalog contribute zero.
    pub fn semester_fee_template(&self) -> Vec<f64> {
        (1..=self.total_semesters)
            .map(|n| {
                self.semesters
                    .iter()
                    .find(|s| s.semester_number == n)
                    .map(|s| s.fee)
                    .unwrap_or(0.0)
            })
            .collect()
    }

    pub fn semester(&self, number: u32) -> Option<&CourseSemester> {
        self.semesters.iter().find(|s| s.semester_number == number)
    }
}
