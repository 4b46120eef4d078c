// Read-only summaries over students and results for the reports pages.

use serde::Serialize;

use crate::models::{ExamResult, FeeStatus, OverallResult, Student};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Defaulter {
    pub student_id: String,
    pub name: String,
    pub course: String,
    pub remaining_amount: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FeeSummary {
    pub students: usize,
    pub total_fee: f64,
    pub total_collected: f64,
    pub total_outstanding: f64,
    pub paid: usize,
    pub partial: usize,
    pub pending: usize,
    pub defaulters: Vec<Defaulter>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ResultSummary {
    pub results: usize,
    pub passed: usize,
    pub failed: usize,
    pub open_back_subjects: usize,
    pub cleared_back_subjects: usize,
}

/// Defaulters are listed largest balance first.
pub fn fee_summary(students: &[Student]) -> FeeSummary {
    let mut summary = FeeSummary {
        students: students.len(),
        ..FeeSummary::default()
    };
    for student in students {
        let fees = &student.fee_structure;
        summary.total_fee += fees.total_course_fee;
        summary.total_collected += fees.total_paid;
        summary.total_outstanding += fees.outstanding();
        match fees.fee_status() {
            FeeStatus::Paid => summary.paid += 1,
            FeeStatus::Partial => summary.partial += 1,
            FeeStatus::Pending => summary.pending += 1,
        }
        if fees.fee_status() != FeeStatus::Paid {
            summary.defaulters.push(Defaulter {
                student_id: student.student_id.clone(),
                name: student.name.clone(),
                course: student.academic_info.course.clone(),
                remaining_amount: fees.outstanding(),
            });
        }
    }
    summary
        .defaulters
        .sort_by(|a, b| b.remaining_amount.total_cmp(&a.remaining_amount));
    summary
}

pub fn result_summary(results: &[ExamResult]) -> ResultSummary {
    let mut summary = ResultSummary {
        results: results.len(),
        ..ResultSummary::default()
    };
    for result in results {
        match result.overall_result {
            OverallResult::Pass => summary.passed += 1,
            OverallResult::Fail => summary.failed += 1,
        }
        let open = result.uncleared_back_subjects();
        summary.open_back_subjects += open;
        summary.cleared_back_subjects += result.back_subjects.len() - open;
    }
    summary
}
