// Result evaluator: turns per-subject outcomes into a verdict and a priced
// list of back subjects. Pure; nothing here touches storage.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::{BackSubject, OverallResult, SubjectOutcome, SubjectResult};

use super::error::{LedgerError, Result};

/// One subject as submitted by the caller. `result` is optional on the wire
/// so a missing outcome can be reported per subject instead of failing the
/// whole body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectInput {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub max_marks: Option<f64>,
    #[serde(default)]
    pub obtained_marks: Option<f64>,
    #[serde(default)]
    pub result: Option<SubjectOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub semester: u32,
    pub overall_result: OverallResult,
    pub subjects: Vec<SubjectResult>,
    pub back_subjects: Vec<BackSubject>,
    pub back_subject_fee_total: f64,
}

impl Evaluation {
    pub fn back_subjects_count(&self) -> usize {
        self.back_subjects.len()
    }
}

pub fn evaluate(
    semester: Option<u32>,
    subjects: &[SubjectInput],
    unit_fee: f64,
) -> Result<Evaluation> {
    let semester = match semester {
        Some(n) if n > 0 => n,
        _ => return Err(LedgerError::validation("semester", "semester is required")),
    };
    if subjects.is_empty() {
        return Err(LedgerError::validation(
            "subjects",
            format!("no subjects for semester {semester}"),
        ));
    }

    let mut seen_codes = HashSet::new();
    let mut evaluated = Vec::with_capacity(subjects.len());
    for (idx, subject) in subjects.iter().enumerate() {
        let name = subject.name.trim();
        let code = subject.code.trim();
        if name.is_empty() {
            return Err(LedgerError::validation(
                format!("subjects[{idx}].name"),
                "subject name is required",
            ));
        }
        if code.is_empty() {
            return Err(LedgerError::validation(
                format!("subjects[{idx}].code"),
                format!("subject code is required for {name}"),
            ));
        }
        if !seen_codes.insert(code.to_string()) {
            return Err(LedgerError::validation(
                format!("subjects[{idx}].code"),
                format!("subject code {code} appears more than once"),
            ));
        }
        let result = subject.result.ok_or_else(|| {
            LedgerError::validation(
                format!("subjects[{idx}].result"),
                format!("result is required for {name} ({code})"),
            )
        })?;
        if let (Some(max), Some(obtained)) = (subject.max_marks, subject.obtained_marks) {
            if obtained < 0.0 || obtained > max {
                return Err(LedgerError::validation(
                    format!("subjects[{idx}].obtained_marks"),
                    format!("obtained marks {obtained} must be between 0 and {max}"),
                ));
            }
        }

        evaluated.push(SubjectResult {
            name: name.to_string(),
            code: code.to_string(),
            max_marks: subject.max_marks,
            obtained_marks: subject.obtained_marks,
            result,
        });
    }

    let back_subjects: Vec<BackSubject> = evaluated
        .iter()
        .filter(|s| s.result.is_failing())
        .map(|s| BackSubject {
            name: s.name.clone(),
            code: s.code.clone(),
            fee: unit_fee,
            is_cleared: false,
            cleared_on: None,
        })
        .collect();

    let overall_result = if back_subjects.is_empty() {
        OverallResult::Pass
    } else {
        OverallResult::Fail
    };
    let back_subject_fee_total = back_subjects.len() as f64 * unit_fee;

    Ok(Evaluation {
        semester,
        overall_result,
        subjects: evaluated,
        back_subjects,
        back_subject_fee_total,
    })
}

/// Keeps the cleared flag of back subjects that survive a re-evaluation,
/// matched by subject code.
pub fn carry_cleared(previous: &[BackSubject], mut next: Vec<BackSubject>) -> Vec<BackSubject> {
    for back in &mut next {
        if let Some(old) = previous.iter().find(|p| p.code == back.code && p.is_cleared) {
            back.is_cleared = true;
            back.cleared_on = old.cleared_on;
            back.fee = old.fee;
        }
    }
    next
}
