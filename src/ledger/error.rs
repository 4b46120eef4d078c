use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Rejected input. Always raised before anything is written.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    /// A two-record write half-succeeded and the rollback failed too. The
    /// fee structure of the student may no longer match its records.
    #[error("ledger consistency violated: {context}")]
    Consistency { context: String },
    #[error("student {student_id} kept changing underneath the update")]
    Conflict { student_id: String },
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether retrying the whole operation from scratch is reasonable.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Conflict { .. } | LedgerError::Storage(_))
    }
}
