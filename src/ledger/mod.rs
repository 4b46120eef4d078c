//! Fee and result ledger.
//!
//! [`evaluator`] turns subject outcomes into a verdict and back subjects,
//! [`fees`] owns the arithmetic on a student's fee structure, and
//! [`reconciler`] ties the two to storage so a result or payment and its fee
//! effect are written together or not at all.

pub mod error;
pub mod evaluator;
pub mod fees;
pub mod locks;
pub mod memory;
pub mod reconciler;
pub mod reports;
pub mod store;

pub use error::{LedgerError, Result};
pub use evaluator::{Evaluation, SubjectInput, evaluate};
pub use fees::BACK_SUBJECT_FEE;
pub use memory::MemoryStore;
pub use reconciler::{
    NewStudent, PublishResult, Receipt, RecordPayment, Reconciler, ResultOutcome, ResultRemoval,
    ReviseResult, StudentUpdate,
};
pub use store::{LedgerStore, StudentRemoval};
