use crate::domain::models::FailureKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("corrupt document: {0}")]
    Corrupt(String),

    #[error("password protected: {0}")]
    PasswordProtected(String),

    #[error("malformed document: {0}")]
    Malformed(String),
}

impl ExtractionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExtractionError::Unsupported(_) => FailureKind::Unsupported,
            ExtractionError::Corrupt(_) => FailureKind::Corrupt,
            ExtractionError::PasswordProtected(_) => FailureKind::PasswordProtected,
            ExtractionError::Malformed(_) => FailureKind::Malformed,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("no processable files are selected")]
    EmptySelection,

    #[error("export cancelled after {completed} of {total} files")]
    Cancelled { completed: usize, total: usize },
}
