use std::path::PathBuf;
use thiserror::Error;

/// Problems with what the patient typed or picked. Always recoverable by
/// asking again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("you can book at most {max} slots at once (picked {chosen})")]
    TooManySlots { chosen: usize, max: usize },

    #[error("slot index {index} is not open; choose from {open:?}")]
    SlotNotOpen { index: usize, open: Vec<usize> },

    #[error("'{0}' is not a slot index")]
    UnparseableIndex(String),

    #[error("'{0}' is not a date in YYYY/MM/DD form")]
    InvalidDate(String),

    #[error("'{0}' is not a mood between 1 and 5")]
    InvalidMood(String),

    #[error("invalid value: {0}")]
    InvalidField(String),
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("file '{}' not found", path.display())]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(String),

    #[error("malformed data in '{}': {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("{0}")]
    Conflict(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BookingError {
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BookingError::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors the user can fix by changing their input.
    pub fn is_validation(&self) -> bool {
        matches!(self, BookingError::Validation(_))
    }
}

pub type Result<T, E = BookingError> = std::result::Result<T, E>;
