use chrono::NaiveDate;

use crate::codec::ImportError;
use crate::storage::StorageError;

/// Input rejected before any mutation or flush.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyTaskText,
    EmptyProjectName,
    EmptyCountdownLabel,
    InvalidDate(String),
    DateOrder { start: NaiveDate, end: NaiveDate },
    UnknownColor(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyTaskText => write!(f, "task text must not be empty"),
            ValidationError::EmptyProjectName => write!(f, "project name must not be empty"),
            ValidationError::EmptyCountdownLabel => write!(f, "countdown label must not be empty"),
            ValidationError::InvalidDate(raw) => write!(f, "invalid date {raw:?}, expected YYYY-MM-DD"),
            ValidationError::DateOrder { start, end } => {
                write!(f, "start date {start} is after end date {end}")
            }
            ValidationError::UnknownColor(raw) => write!(f, "color {raw} is not in the palette"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug)]
pub enum DashboardError {
    /// A previous flush is still pending.
    Busy,
    NotFound(String),
    NoGesture,
    Validation(ValidationError),
    Storage(StorageError),
    Import(ImportError),
}

impl std::fmt::Display for DashboardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DashboardError::Busy => write!(f, "busy: a previous change is still being saved"),
            DashboardError::NotFound(id) => write!(f, "not found: {id}"),
            DashboardError::NoGesture => write!(f, "no drag in progress"),
            DashboardError::Validation(err) => write!(f, "validation error: {err}"),
            DashboardError::Storage(err) => write!(f, "storage error: {err}"),
            DashboardError::Import(err) => write!(f, "import error: {err}"),
        }
    }
}

impl std::error::Error for DashboardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DashboardError::Validation(err) => Some(err),
            DashboardError::Storage(err) => Some(err),
            DashboardError::Import(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for DashboardError {
    fn from(value: ValidationError) -> Self {
        DashboardError::Validation(value)
    }
}

impl From<StorageError> for DashboardError {
    fn from(value: StorageError) -> Self {
        DashboardError::Storage(value)
    }
}

impl From<ImportError> for DashboardError {
    fn from(value: ImportError) -> Self {
        DashboardError::Import(value)
    }
}
