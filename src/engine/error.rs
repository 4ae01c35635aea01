use crate::model::CellConflict;
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed request, rejected before the table is read.
    Validation(String),
    /// No bookable row for the requested date.
    NotFound(String),
    UnknownOffice(String),
    /// Every requested cell that is not available, with its occupant.
    Conflict(Vec<CellConflict>),
    /// The stored sheet changed between load and save; retry the request.
    ConcurrentModification(String),
    Unauthorized,
    Forbidden(String),
    LimitExceeded(&'static str),
    Storage(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrentModification(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::NotFound(msg) => write!(f, "not found: {msg}"),
            EngineError::UnknownOffice(name) => write!(f, "unknown flex office: {name}"),
            EngineError::Conflict(cells) => {
                write!(f, "not available:")?;
                for (i, c) in cells.iter().enumerate() {
                    let sep = if i == 0 { " " } else { "; " };
                    write!(f, "{sep}{} (reserved by {})", c.cell, c.occupant)?;
                }
                Ok(())
            }
            EngineError::ConcurrentModification(office) => {
                write!(f, "table for {office} changed concurrently, retry")
            }
            EngineError::Unauthorized => write!(f, "session is not authenticated"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Storage(e.to_string())
    }
}
