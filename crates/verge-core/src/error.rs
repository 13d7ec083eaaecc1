//! Error types for the scheduling core.
//!
//! Every variant leaves the task store and stats untouched: operations
//! validate before they mutate, and persistence failures are reported after
//! the in-memory change has already been applied.

/// Errors produced by the task store, datastore and import path.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// User input failed validation (missing title, missing deadline, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// No task with the given id exists.
    #[error("task not found: {0}")]
    NotFound(u64),

    /// Reading or writing persisted state failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// An import document could not be understood.
    #[error("invalid import document: {0}")]
    ImportFormat(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}

/// Convenience alias for core results.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_validation() {
        let err = Error::validation("title is required");
        assert_eq!(err.to_string(), "validation failed: title is required");
    }

    #[test]
    fn display_not_found() {
        let err = Error::NotFound(42);
        assert_eq!(err.to_string(), "task not found: 42");
    }

    #[test]
    fn display_persistence() {
        let err = Error::persistence("disk full");
        assert_eq!(err.to_string(), "persistence error: disk full");
    }

    #[test]
    fn display_import_format() {
        let err = Error::ImportFormat("missing tasks".into());
        assert_eq!(err.to_string(), "invalid import document: missing tasks");
    }
}
