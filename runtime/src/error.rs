//! Error taxonomy for the compatibility engine.
//!
//! Per-page and per-feed failures are recovered where they happen and never
//! reach this type as a scan-wide failure. What does surface here is what a
//! caller has to decide about: a missing feature or UI, a cancelled or timed
//! out scan, and the absence of any usable catalog snapshot.

/// All errors the engine reports to its callers.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("scan cancelled")]
    Cancelled,

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Shorthand for a feature, UI or report that does not exist.
    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }

    /// Whether the caller may fall back instead of failing the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound(_) | EngineError::FetchFailure { .. }
        )
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

/// Convenience result type.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(EngineError::not_found(":has()").is_recoverable());
        assert!(EngineError::FetchFailure {
            url: "https://example.com".into(),
            reason: "timeout".into(),
        }
        .is_recoverable());
        assert!(!EngineError::Cancelled.is_recoverable());
        assert!(!EngineError::InvariantViolation("no snapshot".into()).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::not_found("feature 'subgrid'");
        assert_eq!(err.to_string(), "not found: feature 'subgrid'");
        assert_eq!(EngineError::Timeout(500).to_string(), "timed out after 500ms");
    }
}
