//! Stage error taxonomy
//!
//! A failure at any stage halts the remainder of the chain. Nothing is rolled
//! back: durable writes made by earlier stages (an uploaded object, a
//! persisted record) stand even when a later stage fails.

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by pipeline stages
#[derive(Debug, Error)]
pub enum StageError {
    /// Bad extension or oversize upload. Non-retryable; surfaced to the
    /// submitter before the chain starts.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Object storage upload failure. Terminal; aborts the chain.
    #[error("Storage upload failed: {0}")]
    Storage(String),

    /// Asset unreachable after the retry ceiling. Terminal; the record keeps
    /// a null annotation unless the submission is retried.
    #[error("Asset unreachable after {attempts} attempts: {url}")]
    FetchTimeout { url: String, attempts: u32 },

    /// Vision model invocation failure. Terminal; aborts the chain.
    #[error("Model invocation failed: {0}")]
    Model(String),

    /// Update stage found no record for the identifier. Indicates the
    /// persistence stage did not run or has not been observed yet.
    #[error("No record found for task {0}")]
    RecordNotFound(Uuid),

    /// Email dispatch failure. Terminal for the notification stage only; the
    /// already-persisted annotation remains valid.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Relational store failure outside the not-found case.
    #[error("Database error: {0}")]
    Database(String),

    /// A stage received an envelope without a field its contract requires.
    /// Indicates a chain construction bug, not bad user input.
    #[error("Envelope missing required field: {0}")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_timeout_names_url_and_attempts() {
        let err = StageError::FetchTimeout {
            url: "http://storage.local/a.jpg".to_string(),
            attempts: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("5 attempts"));
        assert!(msg.contains("http://storage.local/a.jpg"));
    }
}
