//! Application error model
//!
//! Defines a typed error hierarchy using `thiserror`. Every variant is fatal
//! for the run unless the configured error policy says otherwise; see
//! [`crate::indexer::ErrorPolicy`].

use thiserror::Error;

/// Application error type
///
/// Covers every failure the indexer can hit, from configuration through the
/// IMAP walk to the catalog store.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid configuration (CLI arguments, environment variables)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Session cannot be opened or authenticated (TCP, TLS, greeting, LOGIN)
    #[error("connection failed: {0}")]
    Connection(String),
    /// Non-OK status (or timeout) from LIST, SELECT, SEARCH or FETCH
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Fetched header block has no Message-ID, so it cannot be deduplicated
    #[error("message {sequence} in folder '{folder}' has no Message-ID header")]
    MissingIdentifier {
        /// Folder the message was fetched from
        folder: String,
        /// Sequence number of the offending message
        sequence: u32,
    },
    /// Catalog store could not complete a transaction
    #[error("store error: {0}")]
    Store(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the error only concerns the folder being walked
    ///
    /// Folder-scoped errors may be absorbed under the `skip-folder` policy;
    /// everything else always aborts the run.
    pub fn is_folder_scoped(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::MissingIdentifier { .. })
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::Store(e.to_string())
    }
}

/// Type alias for fallible return values
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn missing_identifier_names_folder_and_sequence() {
        let err = AppError::MissingIdentifier {
            folder: "INBOX".to_owned(),
            sequence: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("INBOX"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn only_protocol_and_identifier_errors_are_folder_scoped() {
        assert!(AppError::Protocol("x".to_owned()).is_folder_scoped());
        assert!(
            AppError::MissingIdentifier {
                folder: "INBOX".to_owned(),
                sequence: 1,
            }
            .is_folder_scoped()
        );
        assert!(!AppError::Connection("x".to_owned()).is_folder_scoped());
        assert!(!AppError::Store("x".to_owned()).is_folder_scoped());
        assert!(!AppError::invalid("x").is_folder_scoped());
    }
}
