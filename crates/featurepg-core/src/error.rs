//! Error types for featurepg
//!
//! Every fallible operation in the workspace returns [`Result`], whose error
//! side is the [`Error`] taxonomy below. We use `thiserror` so the variants
//! stay short and their display messages live next to their definitions.
//!
//! ## Propagation policy
//!
//! - Write and read paths propagate every failure to the caller. There is no
//!   internal retry and no partial-success suppression.
//! - Schema updates are all-or-nothing; a failure rolls the transaction back.
//! - Teardown is the single case of local recovery: its failure is logged and
//!   reported through a status value, never returned as `Err`.

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// All errors surfaced by the online store
#[derive(Error, Debug)]
pub enum Error {
    /// Backend unreachable, authentication failure, or a connection that
    /// has already died. Never retried.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation against a table that does not exist, or an identifier
    /// that cannot be used safely as a table/index name.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Malformed entity key or value bytes
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Failure while dropping the whole schema
    ///
    /// Only ever carried inside a teardown status; teardown never returns it
    /// as an `Err`.
    #[error("Teardown failed: {0}")]
    Teardown(String),

    /// Any other backend error (constraint violation, syntax, ...)
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input from the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Creates a Connection error from a string
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a Schema error from a string
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Creates a Serialization error from a string
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a Config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an InvalidInput error from a string
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::schema("relation \"demo_driver_stats\" does not exist");
        assert_eq!(
            err.to_string(),
            "Schema error: relation \"demo_driver_stats\" does not exist"
        );
    }

    #[test]
    fn test_error_helpers() {
        let err = Error::config("Missing required field");
        assert!(matches!(err, Error::Config(_)));

        let err = Error::invalid_input("bad url");
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = Error::connection("refused");
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn test_serde_json_error_is_serialization() {
        let err: Error = serde_json::from_slice::<u32>(b"not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
