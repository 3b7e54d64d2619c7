//! Resolver error types.
//!
//! None of these reach callers of `resolve()` or `load()`: fetch and storage
//! failures are recovered locally and logged. They surface only from
//! construction (`ResolverEngine::from_config`) and from the pattern source
//! trait itself.

use std::time::Duration;

use urlgate_storage::StoreError;

/// Errors that can occur while fetching pattern records.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request could not be sent or the connection failed.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
    },

    /// The pattern source answered with a non-success status.
    #[error("HTTP error: status {status}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
    },

    /// The response body is not a list of pattern records.
    #[error("Failed to parse pattern records: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },

    /// The fetch did not complete within the configured timeout.
    #[error("Pattern source timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {message}")]
    Client {
        /// Description of the client error.
        message: String,
    },
}

impl FetchError {
    /// Creates a new `Network` error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a new `Parse` error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration sources could not be read or deserialized.
    #[error("Configuration load error: {0}")]
    Load(String),

    /// The configuration is well-formed but invalid.
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

impl ConfigError {
    /// Creates a new `Validation` error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Errors that can occur while constructing an engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The pattern source could not be created.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The persisted store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Type alias for pattern source results.
pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        assert_eq!(
            FetchError::HttpStatus { status: 503 }.to_string(),
            "HTTP error: status 503"
        );
        assert_eq!(
            FetchError::Timeout {
                after: Duration::from_millis(250)
            }
            .to_string(),
            "Pattern source timed out after 250ms"
        );
    }

    #[test]
    fn test_engine_error_is_transparent() {
        let err: EngineError = ConfigError::validation("cache_capacity must be > 0").into();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: cache_capacity must be > 0"
        );
    }
}
