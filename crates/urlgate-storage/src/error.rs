//! Storage error types for the persisted key/value store.

/// Errors that can occur during persisted store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store is full; the write was rejected.
    #[error("Storage quota exceeded while writing '{key}'")]
    QuotaExceeded {
        /// The key whose write was rejected.
        key: String,
    },

    /// Reading or writing the backing medium failed.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O failure.
        message: String,
    },

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `QuotaExceeded` error.
    #[must_use]
    pub fn quota_exceeded(key: impl Into<String>) -> Self {
        Self::QuotaExceeded { key: key.into() }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error means the store ran out of space.
    #[must_use]
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exceeded_detection() {
        assert!(StoreError::quota_exceeded("k").is_quota_exceeded());
        assert!(!StoreError::internal("boom").is_quota_exceeded());
    }

    #[test]
    fn test_from_io_error() {
        let err: StoreError = std::io::Error::other("disk gone").into();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(err.to_string(), "I/O error: disk gone");
    }
}
