//! Pattern compilation error types.

/// Errors that can occur while compiling a pattern string into a matcher.
///
/// These never escape a registry load: the registry logs them and keeps a
/// degraded pattern that matches nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The pattern string is empty or whitespace only.
    #[error("Empty pattern")]
    EmptyPattern,

    /// The pattern (or the regex generated from it) is not a valid expression.
    #[error("Invalid regex in pattern '{pattern}': {message}")]
    InvalidRegex {
        /// The raw pattern text.
        pattern: String,
        /// Description from the regex compiler.
        message: String,
    },

    /// A `:` segment without a name, e.g. `/clients/:/projects`.
    #[error("Empty parameter name in pattern '{pattern}' at segment {position}")]
    EmptyParameterName {
        /// The raw pattern text.
        pattern: String,
        /// Zero-based index of the offending `/`-separated segment.
        position: usize,
    },

    /// The same parameter name is declared twice.
    #[error("Duplicate parameter '{name}' in pattern '{pattern}'")]
    DuplicateParameter {
        /// The raw pattern text.
        pattern: String,
        /// The repeated parameter name.
        name: String,
    },
}

impl CompileError {
    /// Creates a new `InvalidRegex` error.
    #[must_use]
    pub fn invalid_regex(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRegex {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Returns the raw pattern text the error refers to, if any.
    #[must_use]
    pub fn pattern(&self) -> Option<&str> {
        match self {
            Self::EmptyPattern => None,
            Self::InvalidRegex { pattern, .. }
            | Self::EmptyParameterName { pattern, .. }
            | Self::DuplicateParameter { pattern, .. } => Some(pattern),
        }
    }
}
