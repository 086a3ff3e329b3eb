//! Shared error type across promgrep crates.

use thiserror::Error;

/// Coarse error classes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any input is consumed.
    Config,
    /// Input stream failure.
    Stream,
    /// Internal failure.
    Internal,
}

impl ErrorCategory {
    /// String representation used in logs and tests.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Config => "CONFIG",
            ErrorCategory::Stream => "STREAM",
            ErrorCategory::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PromgrepError>;

/// Unified error type used by core and exporter.
#[derive(Debug, Error)]
pub enum PromgrepError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("no rules defined")]
    NoRules,
    #[error("invalid rule name: {0:?}")]
    InvalidRuleName(String),
    #[error("duplicate metric name: {0}")]
    DuplicateRule(String),
    #[error("invalid pattern for rule {rule}: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
    #[error("gauge rule {0} must have at least one capture group to extract its value")]
    GaugeWithoutCapture(String),
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stream read failed: {0}")]
    Stream(#[from] std::io::Error),
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
    #[error("internal: {0}")]
    Internal(String),
}

impl PromgrepError {
    /// Map an error to its stable category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PromgrepError::InvalidConfig(_)
            | PromgrepError::NoRules
            | PromgrepError::InvalidRuleName(_)
            | PromgrepError::DuplicateRule(_)
            | PromgrepError::InvalidPattern { .. }
            | PromgrepError::GaugeWithoutCapture(_)
            | PromgrepError::Bind { .. } => ErrorCategory::Config,
            PromgrepError::Stream(_) | PromgrepError::LineTooLong(_) => ErrorCategory::Stream,
            PromgrepError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// True for errors that must stop the process before it serves or reads.
    pub fn is_config(&self) -> bool {
        self.category() == ErrorCategory::Config
    }
}
