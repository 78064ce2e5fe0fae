use std::time::Duration;

use thiserror::Error;

/// Main error type for COFFEE runs
#[derive(Error, Debug)]
pub enum CfError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Algorithm error: {0}")]
    Algorithm(#[from] AlgorithmError),

    #[error("Export error: {0}")]
    Export(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CfError {
    /// Configuration and validation errors are raised before any evaluation runs.
    pub fn is_config(&self) -> bool {
        matches!(self, CfError::Config(_) | CfError::Validation(_))
    }
}

/// Reasons a single objective evaluation could not produce a value.
///
/// These never leave the evaluator: they are logged and replaced by the
/// sentinel value.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("failed to start `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("I/O error while talking to `{program}`: {message}")]
    Io { program: String, message: String },

    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("`{program}` exited with {code}: {stderr}")]
    NonZeroExit {
        program: String,
        code: String,
        stderr: String,
    },

    #[error("no `begin_output ... ans: <number> ... end_output` marker in output")]
    NoMatch,

    #[error("marker found but `{token}` is not a valid number")]
    Malformed { token: String },
}

/// Errors raised by the optimization algorithm library
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlgorithmError {
    #[error("{algorithm}: empty bounds")]
    EmptyBounds { algorithm: &'static str },

    #[error("{algorithm}: invalid bounds for dimension {index}: [{lower}, {upper}]")]
    InvalidBounds {
        algorithm: &'static str,
        index: usize,
        lower: f64,
        upper: f64,
    },

    #[error("{algorithm}: {dimensions} dimensions requested, at most {max} supported")]
    UnsupportedDimension {
        algorithm: &'static str,
        dimensions: usize,
        max: usize,
    },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Result type alias for COFFEE operations
pub type CfResult<T> = Result<T, CfError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::CfError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::CfError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::CfError::Config(format!($($arg)*))
    };
}
