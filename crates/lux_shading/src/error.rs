//! Errors raised at the configuration boundary.
//!
//! Nothing inside the shading kernel returns these: a full closure arena, a
//! negligible weight or an impossible sample direction are ordinary outcomes
//! expressed as `None` or a zero pdf.

use thiserror::Error;

/// Errors that can occur while loading or validating a [`crate::KernelConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for `{field}`: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
