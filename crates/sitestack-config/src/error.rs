//! Configuration parsing errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("duplicate definition: {0}")]
    Duplicate(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("plaintext secret not allowed: {0}")]
    PlaintextSecret(String),

    #[error(transparent)]
    Core(#[from] sitestack_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.to_string(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
