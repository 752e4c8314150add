use std::path::PathBuf;
use thiserror::Error;

/// Config errors are always fatal at startup (spec §7 "ConfigInvalid").
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {0}: {1}")]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("duplicate backend id: {0}")]
    DuplicateBackendId(String),

    #[error("duplicate oauth client id: {0}")]
    DuplicateClientId(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
