//! Error types for Crosscast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosscastError>;

#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosscastError {
    /// Process exit code for the CLIs: 3 for bad input, 2 for credential
    /// problems, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput(_) => 3,
            Self::Platform(PlatformError::Authentication(_)) => 2,
            _ => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by a publisher for one target. Cloneable so a captured
/// error can be recorded on the target and still bubble into logs.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Publishing failed: {0}")]
    Publishing(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimit(String),

    #[error("Publish timed out: {0}")]
    Timeout(String),
}
