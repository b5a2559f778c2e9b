//! Application-wide error types.

use crowdfund_hook::HookError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The hook (or the store on commit) rejected the invocation.
    #[error("Rejected ({}): {0}", .0.code())]
    Rejected(#[from] HookError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type Result<T> = std::result::Result<T, HostError>;
