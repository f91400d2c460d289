use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    /// The search credential was rejected; the whole batch stops.
    #[error("Search authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited, reset in {wait:?}")]
    RateLimited { wait: Duration },

    #[error("Transient search failure: {0}")]
    Transient(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Resolution cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ResolverError>;
