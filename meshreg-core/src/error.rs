use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),
}

impl Error {
    /// Shorthand for a registry-side query failure
    #[must_use]
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
