use thiserror::Error;

/// Invalid or missing construction input. The middleware is never built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no {0} provided")]
    Missing(&'static str),

    #[error("invalid {option}: {reason}")]
    Invalid {
        option: &'static str,
        reason: String,
    },

    #[error("private key error: {0}")]
    PrivateKey(String),

    #[error("failed to load options: {0}")]
    Load(String),
}

impl ConfigError {
    pub(crate) fn invalid(option: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            option,
            reason: reason.into(),
        }
    }
}

/// Refresh-time failures. Never surfaced to request handling.
#[derive(Debug, Error)]
pub enum RangeError {
    #[error("failed to fetch IP ranges: {0}")]
    Fetch(String),

    #[error("failed to parse IP ranges document: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid resource URL: {0}")]
    InvalidUrl(String),

    #[error("invalid expiry: {0}")]
    Expiry(String),

    #[error("RSA signing failed: {0}")]
    Rsa(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Signing(#[from] SigningError),
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;
