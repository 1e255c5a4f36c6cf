//! Error types for ossync

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ossync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ossync
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors (file system operations)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// The remote API could not be reached
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Session token expired or rejected (HTTP 401)
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// The remote API answered with a non-zero status
    #[error("Remote error [{code}]: {message}")]
    Remote { code: i64, message: String },

    /// Object or file not found
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// Local content hash could not be computed
    #[error("Hash error at {}: {source}", path.display())]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Upload or download failed
    #[error("Transfer of {path} failed: {message}")]
    Transfer { path: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Malformed index or response body
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>, source: Option<reqwest::Error>) -> Self {
        Self::Connection {
            message: message.into(),
            source,
        }
    }

    /// Create an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a remote application error
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }

    /// Create a hashing error for `path`
    pub fn hash(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Hash {
            path: path.into(),
            source,
        }
    }

    /// Create a transfer error
    pub fn transfer(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transfer {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this error is worth another attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Auth { .. } | Error::Config { .. } | Error::NotFound { .. } | Error::Cancelled
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: format!("TOML parse error: {}", err),
        }
    }
}
