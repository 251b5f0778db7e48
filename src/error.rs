//! Error types for keepsake.
//!
//! Absence is never an error: reads return `Ok(None)` when a key or record
//! is missing. Errors are reserved for backend I/O failures, corrupt stored
//! records and configuration problems. A corrupt record is always
//! propagated to the caller, who is expected to treat it as an invalid
//! session and destroy it.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for keepsake operations.
#[derive(Error, Debug)]
pub enum KeepsakeError {
    /// I/O errors from a storage backend.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stored record is not valid base64 or not valid UTF-8.
    #[error("decode error: {message}")]
    Decode { message: String },

    /// JSON parsing/serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },
}

/// A specialized Result type for keepsake operations.
pub type Result<T> = std::result::Result<T, KeepsakeError>;

impl KeepsakeError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the error means the stored record itself is unreadable.
    ///
    /// Callers typically respond to a corrupt record by destroying the
    /// session.
    pub fn is_corrupt_record(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Serde { .. })
    }
}

impl From<io::Error> for KeepsakeError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for KeepsakeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Log-and-default handling for non-critical paths.
///
/// Used for configuration loading and CLI conveniences. Session reads never
/// go through this; a corrupt record must reach the caller.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (using default)", context, err);
                T::default()
            }
        }
    }
}

/// Exit codes for the keepsake CLI.
pub mod exit_codes {
    /// Command succeeded (for `exists`: a session is active).
    pub const SUCCESS: i32 = 0;

    /// No active session.
    pub const NO_SESSION: i32 = 1;

    /// Command failed.
    pub const ERROR: i32 = 2;

    /// The session is active but the requested detail is not set.
    pub const NOT_FOUND: i32 = 3;
}
