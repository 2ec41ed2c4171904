//! Custom error types for snapvault
//!
//! This module defines the error hierarchy for the backup engine using thiserror
//! for ergonomic error definitions.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Stage of an operation an error was raised in, carried for log context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Building metadata, creating directories, opening files
    Prepare,
    /// Streaming entries into a new archive
    Write,
    /// Flushing, syncing and renaming the finished archive
    Commit,
    /// Reading and decoding an existing archive
    Read,
    /// Writing restored files to disk
    Extract,
    /// Retention and temp file cleanup
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prepare => "prepare",
            Self::Write => "write",
            Self::Commit => "commit",
            Self::Read => "read",
            Self::Extract => "extract",
            Self::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a [`BackupError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Format,
    Authentication,
    SourceUnreadable,
    Other,
}

/// Marker carried inside an `io::Error` when an AEAD frame fails to verify.
///
/// Readers stacked above the decrypting layer only see `io::Error`s, so the
/// authentication failure rides along as the inner error and is recovered by
/// [`BackupError::from_stream`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("authentication failed")]
pub struct AuthenticationFailed;

impl AuthenticationFailed {
    /// Wrap the marker in an `io::Error`
    pub fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, self)
    }
}

/// The main error type for snapvault operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Filesystem unavailable, permission denied, disk full
    #[error("I/O error during {phase} of {}: {source}", .path.display())]
    Io {
        phase: Phase,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Not a valid compressed/serialized archive stream
    #[error("Invalid archive during {phase}: {message}")]
    Format { phase: Phase, message: String },

    /// Wrong passphrase or corrupted ciphertext (intentionally undistinguished)
    #[error("Authentication failed: wrong passphrase or corrupted archive")]
    Authentication,

    /// A requested backup source cannot be read
    #[error("Cannot read backup source {}: {source}", .path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Cipher setup or random number generation errors
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },
}

impl BackupError {
    /// Create an I/O error with path and phase context
    pub fn io(phase: Phase, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            phase,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a format error
    pub fn format(phase: Phase, message: impl Into<String>) -> Self {
        Self::Format {
            phase,
            message: message.into(),
        }
    }

    /// Create a "not found" error for backups
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Classify an `io::Error` raised while decoding an archive stream.
    ///
    /// Decryption failures surface as [`AuthenticationFailed`], decoder and
    /// parser failures as `InvalidData`/`UnexpectedEof`/`Other`. Anything else
    /// is a genuine filesystem failure.
    pub fn from_stream(phase: Phase, path: impl AsRef<Path>, err: io::Error) -> Self {
        if carries_auth_failure(&err) {
            return Self::Authentication;
        }
        match err.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof | io::ErrorKind::Other => {
                Self::format(phase, err.to_string())
            }
            _ => Self::io(phase, path, err),
        }
    }

    /// Fill in the path of an I/O error raised without one
    pub fn with_path(self, path: impl AsRef<Path>) -> Self {
        match self {
            Self::Io {
                phase,
                path: p,
                source,
            } if p.as_os_str().is_empty() => Self::Io {
                phase,
                path: path.as_ref().to_path_buf(),
                source,
            },
            other => other,
        }
    }

    /// Get the coarse kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::Format { .. } => ErrorKind::Format,
            Self::Authentication => ErrorKind::Authentication,
            Self::SourceUnreadable { .. } => ErrorKind::SourceUnreadable,
            _ => ErrorKind::Other,
        }
    }

    /// Check if this is an authentication failure
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication)
    }

    /// Check if this is a format failure
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. })
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Walk nested `io::Error`s looking for the authentication marker
fn carries_auth_failure(err: &io::Error) -> bool {
    let mut current = err;
    loop {
        let Some(inner) = current.get_ref() else {
            return false;
        };
        if inner.is::<AuthenticationFailed>() {
            return true;
        }
        match inner.downcast_ref::<io::Error>() {
            Some(next) => current = next,
            None => return false,
        }
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for snapvault operations
pub type BackupResult<T> = Result<T, BackupError>;
