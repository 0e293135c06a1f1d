//! Error types for the sftpsync library

use std::path::PathBuf;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type for session setup and sync passes
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The server rejected the credentials or its host key was not accepted
    #[error("Authentication failed for {username}@{host}: {message}")]
    Authentication {
        host: String,
        username: String,
        message: String,
    },

    /// The connection attempt did not complete in time
    #[error("Timed out connecting to {host}: {message}")]
    Timeout { host: String, message: String },

    /// Any other SSH/SFTP failure while establishing the session
    #[error("SSH transport error for {host}: {message}")]
    Transport { host: String, message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path-related errors
    #[error("Path error at '{path}': {message}")]
    Path { path: PathBuf, message: String },

    /// Filter pattern errors
    #[error("Filter pattern error: {0}")]
    FilterPattern(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File copying errors
    #[error("File copy error: {message}")]
    FileCopy { message: String },

    /// File deletion errors
    #[error("File deletion error at '{path}': {message}")]
    FileDeletion { path: PathBuf, message: String },

    /// Remote operation errors after the session is up
    #[error("SFTP error at '{path}': {message}")]
    Remote { path: String, message: String },
}

impl SyncError {
    /// Create a new path error
    pub fn path_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new file copy error
    pub fn copy_error(
        source: impl AsRef<std::path::Path>,
        dest: impl AsRef<std::path::Path>,
        message: impl Into<String>,
    ) -> Self {
        let full_message = format!(
            "File copy error from '{}' to '{}': {}",
            source.as_ref().display(),
            dest.as_ref().display(),
            message.into()
        );
        Self::FileCopy {
            message: full_message,
        }
    }

    /// Create a new file deletion error
    pub fn deletion_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FileDeletion {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new remote operation error
    pub fn remote_error(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Remote {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error was raised while establishing the SSH session
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::Timeout { .. } | Self::Transport { .. }
        )
    }
}
