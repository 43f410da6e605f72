//! Common error types used throughout tagforged.
//!
//! One enum covers the whole coordination layer: submission validation,
//! external tool failures, per-job outcomes and state store misuse. Per-job
//! failures are converted into a job's `error_message`; everything else is
//! returned to the caller as a typed result.

use std::path::PathBuf;

/// Common error type for tagforged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The external transcoding tool did not answer its version probe.
    #[error("Tool unavailable: {tool}: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    /// The requested target format is not one of the supported formats.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The requested quality tier is not recognised.
    #[error("Unsupported quality: {0}")]
    UnsupportedQuality(String),

    /// A submitted path was empty or otherwise unusable.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The tool process could not be spawned.
    #[error("Failed to launch {program}: {message}")]
    LaunchFailure { program: String, message: String },

    /// The tool ran but reported failure.
    #[error("Process exited with {}: {stderr}", exit_label(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// The source file could not be deleted after a successful conversion.
    #[error("Failed to delete source {}: {source}", path.display())]
    SourceDeletion {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The work was cancelled by the user.
    #[error("Cancelled by user")]
    Cancelled,

    /// The tool exceeded its allotted time.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The requested record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A record with the same identifier already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A status change that the state machine does not allow.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Configuration could not be loaded or failed validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "signal".to_string(),
    }
}

impl Error {
    /// Create a new ToolUnavailable error.
    pub fn tool_unavailable<T: Into<String>, R: Into<String>>(tool: T, reason: R) -> Self {
        Self::ToolUnavailable {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Create a new LaunchFailure error.
    pub fn launch_failure<P: Into<String>, M: Into<String>>(program: P, message: M) -> Self {
        Self::LaunchFailure {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a new NotFound error.
    pub fn not_found<E: Into<String>, I: std::fmt::Display>(entity: E, id: I) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Create a new InvalidPath error.
    pub fn invalid_path<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Create a new InvalidTransition error.
    pub fn invalid_transition<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTransition(msg.into())
    }

    /// Create a new Config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
