//! Unified error type for trendclip.
//!
//! Every failure carries a human-readable cause. Installation failures are
//! split into distinct variants so a caller can report *why* healing failed,
//! and transform failures separate a non-zero exit from an unusable output.

use std::fmt;
use std::path::Path;

/// Unified error type covering toolchain management and media transforms.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required tool cannot be resolved. Needs operator action.
    #[error("Tool unavailable [{tool}]: {message}")]
    ToolUnavailable {
        /// Name of the missing tool.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Fetching an artifact failed (network, non-2xx status, truncation).
    #[error("Download failed [{tool}]: {message}")]
    DownloadFailed {
        /// Tool whose artifact was being fetched.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The artifact could not be unpacked or lacked an expected member.
    #[error("Extraction failed [{tool}]: {message}")]
    ExtractionFailed {
        /// Tool whose artifact was being unpacked.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Digest mismatch while verification is enforced.
    #[error("Verification failed for {path}: expected {expected}, got {actual}")]
    VerificationFailed {
        /// File that was hashed.
        path: String,
        /// Digest the caller expected.
        expected: String,
        /// Digest actually computed.
        actual: String,
    },

    /// The tool was installed but still does not answer its probe.
    #[error("Post-install probe failed [{tool}]: {message}")]
    PostInstallProbeFailed {
        /// Name of the installed tool.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The transcoder exited with a non-zero status.
    #[error("Transform failed ({status}): {stderr}")]
    TransformFailed {
        /// Exit status as reported by the OS.
        status: String,
        /// Tail of the transcoder's standard error.
        stderr: String,
    },

    /// The transcoder exited successfully but the output is unusable.
    #[error("Output invalid: {0}")]
    OutputInvalid(String),

    /// Media metadata could not be obtained or was incomplete.
    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    /// Caller-supplied data failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An external command could not be run to completion.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The operation was abandoned by its caller.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether retrying the same operation later could plausibly succeed.
    ///
    /// Retry policy belongs to the caller; nothing in this workspace retries
    /// on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::DownloadFailed { .. } => true,
            Error::Tool { .. } => true,
            Error::Io { .. } => true,
            Error::TransformFailed { .. } => true,
            Error::ToolUnavailable { .. }
            | Error::ExtractionFailed { .. }
            | Error::VerificationFailed { .. }
            | Error::PostInstallProbeFailed { .. }
            | Error::OutputInvalid(_)
            | Error::MetadataUnavailable(_)
            | Error::InvalidInput(_)
            | Error::Cancelled(_) => false,
        }
    }

    /// Convenience constructor for [`Error::ToolUnavailable`].
    pub fn tool_unavailable(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolUnavailable {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::DownloadFailed`].
    pub fn download(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::DownloadFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::ExtractionFailed`].
    pub fn extraction(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ExtractionFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::VerificationFailed`].
    pub fn verification(
        path: &Path,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Error::VerificationFailed {
            path: path.display().to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Convenience constructor for [`Error::PostInstallProbeFailed`].
    pub fn post_install(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::PostInstallProbeFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
