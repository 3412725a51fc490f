//! Error types for the synchronization engine with context and recovery information

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::core::ModfileIdentity;
use crate::install::InstallError;

/// Classification of a failed catalog request
///
/// The classification decides the retry policy: authentication failures abort,
/// unresolvable requests end a listing, everything else is retried with backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErrorKind {
    /// Credentials were rejected; needs a fresh login
    AuthenticationInvalid,
    /// The request can never succeed as issued (bad filter, missing resource)
    Unresolvable,
    /// The server could not be reached at all
    ServerUnreachable,
    /// The server throttled the client
    RateLimited,
    /// Anything else worth retrying (5xx, dropped connections)
    Transient,
}

impl fmt::Display for RequestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestErrorKind::AuthenticationInvalid => write!(f, "authentication invalid"),
            RequestErrorKind::Unresolvable => write!(f, "unresolvable request"),
            RequestErrorKind::ServerUnreachable => write!(f, "server unreachable"),
            RequestErrorKind::RateLimited => write!(f, "rate limited"),
            RequestErrorKind::Transient => write!(f, "transient failure"),
        }
    }
}

/// A classified failure returned by the remote catalog
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} for '{url}': {message}")]
pub struct RequestError {
    pub url: String,
    pub kind: RequestErrorKind,
    pub status: Option<u16>,
    pub message: String,
    /// Unix timestamp at which a rate limit lifts
    pub limited_until: Option<i64>,
}

impl RequestError {
    /// Classify an HTTP error status
    pub fn from_status(
        url: impl Into<String>,
        status: u16,
        message: impl Into<String>,
        limited_until: Option<i64>,
    ) -> Self {
        let kind = match status {
            401 => RequestErrorKind::AuthenticationInvalid,
            429 => RequestErrorKind::RateLimited,
            400 | 403 | 404 | 405 | 410 | 422 => RequestErrorKind::Unresolvable,
            _ => RequestErrorKind::Transient,
        };

        Self {
            url: url.into(),
            kind,
            status: Some(status),
            message: message.into(),
            limited_until,
        }
    }

    pub fn unreachable(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: RequestErrorKind::ServerUnreachable,
            status: None,
            message: message.into(),
            limited_until: None,
        }
    }

    pub fn is_authentication_invalid(&self) -> bool {
        self.kind == RequestErrorKind::AuthenticationInvalid
    }

    pub fn is_request_unresolvable(&self) -> bool {
        self.kind == RequestErrorKind::Unresolvable
    }

    pub fn is_server_unreachable(&self) -> bool {
        self.kind == RequestErrorKind::ServerUnreachable
    }
}

/// Comprehensive error type for the engine
#[derive(Error, Debug)]
pub enum SyncError {
    /// Transport-level HTTP failure that could not be classified further
    #[error("HTTP request to '{url}' failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Classified catalog failure
    #[error("catalog request failed: {0}")]
    Request(#[from] RequestError),

    /// File system I/O errors with file context
    #[error("file operation failed while {operation} '{path}'")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// URL parsing errors
    #[error("invalid URL '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Response body or marker file did not decode
    #[error("failed to decode {context}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// No usable download locator for a modfile
    #[error("no valid download locator for {identity}")]
    LocatorExpired { identity: ModfileIdentity },

    /// Mod profile has no published build
    #[error("mod {mod_id} has no current build")]
    NoCurrentBuild { mod_id: i64 },

    /// Downloaded archive did not match the catalog metadata
    #[error("downloaded archive '{file}' failed integrity verification")]
    IntegrityMismatch { file: PathBuf },

    /// A download task finished with an error
    #[error("download of {identity} failed")]
    DownloadFailed {
        identity: ModfileIdentity,
        #[source]
        source: Arc<SyncError>,
    },

    /// Background task execution errors
    #[error("background task failed: {reason}")]
    TaskFailed { reason: String },

    #[error(transparent)]
    Install(#[from] InstallError),

    /// Configuration errors
    #[error("invalid configuration: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

/// Types of file operations for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    Create,
    Delete,
    Move,
    Metadata,
    CreateDir,
    ListDir,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Create => write!(f, "creating"),
            FileOperation::Delete => write!(f, "deleting"),
            FileOperation::Move => write!(f, "moving"),
            FileOperation::Metadata => write!(f, "reading metadata of"),
            FileOperation::CreateDir => write!(f, "creating directory"),
            FileOperation::ListDir => write!(f, "listing"),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub fn fs<P: AsRef<Path>>(path: P, operation: FileOperation, source: std::io::Error) -> Self {
        SyncError::FileSystem {
            path: path.as_ref().to_path_buf(),
            operation,
            source,
        }
    }

    /// The classified catalog failure behind this error, if any
    pub fn request_error(&self) -> Option<&RequestError> {
        match self {
            SyncError::Request(error) => Some(error),
            SyncError::DownloadFailed { source, .. } => source.request_error(),
            _ => None,
        }
    }

    /// Authentication failures must reach the caller so it can re-login
    pub fn is_authentication_invalid(&self) -> bool {
        self.request_error()
            .is_some_and(RequestError::is_authentication_invalid)
    }

    /// Check if error is recoverable (should retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Http { source, .. } => source
                .status()
                .is_none_or(|status| status.is_server_error() || status == 429),
            SyncError::Request(error) => matches!(
                error.kind,
                RequestErrorKind::ServerUnreachable
                    | RequestErrorKind::RateLimited
                    | RequestErrorKind::Transient
            ),
            SyncError::FileSystem { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            SyncError::DownloadFailed { source, .. } => source.is_recoverable(),
            SyncError::TaskFailed { .. } => true,
            SyncError::InvalidUrl { .. }
            | SyncError::Decode { .. }
            | SyncError::LocatorExpired { .. }
            | SyncError::NoCurrentBuild { .. }
            | SyncError::IntegrityMismatch { .. }
            | SyncError::Install(_)
            | SyncError::Configuration { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::Http { .. } => "http_request",
            SyncError::Request(_) => "catalog_request",
            SyncError::FileSystem { .. } => "file_system",
            SyncError::InvalidUrl { .. } => "invalid_url",
            SyncError::Decode { .. } => "decode",
            SyncError::LocatorExpired { .. } => "locator_expired",
            SyncError::NoCurrentBuild { .. } => "no_current_build",
            SyncError::IntegrityMismatch { .. } => "integrity_mismatch",
            SyncError::DownloadFailed { .. } => "download_failed",
            SyncError::TaskFailed { .. } => "task_failed",
            SyncError::Install(_) => "install",
            SyncError::Configuration { .. } => "configuration",
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        let url = error
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());

        if error.is_connect() || error.is_timeout() {
            SyncError::Request(RequestError::unreachable(url, error.to_string()))
        } else {
            SyncError::Http { url, source: error }
        }
    }
}
