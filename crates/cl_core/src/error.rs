use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::file_utils::RequestError;

/// Stable classification of every fatal condition the launcher can
/// report. The variants never change meaning between releases; frontends
/// are expected to match on them.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Requested version, loader build or flavor is unknown.
    NotFound,
    /// DNS/TCP/TLS failure, HTTP non-2xx, or a broken body stream.
    Network,
    /// Any configured timeout elapsed.
    Timeout,
    /// A downloaded file failed its integrity check.
    HashMismatch,
    /// A jar/zip was unreadable or missing a required entry.
    ArchiveInvalid,
    /// A manifest or install profile was structurally bad.
    ProfileInvalid,
    /// No rule-satisfying artifact exists for this OS/arch.
    PlatformUnsupported,
    /// Java could not be located or downloaded.
    JavaMissing,
    /// An installer processor exited non-zero or produced nothing.
    PatchFailed,
    /// The child process failed to spawn.
    LaunchFailed,
    /// `launch` was called while a process is live.
    AlreadyRunning,
    /// A cancellation signal was honored.
    Aborted,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Network => "Network",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::HashMismatch => "HashMismatch",
            ErrorKind::ArchiveInvalid => "ArchiveInvalid",
            ErrorKind::ProfileInvalid => "ProfileInvalid",
            ErrorKind::PlatformUnsupported => "PlatformUnsupported",
            ErrorKind::JavaMissing => "JavaMissing",
            ErrorKind::PatchFailed => "PatchFailed",
            ErrorKind::LaunchFailed => "LaunchFailed",
            ErrorKind::AlreadyRunning => "AlreadyRunning",
            ErrorKind::Aborted => "Aborted",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, Error)]
pub enum IoError {
    #[error("at path {path:?}, error: {error}")]
    Io { error: String, path: PathBuf },
    #[error("couldn't read directory {parent:?}, error {error}")]
    ReadDir { error: String, parent: PathBuf },
}

/// Converts any `std::io::Result<T>` into `Result<T, IoError>`,
/// attaching the path that was being accessed.
pub trait IntoIoError<T = ()> {
    type Output;
    fn path(self, p: impl Into<PathBuf>) -> Self::Output;
    fn dir(self, p: impl Into<PathBuf>) -> Self::Output;
}

impl<T> IntoIoError<T> for std::io::Result<T> {
    type Output = Result<T, IoError>;
    fn path(self, p: impl Into<PathBuf>) -> Result<T, IoError> {
        self.map_err(|err| IoError::Io {
            error: err.to_string(),
            path: p.into(),
        })
    }

    fn dir(self, p: impl Into<PathBuf>) -> Result<T, IoError> {
        self.map_err(|err| IoError::ReadDir {
            error: err.to_string(),
            parent: p.into(),
        })
    }
}

impl IntoIoError for std::io::Error {
    type Output = IoError;
    fn path(self, p: impl Into<PathBuf>) -> IoError {
        IoError::Io {
            error: self.to_string(),
            path: p.into(),
        }
    }

    fn dir(self, p: impl Into<PathBuf>) -> IoError {
        IoError::ReadDir {
            error: self.to_string(),
            parent: p.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JsonError {
    #[error("while parsing JSON:\n{error}\n\n{json}")]
    From {
        error: serde_json::Error,
        json: String,
    },
    #[error("while converting object to JSON:\n{error}")]
    To { error: serde_json::Error },
}

pub trait IntoJsonError<T> {
    fn json(self, p: String) -> Result<T, JsonError>;
    fn json_to(self) -> Result<T, JsonError>;
}

impl<T> IntoJsonError<T> for Result<T, serde_json::Error> {
    fn json(self, json: String) -> Result<T, JsonError> {
        self.map_err(|error| JsonError::From { error, json })
    }

    fn json_to(self) -> Result<T, JsonError> {
        self.map_err(|error| JsonError::To { error })
    }
}

#[derive(Debug, Error)]
pub enum JsonDownloadError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Serde(#[from] JsonError),
}

impl From<reqwest::Error> for JsonDownloadError {
    fn from(value: reqwest::Error) -> Self {
        Self::Request(RequestError::ReqwestError(value))
    }
}

impl JsonDownloadError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            JsonDownloadError::Request(e) => e.kind(),
            JsonDownloadError::Serde(_) => ErrorKind::ProfileInvalid,
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadFileError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Io(#[from] IoError),
}

impl From<reqwest::Error> for DownloadFileError {
    fn from(value: reqwest::Error) -> Self {
        Self::Request(RequestError::ReqwestError(value))
    }
}

#[derive(Debug, Error)]
pub enum JsonFileError {
    #[error(transparent)]
    Serde(#[from] JsonError),
    #[error(transparent)]
    Io(#[from] IoError),
}
