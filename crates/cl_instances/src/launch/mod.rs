use std::path::PathBuf;

use thiserror::Error;

use cl_core::{ErrorKind, IoError};
use cl_java_handler::JavaInstallError;
use cl_loaders::{LoaderInstallError, PatchError};

use crate::download::DownloadError;

pub mod arguments;
pub mod supervisor;

pub use arguments::{ArgumentInputs, ArgumentOptions, LaunchCommand};
pub use supervisor::{LaunchSupervisor, SpawnSpec, SupervisorState, NO_LOGS_SENTINEL};

#[derive(Debug, Error)]
pub enum GameLaunchError {
    #[error("a game process is already running")]
    AlreadyRunning,
    #[error("couldn't spawn {program:?}: {error}")]
    Spawn {
        program: PathBuf,
        error: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Java(#[from] JavaInstallError),
    #[error(transparent)]
    Loader(#[from] LoaderInstallError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error("launch configuration invalid: {0}")]
    InvalidConfig(String),
    #[error("launch aborted")]
    Aborted,
}

impl GameLaunchError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameLaunchError::AlreadyRunning => ErrorKind::AlreadyRunning,
            GameLaunchError::Spawn { .. } | GameLaunchError::Io(_) => ErrorKind::LaunchFailed,
            GameLaunchError::Download(e) => e.kind(),
            GameLaunchError::Java(e) => e.kind(),
            GameLaunchError::Loader(e) => e.kind(),
            GameLaunchError::Patch(e) => e.kind(),
            GameLaunchError::InvalidConfig(_) => ErrorKind::ProfileInvalid,
            GameLaunchError::Aborted => ErrorKind::Aborted,
        }
    }
}
