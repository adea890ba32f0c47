//! Shared kernel of the launcher: event bus, error types, wire models,
//! archive/hash/maven utilities and download helpers.
//!
//! Everything here is frontend-agnostic; the pipeline crates build on
//! top of it and a UI only ever consumes the [`event::EventBus`].

use std::future::Future;

pub mod archive;
pub mod constants;
mod error;
pub mod event;
/// Common utilities for working with files and HTTP.
pub mod file_utils;
pub mod hash;
/// JSON structs for the version manifest, libraries, loaders, assets
/// and credentials.
pub mod json;
pub mod maven;
/// Logging macros.
pub mod print;

pub use constants::*;
pub use error::{
    DownloadFileError, ErrorKind, IntoIoError, IntoJsonError, IoError, JsonDownloadError,
    JsonError, JsonFileError,
};
pub use event::{CheckKind, Event, EventBus, LogLevel};
pub use file_utils::RequestError;

/// To prevent spawning of a terminal window (windows only).
///
/// Takes in a `Command` (owned or mutable reference, both are fine).
/// This supports `process::Command` of both `tokio` and `std`.
#[macro_export]
macro_rules! no_window {
    ($cmd:expr) => {
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            // 0x08000000 => CREATE_NO_WINDOW
            $cmd.creation_flags(0x08000000);
        }
    };
}

/// Executes multiple async tasks concurrently (e.g. downloading files).
///
/// The entire operation fails if any task fails.
pub async fn do_jobs<T, E>(
    results: impl Iterator<Item = impl Future<Output = Result<T, E>>>,
) -> Result<Vec<T>, E> {
    do_jobs_with_limit(results, 64).await
}

/// Executes multiple async tasks concurrently with an explicit limit on
/// in-flight jobs, so you can stay under `ulimit -n` file descriptor
/// limits.
pub async fn do_jobs_with_limit<T, E>(
    results: impl Iterator<Item = impl Future<Output = Result<T, E>>>,
    limit: usize,
) -> Result<Vec<T>, E> {
    use futures::StreamExt;

    let mut tasks = futures::stream::FuturesUnordered::new();
    let mut outputs = Vec::new();

    for result in results {
        tasks.push(result);
        if tasks.len() > limit {
            if let Some(task) = tasks.next().await {
                outputs.push(task?);
            }
        }
    }

    while let Some(task) = tasks.next().await {
        outputs.push(task?);
    }
    Ok(outputs)
}
