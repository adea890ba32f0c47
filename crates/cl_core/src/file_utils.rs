//! HTTP and filesystem helpers shared by every stage of the pipeline.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Response;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::io::StreamReader;

use crate::error::{DownloadFileError, ErrorKind, JsonDownloadError};
use crate::{IntoIoError, IntoJsonError, IoError};

const NETWORK_ERROR_MSG: &str = r"
- Check your internet connection
- Check if you are behind a firewall/proxy
- Try doing the action again

";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Download Error (code {code}){NETWORK_ERROR_MSG}Url: {url}")]
    DownloadError {
        code: reqwest::StatusCode,
        url: reqwest::Url,
    },
    #[error("Network Request Error{NETWORK_ERROR_MSG}{0}")]
    ReqwestError(#[from] reqwest::Error),
}

impl RequestError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, RequestError::DownloadError { code, .. } if code.as_u16() == 404)
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::DownloadError { code, .. } if code.as_u16() == 404 => ErrorKind::NotFound,
            RequestError::DownloadError { .. } => ErrorKind::Network,
            RequestError::ReqwestError(err) if err.is_timeout() => ErrorKind::Timeout,
            RequestError::ReqwestError(_) => ErrorKind::Network,
        }
    }
}

/// The one HTTP client the whole session shares. The per-request timeout
/// applies to every call made through it.
pub fn build_client(request_timeout: Duration) -> Result<reqwest::Client, RequestError> {
    Ok(reqwest::Client::builder()
        .timeout(request_timeout)
        .build()?)
}

/// # Errors
/// If the HTTP response status is not a success code.
pub fn check_for_success(response: &Response) -> Result<(), RequestError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(RequestError::DownloadError {
            code: response.status(),
            url: response.url().clone(),
        })
    }
}

/// Retries a non-deterministic operation a few times with exponential
/// backoff. Useful for inherently unreliable operations (network
/// requests) that may fail intermittently.
pub async fn retry<T, E, Res, Func>(f: Func) -> Result<T, E>
where
    Res: Future<Output = Result<T, E>>,
    Func: Fn() -> Res,
{
    const LIMIT: usize = 4;
    let mut delay = Duration::from_millis(500);

    let mut result = f().await;
    for _ in 0..LIMIT {
        if result.is_ok() {
            break;
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(Duration::from_secs(10));
        result = f().await;
    }
    result
}

/// Downloads a file from the given URL into a `String`.
pub async fn download_file_to_string(
    client: &reqwest::Client,
    url: &str,
) -> Result<String, RequestError> {
    async fn inner(client: &reqwest::Client, url: &str) -> Result<String, RequestError> {
        let response = client.get(url).send().await?;
        check_for_success(&response)?;
        Ok(response.text().await?)
    }

    retry(|| inner(client, url)).await
}

/// Downloads a file from the given URL and parses it into anything
/// implementing `serde::Deserialize`.
pub async fn download_file_to_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, JsonDownloadError> {
    let text = download_file_to_string(client, url).await?;
    Ok(serde_json::from_str(&text).json(text)?)
}

/// Downloads a file from the given URL into a `Vec<u8>`.
pub async fn download_file_to_bytes(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<u8>, RequestError> {
    async fn inner(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, RequestError> {
        let response = client.get(url).send().await?;
        check_for_success(&response)?;
        Ok(response.bytes().await?.to_vec())
    }

    retry(|| inner(client, url)).await
}

/// Downloads a file from the given URL and saves it to a path,
/// streaming the body straight to disk.
///
/// The body is written to a `.tmp` sibling and renamed into place on
/// success, so a torn transfer never leaves a plausible-looking file.
pub async fn download_file_to_path(
    client: &reqwest::Client,
    url: &str,
    path: impl AsRef<Path>,
) -> Result<(), DownloadFileError> {
    async fn inner(
        client: &reqwest::Client,
        url: &str,
        path: &Path,
    ) -> Result<(), DownloadFileError> {
        let response = client.get(url).send().await?;
        check_for_success(&response)?;

        let stream = response
            .bytes_stream()
            .map(|n| n.map_err(std::io::Error::other));
        let mut stream = StreamReader::new(stream);

        if let Some(parent) = path.parent() {
            if !parent.is_dir() {
                tokio::fs::create_dir_all(&parent).await.path(parent)?;
            }
        }

        let tmp_path = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp_path).await.path(&tmp_path)?;
        if let Err(err) = tokio::io::copy(&mut stream, &mut file).await {
            drop(file);
            _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.path(&tmp_path).into());
        }
        tokio::fs::rename(&tmp_path, path).await.path(path)?;
        Ok(())
    }

    retry(|| inner(client, url, path.as_ref())).await
}

/// Writes bytes to a path through a `.tmp` sibling and a rename, so
/// concurrent writers of content-addressed files stay idempotent.
pub async fn write_file_atomic(path: &Path, data: &[u8]) -> Result<(), IoError> {
    if let Some(parent) = path.parent() {
        if !parent.is_dir() {
            tokio::fs::create_dir_all(parent).await.path(parent)?;
        }
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, data).await.path(&tmp_path)?;
    tokio::fs::rename(&tmp_path, path).await.path(path)?;
    Ok(())
}

/// Canonicalizes a path, falling back to the path as given. On Windows
/// the `\\?\` verbatim prefix is stripped because Java rejects it.
pub async fn canonicalize_or_self(p: impl AsRef<Path>) -> std::path::PathBuf {
    let p = p.as_ref();
    #[allow(unused_mut)]
    if let Ok(mut n) = tokio::fs::canonicalize(p).await {
        #[cfg(target_os = "windows")]
        {
            let s = n.to_string_lossy();
            if let Some(s) = s.strip_prefix("\\\\?\\") {
                n = std::path::PathBuf::from(s);
            }
        }
        n
    } else {
        p.to_owned()
    }
}

/// Sets the executable bit on a file (rwxr-xr-x).
#[cfg(target_family = "unix")]
pub async fn set_executable(path: &Path) -> Result<(), IoError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = tokio::fs::metadata(path).await.path(path)?.permissions();
    perms.set_mode(0o755);
    tokio::fs::set_permissions(path, perms).await.path(path)
}

#[cfg(not(target_family = "unix"))]
pub async fn set_executable(_path: &Path) -> Result<(), IoError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_leaves_no_tmp_file() {
        let dir = std::env::temp_dir().join("cl_core_fu_test");
        let path = dir.join("sub").join("data.bin");
        write_file_atomic(&path, b"abc").await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abc");
        assert!(!path.with_extension("tmp").exists());

        _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_limit() {
        let attempts = std::sync::atomic::AtomicUsize::new(0);
        let result: Result<(), &str> = retry(|| {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err("nope") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 5);
    }
}
