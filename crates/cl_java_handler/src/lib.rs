//! Java runtime provider.
//!
//! Resolves the `javaVersion.component` named by a version manifest to
//! an absolute path of a `java` executable, downloading the runtime
//! from Mojang into `runtime/<component>/<platform>/` when it is not
//! installed yet.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use owo_colors::OwoColorize;
use thiserror::Error;

use cl_core::event::Event;
use cl_core::{
    do_jobs_with_limit, err, file_utils, info, pt, ErrorKind, EventBus, IntoIoError, IoError,
    JsonDownloadError, RequestError,
};

mod json;
use json::{JavaFile, JavaFileDownload, JavaFilesJson, JavaListJson};
pub use json::{platform_key, JAVA_LIST_URL};

/// Which runtime a manifest asked for. `component` is the Mojang track
/// name (e.g. `java-runtime-gamma`), `major_version` the fallback used
/// when the track is unknown to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaSelector {
    pub component: String,
    pub major_version: usize,
}

impl Default for JavaSelector {
    fn default() -> Self {
        Self {
            component: "jre-legacy".to_owned(),
            major_version: 8,
        }
    }
}

impl JavaSelector {
    /// The track name a major version historically maps to.
    #[must_use]
    pub fn component_for_major(major: usize) -> &'static str {
        match major {
            0..=8 => "jre-legacy",
            16 => "java-runtime-alpha",
            17 => "java-runtime-gamma",
            21 => "java-runtime-delta",
            _ => "java-runtime-epsilon",
        }
    }
}

#[derive(Debug, Error)]
pub enum JavaInstallError {
    #[error("while installing Java:\n{0}")]
    JsonDownload(#[from] JsonDownloadError),
    #[error("while installing Java:\n{0}")]
    Request(#[from] RequestError),
    #[error("while installing Java:\n{0}")]
    Io(#[from] IoError),
    #[error("Java auto-installation is not supported on your platform")]
    UnsupportedPlatform,
    #[error("no Java runtime called {0:?} is published for this platform")]
    NoRuntimeListed(String),
    #[error("couldn't find a java binary inside {0:?}")]
    NoJavaBinFound(PathBuf),
}

impl JavaInstallError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::JavaMissing
    }
}

/// Returns an absolute path to a `java` executable matching `selector`.
///
/// - A caller-supplied `override_path` is used unconditionally.
/// - An already-installed runtime under `<root>/runtime/` is reused.
/// - Otherwise the platform-appropriate runtime is downloaded from
///   Mojang's java-runtime manifest and recorded for next time.
pub async fn get_java_binary(
    root: &Path,
    client: &reqwest::Client,
    bus: &EventBus,
    selector: &JavaSelector,
    override_path: Option<&Path>,
) -> Result<PathBuf, JavaInstallError> {
    if let Some(path) = override_path {
        info!("Java (override): {path:?}");
        return Ok(path.to_owned());
    }

    let platform = platform_key().ok_or(JavaInstallError::UnsupportedPlatform)?;
    let install_dir = root
        .join("runtime")
        .join(&selector.component)
        .join(platform);
    let is_incomplete_install = install_dir.join("install.lock").exists();

    if !install_dir.is_dir() || is_incomplete_install {
        info!("Installing Java: {}", selector.component);
        install_runtime(client, bus, selector, platform, &install_dir).await?;
    }

    find_java_bin(&install_dir).await
}

async fn install_runtime(
    client: &reqwest::Client,
    bus: &EventBus,
    selector: &JavaSelector,
    platform: &str,
    install_dir: &Path,
) -> Result<(), JavaInstallError> {
    const JOBS: usize = 32;

    tokio::fs::create_dir_all(install_dir)
        .await
        .path(install_dir)?;
    let lock_file = install_dir.join("install.lock");
    tokio::fs::write(&lock_file, "java install in progress")
        .await
        .path(&lock_file)?;

    let index: JavaListJson = file_utils::download_file_to_json(client, JAVA_LIST_URL).await?;
    let listings = index
        .get(platform)
        .ok_or(JavaInstallError::UnsupportedPlatform)?;

    // The named track, or the one its major version maps to.
    let listing = listings
        .get(&selector.component)
        .filter(|l| !l.is_empty())
        .or_else(|| {
            listings
                .get(JavaSelector::component_for_major(selector.major_version))
                .filter(|l| !l.is_empty())
        })
        .ok_or_else(|| JavaInstallError::NoRuntimeListed(selector.component.clone()))?;

    let files_url = &listing[0].manifest.url;
    let files: JavaFilesJson = file_utils::download_file_to_json(client, files_url).await?;

    let num_files = files.files.len();
    let file_num = Mutex::new(0usize);

    _ = do_jobs_with_limit(
        files.files.iter().map(|(file_name, file)| {
            install_file(client, bus, &file_num, num_files, install_dir, file_name, file)
        }),
        JOBS,
    )
    .await?;

    tokio::fs::remove_file(&lock_file).await.path(lock_file)?;
    info!("Finished installing {}", selector.component);
    Ok(())
}

async fn install_file(
    client: &reqwest::Client,
    bus: &EventBus,
    file_num: &Mutex<usize>,
    num_files: usize,
    install_dir: &Path,
    file_name: &str,
    file: &JavaFile,
) -> Result<(), JavaInstallError> {
    let file_path = install_dir.join(file_name);
    match file {
        JavaFile::file {
            downloads,
            executable,
        } => {
            if let Some(parent) = file_path.parent() {
                tokio::fs::create_dir_all(parent).await.path(parent)?;
            }
            let bytes = download_runtime_file(client, downloads).await?;
            file_utils::write_file_atomic(&file_path, &bytes).await?;
            if *executable {
                file_utils::set_executable(&file_path).await?;
            }
        }
        JavaFile::directory {} => {
            tokio::fs::create_dir_all(&file_path).await.path(file_path)?;
        }
        JavaFile::link { .. } => {
            // Symlinked duplicates of files installed above; the
            // runtime works without them.
        }
    }

    let done = {
        let mut file_num = file_num.lock().unwrap();
        *file_num += 1;
        *file_num
    };
    bus.emit(Event::Progress {
        done: done as u64,
        total: num_files as u64,
        element: format!("java: {file_name}"),
    });
    pt!("({done}/{num_files}): {file_name}");
    Ok(())
}

/// Runtime files come in a raw and an lzma-compressed variant; the
/// compressed one saves most of the transfer when it is intact.
async fn download_runtime_file(
    client: &reqwest::Client,
    downloads: &JavaFileDownload,
) -> Result<Vec<u8>, JavaInstallError> {
    let Some(lzma) = &downloads.lzma else {
        return Ok(file_utils::download_file_to_bytes(client, &downloads.raw.url).await?);
    };

    let compressed = file_utils::download_file_to_bytes(client, &lzma.url).await?;
    let mut reader = std::io::BufReader::new(std::io::Cursor::new(compressed));
    let mut out = Vec::new();
    match lzma_rs::lzma_decompress(&mut reader, &mut out) {
        Ok(()) => Ok(out),
        Err(err) => {
            err!(
                "Could not decompress lzma file: {err}\n  ({})",
                downloads.raw.url.bright_black()
            );
            Ok(file_utils::download_file_to_bytes(client, &downloads.raw.url).await?)
        }
    }
}

async fn find_java_bin(java_dir: &Path) -> Result<PathBuf, JavaInstallError> {
    let names = [
        "bin/java",
        "Contents/Home/bin/java",
        "jre.bundle/Contents/Home/bin/java",
    ];

    for name in names {
        let path = java_dir.join(name);
        if path.exists() {
            return Ok(cl_core::file_utils::canonicalize_or_self(&path).await);
        }
        let exe = java_dir.join(format!("{name}.exe"));
        if exe.exists() {
            return Ok(exe);
        }
    }

    Err(JavaInstallError::NoJavaBinFound(java_dir.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_version_fallback_tracks() {
        assert_eq!(JavaSelector::component_for_major(8), "jre-legacy");
        assert_eq!(JavaSelector::component_for_major(17), "java-runtime-gamma");
        assert_eq!(JavaSelector::component_for_major(21), "java-runtime-delta");
    }

    #[tokio::test]
    async fn override_path_wins_without_touching_disk() {
        let bus = EventBus::new();
        let client = reqwest::Client::new();
        let override_path = PathBuf::from("/opt/custom/jdk/bin/java");
        let got = get_java_binary(
            Path::new("/nonexistent-root"),
            &client,
            &bus,
            &JavaSelector::default(),
            Some(&override_path),
        )
        .await
        .unwrap();
        assert_eq!(got, override_path);
    }
}
