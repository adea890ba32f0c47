//! Loader subsystem: per-flavor backends that overlay a base version
//! manifest with a mod loader's libraries, main class and arguments.
//!
//! Forge-family backends additionally hand back a [`forge::PatchJob`]
//! describing the installer processors that must run (after native
//! extraction) before the game can launch.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cl_core::archive::ArchiveError;
use cl_core::event::Event;
use cl_core::json::version::{Library, RuleContext, VersionDetails};
use cl_core::{
    do_jobs, file_utils, maven, pt, DownloadFileError, ErrorKind, EventBus, IntoIoError, IoError,
    JsonDownloadError, JsonError, RequestError,
};

pub mod fabric;
pub mod forge;
pub mod neoforge;

pub use forge::patcher::{PatchError, PatchJob};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Loader {
    Fabric,
    LegacyFabric,
    Quilt,
    Forge,
    Neoforge,
}

impl std::fmt::Display for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Loader::Fabric => "fabric",
            Loader::LegacyFabric => "legacy-fabric",
            Loader::Quilt => "quilt",
            Loader::Forge => "forge",
            Loader::Neoforge => "neoforge",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Loader {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fabric" => Ok(Loader::Fabric),
            "legacy-fabric" | "legacy_fabric" | "legacyfabric" => Ok(Loader::LegacyFabric),
            "quilt" => Ok(Loader::Quilt),
            "forge" => Ok(Loader::Forge),
            "neoforge" => Ok(Loader::Neoforge),
            other => Err(format!("unknown loader: {other}")),
        }
    }
}

/// Which loader build to install.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum BuildSelection {
    Latest,
    Recommended,
    Literal(String),
}

impl std::str::FromStr for BuildSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "latest" => BuildSelection::Latest,
            "recommended" => BuildSelection::Recommended,
            other => BuildSelection::Literal(other.to_owned()),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoaderSpec {
    pub loader: Loader,
    pub build: BuildSelection,
}

/// Everything a backend needs from the launch in progress.
pub struct LoaderContext<'a> {
    pub root: &'a Path,
    pub client: &'a reqwest::Client,
    pub bus: &'a EventBus,
    pub base_version: &'a VersionDetails,
    pub base_version_id: &'a str,
    pub rule_ctx: &'a RuleContext,
}

impl LoaderContext<'_> {
    #[must_use]
    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    #[must_use]
    pub fn base_jar_path(&self) -> PathBuf {
        self.root
            .join("versions")
            .join(self.base_version_id)
            .join(format!("{}.jar", self.base_version_id))
    }

    #[must_use]
    pub fn base_json_path(&self) -> PathBuf {
        self.root
            .join("versions")
            .join(self.base_version_id)
            .join(format!("{}.json", self.base_version_id))
    }
}

/// The overlay a backend produced: a version manifest fragment that is
/// merged over the base at launch time.
#[derive(Debug, Clone)]
pub struct LoaderProfile {
    pub id: String,
    pub overlay: VersionDetails,
}

#[derive(Debug, Error)]
pub enum LoaderInstallError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    JsonDownload(#[from] JsonDownloadError),
    #[error(transparent)]
    Json(#[from] JsonError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    DownloadFile(#[from] DownloadFileError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("{loader} has no builds for game version {game}")]
    UnsupportedGameVersion { loader: Loader, game: String },
    #[error("no {loader} build {requested:?}; available: {available:?}")]
    NoMatchingBuild {
        loader: Loader,
        requested: String,
        available: Vec<String>,
    },
    #[error("installer offers no usable flavor (installer/client/universal)")]
    NoInstallerFlavor,
    #[error("installer hash mismatch: expected {expected}, got {got}")]
    InstallerHashMismatch { expected: String, got: String },
    #[error("installer archive is missing entry {0:?}")]
    MissingInstallerEntry(String),
    #[error("install profile is invalid: {0}")]
    ProfileInvalid(String),
}

impl LoaderInstallError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoaderInstallError::Request(e) => e.kind(),
            LoaderInstallError::JsonDownload(e) => e.kind(),
            LoaderInstallError::Json(_) => ErrorKind::ProfileInvalid,
            LoaderInstallError::Io(_) => ErrorKind::LaunchFailed,
            LoaderInstallError::DownloadFile(DownloadFileError::Request(e)) => e.kind(),
            LoaderInstallError::DownloadFile(DownloadFileError::Io(_)) => ErrorKind::LaunchFailed,
            LoaderInstallError::Archive(_) | LoaderInstallError::MissingInstallerEntry(_) => {
                ErrorKind::ArchiveInvalid
            }
            LoaderInstallError::UnsupportedGameVersion { .. }
            | LoaderInstallError::NoMatchingBuild { .. }
            | LoaderInstallError::NoInstallerFlavor => ErrorKind::NotFound,
            LoaderInstallError::InstallerHashMismatch { .. } => ErrorKind::HashMismatch,
            LoaderInstallError::ProfileInvalid(_) => ErrorKind::ProfileInvalid,
        }
    }
}

/// Resolves the requested loader into an overlay profile, downloading
/// its libraries as a side effect. Forge-family flavors also return the
/// patch job to run once natives are extracted.
pub async fn resolve_profile(
    ctx: &LoaderContext<'_>,
    spec: &LoaderSpec,
) -> Result<(LoaderProfile, Option<PatchJob>), LoaderInstallError> {
    match spec.loader {
        Loader::Fabric | Loader::LegacyFabric | Loader::Quilt => {
            let profile = fabric::resolve(ctx, spec.loader, &spec.build).await?;
            Ok((profile, None))
        }
        Loader::Forge => forge::resolve(ctx, &spec.build).await,
        Loader::Neoforge => neoforge::resolve(ctx, &spec.build).await,
    }
}

/// Persists an overlay under `versions/<id>/` and copies the base
/// client jar next to it, the layout the vanilla launcher uses.
pub(crate) async fn persist_overlay(
    ctx: &LoaderContext<'_>,
    overlay: &VersionDetails,
) -> Result<(), LoaderInstallError> {
    let dir = ctx.root.join("versions").join(&overlay.id);
    tokio::fs::create_dir_all(&dir).await.path(&dir)?;
    overlay
        .save_to_path(&dir.join(format!("{}.json", overlay.id)))
        .await
        .map_err(|e| match e {
            cl_core::JsonFileError::Serde(e) => LoaderInstallError::Json(e),
            cl_core::JsonFileError::Io(e) => LoaderInstallError::Io(e),
        })?;

    let jar_dest = dir.join(format!("{}.jar", overlay.id));
    let base_jar = ctx.base_jar_path();
    if !jar_dest.exists() && base_jar.is_file() {
        tokio::fs::copy(&base_jar, &jar_dest).await.path(&jar_dest)?;
    }
    Ok(())
}

/// Downloads the libraries an overlay or install profile declares.
/// Entries whose artifact URL is empty are skipped: those were just
/// extracted out of an installer. Rule-gated entries are skipped too.
pub(crate) async fn download_profile_libraries(
    ctx: &LoaderContext<'_>,
    libraries: &[Library],
) -> Result<(), LoaderInstallError> {
    let libraries_dir = ctx.libraries_dir();
    let total = libraries.len();

    let jobs = libraries.iter().enumerate().map(|(i, library)| {
        let libraries_dir = libraries_dir.clone();
        async move {
            let Some(name) = library.name.as_deref() else {
                return Ok(());
            };
            if !library.is_allowed(ctx.rule_ctx) {
                pt!("Skipping {name}");
                return Ok(());
            }

            let (url, rel) = match (library.artifact(), library.rel_path()) {
                (Some(artifact), Some(rel)) => {
                    if artifact.url.is_empty() {
                        return Ok(());
                    }
                    (artifact.url.clone(), rel)
                }
                (None, Some(rel)) => {
                    let Some(base) = library.url.as_deref() else {
                        pt!("Skipping (no url): {name}");
                        return Ok(());
                    };
                    (format!("{}/{rel}", base.trim_end_matches('/')), rel)
                }
                _ => return Ok(()),
            };

            let dest = libraries_dir.join(&rel);
            if !dest.exists() {
                file_utils::download_file_to_path(ctx.client, &url, &dest).await?;
            }
            ctx.bus.emit(Event::Progress {
                done: (i + 1) as u64,
                total: total as u64,
                element: name.to_owned(),
            });
            Ok::<(), LoaderInstallError>(())
        }
    });

    _ = do_jobs(jobs).await?;
    Ok(())
}

/// Classpath-bearing paths of a profile's libraries, rule-filtered, in
/// declaration order.
#[must_use]
pub fn profile_library_paths(
    libraries: &[Library],
    libraries_dir: &Path,
    rule_ctx: &RuleContext,
) -> Vec<(String, PathBuf)> {
    libraries
        .iter()
        .filter(|l| l.is_allowed(rule_ctx))
        .filter_map(|l| {
            let name = l.name.clone()?;
            let rel = l.rel_path()?;
            Some((name, libraries_dir.join(rel)))
        })
        .collect()
}

/// `<universal stem>-clientdata.lzma`, next to the universal jar.
pub(crate) fn clientdata_rel_path(universal_coordinate: &str) -> Option<String> {
    let path = maven::artifact_path(universal_coordinate)?;
    let stem = path.file_name.strip_suffix(".jar")?;
    Some(format!("{}/{stem}-clientdata.lzma", path.dir))
}
