//! Version resolution and artifact assembly: manifest fetching,
//! dependency expansion, hash-verified downloading, native extraction
//! and the content-addressed asset store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use cl_core::archive::ArchiveError;
use cl_core::event::Event;
use cl_core::json::manifest::Manifest;
use cl_core::json::version::RuleContext;
use cl_core::json::VersionDetails;
use cl_core::{
    file_utils, info, CheckKind, DownloadFileError, ErrorKind, EventBus, IoError,
    JsonDownloadError, JsonError, JsonFileError, RequestError,
};

mod assets;
mod downloader;
mod libraries;

pub use downloader::{DownloadStats, DownloadTask, Downloader, HeadInfo, MirrorHit};
pub(crate) use libraries::LibraryPlan;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Json(#[from] JsonError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("unknown version: {0}")]
    VersionNotFound(String),
    #[error("version inheritance forms a cycle at {0}")]
    InheritanceCycle(String),
    #[error("version manifest invalid: {0}")]
    ProfileInvalid(String),
    #[error("hash mismatch for {url}: expected {expected}, got {got}")]
    HashMismatch {
        url: String,
        expected: String,
        got: String,
    },
    #[error("download of {url} timed out")]
    Timeout { url: String },
    #[error("operation aborted")]
    Aborted,
    #[error("{failed} of {total} downloads failed")]
    TasksFailed { failed: usize, total: usize },
}

impl From<JsonDownloadError> for DownloadError {
    fn from(value: JsonDownloadError) -> Self {
        match value {
            JsonDownloadError::Request(e) => Self::Request(e),
            JsonDownloadError::Serde(e) => Self::Json(e),
        }
    }
}

impl From<DownloadFileError> for DownloadError {
    fn from(value: DownloadFileError) -> Self {
        match value {
            DownloadFileError::Request(e) => Self::Request(e),
            DownloadFileError::Io(e) => Self::Io(e),
        }
    }
}

impl From<JsonFileError> for DownloadError {
    fn from(value: JsonFileError) -> Self {
        match value {
            JsonFileError::Serde(e) => Self::Json(e),
            JsonFileError::Io(e) => Self::Io(e),
        }
    }
}

impl DownloadError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::Request(e) => e.kind(),
            DownloadError::Io(_) => ErrorKind::LaunchFailed,
            DownloadError::Json(_) | DownloadError::ProfileInvalid(_)
            | DownloadError::InheritanceCycle(_) => ErrorKind::ProfileInvalid,
            DownloadError::Archive(_) => ErrorKind::ArchiveInvalid,
            DownloadError::VersionNotFound(_) => ErrorKind::NotFound,
            DownloadError::HashMismatch { .. } => ErrorKind::HashMismatch,
            DownloadError::Timeout { .. } => ErrorKind::Timeout,
            DownloadError::Aborted => ErrorKind::Aborted,
            DownloadError::TasksFailed { .. } => ErrorKind::Network,
        }
    }
}

/// Drives artifact assembly for one resolved version: client jar,
/// libraries, natives, assets and the log4j config.
pub struct GameDownloader {
    pub root: PathBuf,
    /// Fully merged (inheritance-resolved) base manifest.
    pub version_json: VersionDetails,
    pub version_id: String,
    pub(crate) downloader: Downloader,
    pub(crate) bus: EventBus,
    pub(crate) rule_ctx: RuleContext,
    pub(crate) mirrors: Vec<String>,
    plan: Option<LibraryPlan>,
}

impl GameDownloader {
    /// Resolves `requested` against the upstream version index,
    /// following the `inheritsFrom` chain, and persists the merged
    /// manifest under `versions/<id>/<id>.json`.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        root: &Path,
        client: reqwest::Client,
        bus: EventBus,
        downloader: Downloader,
        rule_ctx: RuleContext,
        mirrors: Vec<String>,
        requested: &str,
    ) -> Result<Self, DownloadError> {
        info!("Resolving version {requested}");
        let manifest = Manifest::download(&client).await?;
        let entry = manifest
            .resolve(requested)
            .ok_or_else(|| DownloadError::VersionNotFound(requested.to_owned()))?;

        let mut version_json: VersionDetails =
            file_utils::download_file_to_json(&client, &entry.url).await?;

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(version_json.id.clone());
        while let Some(parent_id) = version_json.inheritsFrom.clone() {
            if !visited.insert(parent_id.clone()) {
                return Err(DownloadError::InheritanceCycle(parent_id));
            }
            let parent_entry = manifest
                .resolve(&parent_id)
                .ok_or(DownloadError::VersionNotFound(parent_id))?;
            let parent: VersionDetails =
                file_utils::download_file_to_json(&client, &parent_entry.url).await?;
            version_json = version_json.merged_with_parent(parent);
        }

        if let Some(violation) = version_json.merged_invariant_violation() {
            return Err(DownloadError::ProfileInvalid(violation));
        }

        let version_id = version_json.id.clone();
        let json_path = root
            .join("versions")
            .join(&version_id)
            .join(format!("{version_id}.json"));
        version_json.save_to_path(&json_path).await?;

        Ok(Self {
            root: root.to_owned(),
            version_json,
            version_id,
            downloader,
            bus,
            rule_ctx,
            mirrors,
            plan: None,
        })
    }

    #[must_use]
    pub fn jar_path(&self) -> PathBuf {
        self.root
            .join("versions")
            .join(&self.version_id)
            .join(format!("{}.jar", self.version_id))
    }

    #[must_use]
    pub fn json_path(&self) -> PathBuf {
        self.root
            .join("versions")
            .join(&self.version_id)
            .join(format!("{}.json", self.version_id))
    }

    #[must_use]
    pub fn natives_dir(&self) -> PathBuf {
        self.root.join("natives").join(&self.version_id)
    }

    /// Downloads the client jar, verifying its SHA-1. A valid file
    /// already on disk is left alone.
    pub async fn download_jar(&self) -> Result<(), DownloadError> {
        let Some(downloads) = &self.version_json.downloads else {
            return Err(DownloadError::ProfileInvalid(
                "no client jar download".to_owned(),
            ));
        };
        info!("Downloading client jar");
        let task = DownloadTask {
            url: downloads.client.url.clone(),
            dest: self.jar_path(),
            size: downloads.client.size,
            sha1: Some(downloads.client.sha1.clone()),
        };
        self.downloader.fetch_task(&task, None).await
    }

    /// Plans and downloads every rule-allowed library, remembering the
    /// plan for classpath assembly and native extraction.
    pub async fn download_libraries(&mut self) -> Result<(), DownloadError> {
        info!("Downloading libraries");
        let plan = libraries::plan_libraries(
            &self.version_json,
            &self.root,
            &self.rule_ctx,
            &self.bus,
        )
        .await?;

        let tasks = self.resolve_plan_urls(&plan).await;
        let total_bytes = tasks.iter().map(|t| t.size).sum();
        let stats = self.downloader.download_many(tasks, total_bytes, false).await?;
        if stats.failed > 0 {
            return Err(DownloadError::TasksFailed {
                failed: stats.failed,
                total: stats.completed,
            });
        }

        self.plan = Some(plan);
        Ok(())
    }

    /// Fills in download URLs the manifests left blank by probing the
    /// configured Maven mirrors in order.
    async fn resolve_plan_urls(&self, plan: &LibraryPlan) -> Vec<DownloadTask> {
        let mut tasks = Vec::new();
        for planned in &plan.downloads {
            let url = match &planned.url {
                Some(url) => url.clone(),
                None => {
                    match self
                        .downloader
                        .mirror_probe(&planned.rel, &self.mirrors)
                        .await
                    {
                        Some(hit) => hit.url,
                        None => {
                            cl_core::err!(
                                "No mirror carries {}, skipping",
                                planned.rel
                            );
                            continue;
                        }
                    }
                }
            };
            tasks.push(DownloadTask {
                url,
                dest: planned.dest.clone(),
                size: planned.size,
                sha1: planned.sha1.clone(),
            });
        }
        tasks
    }

    /// Extracts planned native jars into `natives/<version_id>/`.
    /// Must run after every library download has completed.
    pub async fn extract_natives(&self) -> Result<(), DownloadError> {
        let Some(plan) = &self.plan else {
            return Ok(());
        };
        libraries::extract_natives(&plan.natives, &self.natives_dir(), &self.bus).await
    }

    /// Classpath entries from the library plan: `(coordinate, path)`
    /// in manifest order.
    #[must_use]
    pub fn classpath_entries(&self) -> &[(String, PathBuf)] {
        self.plan.as_ref().map_or(&[], |p| &p.classpath)
    }

    /// Downloads the log4j configuration named by the manifest, if any,
    /// returning the local path for `-Dlog4j.configurationFile`.
    pub async fn download_logging_config(&self) -> Result<Option<PathBuf>, DownloadError> {
        let Some(logging) = &self.version_json.logging else {
            return Ok(None);
        };
        let file = &logging.client.file;
        let dest = self
            .root
            .join("assets")
            .join("log_configs")
            .join(&file.id);
        let task = DownloadTask {
            url: file.url.clone(),
            dest: dest.clone(),
            size: file.size,
            sha1: Some(file.sha1.clone()),
        };
        self.downloader.fetch_task(&task, None).await?;
        Ok(Some(dest))
    }

    /// Post-download verification pass: re-hashes every artifact that
    /// declared a hash, re-fetching mismatches once.
    pub async fn verify_artifacts(&self) -> Result<(), DownloadError> {
        let mut checks: Vec<DownloadTask> = Vec::new();
        if let Some(downloads) = &self.version_json.downloads {
            checks.push(DownloadTask {
                url: downloads.client.url.clone(),
                dest: self.jar_path(),
                size: downloads.client.size,
                sha1: Some(downloads.client.sha1.clone()),
            });
        }
        if let Some(plan) = &self.plan {
            for planned in &plan.downloads {
                let Some(url) = planned.url.clone() else {
                    continue;
                };
                checks.push(DownloadTask {
                    url,
                    dest: planned.dest.clone(),
                    size: planned.size,
                    sha1: planned.sha1.clone(),
                });
            }
        }

        let total = checks.len();
        info!("Verifying {total} artifacts");
        for (index, task) in checks.iter().enumerate() {
            self.bus.emit(Event::Check {
                index,
                total,
                kind: CheckKind::Library,
            });
            self.downloader.fetch_task(task, None).await?;
        }
        Ok(())
    }
}
