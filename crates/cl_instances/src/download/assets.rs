//! The content-addressed asset store: `assets/indexes/<id>.json` plus
//! `assets/objects/<hh>/<hash>`, shared by every instance. Legacy
//! versions additionally get a `resources/` shadow tree with the
//! virtual paths the old engine expects.

use cl_core::event::Event;
use cl_core::json::assets::{is_legacy_index, AssetIndexFile};
use cl_core::{info, CheckKind, IntoIoError, IntoJsonError};

use super::{DownloadError, DownloadTask, GameDownloader};

impl GameDownloader {
    /// Fetches the asset index (hash-verified), then downloads every
    /// missing object into the content-addressed store.
    pub async fn download_assets(&self) -> Result<(), DownloadError> {
        let Some(index_info) = &self.version_json.assetIndex else {
            return Ok(());
        };

        let assets_dir = self.root.join("assets");
        let index_path = assets_dir
            .join("indexes")
            .join(format!("{}.json", index_info.id));

        self.downloader
            .fetch_task(
                &DownloadTask {
                    url: index_info.url.clone(),
                    dest: index_path.clone(),
                    size: index_info.size,
                    sha1: Some(index_info.sha1.clone()),
                },
                None,
            )
            .await?;

        let index_text = tokio::fs::read_to_string(&index_path)
            .await
            .path(&index_path)?;
        let index: AssetIndexFile = serde_json::from_str(&index_text).json(index_text)?;

        let objects_dir = assets_dir.join("objects");
        let total = index.objects.len();
        info!("Checking {total} assets");

        let mut tasks = Vec::new();
        let mut declared_total = 0u64;
        for (i, object) in index.objects.values().enumerate() {
            self.bus.emit(Event::Check {
                index: i,
                total,
                kind: CheckKind::Asset,
            });
            declared_total += object.size;
            let dest = objects_dir.join(object.rel_path());
            // Content-addressed: a present file is a correct file.
            if dest.is_file() {
                continue;
            }
            tasks.push(DownloadTask {
                url: object.url(),
                dest,
                size: object.size,
                sha1: Some(object.hash.clone()),
            });
        }

        info!("Downloading {} assets", tasks.len());
        let stats = self
            .downloader
            .download_many(tasks, declared_total, false)
            .await?;
        if stats.failed > 0 {
            return Err(DownloadError::TasksFailed {
                failed: stats.failed,
                total: stats.completed,
            });
        }

        if is_legacy_index(&index_info.id) || index.map_to_resources {
            self.populate_legacy_resources(&index).await?;
        }

        Ok(())
    }

    /// Pre-1.6 engines read assets by virtual path, not by hash; mirror
    /// the objects into `assets/resources/<virtual_path>`.
    async fn populate_legacy_resources(
        &self,
        index: &AssetIndexFile,
    ) -> Result<(), DownloadError> {
        info!("Populating legacy resources tree");
        let assets_dir = self.root.join("assets");
        let objects_dir = assets_dir.join("objects");
        let resources_dir = assets_dir.join("resources");

        for (virtual_path, object) in &index.objects {
            let source = objects_dir.join(object.rel_path());
            let dest = resources_dir.join(virtual_path);
            if dest.is_file() || !source.is_file() {
                continue;
            }
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await.path(parent)?;
            }
            tokio::fs::copy(&source, &dest).await.path(&dest)?;
        }
        Ok(())
    }
}
