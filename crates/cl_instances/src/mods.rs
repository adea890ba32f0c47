//! Mod staging: user-configured mod URLs and local custom-mod jars are
//! placed into `<instance>/mods/` before the game spawns. Failures are
//! logged and counted, never fatal.

use std::path::{Path, PathBuf};

use cl_core::event::Event;
use cl_core::{err, info, pt, CheckKind, EventBus, IntoIoError};

use crate::download::Downloader;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageStats {
    pub staged: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Derives the on-disk name from the URL path, query string stripped.
#[must_use]
pub fn mod_file_name(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next()?;
    let name = without_query.rsplit('/').next()?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_owned())
}

pub async fn stage_mods(
    downloader: &Downloader,
    bus: &EventBus,
    instance_dir: &Path,
    mod_urls: &[String],
    custom_mod_paths: &[PathBuf],
) -> StageStats {
    let mods_dir = instance_dir.join("mods");
    if let Err(e) = tokio::fs::create_dir_all(&mods_dir).await.path(&mods_dir) {
        err!("Couldn't create mods dir: {e}");
        return StageStats {
            failed: mod_urls.len(),
            ..StageStats::default()
        };
    }

    let mut stats = StageStats::default();
    let total = mod_urls.len() + custom_mod_paths.len();

    for (index, url) in mod_urls.iter().enumerate() {
        bus.emit(Event::Check {
            index,
            total,
            kind: CheckKind::Mod,
        });
        let Some(name) = mod_file_name(url) else {
            err!("Can't derive a file name from mod url {url}, skipping");
            stats.failed += 1;
            continue;
        };
        if mods_dir.join(&name).exists() {
            stats.skipped += 1;
            continue;
        }
        match downloader.download_one(url, &mods_dir, &name, None).await {
            Ok(()) => {
                pt!("Staged mod {name}");
                stats.staged += 1;
            }
            Err(e) => {
                err!("Couldn't download mod {url}: {e}");
                stats.failed += 1;
            }
        }
    }

    for path in custom_mod_paths {
        stats = stage_local(path, &mods_dir, stats).await;
    }

    info!(
        "Mod staging: {} staged, {} skipped, {} failed",
        stats.staged, stats.skipped, stats.failed
    );
    stats
}

/// Copies every `.jar` under `source` that isn't a sources jar.
async fn stage_local(source: &Path, mods_dir: &Path, mut stats: StageStats) -> StageStats {
    let mut candidates = Vec::new();
    if source.is_file() {
        candidates.push(source.to_owned());
    } else if source.is_dir() {
        match tokio::fs::read_dir(source).await {
            Ok(mut entries) => {
                while let Ok(Some(entry)) = entries.next_entry().await {
                    candidates.push(entry.path());
                }
            }
            Err(e) => {
                err!("Couldn't read custom mod dir {source:?}: {e}");
                stats.failed += 1;
                return stats;
            }
        }
    }

    for path in candidates {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".jar") || name.contains("sources") {
            continue;
        }
        let dest = mods_dir.join(name);
        if dest.exists() {
            stats.skipped += 1;
            continue;
        }
        match tokio::fs::copy(&path, &dest).await {
            Ok(_) => {
                pt!("Copied custom mod {name}");
                stats.staged += 1;
            }
            Err(e) => {
                err!("Couldn't copy custom mod {path:?}: {e}");
                stats.failed += 1;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_strip_queries_and_fragments() {
        assert_eq!(
            mod_file_name("https://cdn.modrinth.com/data/P7dR8mSH/fabric-api.jar?v=3").as_deref(),
            Some("fabric-api.jar")
        );
        assert_eq!(
            mod_file_name("https://example.com/mods/sodium-0.6.jar").as_deref(),
            Some("sodium-0.6.jar")
        );
        assert!(mod_file_name("https://example.com/mods/").is_none());
    }

    #[tokio::test]
    async fn local_jars_are_copied_once_and_sources_skipped() {
        let base = std::env::temp_dir().join("cl_mods_test");
        _ = tokio::fs::remove_dir_all(&base).await;
        let source = base.join("source");
        let instance = base.join("instance");
        tokio::fs::create_dir_all(&source).await.unwrap();
        tokio::fs::create_dir_all(&instance).await.unwrap();

        tokio::fs::write(source.join("clientmod.jar"), b"jar")
            .await
            .unwrap();
        tokio::fs::write(source.join("clientmod-sources.jar"), b"src")
            .await
            .unwrap();
        tokio::fs::write(source.join("readme.txt"), b"nope")
            .await
            .unwrap();

        let mods_dir = instance.join("mods");
        tokio::fs::create_dir_all(&mods_dir).await.unwrap();

        let stats = stage_local(&source, &mods_dir, StageStats::default()).await;
        assert_eq!(stats.staged, 1);
        assert!(mods_dir.join("clientmod.jar").exists());
        assert!(!mods_dir.join("clientmod-sources.jar").exists());

        // Second pass stages nothing new.
        let stats = stage_local(&source, &mods_dir, StageStats::default()).await;
        assert_eq!(stats.staged, 0);
        assert_eq!(stats.skipped, 1);

        _ = tokio::fs::remove_dir_all(&base).await;
    }
}
