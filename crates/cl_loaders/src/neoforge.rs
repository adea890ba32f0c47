//! NeoForge. Same shape as Forge, but builds live behind two maven
//! APIs: the legacy `net.neoforged:forge` project (1.20.1 only) and the
//! current `net.neoforged:neoforge` one. Which API surfaced the build
//! decides the universal coordinate prefix downstream.

use cl_core::hash::{self, HashAlgorithm};
use cl_core::json::forge::NeoforgeVersions;
use cl_core::{file_utils, info, IntoIoError};

use crate::forge::patcher::PatchJob;
use crate::{BuildSelection, Loader, LoaderContext, LoaderInstallError, LoaderProfile};

const NEOFORGE_API: &str = "https://maven.neoforged.net/api/maven/versions/releases";
const NEOFORGE_MAVEN: &str = "https://maven.neoforged.net/releases";

pub(crate) async fn resolve(
    ctx: &LoaderContext<'_>,
    build: &BuildSelection,
) -> Result<(LoaderProfile, Option<PatchJob>), LoaderInstallError> {
    let game = ctx.base_version_id;

    // Current API first; fall back to the legacy project for the
    // 1.20.1-era builds that predate the rename.
    let current: NeoforgeVersions =
        file_utils::download_file_to_json(ctx.client, &format!("{NEOFORGE_API}/net/neoforged/neoforge"))
            .await?;
    let prefix = version_prefix(game);
    let mut versions: Vec<String> = current
        .versions
        .iter()
        .filter(|v| v.starts_with(&prefix))
        .cloned()
        .collect();

    let old_api = versions.is_empty();
    if old_api {
        let legacy: NeoforgeVersions = file_utils::download_file_to_json(
            ctx.client,
            &format!("{NEOFORGE_API}/net/neoforged/forge"),
        )
        .await?;
        versions = legacy
            .versions
            .iter()
            .filter(|v| v.starts_with(&format!("{game}-")))
            .cloned()
            .collect();
    }
    if versions.is_empty() {
        return Err(LoaderInstallError::UnsupportedGameVersion {
            loader: Loader::Neoforge,
            game: game.to_owned(),
        });
    }

    let version = select_build(&versions, build)?;
    info!("Installing neoforge {version} (old API: {old_api})");

    let project = if old_api { "forge" } else { "neoforge" };
    let installer_url = format!(
        "{NEOFORGE_MAVEN}/net/neoforged/{project}/{version}/{project}-{version}-installer.jar"
    );
    let installer_path = ctx
        .libraries_dir()
        .join("net/neoforged/installer")
        .join(&version)
        .join(format!("{project}-{version}-installer.jar"));

    if !installer_path.is_file() {
        file_utils::download_file_to_path(ctx.client, &installer_url, &installer_path).await?;
    }

    // The maven API publishes a sibling .md5 for every artifact.
    if let Ok(expected) =
        file_utils::download_file_to_string(ctx.client, &format!("{installer_url}.md5")).await
    {
        let expected = expected.trim();
        let got = hash::hash_file(&installer_path, HashAlgorithm::Md5).await?;
        if !got.eq_ignore_ascii_case(expected) {
            tokio::fs::remove_file(&installer_path)
                .await
                .path(&installer_path)?;
            return Err(LoaderInstallError::InstallerHashMismatch {
                expected: expected.to_owned(),
                got,
            });
        }
    }

    let universal_fallback = format!("net.neoforged:{project}:{version}");
    crate::forge::install_from_installer(ctx, &installer_path, Some(universal_fallback)).await
}

/// NeoForge drops the leading `1.` of the game version: 1.21.4 builds
/// are `21.4.*`, 1.21 builds are `21.0.*`, snapshots are `0.<id>.*`.
fn version_prefix(game: &str) -> String {
    if let Some(rest) = game.strip_prefix("1.") {
        let mut prefix = rest.to_owned();
        if !prefix.contains('.') {
            prefix.push_str(".0");
        }
        prefix.push('.');
        prefix
    } else {
        format!("0.{game}.")
    }
}

fn select_build(
    versions: &[String],
    build: &BuildSelection,
) -> Result<String, LoaderInstallError> {
    let found = match build {
        BuildSelection::Latest => versions.last(),
        BuildSelection::Recommended => versions
            .iter()
            .rev()
            .find(|v| !v.contains("beta"))
            .or_else(|| versions.last()),
        BuildSelection::Literal(wanted) => {
            let found = versions.iter().find(|v| *v == wanted);
            if found.is_none() {
                return Err(LoaderInstallError::NoMatchingBuild {
                    loader: Loader::Neoforge,
                    requested: wanted.clone(),
                    available: versions.to_vec(),
                });
            }
            found
        }
    };
    Ok(found.expect("non-empty version list checked by caller").clone())
}
