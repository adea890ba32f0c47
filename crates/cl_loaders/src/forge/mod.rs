//! Forge. The installer jar carries the install profile, a version
//! overlay, an embedded `maven/` tree with the universal jar, and (for
//! 1.13+) the binary patch data its processors consume.

use std::path::Path;

use cl_core::hash::{self, HashAlgorithm};
use cl_core::json::forge::{BuildMeta, InstallProfile, LegacyInstallProfile, Promotions};
use cl_core::json::VersionDetails;
use cl_core::{archive, file_utils, info, maven, pt, IntoIoError};

use crate::{BuildSelection, Loader, LoaderContext, LoaderInstallError, LoaderProfile};

pub mod patcher;
use patcher::PatchJob;

const FORGE_FILES: &str = "https://files.minecraftforge.net/net/minecraftforge/forge";
const FORGE_MAVEN: &str = "https://maven.minecraftforge.net/net/minecraftforge/forge";

pub(crate) async fn resolve(
    ctx: &LoaderContext<'_>,
    build: &BuildSelection,
) -> Result<(LoaderProfile, Option<PatchJob>), LoaderInstallError> {
    let game = ctx.base_version_id;

    let promotions: Promotions =
        file_utils::download_file_to_json(ctx.client, &format!("{FORGE_FILES}/promotions_slim.json"))
            .await?;
    let build = resolve_build(&promotions, game, build)?;
    let version = format!("{game}-{build}");
    info!("Installing forge {version}");

    let meta: BuildMeta =
        file_utils::download_file_to_json(ctx.client, &format!("{FORGE_FILES}/{version}/meta.json"))
            .await?;

    // Prefer the standalone installer; ancient builds only shipped
    // client or universal zips.
    let flavor = ["installer", "client", "universal"]
        .into_iter()
        .find(|f| meta.classifiers.contains_key(*f))
        .ok_or(LoaderInstallError::NoInstallerFlavor)?;

    let installer_url = format!("{FORGE_MAVEN}/{version}/forge-{version}-{flavor}.jar");
    let installer_path = ctx
        .libraries_dir()
        .join("net/minecraftforge/installer")
        .join(&version)
        .join(format!("forge-{version}-{flavor}.jar"));

    if !installer_path.is_file() {
        file_utils::download_file_to_path(ctx.client, &installer_url, &installer_path).await?;
    }

    if let Some(expected) = meta.jar_md5(flavor) {
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

    install_from_installer(ctx, &installer_path, None).await
}

fn resolve_build(
    promotions: &Promotions,
    game: &str,
    build: &BuildSelection,
) -> Result<String, LoaderInstallError> {
    let latest = promotions.promos.get(&format!("{game}-latest"));
    let picked = match build {
        BuildSelection::Latest => latest,
        BuildSelection::Recommended => promotions
            .promos
            .get(&format!("{game}-recommended"))
            .or(latest),
        BuildSelection::Literal(wanted) => return Ok(wanted.clone()),
    };
    picked
        .cloned()
        .ok_or_else(|| LoaderInstallError::UnsupportedGameVersion {
            loader: Loader::Forge,
            game: game.to_owned(),
        })
}

/// Shared Forge/NeoForge tail: parse the install profile out of the
/// downloaded installer, extract the locally-produced artifacts, plan
/// the library downloads and persist the overlay.
pub(crate) async fn install_from_installer(
    ctx: &LoaderContext<'_>,
    installer_path: &Path,
    universal_fallback: Option<String>,
) -> Result<(LoaderProfile, Option<PatchJob>), LoaderInstallError> {
    let profile_bytes = archive::read_entry(installer_path, "install_profile.json")?.ok_or_else(
        || LoaderInstallError::MissingInstallerEntry("install_profile.json".to_owned()),
    )?;

    // Pre-1.13 installers nest `install` + `versionInfo` in a single
    // document; everything newer keeps a sibling overlay JSON.
    if let Ok(legacy) = serde_json::from_slice::<LegacyInstallProfile>(&profile_bytes) {
        return install_legacy(ctx, installer_path, legacy).await;
    }

    let profile: InstallProfile = serde_json::from_slice(&profile_bytes)
        .map_err(|e| LoaderInstallError::ProfileInvalid(e.to_string()))?;

    let overlay_entry = profile
        .json
        .as_deref()
        .map(|n| n.trim_start_matches('/').to_owned())
        .unwrap_or_else(|| "version.json".to_owned());
    let overlay_bytes = archive::read_entry(installer_path, &overlay_entry)?
        .ok_or(LoaderInstallError::MissingInstallerEntry(overlay_entry))?;
    let overlay: VersionDetails = serde_json::from_slice(&overlay_bytes)
        .map_err(|e| LoaderInstallError::ProfileInvalid(e.to_string()))?;

    let universal_coordinate = profile.path.clone().or(universal_fallback);

    // The universal and shim jars ship inside the installer's embedded
    // maven/ tree, never on the CDN; their declared URLs in the profile
    // are empty. Materialize the whole tree into `libraries/`.
    for entry in archive::list_with_prefix(installer_path, "maven/")? {
        let rel = entry.trim_start_matches("maven/").to_owned();
        extract_embedded(ctx, installer_path, &entry, &rel).await?;
    }

    let has_processors = profile.processors.iter().any(|p| p.runs_on_client());
    if has_processors {
        let coordinate = universal_coordinate.as_deref().ok_or_else(|| {
            LoaderInstallError::ProfileInvalid("processors without a universal coordinate".into())
        })?;
        if let Some(rel) = crate::clientdata_rel_path(coordinate) {
            extract_embedded(ctx, installer_path, "data/client.lzma", &rel).await?;
        }
    }

    crate::download_profile_libraries(ctx, &profile.libraries).await?;
    crate::download_profile_libraries(ctx, &overlay.libraries).await?;
    crate::persist_overlay(ctx, &overlay).await?;

    let loader_dir = ctx.root.join("versions").join(&overlay.id);
    let patch_job = has_processors.then(|| PatchJob {
        profile,
        installer_path: installer_path.to_owned(),
        universal_coordinate,
        loader_dir,
        base_jar: ctx.base_jar_path(),
        base_json_path: ctx.base_json_path(),
    });

    Ok((
        LoaderProfile {
            id: overlay.id.clone(),
            overlay,
        },
        patch_job,
    ))
}

async fn install_legacy(
    ctx: &LoaderContext<'_>,
    installer_path: &Path,
    legacy: LegacyInstallProfile,
) -> Result<(LoaderProfile, Option<PatchJob>), LoaderInstallError> {
    let overlay = legacy.versionInfo;

    if let (Some(file_path), Some(coordinate)) =
        (legacy.install.filePath.as_deref(), legacy.install.path.as_deref())
    {
        if let Some(rel) = maven::artifact_rel_path(coordinate) {
            extract_embedded(ctx, installer_path, file_path, &rel).await?;
        }
    }

    crate::download_profile_libraries(ctx, &overlay.libraries).await?;
    crate::persist_overlay(ctx, &overlay).await?;

    Ok((
        LoaderProfile {
            id: overlay.id.clone(),
            overlay,
        },
        None,
    ))
}

/// Copies one installer entry into the libraries tree.
async fn extract_embedded(
    ctx: &LoaderContext<'_>,
    installer_path: &Path,
    entry: &str,
    dest_rel: &str,
) -> Result<(), LoaderInstallError> {
    let Some(bytes) = archive::read_entry(installer_path, entry)? else {
        pt!("Installer has no {entry}, skipping");
        return Ok(());
    };
    let dest = ctx.libraries_dir().join(dest_rel);
    file_utils::write_file_atomic(&dest, &bytes).await?;
    ctx.bus.emit(cl_core::Event::Extract {
        name: dest_rel.to_owned(),
    });
    Ok(())
}
