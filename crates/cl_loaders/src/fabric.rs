//! Fabric, Legacy Fabric and Quilt. As much as people want you to
//! think, the three meta services are almost identical; it's mostly a
//! matter of changing the URL.

use cl_core::json::fabric::LoaderListEntry;
use cl_core::json::VersionDetails;
use cl_core::{file_utils, info, IntoJsonError};

use crate::{BuildSelection, Loader, LoaderContext, LoaderInstallError, LoaderProfile};

fn meta_base(loader: Loader) -> &'static str {
    match loader {
        Loader::Fabric => "https://meta.fabricmc.net/v2",
        Loader::LegacyFabric => "https://meta.legacyfabric.net/v2",
        // Quilt serves the same shapes on a v3 path.
        Loader::Quilt => "https://meta.quiltmc.org/v3",
        Loader::Forge | Loader::Neoforge => unreachable!("not a fabric-family loader"),
    }
}

pub(crate) async fn resolve(
    ctx: &LoaderContext<'_>,
    loader: Loader,
    build: &BuildSelection,
) -> Result<LoaderProfile, LoaderInstallError> {
    let base = meta_base(loader);
    let game = ctx.base_version_id;

    let list_url = format!("{base}/versions/loader/{game}");
    let entries: Vec<LoaderListEntry> =
        file_utils::download_file_to_json(ctx.client, &list_url).await?;
    if entries.is_empty() {
        return Err(LoaderInstallError::UnsupportedGameVersion {
            loader,
            game: game.to_owned(),
        });
    }

    let build = select_build(loader, &entries, build)?;
    info!("Installing {loader} {build} for {game}");

    let profile_url = format!("{base}/versions/loader/{game}/{build}/profile/json");
    let profile_text = file_utils::download_file_to_string(ctx.client, &profile_url).await?;
    let overlay: VersionDetails = serde_json::from_str(&profile_text).json(profile_text)?;

    crate::persist_overlay(ctx, &overlay).await?;
    crate::download_profile_libraries(ctx, &overlay.libraries).await?;

    Ok(LoaderProfile {
        id: overlay.id.clone(),
        overlay,
    })
}

fn select_build(
    loader: Loader,
    entries: &[LoaderListEntry],
    build: &BuildSelection,
) -> Result<String, LoaderInstallError> {
    let found = match build {
        BuildSelection::Latest => entries.first(),
        BuildSelection::Recommended => entries
            .iter()
            .find(|e| e.loader.stable || !e.loader.version.contains("beta"))
            .or_else(|| entries.first()),
        BuildSelection::Literal(wanted) => {
            let found = entries.iter().find(|e| &e.loader.version == wanted);
            if found.is_none() {
                return Err(LoaderInstallError::NoMatchingBuild {
                    loader,
                    requested: wanted.clone(),
                    available: entries.iter().map(|e| e.loader.version.clone()).collect(),
                });
            }
            found
        }
    };
    Ok(found
        .expect("non-empty entry list checked by caller")
        .loader
        .version
        .clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cl_core::json::fabric::LoaderVersion;

    fn entries(versions: &[(&str, bool)]) -> Vec<LoaderListEntry> {
        versions
            .iter()
            .map(|(v, stable)| LoaderListEntry {
                loader: LoaderVersion {
                    version: (*v).to_owned(),
                    stable: *stable,
                },
            })
            .collect()
    }

    #[test]
    fn latest_is_the_first_entry() {
        let list = entries(&[("0.27.0-beta.2", false), ("0.26.4", true)]);
        let build = select_build(Loader::Quilt, &list, &BuildSelection::Latest).unwrap();
        assert_eq!(build, "0.27.0-beta.2");
    }

    #[test]
    fn recommended_skips_betas() {
        let list = entries(&[("0.27.0-beta.2", false), ("0.26.4", false)]);
        let build = select_build(Loader::Quilt, &list, &BuildSelection::Recommended).unwrap();
        assert_eq!(build, "0.26.4");
    }

    #[test]
    fn literal_mismatch_lists_available_builds() {
        let list = entries(&[("0.16.9", true), ("0.16.8", true)]);
        let err = select_build(
            Loader::Fabric,
            &list,
            &BuildSelection::Literal("9.9.9".to_owned()),
        )
        .unwrap_err();
        match err {
            LoaderInstallError::NoMatchingBuild { available, .. } => {
                assert_eq!(available, vec!["0.16.9", "0.16.8"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
