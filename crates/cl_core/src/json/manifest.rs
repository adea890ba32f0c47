use serde::Deserialize;

use crate::{file_utils, JsonDownloadError};

pub const VERSION_MANIFEST_URL: &str =
    "https://launchermeta.mojang.com/mc/game/version_manifest_v2.json";

/// The official Minecraft version index: every known version and the
/// URL of its per-version JSON.
#[derive(Deserialize, Clone, Debug)]
pub struct Manifest {
    pub latest: Latest,
    pub versions: Vec<ManifestVersion>,
}

impl Manifest {
    pub async fn download(client: &reqwest::Client) -> Result<Manifest, JsonDownloadError> {
        file_utils::download_file_to_json(client, VERSION_MANIFEST_URL).await
    }

    /// Looks up a version by its exact name.
    #[must_use]
    pub fn find_name(&self, name: &str) -> Option<&ManifestVersion> {
        self.versions.iter().find(|n| n.id == name)
    }

    /// Resolves a requested identifier, honoring the `latest_release`
    /// and `latest_snapshot` aliases via the index's `latest` field.
    #[must_use]
    pub fn resolve(&self, requested: &str) -> Option<&ManifestVersion> {
        match requested {
            "latest_release" => self.find_name(&self.latest.release),
            "latest_snapshot" => self.find_name(&self.latest.snapshot),
            name => self.find_name(name),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct Latest {
    pub release: String,
    pub snapshot: String,
}

#[allow(non_snake_case)]
#[derive(Deserialize, Clone, Debug)]
pub struct ManifestVersion {
    pub id: String,
    pub r#type: String,
    pub url: String,
    pub time: String,
    pub releaseTime: String,
    pub sha1: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        serde_json::from_str(
            r#"{
                "latest": {"release": "1.21.4", "snapshot": "25w02a"},
                "versions": [
                    {"id": "25w02a", "type": "snapshot", "url": "https://x/25w02a.json",
                     "time": "t", "releaseTime": "t", "sha1": "aa"},
                    {"id": "1.21.4", "type": "release", "url": "https://x/1.21.4.json",
                     "time": "t", "releaseTime": "t", "sha1": "bb"},
                    {"id": "1.8.9", "type": "release", "url": "https://x/1.8.9.json",
                     "time": "t", "releaseTime": "t"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn aliases_consult_latest() {
        let m = sample();
        assert_eq!(m.resolve("latest_release").unwrap().id, "1.21.4");
        assert_eq!(m.resolve("latest_snapshot").unwrap().id, "25w02a");
    }

    #[test]
    fn exact_match_only() {
        let m = sample();
        assert_eq!(m.resolve("1.8.9").unwrap().id, "1.8.9");
        assert!(m.resolve("1.8").is_none());
    }
}
