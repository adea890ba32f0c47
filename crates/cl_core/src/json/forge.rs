use std::collections::HashMap;

use serde::Deserialize;

use super::version::{Library, VersionDetails};

/// `promotions_slim.json`: `"<game>-latest"` / `"<game>-recommended"`
/// keys mapping to a Forge build number.
#[derive(Deserialize, Debug, Clone)]
pub struct Promotions {
    pub promos: HashMap<String, String>,
}

/// Per-build `meta.json`: classifier -> extension -> MD5.
#[derive(Deserialize, Debug, Clone)]
pub struct BuildMeta {
    pub classifiers: HashMap<String, HashMap<String, String>>,
}

impl BuildMeta {
    /// MD5 of `<classifier>.jar`, when the build ships that classifier.
    #[must_use]
    pub fn jar_md5(&self, classifier: &str) -> Option<&str> {
        self.classifiers.get(classifier)?.get("jar").map(String::as_str)
    }
}

/// The modern (1.13+) `install_profile.json` carried inside the
/// installer jar. Older installers nest `install` + `versionInfo`
/// instead; see [`LegacyInstallProfile`].
#[derive(Deserialize, Debug, Clone)]
pub struct InstallProfile {
    pub minecraft: Option<String>,
    /// Name of the sibling version-overlay JSON inside the installer,
    /// e.g. `/version.json`.
    pub json: Option<String>,
    /// Coordinate of the universal jar the installer embeds. Null on
    /// recent NeoForge builds.
    pub path: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, DataEntry>,
    #[serde(default)]
    pub processors: Vec<Processor>,
    #[serde(default)]
    pub libraries: Vec<Library>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DataEntry {
    pub client: String,
    pub server: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Processor {
    #[serde(default)]
    pub sides: Vec<String>,
    pub jar: String,
    #[serde(default)]
    pub classpath: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Processor {
    #[must_use]
    pub fn runs_on_client(&self) -> bool {
        self.sides.is_empty() || self.sides.iter().any(|s| s == "client")
    }
}

/// Pre-1.13 installers: the profile and the version overlay live in one
/// document.
#[allow(non_snake_case)]
#[derive(Deserialize, Debug, Clone)]
pub struct LegacyInstallProfile {
    pub install: LegacyInstall,
    pub versionInfo: VersionDetails,
}

#[allow(non_snake_case)]
#[derive(Deserialize, Debug, Clone)]
pub struct LegacyInstall {
    /// Direct file reference inside the installer, e.g.
    /// `forge-1.12.2-14.23.5.2859-universal.jar`.
    pub filePath: Option<String>,
    /// Maven coordinate of the universal jar.
    pub path: Option<String>,
}

/// NeoForge's maven API listing (both the legacy `forge` project and
/// the current `neoforge` one).
#[derive(Deserialize, Debug, Clone)]
pub struct NeoforgeVersions {
    pub versions: Vec<String>,
}
