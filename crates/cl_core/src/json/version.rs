use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::{ARCH, ARCH_BITS, OS_NAME, OS_NAMES};
use crate::maven;
use crate::{IntoIoError, IntoJsonError, JsonFileError};

/// The per-version descriptor, as served by Mojang and as produced by
/// loader overlays. Field names mirror the wire format.
#[allow(non_snake_case)]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct VersionDetails {
    pub id: String,
    pub inheritsFrom: Option<String>,
    pub assetIndex: Option<AssetIndexInfo>,
    pub assets: Option<String>,
    pub downloads: Option<Downloads>,
    pub javaVersion: Option<JavaVersionJson>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    pub logging: Option<Logging>,
    pub mainClass: Option<String>,

    /// The flat argument string used by Minecraft 1.12.2 and below;
    /// `arguments` replaces it in 1.13+.
    pub minecraftArguments: Option<String>,
    pub arguments: Option<Arguments>,

    pub releaseTime: Option<String>,
    pub time: Option<String>,
    pub r#type: Option<String>,
}

impl VersionDetails {
    pub async fn load_from_path(path: &Path) -> Result<Self, JsonFileError> {
        let file = tokio::fs::read_to_string(path).await.path(path)?;
        Ok(serde_json::from_str(&file).json(file)?)
    }

    pub async fn save_to_path(&self, path: &Path) -> Result<(), JsonFileError> {
        let text = serde_json::to_string(self).json_to()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.path(parent)?;
        }
        tokio::fs::write(path, text).await.path(path)?;
        Ok(())
    }

    /// Merges `self` (the child) over `parent`, per the `inheritsFrom`
    /// contract: library and argument lists concatenate parent-first,
    /// scalar fields prefer the child's value when present.
    ///
    /// The parent's own `inheritsFrom` is carried so a chain can be
    /// resolved step by step.
    #[must_use]
    pub fn merged_with_parent(mut self, parent: VersionDetails) -> VersionDetails {
        let mut libraries = parent.libraries;
        libraries.extend(self.libraries);
        self.libraries = libraries;

        self.arguments = match (parent.arguments, self.arguments) {
            (Some(p), Some(c)) => Some(Arguments {
                game: p.game.into_iter().chain(c.game).collect(),
                jvm: p.jvm.into_iter().chain(c.jvm).collect(),
            }),
            (p, c) => c.or(p),
        };

        self.minecraftArguments = self.minecraftArguments.or(parent.minecraftArguments);
        self.assetIndex = self.assetIndex.or(parent.assetIndex);
        self.assets = self.assets.or(parent.assets);
        self.downloads = self.downloads.or(parent.downloads);
        self.javaVersion = self.javaVersion.or(parent.javaVersion);
        self.logging = self.logging.or(parent.logging);
        self.mainClass = self.mainClass.or(parent.mainClass);
        self.releaseTime = self.releaseTime.or(parent.releaseTime);
        self.time = self.time.or(parent.time);
        self.r#type = self.r#type.or(parent.r#type);
        self.inheritsFrom = parent.inheritsFrom;
        self
    }

    /// Checks the invariants a fully merged manifest must satisfy.
    /// Returns a description of the first violation.
    #[must_use]
    pub fn merged_invariant_violation(&self) -> Option<String> {
        if self.mainClass.as_deref().unwrap_or("").is_empty() {
            return Some("main class is missing or empty".to_owned());
        }
        if self.downloads.as_ref().map(|d| &d.client).is_none() {
            return Some("client jar download is missing".to_owned());
        }
        let has_args = self
            .arguments
            .as_ref()
            .is_some_and(|a| !a.game.is_empty())
            || self
                .minecraftArguments
                .as_ref()
                .is_some_and(|a| !a.is_empty());
        if !has_args {
            return Some("argument lists are empty".to_owned());
        }
        None
    }

    #[must_use]
    pub fn release_type(&self) -> &str {
        self.r#type.as_deref().unwrap_or("release")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<ArgumentToken>,
    #[serde(default)]
    pub jvm: Vec<ArgumentToken>,
}

/// A single argument-list entry: either a plain string or a
/// rule-guarded value.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ArgumentToken {
    Plain(String),
    Guarded {
        rules: Vec<Rule>,
        value: TokenValue,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum TokenValue {
    One(String),
    Many(Vec<String>),
}

impl TokenValue {
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        match self {
            TokenValue::One(s) => vec![s],
            TokenValue::Many(v) => v,
        }
    }
}

#[allow(non_snake_case)]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssetIndexInfo {
    pub id: String,
    pub sha1: String,
    pub size: u64,
    pub totalSize: Option<u64>,
    pub url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Downloads {
    pub client: Download,
    pub server: Option<Download>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Download {
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

#[allow(non_snake_case)]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JavaVersionJson {
    pub component: String,
    pub majorVersion: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Library {
    pub name: Option<String>,
    pub downloads: Option<LibraryDownloads>,
    pub extract: Option<LibraryExtract>,
    pub natives: Option<BTreeMap<String, String>>,
    pub rules: Option<Vec<Rule>>,
    /// Alternate Maven repository base, used by loader profiles.
    pub url: Option<String>,
}

impl Library {
    #[must_use]
    pub fn is_allowed(&self, ctx: &RuleContext) -> bool {
        match &self.rules {
            Some(rules) => rules_allow(rules, ctx),
            None => true,
        }
    }

    #[must_use]
    pub fn artifact(&self) -> Option<&LibraryArtifact> {
        self.downloads.as_ref()?.artifact.as_ref()
    }

    /// The native classifier for this platform, with `${arch}`
    /// substituted, or `None` if the library carries no natives here.
    #[must_use]
    pub fn native_classifier(&self, ctx: &RuleContext) -> Option<String> {
        let natives = self.natives.as_ref()?;
        let template = ctx
            .os_aliases
            .iter()
            .find_map(|name| natives.get(*name))?;
        Some(template.replace("${arch}", ctx.arch_bits))
    }

    #[must_use]
    pub fn classifier_artifact(&self, classifier: &str) -> Option<&LibraryArtifact> {
        self.downloads
            .as_ref()?
            .classifiers
            .as_ref()?
            .get(classifier)
    }

    /// Relative path under `libraries/`: the declared artifact path if
    /// present, otherwise derived from the Maven coordinate.
    #[must_use]
    pub fn rel_path(&self) -> Option<String> {
        if let Some(path) = self.artifact().and_then(|a| a.path.clone()) {
            return Some(path);
        }
        maven::artifact_rel_path(self.name.as_deref()?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LibraryDownloads {
    pub artifact: Option<LibraryArtifact>,
    pub classifiers: Option<BTreeMap<String, LibraryArtifact>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LibraryArtifact {
    pub path: Option<String>,
    pub sha1: Option<String>,
    pub size: Option<u64>,
    /// May be empty for artifacts produced locally (Forge universal).
    #[serde(default)]
    pub url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LibraryExtract {
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Rule {
    pub action: String,
    pub os: Option<OsRule>,
    pub features: Option<BTreeMap<String, bool>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OsRule {
    pub name: Option<String>,
    pub arch: Option<String>,
    /// Regex matched against the OS version string.
    pub version: Option<String>,
}

/// The platform the rules are evaluated against. Built once per launch
/// from compile-time constants plus the caller's feature flags.
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub os_name: String,
    /// Accepted spellings of the OS family (`osx` and `macos` are the
    /// same family in the wild).
    pub os_aliases: Vec<&'static str>,
    pub os_version: String,
    pub arch: String,
    pub arch_bits: &'static str,
    pub features: HashMap<String, bool>,
}

impl RuleContext {
    #[must_use]
    pub fn current(features: HashMap<String, bool>) -> Self {
        Self {
            os_name: OS_NAME.to_owned(),
            os_aliases: OS_NAMES.to_vec(),
            os_version: String::new(),
            arch: ARCH.to_owned(),
            arch_bits: ARCH_BITS,
            features,
        }
    }

    #[must_use]
    pub fn matches_os_name(&self, name: &str) -> bool {
        name == self.os_name || self.os_aliases.contains(&name)
    }
}

/// Evaluates a rule list in order; the last matching rule's action
/// wins. An empty list allows; a non-empty list denies until a rule
/// matches. A rule whose `features` clause is not satisfied is skipped
/// entirely.
#[must_use]
pub fn rules_allow(rules: &[Rule], ctx: &RuleContext) -> bool {
    if rules.is_empty() {
        return true;
    }
    let mut allowed = false;
    for rule in rules {
        if let Some(features) = &rule.features {
            let satisfied = features
                .iter()
                .all(|(key, want)| ctx.features.get(key).copied().unwrap_or(false) == *want);
            if !satisfied {
                continue;
            }
        }

        let os_matches = match &rule.os {
            None => true,
            Some(os) => {
                let name_ok = os
                    .name
                    .as_deref()
                    .is_none_or(|name| ctx.matches_os_name(name));
                let arch_ok = os.arch.as_deref().is_none_or(|arch| arch == ctx.arch);
                let version_ok = match os.version.as_deref() {
                    None => true,
                    Some(pattern) => Regex::new(pattern)
                        .map(|re| re.is_match(&ctx.os_version))
                        .unwrap_or(false),
                };
                name_ok && arch_ok && version_ok
            }
        };

        if os_matches {
            allowed = rule.action == "allow";
        }
    }
    allowed
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Logging {
    pub client: LoggingClient,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingClient {
    pub argument: String,
    pub file: LoggingFile,
    pub r#type: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingFile {
    pub id: String,
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(os: &str) -> RuleContext {
        RuleContext {
            os_name: os.to_owned(),
            os_aliases: match os {
                "osx" => vec!["osx", "macos"],
                "windows" => vec!["windows"],
                _ => vec!["linux"],
            },
            os_version: String::new(),
            arch: "x86_64".to_owned(),
            arch_bits: "64",
            features: HashMap::new(),
        }
    }

    fn rule(action: &str, os: Option<&str>) -> Rule {
        Rule {
            action: action.to_owned(),
            os: os.map(|name| OsRule {
                name: Some(name.to_owned()),
                arch: None,
                version: None,
            }),
            features: None,
        }
    }

    #[test]
    fn disallow_for_matching_os_wins() {
        let rules = vec![rule("allow", None), rule("disallow", Some("osx"))];
        assert!(!rules_allow(&rules, &ctx("osx")));
        assert!(rules_allow(&rules, &ctx("linux")));
    }

    #[test]
    fn macos_alias_matches_osx_rules() {
        let rules = vec![rule("allow", None), rule("disallow", Some("macos"))];
        assert!(!rules_allow(&rules, &ctx("osx")));
    }

    #[test]
    fn feature_guarded_rule_only_fires_when_the_feature_is_set() {
        let mut features = BTreeMap::new();
        features.insert("has_custom_resolution".to_owned(), true);
        let rules = vec![Rule {
            action: "allow".to_owned(),
            os: None,
            features: Some(features),
        }];
        // Feature not set: the only rule is skipped, nothing allows.
        assert!(!rules_allow(&rules, &ctx("linux")));

        let mut c = ctx("linux");
        c.features.insert("has_custom_resolution".to_owned(), true);
        assert!(rules_allow(&rules, &c));
    }

    #[test]
    fn lone_os_scoped_allow_denies_elsewhere() {
        let rules = vec![rule("allow", Some("osx"))];
        assert!(rules_allow(&rules, &ctx("osx")));
        assert!(!rules_allow(&rules, &ctx("linux")));
    }

    #[test]
    fn natives_arch_substitution() {
        let mut natives = BTreeMap::new();
        natives.insert("windows".to_owned(), "natives-windows-${arch}".to_owned());
        let lib = Library {
            name: Some("org.lwjgl:lwjgl:2.9.4".to_owned()),
            natives: Some(natives),
            ..Library::default()
        };
        let c = ctx("windows");
        assert_eq!(
            lib.native_classifier(&c).as_deref(),
            Some("natives-windows-64")
        );
        assert!(lib.native_classifier(&ctx("linux")).is_none());
    }

    #[test]
    fn merge_prefers_child_scalars_and_orders_lists_parent_first() {
        let parent = VersionDetails {
            id: "1.20.1".to_owned(),
            mainClass: Some("net.minecraft.client.main.Main".to_owned()),
            libraries: vec![Library {
                name: Some("a:parent:1".to_owned()),
                ..Library::default()
            }],
            arguments: Some(Arguments {
                game: vec![ArgumentToken::Plain("--parent".to_owned())],
                jvm: Vec::new(),
            }),
            ..VersionDetails::default()
        };
        let child = VersionDetails {
            id: "forge-1.20.1".to_owned(),
            mainClass: Some("cpw.mods.bootstraplauncher.BootstrapLauncher".to_owned()),
            inheritsFrom: Some("1.20.1".to_owned()),
            libraries: vec![Library {
                name: Some("b:child:1".to_owned()),
                ..Library::default()
            }],
            arguments: Some(Arguments {
                game: vec![ArgumentToken::Plain("--child".to_owned())],
                jvm: Vec::new(),
            }),
            ..VersionDetails::default()
        };

        let merged = child.merged_with_parent(parent);
        assert_eq!(merged.id, "forge-1.20.1");
        assert_eq!(
            merged.mainClass.as_deref(),
            Some("cpw.mods.bootstraplauncher.BootstrapLauncher")
        );
        let names: Vec<_> = merged
            .libraries
            .iter()
            .map(|l| l.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["a:parent:1", "b:child:1"]);
        let game = merged.arguments.unwrap().game;
        assert!(
            matches!(&game[0], ArgumentToken::Plain(s) if s == "--parent")
                && matches!(&game[1], ArgumentToken::Plain(s) if s == "--child")
        );
        // The chain pointer is cleared once the root is reached.
        assert!(merged.inheritsFrom.is_none());
    }

    #[test]
    fn invariants_catch_missing_pieces() {
        let bare = VersionDetails::default();
        assert!(bare.merged_invariant_violation().is_some());
    }

    #[test]
    fn guarded_tokens_deserialize() {
        let json = r#"[
            "--username",
            {"rules": [{"action": "allow", "features": {"is_demo_user": true}}], "value": "--demo"},
            {"rules": [{"action": "allow", "os": {"name": "windows"}}], "value": ["-a", "-b"]}
        ]"#;
        let tokens: Vec<ArgumentToken> = serde_json::from_str(json).unwrap();
        assert_eq!(tokens.len(), 3);
        assert!(matches!(&tokens[0], ArgumentToken::Plain(s) if s == "--username"));
        match &tokens[2] {
            ArgumentToken::Guarded { value, .. } => {
                assert_eq!(value.clone().into_vec(), vec!["-a", "-b"]);
            }
            other => panic!("unexpected token: {other:?}"),
        }
    }
}
