//! Command-line synthesis: JVM flags, classpath, main class and game
//! arguments, composed from manifest templates with placeholder
//! substitution. Credential-bearing substitutions never reach a log
//! surface unredacted.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use cl_core::json::assets::is_legacy_index;
use cl_core::json::version::{rules_allow, ArgumentToken, RuleContext, VersionDetails};
use cl_core::json::Credential;
use cl_core::{maven, EventBus, CLASSPATH_SEPARATOR};

/// Fixed-width stand-in for credential values on log surfaces.
const REDACTION_MASK: &str = "????????";

pub struct ArgumentOptions {
    pub memory_min_mb: usize,
    pub memory_max_mb: usize,
    pub resolution: Option<(u32, u32)>,
    pub extra_jvm: Vec<String>,
    pub extra_game: Vec<String>,
    pub launcher_name: String,
    pub launcher_version: String,
}

pub struct ArgumentInputs<'a> {
    /// Effective manifest: base merged with the loader overlay, if any.
    pub version: &'a VersionDetails,
    /// Effective version id (the overlay's when a loader is active).
    pub version_id: &'a str,
    /// The base game version, which names the natives directory and
    /// decides platform quirks.
    pub base_version_id: &'a str,
    pub root: &'a Path,
    pub instance_dir: &'a Path,
    pub credential: &'a Credential,
    /// `(coordinate, path)` entries in precedence order; deduplicated
    /// here by coordinate, first occurrence winning.
    pub classpath: &'a [(String, PathBuf)],
    pub client_jar: &'a Path,
    pub java_bin: &'a Path,
    pub rule_ctx: &'a RuleContext,
    pub logging_config: Option<&'a Path>,
    pub options: &'a ArgumentOptions,
    pub bus: &'a EventBus,
}

#[derive(Debug, Clone)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Builds the full child command line. Pure with respect to its
/// inputs; the only side effect is a debug log for placeholders it
/// does not recognize.
#[must_use]
pub fn build(inputs: &ArgumentInputs<'_>) -> LaunchCommand {
    let classpath = build_classpath(inputs.classpath, inputs.client_jar);
    let vars = substitution_table(inputs, &classpath);

    let mut args = jvm_arguments(inputs, &classpath, &vars);
    args.push(
        inputs
            .version
            .mainClass
            .clone()
            .unwrap_or_else(|| "net.minecraft.client.main.Main".to_owned()),
    );
    args.extend(game_arguments(inputs, &vars));

    report_unknown_placeholders(inputs.bus, &args);

    // Pre-1.17 clients need an x86_64 JVM; on Apple silicon the whole
    // command runs under the `arch` shim so Rosetta picks it up.
    if needs_intel_emulation(&inputs.rule_ctx.os_name, inputs.base_version_id) {
        let mut shimmed = vec![
            "-x86_64".to_owned(),
            inputs.java_bin.to_string_lossy().to_string(),
        ];
        shimmed.extend(args);
        return LaunchCommand {
            program: PathBuf::from("arch"),
            args: shimmed,
        };
    }

    LaunchCommand {
        program: inputs.java_bin.to_owned(),
        args,
    }
}

/// Joined classpath with each Maven coordinate at most once; the first
/// occurrence (loader overlay before base) wins. The client jar closes
/// the list.
fn build_classpath(entries: &[(String, PathBuf)], client_jar: &Path) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut out = String::new();
    for (coordinate, path) in entries {
        if !seen.insert(maven::coordinate_key(coordinate)) {
            continue;
        }
        out.push_str(&path.to_string_lossy());
        out.push(CLASSPATH_SEPARATOR);
    }
    out.push_str(&client_jar.to_string_lossy());
    out
}

fn substitution_table(inputs: &ArgumentInputs<'_>, classpath: &str) -> Vec<(String, String)> {
    let credential = inputs.credential;
    let assets_root = inputs.root.join("assets");
    let asset_index_id = inputs
        .version
        .assetIndex
        .as_ref()
        .map(|a| a.id.clone())
        .or_else(|| inputs.version.assets.clone())
        .unwrap_or_default();
    // Legacy engines read assets by virtual path out of the shadow tree.
    let game_assets = if is_legacy_index(&asset_index_id) {
        assets_root.join("resources")
    } else {
        assets_root.clone()
    };
    let natives_dir = inputs.root.join("natives").join(inputs.base_version_id);

    let mut vars: Vec<(String, String)> = vec![
        ("auth_player_name".into(), credential.name.clone()),
        ("auth_uuid".into(), credential.uuid.clone()),
        ("uuid".into(), credential.uuid.clone()),
        ("auth_access_token".into(), credential.access_token.clone()),
        ("auth_session".into(), credential.access_token.clone()),
        ("accessToken".into(), credential.access_token.clone()),
        ("clientid".into(), credential.client_token.clone()),
        ("auth_xuid".into(), credential.xuid().to_owned()),
        ("user_type".into(), credential.user_type().to_owned()),
        ("user_properties".into(), credential.user_properties_json()),
        ("version_name".into(), inputs.version_id.to_owned()),
        (
            "version_type".into(),
            inputs.version.release_type().to_owned(),
        ),
        (
            "game_directory".into(),
            inputs.instance_dir.to_string_lossy().to_string(),
        ),
        (
            "assets_root".into(),
            assets_root.to_string_lossy().to_string(),
        ),
        (
            "game_assets".into(),
            game_assets.to_string_lossy().to_string(),
        ),
        ("assets_index_name".into(), asset_index_id),
        (
            "natives_directory".into(),
            natives_dir.to_string_lossy().to_string(),
        ),
        (
            "launcher_name".into(),
            inputs.options.launcher_name.clone(),
        ),
        (
            "launcher_version".into(),
            inputs.options.launcher_version.clone(),
        ),
        ("classpath".into(), classpath.to_owned()),
        (
            "classpath_separator".into(),
            CLASSPATH_SEPARATOR.to_string(),
        ),
        (
            "library_directory".into(),
            inputs.root.join("libraries").to_string_lossy().to_string(),
        ),
    ];

    if let Some((width, height)) = inputs.options.resolution {
        vars.push(("resolution_width".into(), width.to_string()));
        vars.push(("resolution_height".into(), height.to_string()));
    }

    vars
}

fn jvm_arguments(
    inputs: &ArgumentInputs<'_>,
    classpath: &str,
    vars: &[(String, String)],
) -> Vec<String> {
    let natives_dir = inputs
        .root
        .join("natives")
        .join(inputs.base_version_id)
        .to_string_lossy()
        .to_string();

    let mut args = Vec::new();
    if let Some(arguments) = &inputs.version.arguments {
        args.extend(process_tokens(&arguments.jvm, inputs.rule_ctx, vars));
    }

    // Legacy manifests carry no JVM tokens; modern ones already name
    // the library path and classpath. Fill in whichever are missing.
    if !args.iter().any(|a| a.starts_with("-Djava.library.path=")) {
        args.push(format!("-Djava.library.path={natives_dir}"));
    }
    args.push(format!("-Djna.tmpdir={natives_dir}"));
    args.push(format!(
        "-Dorg.lwjgl.system.SharedLibraryExtractPath={natives_dir}"
    ));
    args.push(format!("-Dio.netty.native.workdir={natives_dir}"));

    args.push(format!("-Xms{}M", inputs.options.memory_min_mb));
    args.push(format!("-Xmx{}M", inputs.options.memory_max_mb));

    args.push(format!(
        "-Dminecraft.launcher.brand={}",
        inputs.options.launcher_name
    ));
    args.push(format!(
        "-Dminecraft.launcher.version={}",
        inputs.options.launcher_version
    ));

    if inputs.rule_ctx.os_name == "osx" {
        args.push("-XstartOnFirstThread".to_owned());
    }

    if let (Some(config_path), Some(logging)) =
        (inputs.logging_config, &inputs.version.logging)
    {
        args.push(
            logging
                .client
                .argument
                .replace("${path}", &config_path.to_string_lossy()),
        );
    }

    if !args.iter().any(|a| a == "-cp" || a == "-classpath") {
        args.push("-cp".to_owned());
        args.push(classpath.to_owned());
    }

    args.extend(inputs.options.extra_jvm.iter().cloned());
    args.retain(|a| !a.trim().is_empty());
    args
}

fn game_arguments(inputs: &ArgumentInputs<'_>, vars: &[(String, String)]) -> Vec<String> {
    let mut args = if let Some(legacy) = &inputs.version.minecraftArguments {
        legacy
            .split(' ')
            .filter(|s| !s.is_empty())
            .map(|s| substitute(s, vars))
            .collect()
    } else if let Some(arguments) = &inputs.version.arguments {
        process_tokens(&arguments.game, inputs.rule_ctx, vars)
    } else {
        Vec::new()
    };

    if let Some((width, height)) = inputs.options.resolution {
        if !args.iter().any(|a| a == "--width") {
            args.push("--width".to_owned());
            args.push(width.to_string());
            args.push("--height".to_owned());
            args.push(height.to_string());
        }
    }

    args.extend(inputs.options.extra_game.iter().cloned());
    args
}

fn process_tokens(
    tokens: &[ArgumentToken],
    ctx: &RuleContext,
    vars: &[(String, String)],
) -> Vec<String> {
    let mut out = Vec::new();
    for token in tokens {
        match token {
            ArgumentToken::Plain(s) => out.push(substitute(s, vars)),
            ArgumentToken::Guarded { rules, value } => {
                if rules_allow(rules, ctx) {
                    out.extend(value.clone().into_vec().iter().map(|s| substitute(s, vars)));
                }
            }
        }
    }
    out
}

/// Replaces every known `${name}`; unknown placeholders are preserved
/// verbatim.
fn substitute(arg: &str, vars: &[(String, String)]) -> String {
    let mut out = arg.to_owned();
    for (name, value) in vars {
        out = out.replace(&format!("${{{name}}}"), value);
    }
    out
}

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{[A-Za-z0-9_.]+\}").unwrap());

fn report_unknown_placeholders(bus: &EventBus, args: &[String]) {
    for arg in args {
        for found in PLACEHOLDER_REGEX.find_iter(arg) {
            bus.log_debug(format!("unresolved placeholder {}", found.as_str()));
        }
    }
}

/// Clients up to 1.16 bundle x86-only LWJGL natives; on Darwin they are
/// run through Rosetta via the `arch -x86_64` shim.
#[must_use]
pub fn needs_intel_emulation(os_name: &str, game_version: &str) -> bool {
    if os_name != "osx" {
        return false;
    }
    if let Some(rest) = game_version.strip_prefix("1.") {
        let minor: Option<usize> = rest
            .split(['.', '-'])
            .next()
            .and_then(|s| s.parse().ok());
        return minor.is_some_and(|m| m <= 16);
    }
    // Alpha/beta/classic/indev identifiers all predate ARM builds.
    game_version.starts_with(['a', 'b', 'c']) || game_version.starts_with("in")
}

/// The redacted form of a command line for log surfaces: credential
/// values become a fixed-width mask and the root path is stripped.
#[must_use]
pub fn redact_args(args: &[String], credential: &Credential, root: &Path) -> Vec<String> {
    let root_str = root.to_string_lossy();
    args.iter()
        .map(|arg| {
            let mut out = arg.clone();
            for value in credential.sensitive_values() {
                out = out.replace(value, REDACTION_MASK);
            }
            if !root_str.is_empty() {
                out = out.replace(root_str.as_ref(), "");
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cl_core::json::version::{Arguments, AssetIndexInfo, Download, Downloads};
    use std::collections::HashMap;

    fn test_ctx(os: &str) -> RuleContext {
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

    fn credential() -> Credential {
        serde_json::from_str(
            r#"{"name": "Steve", "uuid": "11111111-2222", "access_token": "secret-token",
                "client_token": "client-secret"}"#,
        )
        .unwrap()
    }

    fn version() -> VersionDetails {
        VersionDetails {
            id: "1.21.4".to_owned(),
            mainClass: Some("net.minecraft.client.main.Main".to_owned()),
            assetIndex: Some(AssetIndexInfo {
                id: "19".to_owned(),
                sha1: "aa".to_owned(),
                size: 1,
                totalSize: None,
                url: "https://x/19.json".to_owned(),
            }),
            downloads: Some(Downloads {
                client: Download {
                    sha1: "bb".to_owned(),
                    size: 1,
                    url: "https://x/client.jar".to_owned(),
                },
                server: None,
            }),
            arguments: Some(Arguments {
                game: vec![
                    ArgumentToken::Plain("--username".to_owned()),
                    ArgumentToken::Plain("${auth_player_name}".to_owned()),
                    ArgumentToken::Plain("--accessToken".to_owned()),
                    ArgumentToken::Plain("${auth_access_token}".to_owned()),
                ],
                jvm: vec![ArgumentToken::Plain(
                    "-Dminecraft.launcher.brand=${launcher_name}".to_owned(),
                )],
            }),
            ..VersionDetails::default()
        }
    }

    fn options() -> ArgumentOptions {
        ArgumentOptions {
            memory_min_mb: 512,
            memory_max_mb: 2048,
            resolution: None,
            extra_jvm: Vec::new(),
            extra_game: Vec::new(),
            launcher_name: "cl-launcher".to_owned(),
            launcher_version: "0.1.0".to_owned(),
        }
    }

    fn build_for(os: &str, base_id: &str) -> LaunchCommand {
        let version = version();
        let ctx = test_ctx(os);
        let opts = options();
        let bus = EventBus::new();
        let cred = credential();
        let classpath = vec![
            (
                "org.ow2.asm:asm:9.6".to_owned(),
                PathBuf::from("/data/libraries/asm-9.6.jar"),
            ),
            (
                "org.ow2.asm:asm:9.3".to_owned(),
                PathBuf::from("/data/libraries/asm-9.3.jar"),
            ),
        ];
        build(&ArgumentInputs {
            version: &version,
            version_id: base_id,
            base_version_id: base_id,
            root: Path::new("/data"),
            instance_dir: Path::new("/data/instances/main"),
            credential: &cred,
            classpath: &classpath,
            client_jar: Path::new("/data/versions/x/x.jar"),
            java_bin: Path::new("/usr/bin/java"),
            rule_ctx: &ctx,
            logging_config: None,
            options: &opts,
            bus: &bus,
        })
    }

    #[test]
    fn placeholders_resolve_and_memory_flags_present() {
        let cmd = build_for("linux", "1.21.4");
        assert!(cmd.args.iter().any(|a| a == "Steve"));
        assert!(cmd.args.iter().any(|a| a == "secret-token"));
        assert!(cmd.args.iter().any(|a| a == "-Xms512M"));
        assert!(cmd.args.iter().any(|a| a == "-Xmx2048M"));
        assert_eq!(cmd.program, PathBuf::from("/usr/bin/java"));
    }

    #[test]
    fn classpath_dedups_by_coordinate_keeping_first() {
        let cmd = build_for("linux", "1.21.4");
        let cp_index = cmd.args.iter().position(|a| a == "-cp").unwrap();
        let cp = &cmd.args[cp_index + 1];
        assert!(cp.contains("asm-9.6.jar"));
        assert!(!cp.contains("asm-9.3.jar"));
        assert!(cp.ends_with("/data/versions/x/x.jar"));
    }

    #[test]
    fn intel_emulation_only_on_old_darwin() {
        assert!(needs_intel_emulation("osx", "1.8.9"));
        assert!(needs_intel_emulation("osx", "1.16.5"));
        assert!(needs_intel_emulation("osx", "b1.7.3"));
        assert!(!needs_intel_emulation("osx", "1.17"));
        assert!(!needs_intel_emulation("osx", "1.21.4"));
        assert!(!needs_intel_emulation("linux", "1.8.9"));

        let cmd = build_for("osx", "1.8.9");
        assert_eq!(cmd.program, PathBuf::from("arch"));
        assert_eq!(cmd.args[0], "-x86_64");
        assert!(cmd.args.iter().any(|a| a == "-XstartOnFirstThread"));

        let cmd = build_for("osx", "1.21.4");
        assert_ne!(cmd.program, PathBuf::from("arch"));
        assert!(!cmd.args.iter().any(|a| a == "-x86_64"));
    }

    #[test]
    fn redaction_masks_every_credential_field() {
        let cmd = build_for("linux", "1.21.4");
        let redacted = redact_args(&cmd.args, &credential(), Path::new("/data"));
        assert!(redacted.iter().all(|a| !a.contains("secret-token")));
        assert!(redacted.iter().all(|a| !a.contains("client-secret")));
        assert!(redacted.iter().all(|a| !a.contains("11111111-2222")));
        assert!(redacted.iter().any(|a| a == "????????"));
        // Root path stripped.
        assert!(redacted.iter().all(|a| !a.contains("/data/libraries")));
    }

    #[test]
    fn unknown_placeholders_survive() {
        let mut v = version();
        v.arguments.as_mut().unwrap().game.push(ArgumentToken::Plain(
            "${quickPlayPath}".to_owned(),
        ));
        let ctx = test_ctx("linux");
        let opts = options();
        let bus = EventBus::new();
        let cred = credential();
        let cmd = build(&ArgumentInputs {
            version: &v,
            version_id: "1.21.4",
            base_version_id: "1.21.4",
            root: Path::new("/data"),
            instance_dir: Path::new("/data/instances/main"),
            credential: &cred,
            classpath: &[],
            client_jar: Path::new("/data/versions/x/x.jar"),
            java_bin: Path::new("/usr/bin/java"),
            rule_ctx: &ctx,
            logging_config: None,
            options: &opts,
            bus: &bus,
        });
        assert!(cmd.args.iter().any(|a| a == "${quickPlayPath}"));
    }

    #[test]
    fn legacy_arguments_split_and_substitute() {
        let mut v = version();
        v.arguments = None;
        v.minecraftArguments =
            Some("--username ${auth_player_name} --session ${auth_session}".to_owned());
        let ctx = test_ctx("linux");
        let opts = options();
        let bus = EventBus::new();
        let cred = credential();
        let cmd = build(&ArgumentInputs {
            version: &v,
            version_id: "1.8.9",
            base_version_id: "1.8.9",
            root: Path::new("/data"),
            instance_dir: Path::new("/data/instances/main"),
            credential: &cred,
            classpath: &[],
            client_jar: Path::new("/data/versions/1.8.9/1.8.9.jar"),
            java_bin: Path::new("/usr/bin/java"),
            rule_ctx: &ctx,
            logging_config: None,
            options: &opts,
            bus: &bus,
        });
        let main_index = cmd
            .args
            .iter()
            .position(|a| a == "net.minecraft.client.main.Main")
            .unwrap();
        assert!(cmd.args[main_index + 1..].iter().any(|a| a == "Steve"));
    }
}
