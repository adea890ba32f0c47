//! Executes the install profile's processors: the child JVMs that
//! deobfuscate, patch and re-pack the client before a Forge-family
//! launch can work.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use cl_core::event::Event;
use cl_core::json::forge::{InstallProfile, Processor};
use cl_core::{archive, err, info, maven, no_window, pt, ErrorKind, EventBus, CLASSPATH_SEPARATOR};

/// Everything needed to run an installer's processors, produced by the
/// Forge/NeoForge backends and executed after native extraction.
#[derive(Debug)]
pub struct PatchJob {
    pub profile: InstallProfile,
    pub installer_path: PathBuf,
    pub universal_coordinate: Option<String>,
    /// `versions/<overlay id>/` of the loader being installed.
    pub loader_dir: PathBuf,
    pub base_jar: PathBuf,
    pub base_json_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("couldn't read processor jar:\n{0}")]
    Archive(#[from] cl_core::archive::ArchiveError),
    #[error("processor jar {0} has no Main-Class in its manifest")]
    MissingMainClass(String),
    #[error("processor coordinate {0} is not a valid Maven coordinate")]
    BadCoordinate(String),
    #[error("couldn't spawn processor {jar}: {error}")]
    Spawn { jar: String, error: std::io::Error },
    #[error("processor {jar} exceeded its time limit")]
    Timeout { jar: String },
    #[error("processor {jar} exited with {code:?} and no later processor succeeded")]
    ProcessorFailed { jar: String, code: Option<i32> },
}

impl PatchError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchError::Timeout { .. } => ErrorKind::Timeout,
            _ => ErrorKind::PatchFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchOutcome {
    pub ran: usize,
    pub skipped: bool,
}

/// Runs every client-side processor in profile order.
///
/// A non-zero exit is tolerated only when a later processor succeeds;
/// a failure with nothing after it fails the whole patch. When every
/// `data` artifact the profile references already exists on disk, the
/// patch is skipped entirely.
pub async fn run(
    root: &Path,
    java_bin: &Path,
    bus: &EventBus,
    job: &PatchJob,
    processor_timeout: Option<Duration>,
) -> Result<PatchOutcome, PatchError> {
    let libraries_dir = root.join("libraries");
    let vars = build_data_vars(root, &libraries_dir, job);

    if outputs_already_present(&job.profile, &libraries_dir) {
        info!("Patch outputs already present, skipping processors");
        return Ok(PatchOutcome {
            ran: 0,
            skipped: true,
        });
    }

    let processors: Vec<&Processor> = job
        .profile
        .processors
        .iter()
        .filter(|p| p.runs_on_client())
        .collect();
    let total = processors.len();

    let mut last_failure: Option<PatchError> = None;
    for (i, processor) in processors.into_iter().enumerate() {
        info!("Processor ({}/{total}): {}", i + 1, processor.jar);
        match run_single(java_bin, &libraries_dir, &vars, processor, bus, processor_timeout).await {
            Ok(()) => last_failure = None,
            Err(e @ PatchError::Timeout { .. }) => return Err(e),
            Err(e) => {
                err!("{e}");
                last_failure = Some(e);
            }
        }
    }

    match last_failure {
        Some(error) => Err(error),
        None => Ok(PatchOutcome {
            ran: total,
            skipped: false,
        }),
    }
}

/// The substitution table for `{TOKEN}` arguments: reserved tokens
/// first, then the profile's client-side `data` entries, then
/// `BINPATCH` pointing at the extracted client patch data.
fn build_data_vars(
    root: &Path,
    libraries_dir: &Path,
    job: &PatchJob,
) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    let loader_parent = job
        .loader_dir
        .parent()
        .unwrap_or(&job.loader_dir)
        .to_string_lossy()
        .to_string();

    vars.insert("SIDE".to_owned(), "client".to_owned());
    vars.insert("ROOT".to_owned(), loader_parent);
    vars.insert(
        "MINECRAFT_JAR".to_owned(),
        job.base_jar.to_string_lossy().to_string(),
    );
    vars.insert(
        "MINECRAFT_VERSION".to_owned(),
        job.base_json_path.to_string_lossy().to_string(),
    );
    vars.insert(
        "INSTALLER".to_owned(),
        root.join("libraries").to_string_lossy().to_string(),
    );
    vars.insert(
        "LIBRARY_DIR".to_owned(),
        root.join("libraries").to_string_lossy().to_string(),
    );

    for (key, entry) in &job.profile.data {
        let value = &entry.client;
        let resolved = if let Some(coordinate) = as_coordinate_ref(value) {
            match maven::artifact_rel_path(coordinate) {
                Some(rel) => libraries_dir.join(rel).to_string_lossy().to_string(),
                None => value.clone(),
            }
        } else {
            value.trim_matches('\'').to_owned()
        };
        vars.insert(key.clone(), resolved);
    }

    if let Some(coordinate) = job.universal_coordinate.as_deref() {
        if let Some(rel) = crate::clientdata_rel_path(coordinate) {
            vars.insert(
                "BINPATCH".to_owned(),
                libraries_dir.join(rel).to_string_lossy().to_string(),
            );
        }
    }

    vars
}

/// When every `[coordinate]` referenced by the data table is already on
/// disk, the processors have run before and are skipped.
fn outputs_already_present(profile: &InstallProfile, libraries_dir: &Path) -> bool {
    let mut any = false;
    for entry in profile.data.values() {
        let Some(coordinate) = as_coordinate_ref(&entry.client) else {
            continue;
        };
        let Some(rel) = maven::artifact_rel_path(coordinate) else {
            continue;
        };
        any = true;
        if !libraries_dir.join(rel).is_file() {
            return false;
        }
    }
    any
}

fn as_coordinate_ref(value: &str) -> Option<&str> {
    value.strip_prefix('[')?.strip_suffix(']')
}

async fn run_single(
    java_bin: &Path,
    libraries_dir: &Path,
    vars: &HashMap<String, String>,
    processor: &Processor,
    bus: &EventBus,
    timeout: Option<Duration>,
) -> Result<(), PatchError> {
    let jar_rel = maven::artifact_rel_path(&processor.jar)
        .ok_or_else(|| PatchError::BadCoordinate(processor.jar.clone()))?;
    let jar_path = libraries_dir.join(jar_rel);

    let mut classpath = String::new();
    classpath.push_str(&jar_path.to_string_lossy());
    for entry in &processor.classpath {
        if let Some(rel) = maven::artifact_rel_path(entry) {
            classpath.push(CLASSPATH_SEPARATOR);
            classpath.push_str(&libraries_dir.join(rel).to_string_lossy());
        }
    }

    let main_class = read_main_class(&jar_path)?
        .ok_or_else(|| PatchError::MissingMainClass(processor.jar.clone()))?;

    let args: Vec<String> = processor
        .args
        .iter()
        .map(|arg| substitute(arg, vars, libraries_dir))
        .collect();

    pt!("{main_class} {args:?}");
    let mut command = Command::new(java_bin);
    no_window!(command);
    command
        .arg("-classpath")
        .arg(&classpath)
        .arg(&main_class)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output_fut = command.output();
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, output_fut)
            .await
            .map_err(|_| PatchError::Timeout {
                jar: processor.jar.clone(),
            })?,
        None => output_fut.await,
    }
    .map_err(|error| PatchError::Spawn {
        jar: processor.jar.clone(),
        error,
    })?;

    for chunk in [&output.stdout, &output.stderr] {
        if !chunk.is_empty() {
            bus.emit(Event::Patch {
                chunk: String::from_utf8_lossy(chunk).to_string(),
            });
        }
    }

    if output.status.success() {
        Ok(())
    } else {
        Err(PatchError::ProcessorFailed {
            jar: processor.jar.clone(),
            code: output.status.code(),
        })
    }
}

/// `{TOKEN}` substitution plus `[coordinate]` resolution to a library
/// path.
fn substitute(arg: &str, vars: &HashMap<String, String>, libraries_dir: &Path) -> String {
    let mut result = arg.to_owned();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }

    while let Some(start) = result.find('[') {
        let Some(len) = result[start..].find(']') else {
            break;
        };
        let coordinate = &result[start + 1..start + len];
        let Some(rel) = maven::artifact_rel_path(coordinate) else {
            break;
        };
        let path = libraries_dir.join(rel).to_string_lossy().to_string();
        result = format!("{}{}{}", &result[..start], path, &result[start + len + 1..]);
    }

    result
}

fn read_main_class(jar_path: &Path) -> Result<Option<String>, PatchError> {
    let Some(manifest) = archive::read_entry(jar_path, "META-INF/MANIFEST.MF")? else {
        return Ok(None);
    };
    let manifest = String::from_utf8_lossy(&manifest);
    for line in manifest.lines() {
        if let Some(value) = line.strip_prefix("Main-Class:") {
            return Ok(Some(value.trim().to_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cl_core::json::forge::DataEntry;

    fn job_with_data(data: &[(&str, &str)]) -> PatchJob {
        PatchJob {
            profile: InstallProfile {
                minecraft: Some("1.20.1".to_owned()),
                json: Some("/version.json".to_owned()),
                path: Some("net.minecraftforge:forge:1.20.1-47.2.0".to_owned()),
                data: data
                    .iter()
                    .map(|(k, v)| {
                        ((*k).to_owned(), DataEntry {
                            client: (*v).to_owned(),
                            server: None,
                        })
                    })
                    .collect(),
                processors: Vec::new(),
                libraries: Vec::new(),
            },
            installer_path: PathBuf::from("/tmp/installer.jar"),
            universal_coordinate: Some("net.minecraftforge:forge:1.20.1-47.2.0".to_owned()),
            loader_dir: PathBuf::from("/data/versions/forge-47.2.0"),
            base_jar: PathBuf::from("/data/versions/1.20.1/1.20.1.jar"),
            base_json_path: PathBuf::from("/data/versions/1.20.1/1.20.1.json"),
        }
    }

    #[test]
    fn reserved_tokens_and_data_entries_resolve() {
        let root = Path::new("/data");
        let libraries = root.join("libraries");
        let job = job_with_data(&[
            ("MAPPINGS", "[de.oceanlabs.mcp:mcp_config:1.20.1@zip]"),
            ("MOJMAPS", "'official'"),
        ]);
        let vars = build_data_vars(root, &libraries, &job);

        assert_eq!(vars["SIDE"], "client");
        assert_eq!(vars["ROOT"], "/data/versions");
        assert_eq!(vars["MINECRAFT_JAR"], "/data/versions/1.20.1/1.20.1.jar");
        assert_eq!(vars["LIBRARY_DIR"], "/data/libraries");
        assert_eq!(
            vars["MAPPINGS"],
            "/data/libraries/de/oceanlabs/mcp/mcp_config/1.20.1/mcp_config-1.20.1.zip"
        );
        assert_eq!(vars["MOJMAPS"], "official");
        assert!(vars["BINPATCH"].ends_with("forge-1.20.1-47.2.0-clientdata.lzma"));
    }

    #[test]
    fn substitution_handles_tokens_and_coordinates() {
        let libraries = Path::new("/data/libraries");
        let mut vars = HashMap::new();
        vars.insert("SIDE".to_owned(), "client".to_owned());

        assert_eq!(substitute("--side={SIDE}", &vars, libraries), "--side=client");
        assert_eq!(
            substitute("[org.ow2.asm:asm:9.6]", &vars, libraries),
            "/data/libraries/org/ow2/asm/asm/9.6/asm-9.6.jar"
        );
        // Unknown tokens survive untouched.
        assert_eq!(substitute("{UNKNOWN}", &vars, libraries), "{UNKNOWN}");
    }

    #[test]
    fn idempotence_requires_every_output() {
        let dir = std::env::temp_dir().join("cl_patcher_test_libs");
        _ = std::fs::remove_dir_all(&dir);
        let job = job_with_data(&[("PATCHED", "[a.b:out:1]")]);

        assert!(!outputs_already_present(&job.profile, &dir));

        let out = dir.join("a/b/out/1/out-1.jar");
        std::fs::create_dir_all(out.parent().unwrap()).unwrap();
        std::fs::write(&out, b"x").unwrap();
        assert!(outputs_already_present(&job.profile, &dir));

        _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn profiles_without_coordinate_data_never_skip() {
        let job = job_with_data(&[("BINPATCH", "/data/client.lzma")]);
        assert!(!outputs_already_present(
            &job.profile,
            Path::new("/nonexistent")
        ));
    }
}
