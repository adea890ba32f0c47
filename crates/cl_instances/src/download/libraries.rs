//! Library planning: platform rules decide what to materialize, the
//! plan says what to download, what goes on the classpath and which
//! native jars get extracted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cl_core::event::Event;
use cl_core::hash::{self, HashAlgorithm};
use cl_core::json::version::{Library, RuleContext, VersionDetails};
use cl_core::{archive, file_utils, maven, pt, CheckKind, EventBus, IntoIoError};

use super::DownloadError;

pub(crate) struct LibraryPlan {
    pub downloads: Vec<PlannedDownload>,
    /// `(coordinate, absolute path)` in manifest order, natives
    /// excluded.
    pub classpath: Vec<(String, PathBuf)>,
    pub natives: Vec<NativePlan>,
}

pub(crate) struct PlannedDownload {
    /// `None` when no manifest or repository URL is known; the caller
    /// resolves it through the mirror list.
    pub url: Option<String>,
    pub rel: String,
    pub dest: PathBuf,
    pub size: u64,
    pub sha1: Option<String>,
}

pub(crate) struct NativePlan {
    pub jar: PathBuf,
    pub exclude: Vec<String>,
}

/// Walks the manifest's library list and produces the download,
/// classpath and extraction plans. On-disk files are re-checked against
/// their declared hashes; anything missing or wrong is planned for
/// download. When two entries share a coordinate the last declared
/// wins.
pub(crate) async fn plan_libraries(
    version: &VersionDetails,
    root: &Path,
    ctx: &RuleContext,
    bus: &EventBus,
) -> Result<LibraryPlan, DownloadError> {
    let libraries_dir = root.join("libraries");
    let libraries = &version.libraries;

    // Last declaration of a coordinate wins over earlier ones.
    let mut last_of: HashMap<&str, usize> = HashMap::new();
    for (i, library) in libraries.iter().enumerate() {
        if let Some(name) = library.name.as_deref() {
            last_of.insert(name, i);
        }
    }

    let mut plan = LibraryPlan {
        downloads: Vec::new(),
        classpath: Vec::new(),
        natives: Vec::new(),
    };

    let total = libraries.len();
    for (index, library) in libraries.iter().enumerate() {
        bus.emit(Event::Check {
            index,
            total,
            kind: CheckKind::Library,
        });

        if let Some(name) = library.name.as_deref() {
            if last_of.get(name).copied() != Some(index) {
                continue;
            }
        }
        if !library.is_allowed(ctx) {
            pt!("Skipping {:?}", library.name);
            continue;
        }

        if let Some(classifier) = library.native_classifier(ctx) {
            plan_native(&mut plan, library, &classifier, &libraries_dir, bus).await;
        } else {
            plan_artifact(&mut plan, library, &libraries_dir).await;
        }
    }

    Ok(plan)
}

async fn plan_artifact(plan: &mut LibraryPlan, library: &Library, libraries_dir: &Path) {
    let Some(rel) = library.rel_path() else {
        return;
    };
    let dest = libraries_dir.join(&rel);

    if let Some(name) = &library.name {
        plan.classpath.push((name.clone(), dest.clone()));
    }

    let (url, size, sha1) = artifact_source(library, &rel);
    if needs_download(&dest, sha1.as_deref()).await {
        plan.downloads.push(PlannedDownload {
            url,
            rel,
            dest,
            size,
            sha1,
        });
    }
}

async fn plan_native(
    plan: &mut LibraryPlan,
    library: &Library,
    classifier: &str,
    libraries_dir: &Path,
    bus: &EventBus,
) {
    let Some(artifact) = library.classifier_artifact(classifier) else {
        // The manifest names a native for this OS family but ships no
        // matching artifact. The launch may still work without it.
        bus.error(
            cl_core::ErrorKind::PlatformUnsupported,
            format!(
                "no native artifact {classifier} for {:?}",
                library.name.as_deref().unwrap_or("<unnamed>")
            ),
        );
        return;
    };

    let rel = artifact.path.clone().or_else(|| {
        let name = library.name.as_deref()?;
        maven::artifact_rel_path(&format!("{name}:{classifier}"))
    });
    let Some(rel) = rel else {
        return;
    };
    let dest = libraries_dir.join(&rel);

    if needs_download(&dest, artifact.sha1.as_deref()).await {
        plan.downloads.push(PlannedDownload {
            url: (!artifact.url.is_empty()).then(|| artifact.url.clone()),
            rel,
            dest: dest.clone(),
            size: artifact.size.unwrap_or(0),
            sha1: artifact.sha1.clone(),
        });
    }

    plan.natives.push(NativePlan {
        jar: dest,
        exclude: library
            .extract
            .as_ref()
            .map(|e| e.exclude.clone())
            .unwrap_or_default(),
    });
}

fn artifact_source(library: &Library, rel: &str) -> (Option<String>, u64, Option<String>) {
    if let Some(artifact) = library.artifact() {
        let url = (!artifact.url.is_empty()).then(|| artifact.url.clone());
        return (url, artifact.size.unwrap_or(0), artifact.sha1.clone());
    }
    // Loader-style entry: repository base + Maven-derived path.
    let url = library
        .url
        .as_deref()
        .map(|base| format!("{}/{rel}", base.trim_end_matches('/')));
    (url, 0, None)
}

async fn needs_download(dest: &Path, sha1: Option<&str>) -> bool {
    if !dest.is_file() {
        return true;
    }
    match sha1 {
        Some(expected) => !hash::file_matches(dest, expected, HashAlgorithm::Sha1).await,
        None => false,
    }
}

/// Unpacks each planned native jar flat into `natives/<version_id>/`,
/// honoring the library's `extract.exclude` prefixes.
pub(crate) async fn extract_natives(
    natives: &[NativePlan],
    natives_dir: &Path,
    bus: &EventBus,
) -> Result<(), DownloadError> {
    if natives.is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(natives_dir)
        .await
        .path(natives_dir)?;

    for native in natives {
        let entries = archive::list_all(&native.jar, false)?;
        for entry in entries {
            if is_excluded(&entry.name, &native.exclude) {
                continue;
            }
            // Never write outside the natives dir.
            if entry.name.contains("..") {
                continue;
            }
            let dest = natives_dir.join(&entry.name);
            file_utils::write_file_atomic(&dest, &entry.data).await?;
            bus.emit(Event::Extract {
                name: entry.name.clone(),
            });
        }
    }
    Ok(())
}

fn is_excluded(entry_name: &str, exclude: &[String]) -> bool {
    exclude.iter().any(|prefix| entry_name.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cl_core::json::version::{
        LibraryArtifact, LibraryDownloads, OsRule, Rule,
    };
    use std::collections::BTreeMap;

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

    fn lib(name: &str, url: &str, sha1: &str) -> Library {
        Library {
            name: Some(name.to_owned()),
            downloads: Some(LibraryDownloads {
                artifact: Some(LibraryArtifact {
                    path: maven::artifact_rel_path(name),
                    sha1: Some(sha1.to_owned()),
                    size: Some(10),
                    url: url.to_owned(),
                }),
                classifiers: None,
            }),
            ..Library::default()
        }
    }

    fn version_with(libraries: Vec<Library>) -> VersionDetails {
        VersionDetails {
            id: "1.20.1-test".to_owned(),
            libraries,
            ..VersionDetails::default()
        }
    }

    #[tokio::test]
    async fn disallowed_library_contributes_nothing() {
        let mut denied = lib("a.b:denied:1", "https://x/denied.jar", "aa");
        denied.rules = Some(vec![
            Rule {
                action: "allow".to_owned(),
                os: None,
                features: None,
            },
            Rule {
                action: "disallow".to_owned(),
                os: Some(OsRule {
                    name: Some("linux".to_owned()),
                    arch: None,
                    version: None,
                }),
                features: None,
            },
        ]);
        let version = version_with(vec![denied, lib("a.b:kept:1", "https://x/kept.jar", "bb")]);

        let root = std::env::temp_dir().join("cl_plan_rules");
        let plan = plan_libraries(&version, &root, &test_ctx("linux"), &EventBus::new())
            .await
            .unwrap();

        let names: Vec<&str> = plan.classpath.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a.b:kept:1"]);
        assert_eq!(plan.downloads.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_coordinates_keep_the_last_declaration() {
        let version = version_with(vec![
            lib("a.b:dup:1", "https://x/first.jar", "aa"),
            lib("a.b:dup:1", "https://x/second.jar", "bb"),
        ]);
        let root = std::env::temp_dir().join("cl_plan_dup");
        let plan = plan_libraries(&version, &root, &test_ctx("linux"), &EventBus::new())
            .await
            .unwrap();

        assert_eq!(plan.classpath.len(), 1);
        assert_eq!(plan.downloads.len(), 1);
        assert_eq!(plan.downloads[0].url.as_deref(), Some("https://x/second.jar"));
        assert_eq!(plan.downloads[0].sha1.as_deref(), Some("bb"));
    }

    #[tokio::test]
    async fn natives_go_to_extraction_not_classpath() {
        let mut natives = BTreeMap::new();
        natives.insert("linux".to_owned(), "natives-linux-${arch}".to_owned());
        let mut classifiers = BTreeMap::new();
        classifiers.insert(
            "natives-linux-64".to_owned(),
            LibraryArtifact {
                path: Some("org/lwjgl/lwjgl/2.9.4/lwjgl-2.9.4-natives-linux-64.jar".to_owned()),
                sha1: Some("cc".to_owned()),
                size: Some(20),
                url: "https://x/native.jar".to_owned(),
            },
        );
        let library = Library {
            name: Some("org.lwjgl:lwjgl:2.9.4".to_owned()),
            natives: Some(natives),
            downloads: Some(LibraryDownloads {
                artifact: None,
                classifiers: Some(classifiers),
            }),
            ..Library::default()
        };

        let root = std::env::temp_dir().join("cl_plan_natives");
        let plan = plan_libraries(
            &version_with(vec![library]),
            &root,
            &test_ctx("linux"),
            &EventBus::new(),
        )
        .await
        .unwrap();

        assert!(plan.classpath.is_empty());
        assert_eq!(plan.natives.len(), 1);
        assert_eq!(plan.downloads.len(), 1);
        assert!(plan.natives[0]
            .jar
            .ends_with("org/lwjgl/lwjgl/2.9.4/lwjgl-2.9.4-natives-linux-64.jar"));
    }

    #[test]
    fn exclusion_prefixes() {
        let exclude = vec!["META-INF/".to_owned()];
        assert!(is_excluded("META-INF/MANIFEST.MF", &exclude));
        assert!(!is_excluded("liblwjgl.so", &exclude));
    }
}
