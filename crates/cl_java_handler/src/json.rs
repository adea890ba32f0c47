use std::collections::HashMap;

use serde::Deserialize;

/// Mojang's java-runtime index: platform key -> runtime component name
/// -> available builds.
pub type JavaListJson = HashMap<String, HashMap<String, Vec<JavaInstallListing>>>;

pub const JAVA_LIST_URL: &str =
    "https://launchermeta.mojang.com/v1/products/java-runtime/2ec0cc96c44e5a76b9c8b7c39df7210883d12871/all.json";

/// The platform key used both in the index above and in the on-disk
/// `runtime/<component>/<platform>/` layout.
#[must_use]
pub fn platform_key() -> Option<&'static str> {
    if cfg!(target_os = "linux") {
        if cfg!(target_arch = "x86_64") {
            Some("linux")
        } else if cfg!(target_arch = "x86") {
            Some("linux-i386")
        } else {
            None
        }
    } else if cfg!(target_os = "macos") {
        if cfg!(target_arch = "aarch64") {
            Some("mac-os-arm64")
        } else if cfg!(target_arch = "x86_64") {
            Some("mac-os")
        } else {
            None
        }
    } else if cfg!(target_os = "windows") {
        if cfg!(target_arch = "x86_64") {
            Some("windows-x64")
        } else if cfg!(target_arch = "x86") {
            Some("windows-x86")
        } else if cfg!(target_arch = "aarch64") {
            Some("windows-arm64")
        } else {
            None
        }
    } else {
        None
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct JavaInstallListing {
    pub manifest: JavaInstallListingManifest,
}

#[derive(Deserialize, Debug, Clone)]
pub struct JavaInstallListingManifest {
    pub url: String,
}

/// The per-runtime file listing referenced by the index.
#[derive(Deserialize, Debug, Clone)]
pub struct JavaFilesJson {
    pub files: HashMap<String, JavaFile>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type")]
#[allow(non_camel_case_types)]
pub enum JavaFile {
    file {
        downloads: JavaFileDownload,
        executable: bool,
    },
    directory {},
    link {
        target: String,
    },
}

#[derive(Deserialize, Debug, Clone)]
pub struct JavaFileDownload {
    pub lzma: Option<JavaFileDownloadItem>,
    pub raw: JavaFileDownloadItem,
}

#[derive(Deserialize, Debug, Clone)]
pub struct JavaFileDownloadItem {
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_json_parses_all_entry_kinds() {
        let json = r#"{
            "files": {
                "bin/java": {"type": "file", "executable": true, "downloads": {
                    "raw": {"sha1": "aa", "size": 10, "url": "https://x/java"},
                    "lzma": {"sha1": "bb", "size": 4, "url": "https://x/java.lzma"}
                }},
                "conf": {"type": "directory"},
                "lib/libjawt.so": {"type": "link", "target": "../libjawt.so"}
            }
        }"#;
        let parsed: JavaFilesJson = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.files.len(), 3);
        assert!(matches!(
            parsed.files.get("bin/java"),
            Some(JavaFile::file { executable: true, .. })
        ));
    }
}
