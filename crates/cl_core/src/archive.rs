//! Read-only access to jar/zip archives.
//!
//! Loader installers embed whole `maven/` trees and metadata files in
//! their jars; this module is how the rest of the launcher gets at them.
//! Archives may be opened multiple times; nothing here writes.

use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::ZipArchive;

use crate::ErrorKind;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("couldn't open archive {path:?}:\n{error}")]
    Open {
        error: zip::result::ZipError,
        path: PathBuf,
    },
    #[error("archive is not a valid zip:\n{0}")]
    Invalid(#[from] zip::result::ZipError),
    #[error("couldn't read entry {entry} of archive:\n{error}")]
    EntryRead {
        error: std::io::Error,
        entry: String,
    },
}

impl ArchiveError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ArchiveInvalid
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub is_dir: bool,
}

/// Reads one entry by exact name. A missing entry is `Ok(None)`, not an
/// error; callers decide whether that is fatal.
pub fn read_entry(archive_path: &Path, entry_name: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
    let file = open(archive_path)?;
    let mut zip = ZipArchive::new(file).map_err(|error| ArchiveError::Open {
        error,
        path: archive_path.to_owned(),
    })?;
    read_entry_inner(&mut zip, entry_name)
}

/// Same as [`read_entry`], over an in-memory archive.
pub fn read_entry_bytes(archive: &[u8], entry_name: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    read_entry_inner(&mut zip, entry_name)
}

/// Lists non-directory entry names starting with `prefix`.
pub fn list_with_prefix(archive_path: &Path, prefix: &str) -> Result<Vec<String>, ArchiveError> {
    let file = open(archive_path)?;
    let zip = ZipArchive::new(file).map_err(|error| ArchiveError::Open {
        error,
        path: archive_path.to_owned(),
    })?;
    Ok(list_prefix_inner(&zip, prefix))
}

pub fn list_with_prefix_bytes(archive: &[u8], prefix: &str) -> Result<Vec<String>, ArchiveError> {
    let zip = ZipArchive::new(Cursor::new(archive))?;
    Ok(list_prefix_inner(&zip, prefix))
}

/// Full enumeration with entry data, for bulk extraction.
pub fn list_all(archive_path: &Path, include_dirs: bool) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let file = open(archive_path)?;
    let mut zip = ZipArchive::new(file).map_err(|error| ArchiveError::Open {
        error,
        path: archive_path.to_owned(),
    })?;
    list_all_inner(&mut zip, include_dirs)
}

pub fn list_all_bytes(archive: &[u8], include_dirs: bool) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    list_all_inner(&mut zip, include_dirs)
}

fn open(path: &Path) -> Result<std::fs::File, ArchiveError> {
    std::fs::File::open(path).map_err(|error| ArchiveError::Open {
        error: zip::result::ZipError::Io(error),
        path: path.to_owned(),
    })
}

fn read_entry_inner<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    entry_name: &str,
) -> Result<Option<Vec<u8>>, ArchiveError> {
    let Ok(mut entry) = zip.by_name(entry_name) else {
        return Ok(None);
    };
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut data)
        .map_err(|error| ArchiveError::EntryRead {
            error,
            entry: entry_name.to_owned(),
        })?;
    Ok(Some(data))
}

fn list_prefix_inner<R: Read + Seek>(zip: &ZipArchive<R>, prefix: &str) -> Vec<String> {
    zip.file_names()
        .filter(|name| name.starts_with(prefix) && !name.ends_with('/'))
        .map(ToOwned::to_owned)
        .collect()
}

fn list_all_inner<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    include_dirs: bool,
) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut entries = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let is_dir = entry.is_dir();
        if is_dir && !include_dirs {
            continue;
        }
        let name = entry.name().to_owned();
        let mut data = Vec::new();
        if !is_dir {
            entry
                .read_to_end(&mut data)
                .map_err(|error| ArchiveError::EntryRead {
                    error,
                    entry: name.clone(),
                })?;
        }
        entries.push(ArchiveEntry { name, data, is_dir });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn sample_archive() -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = SimpleFileOptions::default();

        writer.add_directory("maven/", options).unwrap();
        writer
            .start_file("maven/net/forge/forge-1.0.jar", options)
            .unwrap();
        writer.write_all(b"jar bytes").unwrap();
        writer
            .start_file("META-INF/MANIFEST.MF", options)
            .unwrap();
        writer
            .write_all(b"Manifest-Version: 1.0\nMain-Class: net.forge.Installer\n")
            .unwrap();
        writer.finish().unwrap();
        buffer.into_inner()
    }

    #[test]
    fn reads_entry_by_exact_name() {
        let archive = sample_archive();
        let data = read_entry_bytes(&archive, "maven/net/forge/forge-1.0.jar")
            .unwrap()
            .unwrap();
        assert_eq!(data, b"jar bytes");
    }

    #[test]
    fn missing_entry_is_none_not_error() {
        let archive = sample_archive();
        assert!(read_entry_bytes(&archive, "no/such/entry").unwrap().is_none());
    }

    #[test]
    fn prefix_listing_skips_directories() {
        let archive = sample_archive();
        let names = list_with_prefix_bytes(&archive, "maven/").unwrap();
        assert_eq!(names, vec!["maven/net/forge/forge-1.0.jar".to_owned()]);
    }

    #[test]
    fn list_all_includes_dirs_on_request() {
        let archive = sample_archive();
        let without = list_all_bytes(&archive, false).unwrap();
        assert_eq!(without.len(), 2);
        let with = list_all_bytes(&archive, true).unwrap();
        assert_eq!(with.len(), 3);
        assert!(with.iter().any(|e| e.is_dir));
    }

    #[test]
    fn garbage_is_archive_invalid() {
        let err = read_entry_bytes(b"definitely not a zip", "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArchiveInvalid);
    }
}
