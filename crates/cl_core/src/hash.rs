use std::path::Path;

use md5::Md5;
use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;

use crate::{IntoIoError, IoError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Md5,
}

/// Hashes a file by streaming it in 8 KiB chunks.
/// The file is never buffered whole.
pub async fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String, IoError> {
    match algorithm {
        HashAlgorithm::Sha1 => digest_file::<Sha1>(path).await,
        HashAlgorithm::Md5 => digest_file::<Md5>(path).await,
    }
}

#[must_use]
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Sha1 => format!("{:x}", Sha1::digest(data)),
        HashAlgorithm::Md5 => format!("{:x}", Md5::digest(data)),
    }
}

async fn digest_file<D: Digest>(path: &Path) -> Result<String, IoError> {
    let mut file = tokio::fs::File::open(path).await.path(path)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; 8192];
    loop {
        let n = file.read(&mut buffer).await.path(path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// `true` if the file exists and hashes to `expected` (case-insensitive).
pub async fn file_matches(path: &Path, expected: &str, algorithm: HashAlgorithm) -> bool {
    if !path.is_file() {
        return false;
    }
    match hash_file(path, algorithm).await {
        Ok(actual) => actual.eq_ignore_ascii_case(expected),
        Err(_) => false,
    }
}
