//! Maven coordinate handling.
//!
//! Coordinates look like `group:artifact:version[:classifier]`, with an
//! optional `@ext` suffix replacing the default `jar` extension
//! (e.g. `net.minecraft:client:1.20.1:mappings@txt`).

/// A coordinate resolved to its location under a `libraries/` tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPath {
    /// Relative directory, e.g. `org/ow2/asm/asm/9.6`.
    pub dir: String,
    /// File name, e.g. `asm-9.6.jar`.
    pub file_name: String,
    /// Bare version, e.g. `9.6`.
    pub version: String,
}

impl ArtifactPath {
    #[must_use]
    pub fn rel_path(&self) -> String {
        format!("{}/{}", self.dir, self.file_name)
    }
}

/// Resolves a Maven coordinate to `{dir, file_name, version}`.
/// Returns `None` for anything with fewer than three `:` segments.
#[must_use]
pub fn artifact_path(coordinate: &str) -> Option<ArtifactPath> {
    let (coordinate, extension) = match coordinate.split_once('@') {
        Some((c, e)) => (c, e),
        None => (coordinate, "jar"),
    };

    let parts: Vec<&str> = coordinate.split(':').collect();
    if parts.len() < 3 {
        return None;
    }

    // The dot-to-slash conversion applies only to the group segment.
    let group = parts[0].replace('.', "/");
    let artifact = parts[1];
    let version = parts[2];

    let file_name = if let Some(classifier) = parts.get(3) {
        format!("{artifact}-{version}-{classifier}.{extension}")
    } else {
        format!("{artifact}-{version}.{extension}")
    };

    Some(ArtifactPath {
        dir: format!("{group}/{artifact}/{version}"),
        file_name,
        version: version.to_owned(),
    })
}

/// Relative path under `libraries/` for a coordinate, or `None` if it
/// doesn't parse.
#[must_use]
pub fn artifact_rel_path(coordinate: &str) -> Option<String> {
    artifact_path(coordinate).map(|p| p.rel_path())
}

/// Dedup key for classpath building: `group:artifact`, with the
/// classifier kept so natives never collapse into their base library.
#[must_use]
pub fn coordinate_key(coordinate: &str) -> String {
    let coordinate = coordinate.split('@').next().unwrap_or(coordinate);
    let parts: Vec<&str> = coordinate.split(':').collect();
    if parts.len() >= 4 {
        format!("{}:{}:{}", parts[0], parts[1], parts[3])
    } else if parts.len() >= 2 {
        format!("{}:{}", parts[0], parts[1])
    } else {
        coordinate.to_owned()
    }
}
