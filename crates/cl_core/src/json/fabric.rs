use serde::Deserialize;

/// One entry of a Fabric-family meta listing
/// (`/versions/loader/<game>`): the loader build plus fields we ignore.
#[derive(Deserialize, Debug, Clone)]
pub struct LoaderListEntry {
    pub loader: LoaderVersion,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoaderVersion {
    pub version: String,
    /// Absent on Quilt's v3 endpoint.
    #[serde(default)]
    pub stable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quilt_entries_lack_stable() {
        let json = r#"[
            {"loader": {"version": "0.27.1-beta.1"}},
            {"loader": {"version": "0.26.4", "stable": true}}
        ]"#;
        let entries: Vec<LoaderListEntry> = serde_json::from_str(json).unwrap();
        assert!(!entries[0].loader.stable);
        assert!(entries[1].loader.stable);
    }
}
