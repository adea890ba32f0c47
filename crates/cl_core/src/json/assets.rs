use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const RESOURCES_URL: &str = "https://resources.download.minecraft.net";

/// The asset index: virtual path -> content-addressed object.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssetIndexFile {
    pub objects: HashMap<String, AssetObject>,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default)]
    pub map_to_resources: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetObject {
    /// The content-addressed location, `objects/<hh>/<hash>`.
    #[must_use]
    pub fn rel_path(&self) -> String {
        format!("{}/{}", &self.hash[..2], self.hash)
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("{RESOURCES_URL}/{}", self.rel_path())
    }
}

/// Index ids that additionally require the `resources/` shadow tree.
#[must_use]
pub fn is_legacy_index(index_id: &str) -> bool {
    index_id == "legacy" || index_id == "pre-1.6"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths_are_content_addressed() {
        let obj = AssetObject {
            hash: "bdf48ef6b5d0d23bbb02e17d04865216179f510a".to_owned(),
            size: 22,
        };
        assert_eq!(
            obj.rel_path(),
            "bd/bdf48ef6b5d0d23bbb02e17d04865216179f510a"
        );
        assert!(obj.url().starts_with(RESOURCES_URL));
    }

    #[test]
    fn legacy_ids() {
        assert!(is_legacy_index("legacy"));
        assert!(is_legacy_index("pre-1.6"));
        assert!(!is_legacy_index("1.8"));
        assert!(!is_legacy_index("17"));
    }
}
