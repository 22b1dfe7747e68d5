//! Patcher configuration.
//!
//! Configuration is assembled from several JSON documents and then validated
//! into a typed [`PatcherConfig`].
//!
//! # Merge Algorithm
//!
//! 1. Start from the bundled default (`cfg/default.json`).
//! 2. Merge every `shaderpatcher/*.json` found in the data directory overlay, in
//!    path order. A document that fails to parse is logged and skipped.
//! 3. Merge the user file, if one exists.
//! 4. Replace `/` with the platform separator in every string value.
//! 5. Deserialize into [`PatcherConfig`] (unknown keys are rejected) and check
//!    slot indices, texture types and glob syntax.
//!
//! Merging is recursive for objects, an ordered set-union for arrays (existing
//! elements keep their position, new ones are appended) and an overwrite for
//! everything else.

use crate::error::{Error, Result};
use crate::textures::TextureType;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sp_mesh::{TextureSlot, NUM_TEXTURE_SLOTS};
use sp_vfs::{DataDirectory, FileFilter, VirtualPath};
use std::collections::{BTreeMap, BTreeSet};

/// Bundled default configuration.
pub const DEFAULT_CONFIG: &str = include_str!("../cfg/default.json");

/// Overlay folder searched for configuration documents.
pub const OVERLAY_CONFIG_GLOB: &str = "shaderpatcher/*.json";

/// Allow/deny rules for one discovery pass or patcher family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub archive_deny: Vec<String>,
}

impl DiscoveryConfig {
    pub fn to_filter(&self) -> Result<FileFilter> {
        Ok(FileFilter::new(&self.allow, &self.deny, &self.archive_deny)?)
    }
}

/// Settings for one shader patcher family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FamilyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub archive_deny: Vec<String>,
    /// Slots whose texture base is used to look up candidates, in order.
    #[serde(default)]
    pub lookup_order: Vec<usize>,
    /// Free-form switches such as `no_path_check` or `disable_mlp`.
    #[serde(default)]
    pub options: BTreeSet<String>,
}

impl Default for FamilyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow: Vec::new(),
            deny: Vec::new(),
            archive_deny: Vec::new(),
            lookup_order: Vec::new(),
            options: BTreeSet::new(),
        }
    }
}

impl FamilyConfig {
    pub fn to_filter(&self) -> Result<FileFilter> {
        Ok(FileFilter::new(&self.allow, &self.deny, &self.archive_deny)?)
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.contains(option)
    }

    /// Lookup order as slots. Indices are checked during validation.
    pub fn lookup_slots(&self) -> Vec<TextureSlot> {
        self.lookup_order
            .iter()
            .filter_map(|&i| TextureSlot::from_index(i))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchersConfig {
    #[serde(default)]
    pub true_pbr: FamilyConfig,
    #[serde(default)]
    pub complex_material: FamilyConfig,
    #[serde(default)]
    pub vanilla_parallax: FamilyConfig,
    #[serde(default)]
    pub upgrade_parallax_to_cm: TransformConfig,
}

/// Fully merged and validated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatcherConfig {
    pub texture_discovery: DiscoveryConfig,
    pub mesh_discovery: DiscoveryConfig,
    /// Slot index (`"0"`..`"8"`) to filename suffixes.
    pub suffixes: BTreeMap<String, Vec<String>>,
    /// Texture path to texture type name; overrides every other classification.
    #[serde(default)]
    pub texture_maps: BTreeMap<String, String>,
    #[serde(default)]
    pub dyncubemap_blocklist: Vec<String>,
    #[serde(default)]
    pub nif_blocklist: Vec<String>,
    /// Archives whose files are attributed to no mod.
    #[serde(default)]
    pub vanilla_bsas: Vec<String>,
    /// Mods lowest priority first.
    #[serde(default)]
    pub mod_order: Vec<String>,
    #[serde(default)]
    pub patchers: PatchersConfig,
}

impl PatcherConfig {
    /// Whether an archive name is one of the base game archives.
    pub fn is_vanilla_archive(&self, archive: &str) -> bool {
        self.vanilla_bsas
            .iter()
            .any(|v| v.eq_ignore_ascii_case(archive))
    }

    /// Parse the bundled default alone.
    pub fn bundled() -> Result<Self> {
        let mut value: Value = serde_json::from_str(DEFAULT_CONFIG)?;
        normalize_separators(&mut value);
        Self::from_value(value)
    }

    /// Deserialize and validate a merged document.
    pub fn from_value(value: Value) -> Result<Self> {
        let config: Self =
            serde_json::from_value(value).map_err(|e| Error::ValidationFailure(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (key, suffixes) in &self.suffixes {
            let index: usize = key.parse().map_err(|_| {
                Error::ValidationFailure(format!("suffix table key '{}' is not a slot index", key))
            })?;
            if index >= NUM_TEXTURE_SLOTS {
                return Err(Error::ValidationFailure(format!(
                    "suffix table slot {} is out of range",
                    index
                )));
            }
            if let Some(empty) = suffixes.iter().find(|s| s.is_empty()) {
                return Err(Error::ValidationFailure(format!(
                    "suffix table slot {} contains an empty suffix '{}'",
                    index, empty
                )));
            }
        }

        for (path, type_name) in &self.texture_maps {
            if type_name.parse::<TextureType>().is_err() {
                return Err(Error::ValidationFailure(format!(
                    "texture map for '{}' has unknown texture type '{}'",
                    path, type_name
                )));
            }
        }

        let families = [
            ("true_pbr", &self.patchers.true_pbr),
            ("complex_material", &self.patchers.complex_material),
            ("vanilla_parallax", &self.patchers.vanilla_parallax),
        ];
        for (name, family) in families {
            if let Some(bad) = family.lookup_order.iter().find(|&&i| i >= NUM_TEXTURE_SLOTS) {
                return Err(Error::ValidationFailure(format!(
                    "{} lookup order references slot {}",
                    name, bad
                )));
            }
            family
                .to_filter()
                .map_err(|e| Error::ValidationFailure(format!("{}: {}", name, e)))?;
        }

        for (name, discovery) in [
            ("texture_discovery", &self.texture_discovery),
            ("mesh_discovery", &self.mesh_discovery),
        ] {
            discovery
                .to_filter()
                .map_err(|e| Error::ValidationFailure(format!("{}: {}", name, e)))?;
        }

        Ok(())
    }

    /// Suffix table keyed by slot.
    pub fn suffix_table(&self) -> BTreeMap<TextureSlot, Vec<String>> {
        self.suffixes
            .iter()
            .filter_map(|(k, v)| {
                let slot = k.parse().ok().and_then(TextureSlot::from_index)?;
                Some((slot, v.iter().map(|s| s.to_lowercase()).collect()))
            })
            .collect()
    }

    /// Manual texture types keyed by virtual path.
    pub fn manual_texture_maps(&self) -> BTreeMap<VirtualPath, TextureType> {
        self.texture_maps
            .iter()
            .filter_map(|(path, ty)| Some((VirtualPath::new(path), ty.parse().ok()?)))
            .collect()
    }
}

/// Collects documents and merges them in order.
#[derive(Debug)]
pub struct ConfigLoader {
    merged: Value,
    sources: usize,
}

impl ConfigLoader {
    /// Start from the bundled default.
    pub fn new() -> Result<Self> {
        Ok(Self {
            merged: serde_json::from_str(DEFAULT_CONFIG)?,
            sources: 1,
        })
    }

    /// Merge one more document on top.
    pub fn merge(&mut self, document: Value) {
        merge_json(&mut self.merged, document);
        self.sources += 1;
    }

    /// Merge every `shaderpatcher/*.json` visible in the overlay.
    pub fn merge_overlay(&mut self, directory: &DataDirectory) -> Result<()> {
        let filter = FileFilter::new(&[OVERLAY_CONFIG_GLOB], &[], &[])?;
        for path in directory.find_files(&filter) {
            let bytes = match directory.get_file(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!("Unable to read config {}: {}", path, e);
                    continue;
                }
            };
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(document) => {
                    tracing::debug!("Loading config: {}", path);
                    self.merge(document);
                }
                Err(e) => tracing::error!("Error parsing JSON file {}: {}", path, e),
            }
        }
        Ok(())
    }

    /// Merge the user's configuration file if it exists.
    pub fn merge_user_file(&mut self, path: &Utf8Path) -> Result<()> {
        if !path.as_std_path().exists() {
            return Ok(());
        }
        let contents = std::fs::read_to_string(path.as_std_path())?;
        let document: Value = serde_json::from_str(&contents)?;
        self.merge(document);
        Ok(())
    }

    /// Raw merged document, before separator normalization.
    pub fn merged(&self) -> &Value {
        &self.merged
    }

    pub fn finish(mut self) -> Result<PatcherConfig> {
        normalize_separators(&mut self.merged);
        let config = PatcherConfig::from_value(self.merged)?;
        tracing::info!("Loaded {} shader patcher configs successfully", self.sources);
        Ok(config)
    }
}

/// Merge `overlay` into `base`.
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(overlay)) => {
            for value in overlay {
                if !base.contains(&value) {
                    base.push(value);
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Replace `/` with the platform separator in every string value.
pub fn normalize_separators(value: &mut Value) {
    match value {
        Value::String(s) => {
            if std::path::MAIN_SEPARATOR != '/' && s.contains('/') {
                *s = s.replace('/', std::path::MAIN_SEPARATOR_STR);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_separators),
        Value::Object(map) => map.values_mut().for_each(normalize_separators),
        _ => {}
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_arrays_as_ordered_union() {
        let mut base = json!({"suffixes": ["_n"]});
        merge_json(&mut base, json!({"suffixes": ["_n", "_p"]}));
        assert_eq!(base, json!({"suffixes": ["_n", "_p"]}));
    }

    #[test]
    fn test_merge_objects_recursively_and_overwrite_scalars() {
        let mut base = json!({"a": {"x": 1, "y": [1]}, "b": true});
        merge_json(&mut base, json!({"a": {"x": 2, "y": [2, 1], "z": "new"}, "b": false}));
        assert_eq!(
            base,
            json!({"a": {"x": 2, "y": [1, 2], "z": "new"}, "b": false})
        );
    }

    #[test]
    fn test_merge_type_mismatch_overwrites() {
        let mut base = json!({"a": [1, 2]});
        merge_json(&mut base, json!({"a": {"k": 1}}));
        assert_eq!(base, json!({"a": {"k": 1}}));
    }

    #[test]
    fn test_bundled_default_is_valid() {
        let config = PatcherConfig::bundled().unwrap();
        let table = config.suffix_table();
        assert!(table[&TextureSlot::Normal].contains(&"_n".to_string()));
        assert!(config.patchers.vanilla_parallax.enabled);
        assert!(!config.patchers.upgrade_parallax_to_cm.enabled);
        assert_eq!(
            config.patchers.vanilla_parallax.lookup_slots(),
            vec![TextureSlot::Normal, TextureSlot::Diffuse]
        );
    }

    #[test]
    fn test_vanilla_archive_ignores_case() {
        let config = PatcherConfig::bundled().unwrap();
        assert!(config.is_vanilla_archive("Skyrim - Textures3.bsa"));
        assert!(!config.is_vanilla_archive("SomeMod - Textures.bsa"));
    }

    #[test]
    fn test_unknown_key_is_validation_failure() {
        let mut loader = ConfigLoader::new().unwrap();
        loader.merge(json!({"not_a_key": 1}));
        assert!(matches!(loader.finish(), Err(Error::ValidationFailure(_))));
    }

    #[test]
    fn test_bad_suffix_slot_rejected() {
        let mut loader = ConfigLoader::new().unwrap();
        loader.merge(json!({"suffixes": {"12": ["_x"]}}));
        assert!(matches!(loader.finish(), Err(Error::ValidationFailure(_))));
    }

    #[test]
    fn test_bad_texture_type_rejected() {
        let mut loader = ConfigLoader::new().unwrap();
        loader.merge(json!({"texture_maps": {"textures/a.dds": "sparkles"}}));
        assert!(matches!(loader.finish(), Err(Error::ValidationFailure(_))));
    }

    #[test]
    fn test_user_file_merged_last() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(temp.path()).unwrap().join("user.json");
        std::fs::write(path.as_std_path(), r#"{"mod_order": ["A", "B"]}"#).unwrap();

        let mut loader = ConfigLoader::new().unwrap();
        loader.merge(json!({"mod_order": ["B", "C"]}));
        loader.merge_user_file(&path).unwrap();
        let config = loader.finish().unwrap();
        assert_eq!(config.mod_order, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_missing_user_file_is_ignored() {
        let mut loader = ConfigLoader::new().unwrap();
        loader
            .merge_user_file(Utf8Path::new("/definitely/not/here.json"))
            .unwrap();
        assert!(loader.finish().is_ok());
    }

    #[test]
    fn test_merge_overlay_documents() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp.path()).unwrap().to_path_buf();
        std::fs::create_dir_all(root.join("ShaderPatcher").as_std_path()).unwrap();
        std::fs::write(
            root.join("ShaderPatcher/extra.json").as_std_path(),
            r#"{"nif_blocklist": ["meshes/skip/*"]}"#,
        )
        .unwrap();
        std::fs::write(root.join("ShaderPatcher/broken.json").as_std_path(), "{ nope").unwrap();

        let mut dir = DataDirectory::new(root).unwrap();
        dir.populate(&[], false).unwrap();

        let mut loader = ConfigLoader::new().unwrap();
        loader.merge_overlay(&dir).unwrap();
        let config = loader.finish().unwrap();
        assert!(config
            .nif_blocklist
            .iter()
            .any(|p| p.replace('\\', "/") == "meshes/skip/*"));
    }
}
