//! User configuration file.
//!
//! The user file is the last document merged into the configuration, and the
//! place where a resolved `mod_order` is written back. Keys other than
//! `mod_order` are kept as-is when saving.
//!
//! # JSON format
//!
//! ```json
//! {
//!   "mod_order": ["Base Textures", "Parallax Rocks"],
//!   "patchers": { "vanilla_parallax": { "enabled": false } }
//! }
//! ```

use crate::error::Result;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// File name of the user configuration inside the config directory.
pub const USER_CONFIG_FILE: &str = "user.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Mods lowest priority first.
    #[serde(default)]
    pub mod_order: Vec<String>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl UserConfig {
    /// Load the user file.
    ///
    /// Returns `Ok(None)` if the file doesn't exist.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the user JSON file
    pub fn load(path: &Utf8Path) -> Result<Option<Self>> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path.as_std_path())?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(Some(config))
    }

    /// Save the user file, creating parent directories if needed.
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent.as_std_path())?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_std_path(), contents)?;
        Ok(())
    }

    /// Replace the stored mod order and save.
    pub fn store_mod_order(path: &Utf8Path, mod_order: Vec<String>) -> Result<()> {
        let mut config = Self::load(path)?.unwrap_or_default();
        config.mod_order = mod_order;
        config.save(path)?;
        tracing::info!("Saved mod order to {}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_returns_none() {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("user.json")).unwrap();
        assert!(UserConfig::load(&path).unwrap().is_none());
    }

    #[test]
    fn test_store_mod_order_keeps_other_keys() {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("cfg").join("user.json")).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            json!({"mod_order": ["Old"], "nif_blocklist": ["*/skip/*"]}).to_string(),
        )
        .unwrap();

        UserConfig::store_mod_order(&path, vec!["A".to_string(), "B".to_string()]).unwrap();

        let loaded = UserConfig::load(&path).unwrap().unwrap();
        assert_eq!(loaded.mod_order, vec!["A", "B"]);
        assert_eq!(loaded.other["nif_blocklist"], json!(["*/skip/*"]));
    }

    #[test]
    fn test_store_creates_file() {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("new").join("user.json")).unwrap();
        UserConfig::store_mod_order(&path, vec!["Only".to_string()]).unwrap();
        assert_eq!(UserConfig::load(&path).unwrap().unwrap().mod_order, vec!["Only"]);
    }
}
