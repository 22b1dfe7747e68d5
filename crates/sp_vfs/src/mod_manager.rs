//! Mod manager staging folders.
//!
//! Mod managers keep every mod in its own folder (`<mods>/<ModName>/...`) and
//! deploy them into the data directory. Reading the staging folder tells us which
//! mod a deployed file came from, which is what mod priority is ranked on.
//!
//! An optional `modlist.txt` selects and orders mods: `+Name` is enabled, `-Name`
//! disabled, and the first line is the highest priority.

use crate::error::Result;
use crate::vpath::VirtualPath;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use walkdir::WalkDir;

/// Files inside a mod folder that are manager metadata, not game data.
const METADATA_FILES: &[&str] = &["meta.ini"];

/// File ownership derived from a mod manager staging folder.
#[derive(Debug, Default, Clone)]
pub struct ModManagerDirectory {
    /// Enabled mods, lowest priority first.
    mods: Vec<String>,
    /// Virtual path -> winning owner.
    owners: HashMap<VirtualPath, String>,
}

impl ModManagerDirectory {
    /// Scan a staging folder.
    ///
    /// # Arguments
    ///
    /// * `mods_dir` - Folder containing one sub-folder per mod
    /// * `modlist` - Optional `modlist.txt`; when absent every folder is enabled in
    ///   alphabetical order
    pub fn scan(mods_dir: &Utf8Path, modlist: Option<&Utf8Path>) -> Result<Self> {
        let mods = match modlist {
            Some(path) => parse_modlist(&std::fs::read_to_string(path.as_std_path())?),
            None => list_mod_folders(mods_dir)?,
        };

        let mut owners = HashMap::new();
        for mod_name in &mods {
            let root = mods_dir.join(mod_name);
            if !root.as_std_path().is_dir() {
                tracing::warn!("Mod '{}' is enabled but has no folder in {}", mod_name, mods_dir);
                continue;
            }

            for entry in WalkDir::new(root.as_std_path()).follow_links(true) {
                let entry = entry.map_err(std::io::Error::from)?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(path) = Utf8PathBuf::from_path_buf(entry.path().to_path_buf()) else {
                    tracing::warn!("Skipping non-UTF-8 path: {}", entry.path().display());
                    continue;
                };
                let Ok(relative) = path.strip_prefix(&root) else {
                    continue;
                };
                let vpath = VirtualPath::new(relative.as_str());
                if METADATA_FILES.contains(&vpath.as_str()) {
                    continue;
                }
                owners.insert(vpath, mod_name.clone());
            }
        }

        tracing::info!(
            "Mod manager: {} enabled mods own {} files",
            mods.len(),
            owners.len()
        );

        Ok(Self { mods, owners })
    }

    /// Enabled mods, lowest priority first.
    pub fn mods(&self) -> &[String] {
        &self.mods
    }

    pub fn owner_of(&self, path: &VirtualPath) -> Option<&str> {
        self.owners.get(path).map(String::as_str)
    }

    /// Consume into the ownership table used by [`DataDirectory::set_owners`](crate::DataDirectory::set_owners).
    pub fn into_owners(self) -> HashMap<VirtualPath, String> {
        self.owners
    }
}

/// Enabled mods from a `modlist.txt`, lowest priority first.
fn parse_modlist(contents: &str) -> Vec<String> {
    let mut mods: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter_map(|l| l.strip_prefix('+'))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    mods.reverse();
    mods
}

fn list_mod_folders(mods_dir: &Utf8Path) -> Result<Vec<String>> {
    let mut mods = Vec::new();
    for entry in std::fs::read_dir(mods_dir.as_std_path())? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => mods.push(name),
            Err(name) => tracing::warn!("Skipping non-UTF-8 mod folder: {:?}", name),
        }
    }
    mods.sort();
    Ok(mods)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Utf8Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
        std::fs::write(path.as_std_path(), b"").unwrap();
    }

    #[test]
    fn test_parse_modlist_order() {
        let list = "# comment\n+Top Mod\n-Disabled\n+Bottom Mod\n*DLC: Dawnguard\n";
        assert_eq!(parse_modlist(list), vec!["Bottom Mod", "Top Mod"]);
    }

    #[test]
    fn test_higher_priority_mod_owns_conflict() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let mods = root.join("mods");
        write(&mods, "Base/textures/rock.dds");
        write(&mods, "Base/meta.ini");
        write(&mods, "Override/Textures/Rock.dds");
        write(&mods, "Override/Override.bsa");
        write(&mods, "Off/textures/rock.dds");

        let modlist = root.join("modlist.txt");
        std::fs::write(modlist.as_std_path(), "+Override\n-Off\n+Base\n").unwrap();

        let mm = ModManagerDirectory::scan(&mods, Some(&modlist)).unwrap();
        assert_eq!(mm.mods(), &["Base".to_string(), "Override".to_string()]);
        assert_eq!(mm.owner_of(&VirtualPath::new("textures/rock.dds")), Some("Override"));
        assert_eq!(mm.owner_of(&VirtualPath::new("override.bsa")), Some("Override"));
        assert_eq!(mm.owner_of(&VirtualPath::new("meta.ini")), None);
    }

    #[test]
    fn test_scan_without_modlist_uses_folders() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        write(&root, "B/textures/a.dds");
        write(&root, "A/textures/a.dds");

        let mm = ModManagerDirectory::scan(&root, None).unwrap();
        assert_eq!(mm.mods(), &["A".to_string(), "B".to_string()]);
        assert_eq!(mm.owner_of(&VirtualPath::new("textures/a.dds")), Some("B"));
    }
}
