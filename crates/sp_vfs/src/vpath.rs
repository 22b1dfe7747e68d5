//! Case-insensitive virtual paths.
//!
//! Every lookup in the overlay is keyed by a [`VirtualPath`]: a relative path that
//! has been case-folded and normalized to forward slashes. Game data refers to the
//! same file as `Textures\Rock_N.dds`, `textures/rock_n.dds` or `./TEXTURES//rock_n.DDS`;
//! all of these normalize to `textures/rock_n.dds`.
//!
//! Normalization is idempotent and never produces an absolute path: leading
//! separators, drive prefixes, `.` components and empty components are dropped, and
//! `..` is resolved lexically without ever climbing above the root.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized, case-folded path relative to the asset root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VirtualPath(String);

impl VirtualPath {
    /// Normalize a raw path (either separator, any case) into a virtual path.
    pub fn new(path: impl AsRef<str>) -> Self {
        normalize(path.as_ref())
    }

    /// The normalized string form (`/`-separated, lowercase).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Final path component, if any.
    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// File name without its last extension.
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => name,
            Some(idx) => &name[..idx],
        }
    }

    /// Last extension without the leading dot (already lowercase).
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// Everything before the final component, or an empty string at the root.
    pub fn folder(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// The path with its last extension removed (folder included).
    pub fn without_extension(&self) -> &str {
        let stem_len = self.file_stem().len();
        let folder = self.folder();
        if folder.is_empty() {
            &self.0[..stem_len]
        } else {
            &self.0[..folder.len() + 1 + stem_len]
        }
    }

    /// Whether this path lives under `dir` (component-wise, not a raw string prefix).
    pub fn is_under(&self, dir: &str) -> bool {
        let dir = normalize(dir);
        if dir.is_empty() {
            return true;
        }
        self.0.len() > dir.0.len()
            && self.0.starts_with(dir.as_str())
            && self.0.as_bytes()[dir.0.len()] == b'/'
    }

    /// Append a relative child path.
    pub fn join(&self, child: impl AsRef<str>) -> Self {
        if self.is_empty() {
            return normalize(child.as_ref());
        }
        normalize(&format!("{}/{}", self.0, child.as_ref()))
    }

    /// Backslash-separated form, as stored inside game meshes.
    pub fn to_game_string(&self) -> String {
        self.0.replace('/', "\\")
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VirtualPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for VirtualPath {
    fn from(s: String) -> Self {
        normalize(&s)
    }
}

impl From<&str> for VirtualPath {
    fn from(s: &str) -> Self {
        normalize(s)
    }
}

impl From<VirtualPath> for String {
    fn from(p: VirtualPath) -> Self {
        p.0
    }
}

/// Case-fold and separator-normalize a raw path.
pub fn normalize(path: &str) -> VirtualPath {
    let lowered = path.to_lowercase();
    let mut parts: Vec<&str> = Vec::new();

    for part in lowered.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            // Drop a drive prefix so the result is always relative
            p if parts.is_empty() && p.len() == 2 && p.ends_with(':') => continue,
            p => parts.push(p),
        }
    }

    VirtualPath(parts.join("/"))
}

/// Compare two raw paths under virtual path rules.
pub fn equals(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_separators_and_case() {
        let p = normalize("Textures\\Architecture//Rock_N.DDS");
        assert_eq!(p.as_str(), "textures/architecture/rock_n.dds");
    }

    #[test]
    fn test_normalize_strips_root_and_dots() {
        assert_eq!(normalize("/meshes/./rock.nif").as_str(), "meshes/rock.nif");
        assert_eq!(normalize("C:\\meshes\\rock.nif").as_str(), "meshes/rock.nif");
        assert_eq!(normalize("../meshes/a/../rock.nif").as_str(), "meshes/rock.nif");
    }

    #[test]
    fn test_equals_case_variants() {
        assert!(equals("textures\\ROCK.dds", "Textures/rock.DDS"));
        assert!(!equals("textures/rock.dds", "textures/rock_n.dds"));
    }

    #[test]
    fn test_components() {
        let p = VirtualPath::new("textures/rock/rock_n.dds");
        assert_eq!(p.file_name(), "rock_n.dds");
        assert_eq!(p.file_stem(), "rock_n");
        assert_eq!(p.extension(), Some("dds"));
        assert_eq!(p.folder(), "textures/rock");
        assert_eq!(p.without_extension(), "textures/rock/rock_n");
        assert_eq!(p.to_game_string(), "textures\\rock\\rock_n.dds");
    }

    #[test]
    fn test_components_at_root() {
        let p = VirtualPath::new("Skyrim.esm");
        assert_eq!(p.folder(), "");
        assert_eq!(p.file_stem(), "skyrim");
        assert_eq!(p.without_extension(), "skyrim");
    }

    #[test]
    fn test_is_under() {
        let p = VirtualPath::new("textures/pbr/rock.dds");
        assert!(p.is_under("Textures"));
        assert!(p.is_under("textures\\pbr"));
        assert!(!p.is_under("tex"));
        assert!(!p.is_under("textures/pbr/rock.dds"));
    }

    #[test]
    fn test_from_string_normalizes() {
        let p = VirtualPath::from("Meshes\\Rock.NIF".to_string());
        assert_eq!(p.as_str(), "meshes/rock.nif");
        assert_eq!(p.join("..\\Tree.nif").as_str(), "meshes/tree.nif");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_normalize_idempotent(raw in "[a-zA-Z0-9_ .:/\\\\-]{0,48}") {
                let once = normalize(&raw);
                let twice = normalize(once.as_str());
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn test_case_variants_normalize_identically(raw in "[a-zA-Z0-9_/\\\\]{0,48}") {
                prop_assert_eq!(normalize(&raw.to_uppercase()), normalize(&raw.to_lowercase()));
            }
        }
    }
}
