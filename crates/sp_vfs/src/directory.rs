//! The archive overlay filesystem.
//!
//! A [`DataDirectory`] merges the game's packed archives and its loose files into
//! a single read-only namespace keyed by [`VirtualPath`].
//!
//! # Population Algorithm
//!
//! 1. Clear the file map.
//! 2. If archives are included, walk the archive priority list from lowest to
//!    highest priority. Every entry whose extension is not blocklisted is inserted,
//!    overwriting whatever an earlier (lower priority) archive put there. The last
//!    archive in the list therefore wins a conflict between archives.
//! 3. Walk the data directory recursively and insert every loose file. Loose files
//!    are inserted after all archives, so a loose file always shadows an archived
//!    file at the same virtual path.
//!
//! After population the table is never mutated again and lookups are safe from
//! any number of threads. Files produced during a run (for example textures
//! generated by a shader transform) live in a separate, lock-guarded table.

use crate::archive::{open_archive, ArchiveDescriptor, ArchiveKey};
use crate::error::{Error, Result};
use crate::vpath::VirtualPath;
use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use walkdir::WalkDir;

/// Extensions never added to the file map: archive containers and plugin files.
pub const EXTENSION_BLOCKLIST: &[&str] = &["bsa", "esp", "esl", "esm"];

/// Archive file extension looked up in the data directory.
pub const ARCHIVE_EXTENSION: &str = "bsa";

/// Where the bytes of a virtual file come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// A physical file in the data directory.
    Loose(Utf8PathBuf),
    /// An entry inside a packed archive.
    Archived {
        archive: Arc<ArchiveDescriptor>,
        key: ArchiveKey,
    },
}

/// One entry of the overlay's file map.
#[derive(Debug, Clone)]
pub struct FileMapEntry {
    pub source: FileSource,
}

#[derive(Debug, Clone)]
struct GeneratedEntry {
    physical: Utf8PathBuf,
    owner: Option<String>,
}

/// Allow/deny rules for [`DataDirectory::find_files`].
///
/// Patterns are globs matched case-insensitively against the normalized virtual
/// path. An empty allow list allows everything.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    allow: Vec<Pattern>,
    deny: Vec<Pattern>,
    archive_deny: Vec<Pattern>,
}

impl FileFilter {
    /// Compile a filter from raw glob strings.
    ///
    /// # Arguments
    ///
    /// * `allow` - Paths must match at least one of these (if any are given)
    /// * `deny` - Paths matching any of these are excluded
    /// * `archive_deny` - Archived paths are excluded when their archive's file name matches
    pub fn new<S: AsRef<str>>(allow: &[S], deny: &[S], archive_deny: &[S]) -> Result<Self> {
        Ok(Self {
            allow: compile_patterns(allow)?,
            deny: compile_patterns(deny)?,
            archive_deny: compile_patterns(archive_deny)?,
        })
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    /// A filter that only rejects paths matching `deny`.
    pub fn denying<S: AsRef<str>>(deny: &[S]) -> Result<Self> {
        Ok(Self {
            deny: compile_patterns(deny)?,
            ..Self::default()
        })
    }

    /// Whether a path hits the deny list, regardless of the allow list.
    pub fn denies_path(&self, path: &VirtualPath) -> bool {
        self.deny.iter().any(|p| matches_glob(p, path.as_str()))
    }

    /// Check a path against the allow and deny lists only.
    pub fn matches_path(&self, path: &VirtualPath) -> bool {
        if self.denies_path(path) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|p| matches_glob(p, path.as_str()))
    }

    /// Check an archive file name against the archive deny list.
    pub fn denies_archive(&self, archive_name: &str) -> bool {
        let name = archive_name.to_lowercase();
        self.archive_deny.iter().any(|p| matches_glob(p, &name))
    }
}

fn compile_patterns<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Pattern>> {
    raw.iter()
        .map(|s| Pattern::new(&s.as_ref().replace('\\', "/").to_lowercase()).map_err(Error::from))
        .collect()
}

fn matches_glob(pattern: &Pattern, candidate: &str) -> bool {
    pattern.matches_with(
        candidate,
        MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        },
    )
}

/// Overlay of archives and loose files rooted at a game's data directory.
pub struct DataDirectory {
    data_dir: Utf8PathBuf,
    archives: Vec<Arc<ArchiveDescriptor>>,
    file_map: HashMap<VirtualPath, FileMapEntry>,
    owners: HashMap<VirtualPath, String>,
    generated_dir: Option<Utf8PathBuf>,
    generated: RwLock<HashMap<VirtualPath, GeneratedEntry>>,
}

impl DataDirectory {
    /// Create an empty overlay for a data directory.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - The game's `Data` directory. Must exist.
    pub fn new(data_dir: Utf8PathBuf) -> Result<Self> {
        if !data_dir.as_std_path().is_dir() {
            return Err(Error::InvalidDataDir(data_dir));
        }

        Ok(Self {
            data_dir,
            archives: Vec::new(),
            file_map: HashMap::new(),
            owners: HashMap::new(),
            generated_dir: None,
            generated: RwLock::new(HashMap::new()),
        })
    }

    /// Set the directory generated files are written to.
    pub fn with_generated_dir(mut self, dir: Utf8PathBuf) -> Self {
        self.generated_dir = Some(dir);
        self
    }

    /// Attach virtual path -> owning mod attribution (see [`crate::ModManagerDirectory`]).
    pub fn set_owners(&mut self, owners: HashMap<VirtualPath, String>) {
        self.owners = owners;
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn generated_dir(&self) -> Option<&Utf8Path> {
        self.generated_dir.as_deref()
    }

    /// Archives mounted by the last [`populate`](Self::populate), lowest priority first.
    pub fn archives(&self) -> &[Arc<ArchiveDescriptor>] {
        &self.archives
    }

    /// Archive files (`*.bsa`) present at the top level of the data directory.
    pub fn list_data_archives(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.data_dir.as_std_path())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(n) => n,
                Err(n) => {
                    tracing::warn!("Skipping non-UTF-8 archive name: {:?}", n);
                    continue;
                }
            };
            if has_extension(&name, ARCHIVE_EXTENSION) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Rebuild the file map.
    ///
    /// See the module-level docs for the population order.
    ///
    /// # Arguments
    ///
    /// * `archive_order` - Archive file names, lowest priority first
    /// * `include_archives` - Whether archives are mounted at all
    pub fn populate(&mut self, archive_order: &[String], include_archives: bool) -> Result<()> {
        self.file_map.clear();
        self.archives.clear();

        if include_archives {
            self.add_archives(archive_order)?;
        }

        let archived = self.file_map.len();
        self.add_loose_files()?;

        tracing::info!(
            "Overlay populated: {} files ({} from {} archives, {} loose overrides/additions)",
            self.file_map.len(),
            archived,
            self.archives.len(),
            self.file_map
                .values()
                .filter(|e| matches!(e.source, FileSource::Loose(_)))
                .count()
        );

        Ok(())
    }

    fn add_archives(&mut self, archive_order: &[String]) -> Result<()> {
        let on_disk: HashMap<String, String> = self
            .list_data_archives()?
            .into_iter()
            .map(|name| (name.to_lowercase(), name))
            .collect();

        for requested in archive_order {
            let Some(actual) = on_disk.get(&requested.to_lowercase()) else {
                tracing::warn!("Archive '{}' is in the load order but not in the data directory", requested);
                continue;
            };

            let path = self.data_dir.join(actual);
            let archive = match open_archive(&path) {
                Ok(a) => Arc::new(a),
                Err(e) => {
                    tracing::error!("Failed to open archive '{}': {}", path, e);
                    continue;
                }
            };

            let mut added = 0;
            for key in archive.entries() {
                let vpath = key.to_path();
                if is_blocklisted(&vpath) {
                    continue;
                }
                let entry = FileMapEntry {
                    source: FileSource::Archived {
                        archive: Arc::clone(&archive),
                        key,
                    },
                };
                if let Some(previous) = self.file_map.insert(vpath.clone(), entry) {
                    if let FileSource::Archived { archive: prev, .. } = previous.source {
                        tracing::trace!("{} overridden: {} -> {}", vpath, prev.name(), archive.name());
                    }
                }
                added += 1;
            }

            tracing::debug!("Mounted archive {} ({} files)", archive.name(), added);
            self.archives.push(archive);
        }

        Ok(())
    }

    /// Recursively walk the data directory and overlay every loose file.
    fn add_loose_files(&mut self) -> Result<()> {
        // follow symlinked folders
        let walker = WalkDir::new(self.data_dir.as_std_path())
            .min_depth(1)
            .follow_links(true);

        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = match Utf8PathBuf::from_path_buf(entry.path().to_path_buf()) {
                Ok(p) => p,
                Err(p) => {
                    tracing::warn!("Skipping non-UTF-8 path: {}", p.display());
                    continue;
                }
            };

            let Ok(relative) = path.strip_prefix(&self.data_dir) else {
                continue;
            };
            let vpath = VirtualPath::new(relative.as_str());
            if is_blocklisted(&vpath) {
                continue;
            }

            self.file_map.insert(
                vpath,
                FileMapEntry {
                    source: FileSource::Loose(path),
                },
            );
        }

        Ok(())
    }

    /// Read a file's bytes from whichever source answers its path.
    pub fn get_file(&self, path: &VirtualPath) -> Result<Vec<u8>> {
        if let Some(physical) = self.generated_physical(path) {
            return std::fs::read(physical.as_std_path()).map_err(|e| Error::ReadFailure {
                path: path.clone(),
                reason: e.to_string(),
            });
        }

        let entry = self
            .file_map
            .get(path)
            .ok_or_else(|| Error::NotFound(path.clone()))?;

        match &entry.source {
            FileSource::Loose(physical) => {
                std::fs::read(physical.as_std_path()).map_err(|e| Error::ReadFailure {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            }
            FileSource::Archived { archive, key } => {
                archive.extract(key).map_err(|e| Error::ReadFailure {
                    path: path.clone(),
                    reason: format!("{} (archive {})", e, archive.name()),
                })
            }
        }
    }

    pub fn get_entry(&self, path: &VirtualPath) -> Option<&FileMapEntry> {
        self.file_map.get(path)
    }

    pub fn is_file(&self, path: &VirtualPath) -> bool {
        self.file_map.contains_key(path) || self.is_generated(path)
    }

    pub fn is_loose_file(&self, path: &VirtualPath) -> bool {
        matches!(
            self.file_map.get(path).map(|e| &e.source),
            Some(FileSource::Loose(_))
        )
    }

    pub fn is_archived_file(&self, path: &VirtualPath) -> bool {
        matches!(
            self.file_map.get(path).map(|e| &e.source),
            Some(FileSource::Archived { .. })
        )
    }

    /// Name of the archive a path resolves into, if it is archived.
    pub fn archive_of(&self, path: &VirtualPath) -> Option<&str> {
        match self.file_map.get(path).map(|e| &e.source) {
            Some(FileSource::Archived { archive, .. }) => Some(archive.name()),
            _ => None,
        }
    }

    /// Enumerate every mapped path accepted by `filter`.
    ///
    /// Deny rules take precedence over allow rules; an archived path is also
    /// excluded when its archive's file name matches an archive-deny rule.
    pub fn find_files(&self, filter: &FileFilter) -> BTreeSet<VirtualPath> {
        self.file_map
            .iter()
            .filter(|(path, entry)| {
                if !filter.matches_path(path) {
                    return false;
                }
                match &entry.source {
                    FileSource::Archived { archive, .. } => !filter.denies_archive(archive.name()),
                    FileSource::Loose(_) => true,
                }
            })
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Mod owning a path, if known.
    ///
    /// Archived files are attributed to the mod owning their archive; generated
    /// files keep the owner they were registered with.
    pub fn get_mod(&self, path: &VirtualPath) -> Option<String> {
        if let Ok(generated) = self.generated.read() {
            if let Some(entry) = generated.get(path) {
                return entry.owner.clone();
            }
        }

        match self.file_map.get(path).map(|e| &e.source) {
            Some(FileSource::Archived { archive, .. }) => {
                self.owners.get(&VirtualPath::new(archive.name())).cloned()
            }
            Some(FileSource::Loose(_)) => self.owners.get(path).cloned(),
            None => None,
        }
    }

    /// Register a file written by this run under the generated directory.
    ///
    /// # Arguments
    ///
    /// * `path` - Virtual path of the new file
    /// * `owner` - Mod the file is attributed to (usually the owner of its source)
    pub fn add_generated_file(&self, path: VirtualPath, owner: Option<String>) -> Result<()> {
        let root = self
            .generated_dir
            .as_ref()
            .ok_or_else(|| Error::Other("no generated directory configured".to_string()))?;
        let physical = root.join(path.as_str());

        let mut generated = self
            .generated
            .write()
            .map_err(|_| Error::Other("generated file table poisoned".to_string()))?;
        generated.insert(path, GeneratedEntry { physical, owner });
        Ok(())
    }

    pub fn is_generated(&self, path: &VirtualPath) -> bool {
        self.generated
            .read()
            .map(|g| g.contains_key(path))
            .unwrap_or(false)
    }

    /// Physical path a generated file is (or will be) written to.
    pub fn generated_path(&self, path: &VirtualPath) -> Option<Utf8PathBuf> {
        self.generated_dir.as_ref().map(|root| root.join(path.as_str()))
    }

    fn generated_physical(&self, path: &VirtualPath) -> Option<Utf8PathBuf> {
        self.generated
            .read()
            .ok()
            .and_then(|g| g.get(path).map(|e| e.physical.clone()))
    }

    /// Number of mapped (non-generated) files.
    pub fn len(&self) -> usize {
        self.file_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_map.is_empty()
    }
}

fn is_blocklisted(path: &VirtualPath) -> bool {
    path.extension()
        .is_some_and(|ext| EXTENSION_BLOCKLIST.contains(&ext))
}

fn has_extension(name: &str, ext: &str) -> bool {
    VirtualPath::new(name).extension() == Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_test_archive;

    fn setup() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    fn write_loose(root: &Utf8Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
        std::fs::write(path.as_std_path(), bytes).unwrap();
    }

    #[test]
    fn test_new_rejects_missing_dir() {
        let (_temp, root) = setup();
        let missing = root.join("nope");
        assert!(matches!(DataDirectory::new(missing), Err(Error::InvalidDataDir(_))));
    }

    #[test]
    fn test_loose_file_wins_over_archive() {
        let (_temp, root) = setup();
        write_test_archive(&root.join("Mod.bsa"), &[("textures/rock.dds", b"archived")]);
        write_loose(&root, "Textures/Rock.dds", b"loose");

        let mut dir = DataDirectory::new(root).unwrap();
        dir.populate(&["Mod.bsa".to_string()], true).unwrap();

        let path = VirtualPath::new("textures/rock.dds");
        assert_eq!(dir.get_file(&path).unwrap(), b"loose");
        assert!(dir.is_loose_file(&path));
        assert!(!dir.is_archived_file(&path));
    }

    #[cfg(unix)]
    #[test]
    fn test_loose_files_follow_symlinked_folders() {
        let (_temp, root) = setup();
        let data = root.join("data");
        let linked = root.join("linked");
        write_loose(&data, "meshes/rock.nif", b"rock");
        write_loose(&linked, "cliff.dds", b"cliff");
        std::os::unix::fs::symlink(linked.as_std_path(), data.join("textures").as_std_path())
            .unwrap();

        let mut dir = DataDirectory::new(data).unwrap();
        dir.populate(&[], false).unwrap();

        let path = VirtualPath::new("textures/cliff.dds");
        assert!(dir.is_loose_file(&path));
        assert_eq!(dir.get_file(&path).unwrap(), b"cliff");
        assert!(dir.is_loose_file(&VirtualPath::new("meshes/rock.nif")));
    }

    #[test]
    fn test_last_archive_in_order_wins() {
        let (_temp, root) = setup();
        write_test_archive(&root.join("Low.bsa"), &[("textures/a.dds", b"low")]);
        write_test_archive(&root.join("High.bsa"), &[("textures/a.dds", b"high")]);

        let mut dir = DataDirectory::new(root).unwrap();
        dir.populate(&["Low.bsa".to_string(), "High.bsa".to_string()], true)
            .unwrap();

        let path = VirtualPath::new("textures/a.dds");
        assert_eq!(dir.get_file(&path).unwrap(), b"high");
        assert_eq!(dir.archive_of(&path), Some("High.bsa"));
    }

    #[test]
    fn test_populate_without_archives() {
        let (_temp, root) = setup();
        write_test_archive(&root.join("Mod.bsa"), &[("textures/a.dds", b"a")]);
        write_loose(&root, "meshes/b.nif", b"b");

        let mut dir = DataDirectory::new(root).unwrap();
        dir.populate(&["Mod.bsa".to_string()], false).unwrap();

        assert!(!dir.is_file(&VirtualPath::new("textures/a.dds")));
        assert!(dir.is_file(&VirtualPath::new("meshes/b.nif")));
        assert!(dir.archives().is_empty());
    }

    #[test]
    fn test_blocklisted_extensions_skipped() {
        let (_temp, root) = setup();
        write_test_archive(&root.join("Mod.bsa"), &[("nested.esp", b"x")]);
        write_loose(&root, "Skyrim.esm", b"plugin");
        write_loose(&root, "textures/a.dds", b"a");

        let mut dir = DataDirectory::new(root).unwrap();
        dir.populate(&["mod.bsa".to_string()], true).unwrap();

        assert!(!dir.is_file(&VirtualPath::new("skyrim.esm")));
        assert!(!dir.is_file(&VirtualPath::new("mod.bsa")));
        assert!(!dir.is_file(&VirtualPath::new("nested.esp")));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_get_file_not_found() {
        let (_temp, root) = setup();
        let mut dir = DataDirectory::new(root).unwrap();
        dir.populate(&[], true).unwrap();

        let err = dir.get_file(&VirtualPath::new("textures/missing.dds")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_get_file_read_failure_when_loose_file_removed() {
        let (_temp, root) = setup();
        write_loose(&root, "textures/a.dds", b"a");
        let mut dir = DataDirectory::new(root.clone()).unwrap();
        dir.populate(&[], true).unwrap();

        std::fs::remove_file(root.join("textures/a.dds").as_std_path()).unwrap();
        let err = dir.get_file(&VirtualPath::new("textures/a.dds")).unwrap_err();
        assert!(matches!(err, Error::ReadFailure { .. }));
    }

    #[test]
    fn test_find_files_deny_beats_allow() {
        let (_temp, root) = setup();
        write_loose(&root, "textures/rock.dds", b"");
        write_loose(&root, "textures/lod/rock.dds", b"");
        write_loose(&root, "meshes/rock.nif", b"");

        let mut dir = DataDirectory::new(root).unwrap();
        dir.populate(&[], true).unwrap();

        let filter = FileFilter::new(&["textures/*.dds"], &["textures/lod/*"], &[]).unwrap();
        let found = dir.find_files(&filter);
        assert_eq!(found.len(), 1);
        assert!(found.contains(&VirtualPath::new("textures/rock.dds")));
    }

    #[test]
    fn test_find_files_archive_deny() {
        let (_temp, root) = setup();
        write_test_archive(&root.join("Skyrim - Textures0.bsa"), &[("textures/a.dds", b"")]);
        write_test_archive(&root.join("MyMod.bsa"), &[("textures/b.dds", b"")]);
        write_loose(&root, "textures/c.dds", b"");

        let mut dir = DataDirectory::new(root).unwrap();
        dir.populate(
            &["Skyrim - Textures0.bsa".to_string(), "MyMod.bsa".to_string()],
            true,
        )
        .unwrap();

        let filter = FileFilter::new(&["textures/*"], &[], &["skyrim - *.bsa"]).unwrap();
        let found = dir.find_files(&filter);
        assert!(!found.contains(&VirtualPath::new("textures/a.dds")));
        assert!(found.contains(&VirtualPath::new("textures/b.dds")));
        assert!(found.contains(&VirtualPath::new("textures/c.dds")));
    }

    #[test]
    fn test_generated_files_and_owners() {
        let (_temp, root) = setup();
        let data = root.join("data");
        let out = root.join("out");
        std::fs::create_dir_all(data.as_std_path()).unwrap();
        write_loose(&data, "textures/rock_p.dds", b"height");
        write_test_archive(&data.join("Mod.bsa"), &[("textures/tree.dds", b"")]);

        let mut dir = DataDirectory::new(data).unwrap().with_generated_dir(out.clone());
        dir.populate(&["Mod.bsa".to_string()], true).unwrap();

        let mut owners = HashMap::new();
        owners.insert(VirtualPath::new("textures/rock_p.dds"), "Rocks".to_string());
        owners.insert(VirtualPath::new("mod.bsa"), "Trees".to_string());
        dir.set_owners(owners);

        assert_eq!(dir.get_mod(&VirtualPath::new("textures/rock_p.dds")).as_deref(), Some("Rocks"));
        assert_eq!(dir.get_mod(&VirtualPath::new("textures/tree.dds")).as_deref(), Some("Trees"));

        let generated = VirtualPath::new("textures/rock_m.dds");
        write_loose(&out, "textures/rock_m.dds", b"cm");
        dir.add_generated_file(generated.clone(), Some("Rocks".to_string()))
            .unwrap();

        assert!(dir.is_file(&generated));
        assert!(dir.is_generated(&generated));
        assert_eq!(dir.get_file(&generated).unwrap(), b"cm");
        assert_eq!(dir.get_mod(&generated).as_deref(), Some("Rocks"));
    }

    #[test]
    fn test_missing_archive_in_order_is_skipped() {
        let (_temp, root) = setup();
        let mut dir = DataDirectory::new(root).unwrap();
        dir.populate(&["Ghost.bsa".to_string()], true).unwrap();
        assert!(dir.archives().is_empty());
    }
}
