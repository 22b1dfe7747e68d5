//! Read-only archive containers.
//!
//! The overlay treats every archive as an opaque container keyed by
//! `(folder, filename)`. [`ArchiveReader`] is the seam for container formats; the
//! bundled [`ZipArchiveReader`] reads zip-encoded containers, which is what
//! [`open_archive`] uses for every `.bsa` found in the data directory.

use crate::error::{Error, Result};
use crate::vpath::VirtualPath;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::sync::Mutex;
use zip::ZipArchive;

/// Format version reported by zip-backed archives.
pub const ZIP_FORMAT_VERSION: u32 = 20;

/// Key of a single entry inside an archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveKey {
    /// Normalized folder, e.g. `textures/rock`.
    pub folder: String,
    /// Normalized file name, e.g. `rock_n.dds`.
    pub file: String,
}

impl ArchiveKey {
    pub fn from_path(path: &VirtualPath) -> Self {
        Self {
            folder: path.folder().to_string(),
            file: path.file_name().to_string(),
        }
    }

    pub fn to_path(&self) -> VirtualPath {
        VirtualPath::new(&self.folder).join(&self.file)
    }
}

/// Random-access extraction from one archive container.
///
/// Implementations must be shareable across worker threads: the overlay hands
/// out `Arc<ArchiveDescriptor>` references to every file map entry.
pub trait ArchiveReader: Send + Sync {
    /// Declared format version of the container.
    fn format_version(&self) -> u32;

    /// Every file entry in the archive.
    fn entries(&self) -> Vec<ArchiveKey>;

    /// Extract the bytes of one entry.
    fn extract(&self, key: &ArchiveKey) -> Result<Vec<u8>>;
}

/// Identity and handle of one loaded archive.
pub struct ArchiveDescriptor {
    path: Utf8PathBuf,
    name: String,
    version: u32,
    reader: Box<dyn ArchiveReader>,
}

impl ArchiveDescriptor {
    /// Wrap a reader for the archive at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Physical location of the archive
    /// * `reader` - Container backend used for extraction
    pub fn new(path: Utf8PathBuf, reader: Box<dyn ArchiveReader>) -> Result<Self> {
        let name = path
            .file_name()
            .ok_or_else(|| Error::InvalidArchive(path.clone()))?
            .to_string();
        let version = reader.format_version();
        Ok(Self {
            path,
            name,
            version,
            reader,
        })
    }

    /// Physical path on disk.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// File name as it appears in the data directory (original case).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn entries(&self) -> Vec<ArchiveKey> {
        self.reader.entries()
    }

    pub fn extract(&self, key: &ArchiveKey) -> Result<Vec<u8>> {
        self.reader.extract(key)
    }
}

impl std::fmt::Debug for ArchiveDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveDescriptor")
            .field("path", &self.path)
            .field("version", &self.version)
            .finish()
    }
}

/// Zip-encoded archive container.
///
/// Entry names are indexed by their normalized virtual path so lookups are
/// case-insensitive. `ZipArchive` needs `&mut` access to read, so the handle is
/// kept behind a mutex; extraction from the same archive is serialized.
pub struct ZipArchiveReader {
    archive: Mutex<ZipArchive<BufReader<File>>>,
    index: HashMap<ArchiveKey, usize>,
}

impl ZipArchiveReader {
    pub fn open(path: &Utf8Path) -> Result<Self> {
        let file = File::open(path.as_std_path())?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let mut index = HashMap::new();
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let vpath = VirtualPath::new(entry.name());
            if vpath.is_empty() {
                continue;
            }
            index.insert(ArchiveKey::from_path(&vpath), i);
        }

        tracing::debug!("Indexed {} entries in archive {}", index.len(), path);

        Ok(Self {
            archive: Mutex::new(archive),
            index,
        })
    }
}

impl ArchiveReader for ZipArchiveReader {
    fn format_version(&self) -> u32 {
        ZIP_FORMAT_VERSION
    }

    fn entries(&self) -> Vec<ArchiveKey> {
        self.index.keys().cloned().collect()
    }

    fn extract(&self, key: &ArchiveKey) -> Result<Vec<u8>> {
        let idx = *self
            .index
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_path()))?;

        let mut archive = self
            .archive
            .lock()
            .map_err(|_| Error::Other("archive handle poisoned".to_string()))?;
        let mut entry = archive.by_index(idx)?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Open an archive from the data directory with the default container backend.
pub fn open_archive(path: &Utf8Path) -> Result<ArchiveDescriptor> {
    let reader = ZipArchiveReader::open(path)?;
    ArchiveDescriptor::new(path.to_path_buf(), Box::new(reader))
}
