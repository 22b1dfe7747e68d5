//! Checksums of every mesh written by a run.

use crate::error::Result;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// File name of the diff record inside the output directory.
pub const DIFF_FILE: &str = "ShaderPatcher_Diff.json";

/// CRC-32 of a mesh before and after patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub crc32original: u32,
    pub crc32patched: u32,
}

impl DiffEntry {
    pub fn new(original: &[u8], patched: &[u8]) -> Self {
        Self {
            crc32original: crc32fast::hash(original),
            crc32patched: crc32fast::hash(patched),
        }
    }
}

/// Mesh path to checksums, shared between mesh tasks.
///
/// Keys are sorted, so the saved record does not depend on task order.
#[derive(Debug, Default)]
pub struct DiffRecord {
    entries: Mutex<BTreeMap<String, DiffEntry>>,
}

impl DiffRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the entries.
    pub fn update<R>(&self, f: impl FnOnce(&mut BTreeMap<String, DiffEntry>) -> R) -> R {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut entries)
    }

    pub fn record(&self, mesh: &str, original: &[u8], patched: &[u8]) {
        let entry = DiffEntry::new(original, patched);
        self.update(|entries| {
            entries.insert(mesh.to_string(), entry);
        });
    }

    pub fn len(&self) -> usize {
        self.update(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> BTreeMap<String, DiffEntry> {
        self.update(|entries| entries.clone())
    }

    /// Save as pretty JSON, creating parent directories if needed.
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent.as_std_path())?;
        }
        let contents = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path.as_std_path(), contents)?;
        tracing::info!("Saved diff record with {} meshes to {}", self.len(), path);
        Ok(())
    }
}
