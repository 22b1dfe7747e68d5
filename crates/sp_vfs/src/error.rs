//! Error types for overlay filesystem operations.
//!
//! All fallible functions in this crate return [`Result<T>`], which uses [`Error`]
//! as the error type. External error types (`std::io::Error`, zip, INI, glob errors)
//! are automatically converted via `From` impls.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::vpath::VirtualPath;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or reading the overlay.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem I/O failed (walking the data dir, reading loose files, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An archive container could not be opened or one of its entries read.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// An INI file could not be parsed.
    #[error("INI error: {0}")]
    Ini(#[from] ini::Error),

    /// A configured allow/deny pattern is not a valid glob.
    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    /// No file map entry exists for the requested path.
    #[error("File not found in overlay: {0}")]
    NotFound(VirtualPath),

    /// The path resolved to a source, but reading or extracting it failed.
    #[error("Failed to read '{path}': {reason}")]
    ReadFailure { path: VirtualPath, reason: String },

    /// The data directory is missing or not a directory.
    #[error("Invalid data directory: {0}")]
    InvalidDataDir(Utf8PathBuf),

    /// An archive's physical path has no usable file name.
    #[error("Invalid archive path: {0}")]
    InvalidArchive(Utf8PathBuf),

    /// Catch-all for errors from collaborators and other sources.
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
