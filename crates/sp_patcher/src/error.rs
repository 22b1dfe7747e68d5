//! Error types for patching operations.
//!
//! All fallible functions in this crate return [`Result<T>`]. Errors from the
//! overlay filesystem, the mesh format, JSON, zip and the filesystem convert
//! automatically via `From` impls.
//!
//! A shape that no patcher can handle is not an error: patchers report that as an
//! empty match list.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem I/O failed while writing output. Aborts the run.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or serialize JSON (configuration, diff record, user state).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the overlay filesystem.
    #[error("Filesystem error: {0}")]
    Vfs(#[from] sp_vfs::Error),

    /// A mesh could not be parsed or written.
    #[error("Mesh error: {0}")]
    Mesh(#[from] sp_mesh::Error),

    /// Writing the output archive failed.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Merged configuration does not match the expected schema.
    #[error("Invalid configuration: {0}")]
    ValidationFailure(String),

    /// The mesh output file already exists; two tasks would write the same path.
    #[error("Output already exists: {0}")]
    OutputExists(Utf8PathBuf),

    /// Output directory is the data directory or inside it.
    #[error("Output directory {output} must not be inside the data directory {data}")]
    OutputInsideData {
        output: Utf8PathBuf,
        data: Utf8PathBuf,
    },

    /// Output directory contains files this tool did not create.
    #[error("Refusing to clean output directory {dir}: unexpected entry '{entry}'")]
    UnsafeOutputDir { dir: Utf8PathBuf, entry: String },

    /// The image service cannot perform the requested operation.
    #[error("Image operation unsupported: {0}")]
    ImageUnsupported(String),

    /// An image header could not be decoded.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// A task panicked inside the runner.
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// Catch-all for errors from collaborators and other sources.
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
