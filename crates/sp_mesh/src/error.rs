use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The mesh bytes were empty.
    #[error("Mesh file is empty")]
    Empty,

    /// The bytes are not a valid mesh container.
    #[error("Failed to parse mesh: {0}")]
    Parse(#[from] binrw::Error),

    /// Writing the mesh back out failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A slot edit was requested on a shape without a texture set.
    #[error("Shape '{0}' has no texture set")]
    NoTextureSet(String),
}
