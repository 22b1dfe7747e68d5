//! Overlay filesystem over game archives and loose files.
//!
//! This crate exposes a game's asset universe as one read-only namespace:
//!
//! - **Virtual paths**: case-insensitive, separator-normalized keys ([`VirtualPath`])
//! - **Archive overlay**: packed archives mounted in load order, loose files on top
//!   ([`DataDirectory`])
//! - **Load order**: archive ordering derived from INI declarations and active
//!   plugins ([`resolve_archive_order`])
//! - **Mod attribution**: which mod a deployed file came from ([`ModManagerDirectory`])
//!
//! # Example
//!
//! ```no_run
//! use sp_vfs::{DataDirectory, FileFilter, GameInstall, GameType, VirtualPath};
//! use camino::Utf8PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let game = GameInstall::locate(GameType::SkyrimSE, &Utf8PathBuf::from("C:/Games/Skyrim"))?;
//!
//! let ini_archives = sp_vfs::read_ini_archives(&game.ini_paths())?;
//! let plugins = match game.plugins_txt() {
//!     Some(path) => sp_vfs::read_active_plugins(&path)?,
//!     None => Vec::new(),
//! };
//!
//! let mut dir = DataDirectory::new(game.data_dir().to_path_buf())?;
//! let order = sp_vfs::resolve_archive_order(&dir.list_data_archives()?, &ini_archives, &plugins);
//! dir.populate(&order, true)?;
//!
//! let textures = dir.find_files(&FileFilter::new(&["textures/*.dds"], &[], &[])?);
//! println!("{} textures", textures.len());
//! let bytes = dir.get_file(&VirtualPath::new("meshes/rock.nif"))?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod directory;
pub mod error;
pub mod game;
pub mod load_order;
pub mod mod_manager;
pub mod vpath;

// Re-export main types
pub use archive::{open_archive, ArchiveDescriptor, ArchiveKey, ArchiveReader, ZipArchiveReader};
pub use directory::{DataDirectory, FileFilter, FileMapEntry, FileSource};
pub use error::{Error, Result};
pub use game::{GameInstall, GameType};
pub use load_order::{
    find_archives_for_plugin, read_active_plugins, read_ini_archives, resolve_archive_order,
};
pub use mod_manager::ModManagerDirectory;
pub use vpath::VirtualPath;
