//! Texture classification and shader patching for game meshes.
//!
//! This crate decides, for every shape of every mesh in a data directory, which
//! shader upgrade to apply and then applies it:
//!
//! - **Configuration**: bundled defaults merged with overlay and user documents
//!   ([`ConfigLoader`])
//! - **Texture classification**: suffix guesses refined by observed slot usage
//!   ([`TextureIndex`])
//! - **Shader families**: PBR, complex material and parallax patchers, evaluated
//!   highest fidelity first ([`PatcherSet`])
//! - **Mod priority**: the winning candidate per shape ([`get_winning_match`])
//! - **Concurrency**: a bounded worker pool with first-error capture ([`TaskRunner`])
//! - **Diff record**: CRC-32 of every mesh written ([`DiffRecord`])
//!
//! # Example
//!
//! ```no_run
//! use sp_patcher::{DiffRecord, PatchOptions, PatchPipeline, DIFF_FILE};
//! use sp_vfs::DataDirectory;
//! use camino::Utf8PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut directory = DataDirectory::new(Utf8PathBuf::from("C:/Games/Skyrim/Data"))?;
//! directory.populate(&[], false)?;
//!
//! let output = Utf8PathBuf::from("C:/Output");
//! let diff = DiffRecord::new();
//! let report = PatchPipeline::new(directory, output.clone())
//!     .with_options(PatchOptions { parallel: true, ..Default::default() })
//!     .with_progress(|p| println!("{:?} {}/{}", p.stage, p.current, p.total))
//!     .run(&diff)?;
//! diff.save(&output.join(DIFF_FILE))?;
//! println!("Patched {} meshes", report.meshes_patched);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diff;
pub mod error;
pub mod image;
pub mod output;
pub mod patchers;
pub mod pipeline;
pub mod priority;
pub mod runner;
pub mod textures;
pub mod user_config;

// Re-export main types
pub use config::{ConfigLoader, PatcherConfig};
pub use diff::{DiffEntry, DiffRecord, DIFF_FILE};
pub use error::{Error, Result};
pub use image::{DdsImageService, ImageInfo, ImageService};
pub use output::{check_output_dir, clean_output_dir, zip_output, OUTPUT_ZIP};
pub use patchers::{PatcherSet, ShaderFamily};
pub use pipeline::{PatchOptions, PatchPipeline, PatchProgress, PatchReport, PatchStage};
pub use priority::{get_winning_match, KeepPriorOrder, ModOrderResolver, ModPriority};
pub use runner::{TaskOutcome, TaskRunner, TaskTracker};
pub use textures::{TextureIndex, TextureType};
pub use user_config::{UserConfig, USER_CONFIG_FILE};
