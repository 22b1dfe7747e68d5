//! Mesh container reading, writing and shader editing.
//!
//! [`MeshFile`] is parsed with `binrw`. Shapes expose their lighting shader and
//! texture set through change-tracking setters: every setter reports whether it
//! actually modified the mesh, so callers only write files that changed.

pub mod error;
pub mod flags;
pub mod format;
pub mod slots;

pub use error::{Error, Result};
pub use flags::{flags1, flags2, ShaderType};
pub use format::{
    EffectShader, LightingShader, MeshFile, ShaderBlock, Shape, ShapeKind, SizedString,
    TextureSet, MESH_VERSION,
};
pub use slots::{empty_slots, SlotArray, TextureSlot, NUM_TEXTURE_SLOTS};
