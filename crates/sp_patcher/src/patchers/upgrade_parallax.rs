use super::{PatcherContext, PatcherMatch, ShaderFamily, ShaderTransform};
use crate::error::{Error, Result};
use crate::textures::{TextureSlotEntry, TextureType};
use sp_mesh::TextureSlot;
use sp_vfs::VirtualPath;
use std::sync::Mutex;

/// Turns a parallax height match into a generated complex material mask.
///
/// The mask is written once per height map; later shapes reuse it.
#[derive(Debug, Default)]
pub struct UpgradeParallaxToComplexMaterial {
    lock: Mutex<()>,
}

impl UpgradeParallaxToComplexMaterial {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShaderTransform for UpgradeParallaxToComplexMaterial {
    fn from_family(&self) -> ShaderFamily {
        ShaderFamily::VanillaParallax
    }

    fn to_family(&self) -> ShaderFamily {
        ShaderFamily::ComplexMaterial
    }

    fn transform(&self, ctx: &PatcherContext<'_>, matched: &PatcherMatch) -> Result<PatcherMatch> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::Other("upgrade lock poisoned".to_string()))?;

        let height = &matched.matched_path;
        let base = ctx.textures.texture_base(height);
        let complex = VirtualPath::new(format!("{}_m.dds", base));

        let mut result = matched.clone();
        result.matched_path = complex.clone();
        if ctx.directory.is_generated(&complex) {
            return Ok(result);
        }

        let env_mask = ctx
            .textures
            .find(TextureSlot::EnvMask, &base, TextureType::EnvironmentMask)
            .map(|entry| ctx.directory.get_file(&entry.path))
            .transpose()?;
        let height_bytes = ctx.directory.get_file(height)?;
        let generated = ctx
            .images
            .upgrade_height_to_complex_material(&height_bytes, env_mask.as_deref())?;

        let output = ctx
            .directory
            .generated_path(&complex)
            .ok_or_else(|| Error::Other("no generated output directory".to_string()))?;
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&output, generated)?;

        ctx.directory
            .add_generated_file(complex.clone(), ctx.directory.get_mod(height))?;
        ctx.textures.insert(TextureSlotEntry {
            path: complex.clone(),
            texture_type: TextureType::ComplexMaterial,
            base,
        })?;

        tracing::debug!("Generated complex material map: {}", complex);
        Ok(result)
    }
}
