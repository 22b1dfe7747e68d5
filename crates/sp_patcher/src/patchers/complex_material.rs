use super::{order_current_last, MeshInfo, PatcherContext, PatcherMatch, ShaderFamily, ShaderPatcher};
use crate::error::{Error, Result};
use crate::textures::TextureType;
use sp_mesh::{flags1, flags2, ShaderType, Shape, TextureSlot};
use sp_vfs::VirtualPath;

/// Cubemap assigned to complex material shapes so the mask drives reflections.
pub const DYNAMIC_CUBEMAP: &str = "textures\\cubemaps\\dynamic1pxcubemap_black.dds";

/// Family option that converts multilayer parallax shapes instead of skipping them.
pub const DISABLE_MLP_OPTION: &str = "disable_mlp";

/// Environment-map shader driven by a complex material mask in slot 5.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexMaterialPatcher;

impl ComplexMaterialPatcher {
    fn disable_mlp(ctx: &PatcherContext<'_>) -> bool {
        ctx.family_config(ShaderFamily::ComplexMaterial)
            .has_option(DISABLE_MLP_OPTION)
    }
}

impl ShaderPatcher for ComplexMaterialPatcher {
    fn family(&self) -> ShaderFamily {
        ShaderFamily::ComplexMaterial
    }

    fn can_apply(&self, ctx: &PatcherContext<'_>, _mesh: &MeshInfo<'_>, shape: &Shape) -> bool {
        let Some(shader) = shape.lighting() else {
            return false;
        };
        let is_mlp = shader.shader_type() == ShaderType::MultiLayerParallax;
        let supported = matches!(
            shader.shader_type(),
            ShaderType::Default | ShaderType::EnvironmentMap | ShaderType::Parallax
        ) || (is_mlp && Self::disable_mlp(ctx));
        if !supported {
            tracing::trace!("Complex Material: unsupported shader type {:?}", shader.shader_type());
            return false;
        }

        if !is_mlp {
            let slots = shape.texture_slots();
            let occupied = [TextureSlot::Glow, TextureSlot::Multilayer, TextureSlot::Backlight]
                .into_iter()
                .find(|s| !slots[s.index()].is_empty());
            if let Some(slot) = occupied {
                tracing::trace!("Complex Material: {} slot is in use", slot);
                return false;
            }
        }
        true
    }

    fn should_apply(
        &self,
        ctx: &PatcherContext<'_>,
        _mesh: &MeshInfo<'_>,
        shape: &Shape,
    ) -> Vec<PatcherMatch> {
        let slots = shape.texture_slots();
        let diffuse = &slots[TextureSlot::Diffuse.index()];
        if !ctx.slot_exists(diffuse) {
            return Vec::new();
        }
        let diffuse = VirtualPath::new(diffuse);

        let mut matches: Vec<PatcherMatch> = Vec::new();
        for slot in ctx.family_config(ShaderFamily::ComplexMaterial).lookup_slots() {
            let raw = &slots[slot.index()];
            if !ctx.slot_exists(raw) {
                continue;
            }
            let base = ctx.textures.texture_base(&VirtualPath::new(raw));
            let Some(entry) =
                ctx.textures
                    .find(TextureSlot::EnvMask, &base, TextureType::ComplexMaterial)
            else {
                continue;
            };

            if let Some(existing) = matches.iter_mut().find(|m| m.matched_path == entry.path) {
                existing.matched_from.insert(slot);
                continue;
            }
            if !ctx.aspect_ratio_matches(&entry.path, &diffuse) {
                tracing::trace!("Complex Material: aspect ratio mismatch for {}", entry.path);
                continue;
            }
            matches.push(PatcherMatch::new(entry.path, slot));
        }

        order_current_last(&mut matches, &slots[TextureSlot::EnvMask.index()]);
        matches
    }

    fn apply_patch(
        &self,
        ctx: &PatcherContext<'_>,
        mesh: &MeshInfo<'_>,
        shape: &mut Shape,
        matched: &PatcherMatch,
    ) -> Result<bool> {
        let is_mlp = shape
            .lighting()
            .map(|s| s.shader_type() == ShaderType::MultiLayerParallax)
            .unwrap_or(false);
        let strip_mlp = is_mlp && Self::disable_mlp(ctx);

        let mut slots = shape.texture_slots();
        slots[TextureSlot::Parallax.index()].clear();
        slots[TextureSlot::EnvMask.index()] = matched.matched_path.to_game_string();
        if !ctx.dyncubemap_blocked(mesh.path) && !ctx.dyncubemap_blocked(&matched.matched_path) {
            slots[TextureSlot::Cubemap.index()] = DYNAMIC_CUBEMAP.to_string();
        }
        if strip_mlp {
            for slot in [TextureSlot::Glow, TextureSlot::Multilayer, TextureSlot::Backlight] {
                slots[slot.index()].clear();
            }
        }
        let mut changed = shape.set_texture_slots(&slots)?;

        let shader = shape
            .lighting_mut()
            .ok_or_else(|| Error::Other("shape has no lighting shader".to_string()))?;
        if strip_mlp {
            changed |= shader.set_flag2(flags2::MULTI_LAYER_PARALLAX, false);
        }
        changed |= shader.set_shader_type(ShaderType::EnvironmentMap);
        changed |= shader.set_env_map_scale(1.0);
        changed |= shader.set_flag1(flags1::PARALLAX, false);
        changed |= shader.set_flag2(flags2::UNUSED01, false);
        changed |= shader.set_flag1(flags1::ENVIRONMENT_MAPPING, true);
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::PatcherConfig;

    fn files() -> Vec<(&'static str, Vec<u8>)> {
        vec![
            ("textures/rock.dds", square_dds()),
            ("textures/rock_n.dds", square_dds()),
            ("textures/rock_m.dds", alpha_dds()),
            ("textures/plain.dds", square_dds()),
            ("textures/plain_m.dds", square_dds()),
        ]
    }

    #[test]
    fn test_only_alpha_masks_match() {
        let fx = Fixture::new(&files());
        let ctx = fx.context();
        let path = mesh_path();
        let info = mesh_info(&path);

        let rock = lit_shape(ShaderType::Default, &["textures\\rock.dds", "textures\\rock_n.dds"]);
        let matches = ComplexMaterialPatcher.should_apply(&ctx, &info, &rock);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_path, VirtualPath::new("textures/rock_m.dds"));
        assert_eq!(
            matches[0].matched_from.iter().copied().collect::<Vec<_>>(),
            [TextureSlot::Diffuse, TextureSlot::Normal]
        );

        let plain = lit_shape(ShaderType::Default, &["textures\\plain.dds"]);
        assert!(ComplexMaterialPatcher
            .should_apply(&ctx, &info, &plain)
            .is_empty());
    }

    #[test]
    fn test_occupied_slots_block_non_mlp() {
        let fx = Fixture::new(&files());
        let ctx = fx.context();
        let path = mesh_path();
        let info = mesh_info(&path);

        let glow = lit_shape(ShaderType::Default, &["textures\\rock.dds", "", "textures\\rock_g.dds"]);
        assert!(!ComplexMaterialPatcher.can_apply(&ctx, &info, &glow));

        let mlp = lit_shape(ShaderType::MultiLayerParallax, &["textures\\rock.dds"]);
        assert!(!ComplexMaterialPatcher.can_apply(&ctx, &info, &mlp));
    }

    #[test]
    fn test_apply_sets_env_map_and_is_idempotent() {
        let fx = Fixture::new(&files());
        let ctx = fx.context();
        let path = mesh_path();
        let info = mesh_info(&path);
        let mut shape = lit_shape(
            ShaderType::Parallax,
            &["textures\\rock.dds", "textures\\rock_n.dds", "", "textures\\rock_p.dds"],
        );
        let matched = PatcherMatch::new(VirtualPath::new("textures/rock_m.dds"), TextureSlot::Diffuse);

        assert!(ComplexMaterialPatcher.apply_patch(&ctx, &info, &mut shape, &matched).unwrap());
        let slots = shape.texture_slots();
        assert_eq!(slots[3], "");
        assert_eq!(slots[4], DYNAMIC_CUBEMAP);
        assert_eq!(slots[5], "textures\\rock_m.dds");
        let shader = shape.lighting().unwrap();
        assert_eq!(shader.shader_type(), ShaderType::EnvironmentMap);
        assert!(shader.has_flag1(flags1::ENVIRONMENT_MAPPING));
        assert_eq!(shader.env_map_scale, 1.0);

        assert!(!ComplexMaterialPatcher.apply_patch(&ctx, &info, &mut shape, &matched).unwrap());
    }

    #[test]
    fn test_dyncubemap_blocklist_keeps_cubemap_slot() {
        let fx = Fixture::new(&files());
        let ctx = fx.context();
        let path = VirtualPath::new("meshes/lod/rock.nif");
        let info = mesh_info(&path);
        let mut shape = lit_shape(ShaderType::Default, &["textures\\rock.dds"]);
        let matched = PatcherMatch::new(VirtualPath::new("textures/rock_m.dds"), TextureSlot::Diffuse);

        ComplexMaterialPatcher.apply_patch(&ctx, &info, &mut shape, &matched).unwrap();
        assert_eq!(shape.texture_slots()[4], "");
    }

    #[test]
    fn test_disable_mlp_strips_multilayer() {
        let mut config = PatcherConfig::bundled().unwrap();
        config
            .patchers
            .complex_material
            .options
            .insert(DISABLE_MLP_OPTION.to_string());
        let fx = Fixture::with_config(&files(), config);
        let ctx = fx.context();
        let path = mesh_path();
        let info = mesh_info(&path);

        let mut shape = lit_shape(
            ShaderType::MultiLayerParallax,
            &["textures\\rock.dds", "", "textures\\a.dds", "", "", "", "textures\\b.dds"],
        );
        shape
            .lighting_mut()
            .unwrap()
            .set_flag2(flags2::MULTI_LAYER_PARALLAX, true);
        assert!(ComplexMaterialPatcher.can_apply(&ctx, &info, &shape));

        let matched = PatcherMatch::new(VirtualPath::new("textures/rock_m.dds"), TextureSlot::Diffuse);
        ComplexMaterialPatcher.apply_patch(&ctx, &info, &mut shape, &matched).unwrap();
        let slots = shape.texture_slots();
        assert_eq!(slots[2], "");
        assert_eq!(slots[6], "");
        assert!(!shape.lighting().unwrap().has_flag2(flags2::MULTI_LAYER_PARALLAX));
    }
}
