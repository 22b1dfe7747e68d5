use super::{order_current_last, MeshInfo, PatcherContext, PatcherMatch, ShaderFamily, ShaderPatcher};
use crate::error::{Error, Result};
use crate::textures::TextureType;
use sp_mesh::{flags1, flags2, ShaderType, Shape, TextureSlot};
use sp_vfs::VirtualPath;

/// Height-map parallax on the vanilla lighting shader.
#[derive(Debug, Clone, Copy, Default)]
pub struct VanillaParallaxPatcher;

impl ShaderPatcher for VanillaParallaxPatcher {
    fn family(&self) -> ShaderFamily {
        ShaderFamily::VanillaParallax
    }

    fn can_apply(&self, _ctx: &PatcherContext<'_>, mesh: &MeshInfo<'_>, shape: &Shape) -> bool {
        if mesh.has_havok {
            tracing::trace!("Parallax: mesh has attached havok");
            return false;
        }
        if shape.skinned {
            tracing::trace!("Parallax: shape is skinned");
            return false;
        }
        let Some(shader) = shape.lighting() else {
            return false;
        };
        if !matches!(
            shader.shader_type(),
            ShaderType::Default | ShaderType::Parallax | ShaderType::EnvironmentMap
        ) {
            tracing::trace!("Parallax: unsupported shader type {:?}", shader.shader_type());
            return false;
        }
        if shader.has_flag1(flags1::DECAL) || shader.has_flag1(flags1::DYNAMIC_DECAL) {
            tracing::trace!("Parallax: decal shape");
            return false;
        }
        if shader.has_flag2(flags2::SOFT_LIGHTING)
            || shader.has_flag2(flags2::RIM_LIGHTING)
            || shader.has_flag2(flags2::BACK_LIGHTING)
        {
            tracing::trace!("Parallax: special lighting flags");
            return false;
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
        let lookup = ctx.family_config(ShaderFamily::VanillaParallax).lookup_slots();
        let mut matches = Vec::new();
        for slot in lookup {
            let raw = &slots[slot.index()];
            if !ctx.slot_exists(raw) {
                continue;
            }
            let source = VirtualPath::new(raw);
            let base = ctx.textures.texture_base(&source);
            let Some(entry) = ctx
                .textures
                .find(TextureSlot::Parallax, &base, TextureType::Height)
            else {
                continue;
            };
            if !ctx.aspect_ratio_matches(&entry.path, &diffuse) {
                tracing::trace!("Parallax: aspect ratio mismatch for {}", entry.path);
                continue;
            }
            matches.push(PatcherMatch::new(entry.path, slot));
            break;
        }

        order_current_last(&mut matches, &slots[TextureSlot::Parallax.index()]);
        matches
    }

    fn apply_patch(
        &self,
        _ctx: &PatcherContext<'_>,
        _mesh: &MeshInfo<'_>,
        shape: &mut Shape,
        matched: &PatcherMatch,
    ) -> Result<bool> {
        let mut slots = shape.texture_slots();
        slots[TextureSlot::Parallax.index()] = matched.matched_path.to_game_string();
        let mut changed = shape.set_texture_slots(&slots)?;

        let shader = shape
            .lighting_mut()
            .ok_or_else(|| Error::Other("shape has no lighting shader".to_string()))?;
        changed |= shader.set_shader_type(ShaderType::Parallax);
        changed |= shader.set_flag1(flags1::ENVIRONMENT_MAPPING, false);
        changed |= shader.set_flag2(flags2::UNUSED01, false);
        changed |= shader.set_flag1(flags1::PARALLAX, true);
        changed |= shape.set_vertex_colors(true);
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn rock_fixture() -> Fixture {
        Fixture::new(&[
            ("textures/rock.dds", square_dds()),
            ("textures/rock_n.dds", square_dds()),
            ("textures/rock_p.dds", square_dds()),
            ("textures/wide.dds", wide_dds()),
            ("textures/wide_n.dds", wide_dds()),
            ("textures/wide_p.dds", square_dds()),
        ])
    }

    #[test]
    fn test_matches_height_by_normal_base() {
        let fx = rock_fixture();
        let ctx = fx.context();
        let path = mesh_path();
        let shape = lit_shape(ShaderType::Default, &["textures\\rock.dds", "textures\\rock_n.dds"]);

        let matches = VanillaParallaxPatcher.should_apply(&ctx, &mesh_info(&path), &shape);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_path, VirtualPath::new("textures/rock_p.dds"));
        assert!(matches[0].matched_from.contains(&TextureSlot::Normal));
    }

    #[test]
    fn test_aspect_mismatch_rejected() {
        let fx = rock_fixture();
        let ctx = fx.context();
        let path = mesh_path();
        let shape = lit_shape(ShaderType::Default, &["textures\\wide.dds", "textures\\wide_n.dds"]);
        assert!(VanillaParallaxPatcher
            .should_apply(&ctx, &mesh_info(&path), &shape)
            .is_empty());
    }

    #[test]
    fn test_missing_diffuse_rejected() {
        let fx = rock_fixture();
        let ctx = fx.context();
        let path = mesh_path();
        let shape = lit_shape(ShaderType::Default, &["textures\\gone.dds", "textures\\rock_n.dds"]);
        assert!(VanillaParallaxPatcher
            .should_apply(&ctx, &mesh_info(&path), &shape)
            .is_empty());
    }

    #[test]
    fn test_can_apply_rejections() {
        let fx = rock_fixture();
        let ctx = fx.context();
        let path = mesh_path();
        let info = mesh_info(&path);

        let shape = lit_shape(ShaderType::Default, &["a.dds"]);
        assert!(VanillaParallaxPatcher.can_apply(&ctx, &info, &shape));

        let havok = MeshInfo {
            path: &path,
            has_havok: true,
        };
        assert!(!VanillaParallaxPatcher.can_apply(&ctx, &havok, &shape));

        let mut skinned = shape.clone();
        skinned.skinned = true;
        assert!(!VanillaParallaxPatcher.can_apply(&ctx, &info, &skinned));

        let glow = lit_shape(ShaderType::GlowMap, &["a.dds"]);
        assert!(!VanillaParallaxPatcher.can_apply(&ctx, &info, &glow));

        let mut decal = shape.clone();
        decal.lighting_mut().unwrap().set_flag1(flags1::DECAL, true);
        assert!(!VanillaParallaxPatcher.can_apply(&ctx, &info, &decal));

        let mut rim = shape;
        rim.lighting_mut().unwrap().set_flag2(flags2::RIM_LIGHTING, true);
        assert!(!VanillaParallaxPatcher.can_apply(&ctx, &info, &rim));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let fx = rock_fixture();
        let ctx = fx.context();
        let path = mesh_path();
        let info = mesh_info(&path);
        let mut shape = lit_shape(ShaderType::EnvironmentMap, &["textures\\rock.dds", "textures\\rock_n.dds"]);
        shape
            .lighting_mut()
            .unwrap()
            .set_flag1(flags1::ENVIRONMENT_MAPPING, true);

        let matched = VanillaParallaxPatcher.should_apply(&ctx, &info, &shape)[0].clone();
        assert!(VanillaParallaxPatcher.apply_patch(&ctx, &info, &mut shape, &matched).unwrap());

        let shader = shape.lighting().unwrap();
        assert_eq!(shader.shader_type(), ShaderType::Parallax);
        assert!(shader.has_flag1(flags1::PARALLAX));
        assert!(!shader.has_flag1(flags1::ENVIRONMENT_MAPPING));
        assert!(shader.has_flag2(flags2::VERTEX_COLORS));
        assert_eq!(shape.texture_slots()[3], "textures\\rock_p.dds");

        assert!(!VanillaParallaxPatcher.apply_patch(&ctx, &info, &mut shape, &matched).unwrap());
    }
}
