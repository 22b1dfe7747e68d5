//! Shader patcher families.
//!
//! Each family decides, for one shape, whether it can apply at all
//! ([`ShaderPatcher::can_apply`]), which candidate textures it would use
//! ([`ShaderPatcher::should_apply`]) and how to rewrite the shader
//! ([`ShaderPatcher::apply_patch`]). Families are evaluated in
//! [`ShaderFamily::ALL`] order, highest fidelity first.

mod complex_material;
mod true_pbr;
mod upgrade_parallax;
mod vanilla_parallax;

pub use complex_material::ComplexMaterialPatcher;
pub use true_pbr::{load_pbr_entries, PbrEntry, PbrMatchData, TruePbrPatcher, PBR_CONFIG_GLOB};
pub use upgrade_parallax::UpgradeParallaxToComplexMaterial;
pub use vanilla_parallax::VanillaParallaxPatcher;

use crate::config::{FamilyConfig, PatcherConfig};
use crate::error::Result;
use crate::image::ImageService;
use crate::textures::TextureIndex;
use sp_mesh::{Shape, TextureSlot};
use sp_vfs::{DataDirectory, FileFilter, VirtualPath};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Mutex;

/// Shader families, ordered highest fidelity first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderFamily {
    TruePbr,
    ComplexMaterial,
    VanillaParallax,
}

impl ShaderFamily {
    pub const ALL: [ShaderFamily; 3] = [
        ShaderFamily::TruePbr,
        ShaderFamily::ComplexMaterial,
        ShaderFamily::VanillaParallax,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShaderFamily::TruePbr => "True PBR",
            ShaderFamily::ComplexMaterial => "Complex Material",
            ShaderFamily::VanillaParallax => "Parallax",
        }
    }

    pub fn config(self, patchers: &crate::config::PatchersConfig) -> &FamilyConfig {
        match self {
            ShaderFamily::TruePbr => &patchers.true_pbr,
            ShaderFamily::ComplexMaterial => &patchers.complex_material,
            ShaderFamily::VanillaParallax => &patchers.vanilla_parallax,
        }
    }
}

impl fmt::Display for ShaderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mesh-level facts a patcher may check.
#[derive(Debug, Clone, Copy)]
pub struct MeshInfo<'a> {
    pub path: &'a VirtualPath,
    pub has_havok: bool,
}

/// Family-specific payload carried from `should_apply` to `apply_patch`.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchData {
    None,
    Pbr(PbrMatchData),
}

/// A candidate texture found by one family for one shape.
#[derive(Debug, Clone, PartialEq)]
pub struct PatcherMatch {
    pub matched_path: VirtualPath,
    /// Slots whose base name led to the candidate.
    pub matched_from: BTreeSet<TextureSlot>,
    pub data: MatchData,
}

impl PatcherMatch {
    pub fn new(matched_path: VirtualPath, from: TextureSlot) -> Self {
        Self {
            matched_path,
            matched_from: BTreeSet::from([from]),
            data: MatchData::None,
        }
    }
}

/// A candidate with its family, owning mod and optional transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderPatcherMatch {
    pub family: ShaderFamily,
    pub matched: PatcherMatch,
    pub owner: Option<String>,
    /// Family the match must be transformed into before applying.
    pub transform: Option<ShaderFamily>,
}

/// Per-run collaborators shared by every patcher.
pub struct PatcherContext<'a> {
    pub directory: &'a DataDirectory,
    pub textures: &'a TextureIndex,
    pub images: &'a dyn ImageService,
    pub config: &'a PatcherConfig,
    pub pbr_entries: Vec<PbrEntry>,
    family_filters: HashMap<ShaderFamily, FileFilter>,
    dyncubemap_blocklist: FileFilter,
    aspect_cache: Mutex<HashMap<(VirtualPath, VirtualPath), bool>>,
}

impl<'a> PatcherContext<'a> {
    pub fn new(
        directory: &'a DataDirectory,
        textures: &'a TextureIndex,
        images: &'a dyn ImageService,
        config: &'a PatcherConfig,
        pbr_entries: Vec<PbrEntry>,
    ) -> Result<Self> {
        let mut family_filters = HashMap::new();
        for family in ShaderFamily::ALL {
            family_filters.insert(family, family.config(&config.patchers).to_filter()?);
        }
        Ok(Self {
            directory,
            textures,
            images,
            config,
            pbr_entries,
            family_filters,
            dyncubemap_blocklist: FileFilter::denying(&config.dyncubemap_blocklist)?,
            aspect_cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn family_config(&self, family: ShaderFamily) -> &FamilyConfig {
        family.config(&self.config.patchers)
    }

    /// Whether a family's allow/deny rules accept a candidate texture.
    pub fn family_allows(&self, family: ShaderFamily, path: &VirtualPath) -> bool {
        let Some(filter) = self.family_filters.get(&family) else {
            return true;
        };
        if !filter.matches_path(path) {
            return false;
        }
        match self.directory.archive_of(path) {
            Some(archive) => !filter.denies_archive(archive),
            None => true,
        }
    }

    pub fn dyncubemap_blocked(&self, path: &VirtualPath) -> bool {
        self.dyncubemap_blocklist.denies_path(path)
    }

    /// Cached aspect ratio comparison between two textures.
    ///
    /// Unreadable or undecodable images count as a mismatch.
    pub fn aspect_ratio_matches(&self, a: &VirtualPath, b: &VirtualPath) -> bool {
        let key = (a.clone(), b.clone());
        if let Some(cached) = self.aspect_cache.lock().ok().and_then(|c| c.get(&key).copied()) {
            return cached;
        }

        let result = match (self.directory.get_file(a), self.directory.get_file(b)) {
            (Ok(a_bytes), Ok(b_bytes)) => match self.images.check_aspect_ratio_match(&a_bytes, &b_bytes) {
                Ok(matches) => matches,
                Err(e) => {
                    tracing::debug!("Unable to compare aspect ratio of {} and {}: {}", a, b, e);
                    false
                }
            },
            (Err(e), _) | (_, Err(e)) => {
                tracing::debug!("Unable to read texture for aspect check: {}", e);
                false
            }
        };

        if let Ok(mut cache) = self.aspect_cache.lock() {
            cache.insert(key, result);
        }
        result
    }

    /// Whether a slot's texture is present in the overlay or among generated files.
    pub fn slot_exists(&self, slot: &str) -> bool {
        !slot.is_empty() && self.directory.is_file(&VirtualPath::new(slot))
    }
}

pub trait ShaderPatcher: Send + Sync {
    fn family(&self) -> ShaderFamily;

    /// Shape-level compatibility, independent of any texture.
    fn can_apply(&self, ctx: &PatcherContext<'_>, mesh: &MeshInfo<'_>, shape: &Shape) -> bool;

    /// Candidate textures for a shape's current slots, best first.
    fn should_apply(
        &self,
        ctx: &PatcherContext<'_>,
        mesh: &MeshInfo<'_>,
        shape: &Shape,
    ) -> Vec<PatcherMatch>;

    /// Rewrite the shape for a match. Returns whether anything changed.
    fn apply_patch(
        &self,
        ctx: &PatcherContext<'_>,
        mesh: &MeshInfo<'_>,
        shape: &mut Shape,
        matched: &PatcherMatch,
    ) -> Result<bool>;
}

/// Converts a match of one family into a match of another.
pub trait ShaderTransform: Send + Sync {
    fn from_family(&self) -> ShaderFamily;
    fn to_family(&self) -> ShaderFamily;

    fn transform(&self, ctx: &PatcherContext<'_>, matched: &PatcherMatch) -> Result<PatcherMatch>;
}

/// The set of enabled patchers and transforms for a run.
pub struct PatcherSet {
    patchers: Vec<Box<dyn ShaderPatcher>>,
    transforms: Vec<Box<dyn ShaderTransform>>,
}

impl PatcherSet {
    /// Build the enabled families from configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Merged configuration
    /// * `disabled` - Families switched off on the command line
    pub fn from_config(config: &PatcherConfig, disabled: &BTreeSet<ShaderFamily>) -> Self {
        let mut patchers: Vec<Box<dyn ShaderPatcher>> = Vec::new();
        for family in ShaderFamily::ALL {
            if disabled.contains(&family) || !family.config(&config.patchers).enabled {
                continue;
            }
            patchers.push(match family {
                ShaderFamily::TruePbr => Box::new(TruePbrPatcher),
                ShaderFamily::ComplexMaterial => Box::new(ComplexMaterialPatcher),
                ShaderFamily::VanillaParallax => Box::new(VanillaParallaxPatcher),
            });
        }

        let mut transforms: Vec<Box<dyn ShaderTransform>> = Vec::new();
        if config.patchers.upgrade_parallax_to_cm.enabled
            && !disabled.contains(&ShaderFamily::ComplexMaterial)
        {
            transforms.push(Box::new(UpgradeParallaxToComplexMaterial::new()));
        }

        let names: Vec<&str> = patchers.iter().map(|p| p.family().name()).collect();
        tracing::info!("Enabled shader patchers: {}", names.join(", "));
        Self {
            patchers,
            transforms,
        }
    }

    pub fn patchers(&self) -> impl Iterator<Item = &dyn ShaderPatcher> {
        self.patchers.iter().map(|p| p.as_ref())
    }

    pub fn patcher(&self, family: ShaderFamily) -> Option<&dyn ShaderPatcher> {
        self.patchers
            .iter()
            .find(|p| p.family() == family)
            .map(|p| p.as_ref())
    }

    pub fn transform_from(&self, family: ShaderFamily) -> Option<&dyn ShaderTransform> {
        self.transforms
            .iter()
            .find(|t| t.from_family() == family)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.patchers.is_empty()
    }

    /// Every applicable candidate for a shape.
    ///
    /// Families run in order and the first one that yields applicable matches
    /// short-circuits the rest. A match is kept when its own family can apply
    /// to the shape, or when an enabled transform turns it into a family that
    /// can; in the latter case the transform is attached.
    pub fn collect_matches(
        &self,
        ctx: &PatcherContext<'_>,
        mesh: &MeshInfo<'_>,
        shape: &Shape,
    ) -> Vec<ShaderPatcherMatch> {
        for patcher in self.patchers() {
            let family = patcher.family();
            let can_apply = patcher.can_apply(ctx, mesh, shape);
            let transform = self.transform_from(family).and_then(|t| {
                let target = self.patcher(t.to_family())?;
                target.can_apply(ctx, mesh, shape).then_some(t.to_family())
            });
            if !can_apply && transform.is_none() {
                tracing::trace!("{} cannot apply", family);
                continue;
            }

            let found: Vec<ShaderPatcherMatch> = patcher
                .should_apply(ctx, mesh, shape)
                .into_iter()
                .filter(|m| ctx.family_allows(family, &m.matched_path))
                .map(|matched| ShaderPatcherMatch {
                    owner: owner_of(ctx, &matched.matched_path),
                    family,
                    matched,
                    transform,
                })
                .collect();

            if !found.is_empty() {
                tracing::trace!("{} produced {} matches", family, found.len());
                return found;
            }
        }
        Vec::new()
    }
}

/// Mod owning a matched texture. Files from vanilla archives have no owner.
pub fn owner_of(ctx: &PatcherContext<'_>, path: &VirtualPath) -> Option<String> {
    if let Some(archive) = ctx.directory.archive_of(path) {
        if ctx.config.is_vanilla_archive(archive) {
            return None;
        }
    }
    ctx.directory.get_mod(path)
}

/// Move the candidate matching the shape's current slot value to the end.
pub(crate) fn order_current_last(matches: &mut [PatcherMatch], current: &str) {
    if current.is_empty() {
        return;
    }
    let current = VirtualPath::new(current);
    // stable: the relative order of the other candidates is kept
    matches.sort_by_key(|m| m.matched_path == current);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::image::DdsImageService;
    use crate::textures::{SuffixTable, TextureIndex};
    use camino::Utf8PathBuf;
    use sp_mesh::{flags1, LightingShader, ShaderBlock, ShaderType, ShapeKind, SizedString, TextureSet};
    use tempfile::TempDir;

    /// A loose-file data directory with classified textures.
    pub struct Fixture {
        pub _temp: TempDir,
        pub directory: DataDirectory,
        pub textures: TextureIndex,
        pub config: PatcherConfig,
        pub images: DdsImageService,
    }

    impl Fixture {
        /// # Arguments
        ///
        /// * `files` - (virtual path, contents) pairs written as loose files
        pub fn new(files: &[(&str, Vec<u8>)]) -> Self {
            Self::with_config(files, PatcherConfig::bundled().unwrap())
        }

        pub fn with_config(files: &[(&str, Vec<u8>)], config: PatcherConfig) -> Self {
            let temp = TempDir::new().unwrap();
            let root = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
            for (rel, contents) in files {
                let path = root.join(rel);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, contents).unwrap();
            }
            std::fs::create_dir_all(&root).unwrap();
            let generated = Utf8PathBuf::from_path_buf(temp.path().join("out")).unwrap();
            let mut directory = DataDirectory::new(root).unwrap().with_generated_dir(generated);
            directory.populate(&[], false).unwrap();

            let images = DdsImageService::new();
            let mut textures = TextureIndex::new(
                SuffixTable::new(&config.suffix_table()),
                config.manual_texture_maps(),
            );
            let filter = config.texture_discovery.to_filter().unwrap();
            textures.scan(directory.find_files(&filter));
            textures
                .finalize(|p| {
                    directory
                        .get_file(p)
                        .ok()
                        .and_then(|b| images.decode(&b).ok())
                        .map(|i| i.has_alpha)
                        .unwrap_or(false)
                })
                .unwrap();

            Self {
                _temp: temp,
                directory,
                textures,
                config,
                images,
            }
        }

        pub fn context(&self) -> PatcherContext<'_> {
            self.context_with_pbr(Vec::new())
        }

        pub fn context_with_pbr(&self, entries: Vec<PbrEntry>) -> PatcherContext<'_> {
            PatcherContext::new(&self.directory, &self.textures, &self.images, &self.config, entries)
                .unwrap()
        }
    }

    /// A 4x4 DXT1 header, enough for aspect checks.
    pub fn square_dds() -> Vec<u8> {
        crate::image::tests::d3d_dds(4, 4, ddsfile::D3DFormat::DXT1)
    }

    /// A 4x4 BC3 header, reported as having alpha.
    pub fn alpha_dds() -> Vec<u8> {
        crate::image::tests::d3d_dds(4, 4, ddsfile::D3DFormat::DXT5)
    }

    pub fn wide_dds() -> Vec<u8> {
        crate::image::tests::d3d_dds(8, 4, ddsfile::D3DFormat::DXT1)
    }

    pub fn lit_shape(shader_type: ShaderType, slots: &[&str]) -> Shape {
        let mut shape = Shape::new("shape", ShapeKind::BSTriShape);
        shape.shader = ShaderBlock::Lighting(LightingShader {
            shader_type: shader_type.to_raw(),
            flags1: flags1::RECEIVE_SHADOWS,
            texture_set: Some(TextureSet {
                textures: slots.iter().map(|s| SizedString::new(s)).collect(),
            }),
            ..LightingShader::default()
        });
        shape.normalize_texture_set().unwrap();
        shape
    }

    pub fn mesh_path() -> VirtualPath {
        VirtualPath::new("meshes/rock.nif")
    }

    pub fn mesh_info(path: &VirtualPath) -> MeshInfo<'_> {
        MeshInfo {
            path,
            has_havok: false,
        }
    }
}
