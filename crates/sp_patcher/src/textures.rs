//! Texture classification index.
//!
//! Every discovered texture is assigned a slot role and a finer [`TextureType`],
//! then grouped per role by its *base name*: the path without extension and
//! without its role suffix (`textures/rock_n.dds` has base `textures/rock`).
//! Patchers find candidates by looking up the base of an existing slot.
//!
//! # Classification Algorithm
//!
//! 1. [`TextureIndex::scan`] guesses from the longest configured suffix of each
//!    filename stem. A suffix listed under one slot classifies the texture; a
//!    suffix listed under several slots, or no suffix at all, defers it.
//! 2. [`TextureIndex::observe_mesh`] records which slot each texture really
//!    occupies in mesh shapes, and which type the shader implies there.
//! 3. [`TextureIndex::finalize`] decides each texture: a manual `texture_maps`
//!    entry wins outright; otherwise a texture observed in exactly one slot takes
//!    the type most often implied there (ties go to the first type in
//!    [`TextureType`] order); otherwise it falls back to the suffix guess, using
//!    the lowest listed slot for an ambiguous suffix. Environment masks whose image
//!    has an alpha channel become complex material, and height maps shipped in
//!    vanilla archives are dropped.
//! 4. Classified textures are inserted into per-role maps. Two textures with the
//!    same base and role conflict; the later one (in path order) wins.
//!
//! Observations are counted, so the result does not depend on the order meshes
//! are observed in.

use crate::error::{Error, Result};
use rayon::prelude::*;
use sp_mesh::{flags1, flags2, MeshFile, ShaderType, TextureSlot, NUM_TEXTURE_SLOTS};
use sp_vfs::VirtualPath;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, RwLock};

/// Fine-grained texture type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureType {
    Diffuse,
    Normal,
    ModelSpaceNormal,
    Emissive,
    SkinTint,
    SubsurfaceColor,
    Height,
    Cubemap,
    EnvironmentMask,
    ComplexMaterial,
    Rmaos,
    SubsurfaceTint,
    InnerLayer,
    CoatNormalRoughness,
    Backlight,
    Specular,
    SubsurfacePbr,
    Unknown,
}

impl TextureType {
    pub const ALL: [TextureType; 18] = [
        TextureType::Diffuse,
        TextureType::Normal,
        TextureType::ModelSpaceNormal,
        TextureType::Emissive,
        TextureType::SkinTint,
        TextureType::SubsurfaceColor,
        TextureType::Height,
        TextureType::Cubemap,
        TextureType::EnvironmentMask,
        TextureType::ComplexMaterial,
        TextureType::Rmaos,
        TextureType::SubsurfaceTint,
        TextureType::InnerLayer,
        TextureType::CoatNormalRoughness,
        TextureType::Backlight,
        TextureType::Specular,
        TextureType::SubsurfacePbr,
        TextureType::Unknown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TextureType::Diffuse => "diffuse",
            TextureType::Normal => "normal",
            TextureType::ModelSpaceNormal => "model space normal",
            TextureType::Emissive => "emissive",
            TextureType::SkinTint => "skin tint",
            TextureType::SubsurfaceColor => "subsurface color",
            TextureType::Height => "height",
            TextureType::Cubemap => "cubemap",
            TextureType::EnvironmentMask => "environment mask",
            TextureType::ComplexMaterial => "complex material",
            TextureType::Rmaos => "rmaos",
            TextureType::SubsurfaceTint => "subsurface tint",
            TextureType::InnerLayer => "inner layer",
            TextureType::CoatNormalRoughness => "coat normal roughness",
            TextureType::Backlight => "backlight",
            TextureType::Specular => "specular",
            TextureType::SubsurfacePbr => "subsurface pbr",
            TextureType::Unknown => "unknown",
        }
    }

    /// Slot role this type lives in.
    pub fn slot(self) -> TextureSlot {
        match self {
            TextureType::Diffuse => TextureSlot::Diffuse,
            TextureType::Normal | TextureType::ModelSpaceNormal => TextureSlot::Normal,
            TextureType::Emissive | TextureType::SkinTint | TextureType::SubsurfaceColor => {
                TextureSlot::Glow
            }
            TextureType::Height => TextureSlot::Parallax,
            TextureType::Cubemap => TextureSlot::Cubemap,
            TextureType::EnvironmentMask | TextureType::ComplexMaterial | TextureType::Rmaos => {
                TextureSlot::EnvMask
            }
            TextureType::SubsurfaceTint
            | TextureType::InnerLayer
            | TextureType::CoatNormalRoughness => TextureSlot::Multilayer,
            TextureType::Backlight | TextureType::Specular | TextureType::SubsurfacePbr => {
                TextureSlot::Backlight
            }
            TextureType::Unknown => TextureSlot::Unused,
        }
    }

    /// Type assumed for a slot when the suffix says nothing finer.
    pub fn default_for_slot(slot: TextureSlot) -> Self {
        match slot {
            TextureSlot::Diffuse => TextureType::Diffuse,
            TextureSlot::Normal => TextureType::Normal,
            TextureSlot::Glow => TextureType::Emissive,
            TextureSlot::Parallax => TextureType::Height,
            TextureSlot::Cubemap => TextureType::Cubemap,
            TextureSlot::EnvMask => TextureType::EnvironmentMask,
            TextureSlot::Multilayer => TextureType::SubsurfaceTint,
            TextureSlot::Backlight => TextureType::Backlight,
            TextureSlot::Unused => TextureType::Unknown,
        }
    }

    /// Type implied by a well-known suffix, if it belongs to `slot`.
    fn from_suffix(suffix: &str, slot: TextureSlot) -> Self {
        let known = match suffix {
            "_bl" | "_b" => Some(TextureType::Backlight),
            "_cnr" => Some(TextureType::CoatNormalRoughness),
            "_s" => Some(TextureType::SubsurfaceTint),
            "_i" => Some(TextureType::InnerLayer),
            "_rmaos" => Some(TextureType::Rmaos),
            "_envmask" | "_em" | "_m" => Some(TextureType::EnvironmentMask),
            "_e" => Some(TextureType::Cubemap),
            "_p" => Some(TextureType::Height),
            "_sk" => Some(TextureType::SkinTint),
            "_g" => Some(TextureType::Emissive),
            "_msn" | "_n" => Some(TextureType::Normal),
            "_d" | "mask" => Some(TextureType::Diffuse),
            _ => None,
        };
        match known {
            Some(ty) if ty.slot() == slot => ty,
            _ => TextureType::default_for_slot(slot),
        }
    }
}

impl fmt::Display for TextureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextureType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace('_', " ");
        TextureType::ALL
            .into_iter()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| Error::Other(format!("Unknown texture type: {}", s)))
    }
}

/// A classified texture as stored in the per-role maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSlotEntry {
    pub path: VirtualPath,
    pub texture_type: TextureType,
    pub base: String,
}

/// Configured suffixes, longest first for matching.
#[derive(Debug, Clone, Default)]
pub struct SuffixTable {
    /// (suffix, slots listing it in ascending order), longest suffix first.
    entries: Vec<(String, Vec<TextureSlot>)>,
}

impl SuffixTable {
    pub fn new(table: &BTreeMap<TextureSlot, Vec<String>>) -> Self {
        let mut by_suffix: BTreeMap<String, BTreeSet<TextureSlot>> = BTreeMap::new();
        for (slot, suffixes) in table {
            for suffix in suffixes {
                by_suffix
                    .entry(suffix.to_lowercase())
                    .or_default()
                    .insert(*slot);
            }
        }
        let mut entries: Vec<(String, Vec<TextureSlot>)> = by_suffix
            .into_iter()
            .map(|(suffix, slots)| (suffix, slots.into_iter().collect()))
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));
        Self { entries }
    }

    /// Longest suffix ending `stem`, with the slots it is listed under.
    pub fn longest_match(&self, stem: &str) -> Option<(&str, &[TextureSlot])> {
        self.entries
            .iter()
            .find(|(suffix, _)| stem.ends_with(suffix.as_str()))
            .map(|(suffix, slots)| (suffix.as_str(), slots.as_slice()))
    }

    /// Path without extension and without its role suffix.
    pub fn texture_base(&self, path: &VirtualPath) -> String {
        let without_ext = path.without_extension();
        match self.longest_match(path.file_stem()) {
            Some((suffix, _)) => without_ext[..without_ext.len() - suffix.len()].to_string(),
            None => without_ext.to_string(),
        }
    }
}

/// Result of the suffix-only pass for one texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixGuess {
    Classified(TextureSlot, TextureType),
    /// Several slots list the suffix; holds the lowest one.
    Ambiguous(TextureSlot, TextureType),
    Unknown,
}

/// Slot and type counts for one texture across every observed shape.
#[derive(Debug, Clone, Default)]
struct Observation {
    slots: BTreeMap<TextureSlot, usize>,
    types: BTreeMap<TextureType, usize>,
}

impl Observation {
    fn record(&mut self, slot: TextureSlot, ty: TextureType) {
        *self.slots.entry(slot).or_default() += 1;
        *self.types.entry(ty).or_default() += 1;
    }

    /// Majority type, or `None` when the texture was seen in several slots.
    fn decide(&self) -> Option<TextureType> {
        if self.slots.len() != 1 {
            return None;
        }
        self.types
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(ty, _)| *ty)
    }
}

/// Texture classification and per-role lookup maps.
pub struct TextureIndex {
    suffixes: SuffixTable,
    manual: BTreeMap<VirtualPath, TextureType>,
    guesses: BTreeMap<VirtualPath, SuffixGuess>,
    observations: Mutex<HashMap<VirtualPath, Observation>>,
    vanilla: HashSet<VirtualPath>,
    maps: RwLock<[BTreeMap<String, TextureSlotEntry>; NUM_TEXTURE_SLOTS]>,
    types: RwLock<HashMap<VirtualPath, TextureType>>,
}

impl TextureIndex {
    /// # Arguments
    ///
    /// * `suffixes` - Configured suffix table
    /// * `manual` - Manual texture types that override every other rule
    pub fn new(suffixes: SuffixTable, manual: BTreeMap<VirtualPath, TextureType>) -> Self {
        Self {
            suffixes,
            manual,
            guesses: BTreeMap::new(),
            observations: Mutex::new(HashMap::new()),
            vanilla: HashSet::new(),
            maps: RwLock::new(Default::default()),
            types: RwLock::new(HashMap::new()),
        }
    }

    pub fn suffixes(&self) -> &SuffixTable {
        &self.suffixes
    }

    pub fn texture_base(&self, path: &VirtualPath) -> String {
        self.suffixes.texture_base(path)
    }

    /// Suffix pass over every discovered texture.
    pub fn scan<I>(&mut self, textures: I)
    where
        I: IntoIterator<Item = VirtualPath>,
    {
        let mut deferred = 0usize;
        for path in textures {
            let guess = self.guess_from_suffix(&path);
            if !matches!(guess, SuffixGuess::Classified(..)) {
                deferred += 1;
            }
            self.guesses.insert(path, guess);
        }
        tracing::info!(
            "Scanned {} textures ({} deferred to mesh observation)",
            self.guesses.len(),
            deferred
        );
    }

    pub fn guess_from_suffix(&self, path: &VirtualPath) -> SuffixGuess {
        match self.suffixes.longest_match(path.file_stem()) {
            Some((suffix, [slot])) => {
                SuffixGuess::Classified(*slot, TextureType::from_suffix(suffix, *slot))
            }
            Some((suffix, slots)) => match slots.first() {
                Some(slot) => SuffixGuess::Ambiguous(*slot, TextureType::from_suffix(suffix, *slot)),
                None => SuffixGuess::Unknown,
            },
            None => SuffixGuess::Unknown,
        }
    }

    /// Textures read from vanilla archives. Height maps among them are never
    /// classified.
    pub fn set_vanilla_textures<I>(&mut self, textures: I)
    where
        I: IntoIterator<Item = VirtualPath>,
    {
        self.vanilla = textures.into_iter().collect();
    }

    /// Scanned texture paths, in path order.
    pub fn scanned(&self) -> impl Iterator<Item = &VirtualPath> {
        self.guesses.keys()
    }

    /// Record the slots a mesh assigns its textures to.
    ///
    /// Safe to call from many threads at once.
    pub fn observe_mesh(&self, mesh: &MeshFile) -> Result<()> {
        let mut observed = Vec::new();
        for shape in &mesh.shapes {
            let Some(shader) = shape.lighting() else {
                continue;
            };
            if shape.texture_set().is_none() {
                continue;
            }
            let slots = shape.texture_slots();
            for slot in TextureSlot::ALL {
                let raw = &slots[slot.index()];
                if raw.is_empty() {
                    continue;
                }
                let Some(ty) = observed_type(slot, shader.shader_type(), shader.flags1, shader.flags2)
                else {
                    continue;
                };
                observed.push((VirtualPath::new(raw), slot, ty));
            }
        }

        let mut observations = self
            .observations
            .lock()
            .map_err(|_| Error::Other("texture observation table poisoned".to_string()))?;
        for (path, slot, ty) in observed {
            observations.entry(path).or_default().record(slot, ty);
        }
        Ok(())
    }

    /// Convenience for callers holding every mesh in memory.
    pub fn disambiguate<'a, I>(&mut self, meshes: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a MeshFile>,
    {
        for mesh in meshes {
            self.observe_mesh(mesh)?;
        }
        self.finalize(|_| false)
    }

    /// Decide every scanned texture and build the per-role maps.
    ///
    /// # Arguments
    ///
    /// * `has_alpha` - Reports whether an environment mask carries an alpha channel
    pub fn finalize<F>(&mut self, has_alpha: F) -> Result<()>
    where
        F: Fn(&VirtualPath) -> bool + Sync,
    {
        let observations = std::mem::take(
            &mut *self
                .observations
                .lock()
                .map_err(|_| Error::Other("texture observation table poisoned".to_string()))?,
        );

        let mut decided: Vec<(VirtualPath, TextureType)> = Vec::with_capacity(self.guesses.len());
        for (path, guess) in &self.guesses {
            let ty = if let Some(ty) = self.manual.get(path) {
                Some(*ty)
            } else {
                match (observations.get(path).and_then(Observation::decide), guess) {
                    (Some(ty), _) => Some(ty),
                    (None, SuffixGuess::Classified(_, ty) | SuffixGuess::Ambiguous(_, ty)) => {
                        Some(*ty)
                    }
                    (None, SuffixGuess::Unknown) => None,
                }
            };
            if let Some(ty) = ty {
                decided.push((path.clone(), ty));
            }
        }

        // Manual maps may name textures the discovery filters skipped.
        for (path, ty) in &self.manual {
            if !self.guesses.contains_key(path) {
                decided.push((path.clone(), *ty));
            }
        }

        decided.par_iter_mut().for_each(|(path, ty)| {
            if *ty == TextureType::EnvironmentMask && has_alpha(path) {
                *ty = TextureType::ComplexMaterial;
            }
        });
        decided.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, ty) in decided {
            if ty == TextureType::Unknown {
                continue;
            }
            if ty.slot() == TextureSlot::Parallax && self.vanilla.contains(&path) {
                tracing::trace!("Ignored vanilla parallax texture: {}", path);
                continue;
            }
            let base = self.texture_base(&path);
            self.insert(TextureSlotEntry {
                path,
                texture_type: ty,
                base,
            })?;
        }

        tracing::info!(
            "Classified {} textures",
            self.types.read().map(|t| t.len()).unwrap_or(0)
        );
        Ok(())
    }

    /// Add an entry, replacing a conflicting one with a warning.
    pub fn insert(&self, entry: TextureSlotEntry) -> Result<()> {
        let slot = entry.texture_type.slot();
        {
            let mut types = self
                .types
                .write()
                .map_err(|_| Error::Other("texture type table poisoned".to_string()))?;
            types.insert(entry.path.clone(), entry.texture_type);
        }

        let mut maps = self
            .maps
            .write()
            .map_err(|_| Error::Other("texture map poisoned".to_string()))?;
        let map = &mut maps[slot.index()];
        if let Some(existing) = map.get(&entry.base) {
            if existing.path != entry.path {
                tracing::warn!(
                    "Texture conflict for base '{}' in {} slot: {} replaces {}",
                    entry.base,
                    slot,
                    entry.path,
                    existing.path
                );
            }
        }
        map.insert(entry.base.clone(), entry);
        Ok(())
    }

    /// Snapshot of one role's map.
    pub fn get_texture_map(&self, slot: TextureSlot) -> BTreeMap<String, TextureSlotEntry> {
        self.maps
            .read()
            .map(|maps| maps[slot.index()].clone())
            .unwrap_or_default()
    }

    /// The entry for `base` in `slot`'s map, if it has the wanted type.
    pub fn find(&self, slot: TextureSlot, base: &str, wanted: TextureType) -> Option<TextureSlotEntry> {
        let maps = self.maps.read().ok()?;
        maps[slot.index()]
            .get(base)
            .filter(|e| e.texture_type == wanted)
            .cloned()
    }

    pub fn get_texture_type(&self, path: &VirtualPath) -> Option<TextureType> {
        self.types.read().ok()?.get(path).copied()
    }
}

/// Texture type a shader implies for a slot, or `None` if the slot is not
/// meaningful under that shader.
pub fn observed_type(
    slot: TextureSlot,
    shader: ShaderType,
    f1: u32,
    f2: u32,
) -> Option<TextureType> {
    let has1 = |f: u32| f1 & f != 0;
    let has2 = |f: u32| f2 & f != 0;
    let pbr = shader == ShaderType::Default && has2(flags2::UNUSED01);
    let facegen = shader == ShaderType::SkinTint && has1(flags1::FACEGEN_RGB_TINT);
    let mlp = shader == ShaderType::MultiLayerParallax && has2(flags2::MULTI_LAYER_PARALLAX);
    let envmap = shader == ShaderType::EnvironmentMap && has1(flags1::ENVIRONMENT_MAPPING);

    match slot {
        TextureSlot::Diffuse => Some(TextureType::Diffuse),
        TextureSlot::Normal if facegen => Some(TextureType::ModelSpaceNormal),
        TextureSlot::Normal => Some(TextureType::Normal),
        TextureSlot::Glow => {
            if (shader == ShaderType::GlowMap && has2(flags2::GLOW_MAP)) || pbr {
                Some(TextureType::Emissive)
            } else if mlp {
                Some(TextureType::SubsurfaceColor)
            } else if facegen {
                Some(TextureType::SkinTint)
            } else {
                None
            }
        }
        TextureSlot::Parallax => {
            let parallax = shader == ShaderType::Parallax && has1(flags1::PARALLAX);
            (parallax || pbr).then_some(TextureType::Height)
        }
        TextureSlot::Cubemap => envmap.then_some(TextureType::Cubemap),
        TextureSlot::EnvMask => {
            if envmap {
                Some(TextureType::EnvironmentMask)
            } else if pbr {
                Some(TextureType::Rmaos)
            } else {
                None
            }
        }
        TextureSlot::Multilayer => {
            if !mlp {
                None
            } else if has2(flags2::UNUSED01) {
                Some(TextureType::CoatNormalRoughness)
            } else {
                Some(TextureType::InnerLayer)
            }
        }
        TextureSlot::Backlight => {
            if mlp && has2(flags2::UNUSED01) {
                Some(TextureType::SubsurfacePbr)
            } else if has2(flags2::BACK_LIGHTING) {
                Some(TextureType::Backlight)
            } else if facegen {
                Some(TextureType::Specular)
            } else {
                None
            }
        }
        TextureSlot::Unused => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::PatcherConfig;
    use sp_mesh::{LightingShader, ShaderBlock, Shape, ShapeKind, SizedString, TextureSet};

    pub(crate) fn default_index() -> TextureIndex {
        let config = PatcherConfig::bundled().unwrap();
        TextureIndex::new(SuffixTable::new(&config.suffix_table()), BTreeMap::new())
    }

    fn mesh_with(shader_type: ShaderType, f1: u32, f2: u32, slots: &[&str]) -> MeshFile {
        let mut shape = Shape::new("s", ShapeKind::BSTriShape);
        shape.shader = ShaderBlock::Lighting(LightingShader {
            shader_type: shader_type.to_raw(),
            flags1: f1,
            flags2: f2,
            texture_set: Some(TextureSet {
                textures: slots.iter().map(|s| SizedString::new(s)).collect(),
            }),
            ..LightingShader::default()
        });
        MeshFile {
            shapes: vec![shape],
            ..MeshFile::default()
        }
    }

    fn vp(s: &str) -> VirtualPath {
        VirtualPath::new(s)
    }

    #[test]
    fn test_suffix_alone_classifies_normal() {
        let mut index = default_index();
        index.scan([vp("textures/rock_n.dds")]);
        index.finalize(|_| false).unwrap();

        let entry = index.get_texture_map(TextureSlot::Normal)["textures/rock"].clone();
        assert_eq!(entry.texture_type, TextureType::Normal);
        assert_eq!(entry.base, "textures/rock");
    }

    #[test]
    fn test_observation_overrides_suffix() {
        let mut index = default_index();
        index.scan([vp("textures/rock_n.dds"), vp("textures/rock.dds")]);
        let mesh = mesh_with(
            ShaderType::Parallax,
            flags1::PARALLAX,
            0,
            &["textures\\rock.dds", "", "", "textures\\Rock_N.dds"],
        );
        index.disambiguate([&mesh]).unwrap();

        assert!(index.get_texture_map(TextureSlot::Normal).is_empty());
        let height = index.get_texture_map(TextureSlot::Parallax);
        assert_eq!(height["textures/rock"].texture_type, TextureType::Height);
        assert_eq!(height["textures/rock"].path, vp("textures/rock_n.dds"));

        // No suffix at all, but observed in the diffuse slot.
        let diffuse = index.get_texture_map(TextureSlot::Diffuse);
        assert_eq!(diffuse["textures/rock"].path, vp("textures/rock.dds"));
    }

    #[test]
    fn test_conflicting_observations_fall_back_to_suffix() {
        let mut index = default_index();
        index.scan([vp("textures/rock_n.dds")]);
        let a = mesh_with(ShaderType::Parallax, flags1::PARALLAX, 0, &["", "", "", "textures/rock_n.dds"]);
        let b = mesh_with(ShaderType::Default, 0, 0, &["", "textures/rock_n.dds"]);
        index.disambiguate([&a, &b]).unwrap();

        assert_eq!(
            index.get_texture_type(&vp("textures/rock_n.dds")),
            Some(TextureType::Normal)
        );
    }

    #[test]
    fn test_majority_type_independent_of_order() {
        let envmap = mesh_with(
            ShaderType::EnvironmentMap,
            flags1::ENVIRONMENT_MAPPING,
            0,
            &["textures/rock.dds", "", "", "", "", "textures/rock_m.dds"],
        );
        let pbr = mesh_with(
            ShaderType::Default,
            0,
            flags2::UNUSED01,
            &["textures/rock.dds", "", "", "", "", "textures/rock_m.dds"],
        );

        let classify = |meshes: [&MeshFile; 3]| {
            let mut index = default_index();
            index.scan([vp("textures/rock_m.dds")]);
            index.disambiguate(meshes).unwrap();
            index.get_texture_type(&vp("textures/rock_m.dds"))
        };
        let envmap_first = classify([&envmap, &pbr, &pbr]);
        let pbr_first = classify([&pbr, &pbr, &envmap]);
        assert_eq!(envmap_first, Some(TextureType::Rmaos));
        assert_eq!(envmap_first, pbr_first);
    }

    #[test]
    fn test_type_tie_uses_type_order() {
        let envmap = mesh_with(
            ShaderType::EnvironmentMap,
            flags1::ENVIRONMENT_MAPPING,
            0,
            &["", "", "", "", "", "textures/rock_m.dds"],
        );
        let pbr = mesh_with(
            ShaderType::Default,
            0,
            flags2::UNUSED01,
            &["", "", "", "", "", "textures/rock_m.dds"],
        );
        for meshes in [[&envmap, &pbr], [&pbr, &envmap]] {
            let mut index = default_index();
            index.scan([vp("textures/rock_m.dds")]);
            index.disambiguate(meshes).unwrap();
            assert_eq!(
                index.get_texture_type(&vp("textures/rock_m.dds")),
                Some(TextureType::EnvironmentMask)
            );
        }
    }

    #[test]
    fn test_vanilla_height_maps_ignored() {
        let mut index = default_index();
        index.scan([vp("textures/rock_p.dds"), vp("textures/moss_p.dds"), vp("textures/rock_n.dds")]);
        index.set_vanilla_textures([vp("textures/rock_p.dds"), vp("textures/rock_n.dds")]);
        index.finalize(|_| false).unwrap();

        let height = index.get_texture_map(TextureSlot::Parallax);
        assert!(!height.contains_key("textures/rock"));
        assert!(height.contains_key("textures/moss"));
        assert_eq!(index.get_texture_type(&vp("textures/rock_p.dds")), None);
        assert_eq!(
            index.get_texture_type(&vp("textures/rock_n.dds")),
            Some(TextureType::Normal)
        );
    }

    #[test]
    fn test_ambiguous_suffix_uses_lowest_slot() {
        let mut table = BTreeMap::new();
        table.insert(TextureSlot::Glow, vec!["_x".to_string()]);
        table.insert(TextureSlot::Normal, vec!["_x".to_string()]);
        let mut index = TextureIndex::new(SuffixTable::new(&table), BTreeMap::new());

        assert_eq!(
            index.guess_from_suffix(&vp("textures/a_x.dds")),
            SuffixGuess::Ambiguous(TextureSlot::Normal, TextureType::Normal)
        );
        index.scan([vp("textures/a_x.dds")]);
        index.finalize(|_| false).unwrap();
        assert_eq!(
            index.get_texture_type(&vp("textures/a_x.dds")),
            Some(TextureType::Normal)
        );
    }

    #[test]
    fn test_longest_suffix_wins() {
        let index = default_index();
        assert_eq!(index.texture_base(&vp("textures/a/b_envmask.dds")), "textures/a/b");
        assert_eq!(index.texture_base(&vp("textures/a/b_rmaos.dds")), "textures/a/b");
        assert_eq!(index.texture_base(&vp("textures/a/b.dds")), "textures/a/b");
        assert_eq!(
            index.guess_from_suffix(&vp("textures/b_rmaos.dds")),
            SuffixGuess::Classified(TextureSlot::EnvMask, TextureType::Rmaos)
        );
    }

    #[test]
    fn test_manual_map_wins() {
        let config = PatcherConfig::bundled().unwrap();
        let mut manual = BTreeMap::new();
        manual.insert(vp("textures/odd_n.dds"), TextureType::Height);
        let mut index = TextureIndex::new(SuffixTable::new(&config.suffix_table()), manual);
        index.scan([vp("textures/odd_n.dds")]);
        index.finalize(|_| false).unwrap();
        assert_eq!(
            index.find(TextureSlot::Parallax, "textures/odd", TextureType::Height).map(|e| e.path),
            Some(vp("textures/odd_n.dds"))
        );
    }

    #[test]
    fn test_env_mask_with_alpha_becomes_complex_material() {
        let mut index = default_index();
        index.scan([vp("textures/a_m.dds"), vp("textures/b_m.dds")]);
        index
            .finalize(|p| p.as_str() == "textures/a_m.dds")
            .unwrap();
        assert_eq!(
            index.get_texture_type(&vp("textures/a_m.dds")),
            Some(TextureType::ComplexMaterial)
        );
        assert_eq!(
            index.get_texture_type(&vp("textures/b_m.dds")),
            Some(TextureType::EnvironmentMask)
        );
    }

    #[test]
    fn test_conflict_later_insertion_wins() {
        let mut index = default_index();
        index.scan([vp("textures/rock_msn.dds"), vp("textures/rock_n.dds")]);
        index.finalize(|_| false).unwrap();
        let map = index.get_texture_map(TextureSlot::Normal);
        assert_eq!(map.len(), 1);
        assert_eq!(map["textures/rock"].path, vp("textures/rock_n.dds"));
    }

    #[test]
    fn test_observed_types_follow_shader() {
        use TextureSlot::*;
        assert_eq!(
            observed_type(EnvMask, ShaderType::Default, 0, flags2::UNUSED01),
            Some(TextureType::Rmaos)
        );
        assert_eq!(
            observed_type(EnvMask, ShaderType::EnvironmentMap, flags1::ENVIRONMENT_MAPPING, 0),
            Some(TextureType::EnvironmentMask)
        );
        assert_eq!(observed_type(Parallax, ShaderType::Default, 0, 0), None);
        assert_eq!(
            observed_type(Normal, ShaderType::SkinTint, flags1::FACEGEN_RGB_TINT, 0),
            Some(TextureType::ModelSpaceNormal)
        );
        assert_eq!(
            observed_type(Backlight, ShaderType::Default, 0, flags2::BACK_LIGHTING),
            Some(TextureType::Backlight)
        );
    }

    #[test]
    fn test_texture_type_from_str() {
        assert_eq!("complex material".parse::<TextureType>().unwrap(), TextureType::ComplexMaterial);
        assert_eq!("Model_Space_Normal".parse::<TextureType>().unwrap(), TextureType::ModelSpaceNormal);
        assert!("bogus".parse::<TextureType>().is_err());
    }
}
