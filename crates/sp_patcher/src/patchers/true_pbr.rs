//! Physically based rendering driven by JSON entries.
//!
//! Entries come from `pbrnifpatcher/*.json` documents in the overlay, each an array
//! of objects. An entry matches a shape when the texture base of the shape's normal
//! (`match_normal`) or diffuse (`match_diffuse`) slot ends with the entry's value
//! at a path component boundary, or when the diffuse base contains `path_contains`.
//!
//! # Match Algorithm
//!
//! 1. Collect every accepted entry for the shape, skipping entries whose
//!    `nif_filter` is not part of the mesh path.
//! 2. For each entry compute the PBR texture base: the matched slot's base moved
//!    under `textures\pbr\`, with the matched part replaced by `rename` if given.
//! 3. Group entries by the JSON document they came from. Each group is one match
//!    whose owner is the mod providing that document.
//! 4. Drop groups whose resulting slots reference missing files, unless the group
//!    deletes the shape or the `no_path_check` option is set.
//! 5. Order groups by their earliest entry.
//! 6. Without any entry, a shape whose `textures\pbr\` RMAOS exists still matches,
//!    as does a shape that is already PBR; both only move slots under `textures\pbr\`.

use super::{MatchData, MeshInfo, PatcherContext, PatcherMatch, ShaderFamily, ShaderPatcher};
use crate::error::{Error, Result};
use crate::textures::{SuffixTable, TextureType};
use serde::Deserialize;
use serde_json::Value;
use sp_mesh::{flags1, flags2, ShaderType, Shape, SlotArray, TextureSlot, NUM_TEXTURE_SLOTS};
use sp_vfs::{DataDirectory, FileFilter, VirtualPath};
use std::collections::{BTreeMap, BTreeSet};

/// Overlay folder searched for PBR entry documents.
pub const PBR_CONFIG_GLOB: &str = "pbrnifpatcher/*.json";

/// Family option that keeps matches whose slots reference missing files.
pub const NO_PATH_CHECK_OPTION: &str = "no_path_check";

const TEXTURES_PREFIX: &str = "textures\\";
const PBR_PREFIX: &str = "textures\\pbr\\";

/// One entry of a PBR document. Keys this crate does not act on are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PbrEntry {
    #[serde(default, alias = "texture")]
    pub match_diffuse: Option<String>,
    #[serde(default)]
    pub match_normal: Option<String>,
    #[serde(default)]
    pub path_contains: Option<String>,
    #[serde(default)]
    pub nif_filter: Option<String>,
    #[serde(default)]
    pub rename: Option<String>,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub pbr: Option<bool>,
    #[serde(default)]
    pub lock_diffuse: bool,
    #[serde(default)]
    pub lock_normal: bool,
    #[serde(default)]
    pub lock_rmaos: bool,
    #[serde(default)]
    pub lock_emissive: bool,
    #[serde(default)]
    pub lock_parallax: bool,
    #[serde(default)]
    pub lock_cubemap: bool,
    #[serde(default)]
    pub lock_cnr: bool,
    #[serde(default)]
    pub lock_subsurface: bool,
    #[serde(default)]
    pub emissive: Option<bool>,
    #[serde(default)]
    pub parallax: Option<bool>,
    #[serde(default)]
    pub subsurface: Option<bool>,
    #[serde(default)]
    pub coat_normal: Option<bool>,
    #[serde(default)]
    pub multilayer: bool,
    #[serde(default)]
    pub hair: bool,
    #[serde(default)]
    pub cubemap: Option<String>,
    #[serde(default)]
    pub uv_scale: Option<f32>,
    #[serde(default)]
    pub vertex_colors: Option<bool>,
    #[serde(default)]
    pub env_mapping: bool,
    #[serde(default)]
    pub env_map_scale: Option<f32>,
    #[serde(default)]
    pub specular_level: Option<f32>,
    #[serde(default)]
    pub roughness_scale: Option<f32>,
    #[serde(default)]
    pub emissive_scale: Option<f32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,

    /// Document the entry was loaded from.
    #[serde(skip)]
    pub source: VirtualPath,
    /// Load position across every document.
    #[serde(skip)]
    pub order: usize,
}

impl PbrEntry {
    /// Normalize the filename fields to lowercase backslash form with a leading
    /// separator, so suffix matching stops at a path component boundary.
    fn normalize(&mut self) {
        for field in [&mut self.match_diffuse, &mut self.match_normal, &mut self.rename] {
            if let Some(value) = field.as_mut() {
                let mut normalized = value.replace('/', "\\").to_lowercase();
                if !normalized.starts_with('\\') {
                    normalized.insert(0, '\\');
                }
                *value = normalized;
            }
        }
        if let Some(value) = self.path_contains.as_mut() {
            *value = value.replace('/', "\\").to_lowercase();
        }
        if let Some(value) = self.nif_filter.as_mut() {
            *value = value.replace('\\', "/").to_lowercase();
        }
    }

    /// The field an entry was matched by, reduced to its texture base.
    fn matched_field_base(&self, suffixes: &SuffixTable) -> String {
        let field = self
            .match_normal
            .as_deref()
            .or(self.match_diffuse.as_deref())
            .unwrap_or_default();
        field_base(field, suffixes)
    }

    /// Slot override from a `slot1`..`slot8` key.
    fn slot_override(&self, index: usize) -> Option<String> {
        let value = self.extra.get(&format!("slot{}", index + 1))?.as_str()?;
        let value = value.replace('/', "\\");
        if value.to_lowercase().starts_with(TEXTURES_PREFIX) {
            Some(value)
        } else {
            Some(format!("{}{}", TEXTURES_PREFIX, value))
        }
    }
}

/// `\`-prefixed texture base of a filename field.
fn field_base(field: &str, suffixes: &SuffixTable) -> String {
    if field.is_empty() {
        return String::new();
    }
    let base = suffixes.texture_base(&VirtualPath::new(field));
    format!("\\{}", base.replace('/', "\\"))
}

/// Load every entry from the overlay's PBR documents, in path order.
///
/// A document that cannot be read or parsed is logged and skipped.
pub fn load_pbr_entries(directory: &DataDirectory) -> Result<Vec<PbrEntry>> {
    let filter = FileFilter::new(&[PBR_CONFIG_GLOB], &[], &[])?;
    let mut entries = Vec::new();
    for path in directory.find_files(&filter) {
        let bytes = match directory.get_file(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Unable to read PBR config {}: {}", path, e);
                continue;
            }
        };
        let parsed: Vec<PbrEntry> = match serde_json::from_slice(&bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!("Unable to parse PBR config {}: {}", path, e);
                continue;
            }
        };
        for mut entry in parsed {
            entry.normalize();
            entry.source = path.clone();
            entry.order = entries.len();
            entries.push(entry);
        }
    }
    tracing::info!("Found {} PBR entries", entries.len());
    Ok(entries)
}

/// Entries of one document that matched a shape.
#[derive(Debug, Clone, PartialEq)]
pub struct PbrMatchData {
    /// (index into the context's entries, PBR texture base or empty when PBR is off)
    pub applications: Vec<(usize, String)>,
}

impl PbrMatchData {
    fn deletes(&self, entries: &[PbrEntry]) -> bool {
        self.applications
            .iter()
            .any(|(i, _)| entries.get(*i).map(|e| e.delete).unwrap_or(false))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TruePbrPatcher;

impl TruePbrPatcher {
    fn collect_entries(
        &self,
        ctx: &PatcherContext<'_>,
        mesh: &MeshInfo<'_>,
        slots: &SlotArray,
    ) -> BTreeMap<usize, String> {
        let suffixes = ctx.textures.suffixes();
        let search = |slot: TextureSlot| -> Option<String> {
            let raw = &slots[slot.index()];
            if raw.is_empty() {
                return None;
            }
            let base = suffixes.texture_base(&VirtualPath::new(raw));
            Some(base.replace('/', "\\"))
        };
        let diffuse_base = search(TextureSlot::Diffuse);

        let mut accepted: BTreeMap<usize, String> = BTreeMap::new();
        for slot in ctx.family_config(ShaderFamily::TruePbr).lookup_slots() {
            let Some(base) = search(slot) else {
                continue;
            };
            let boundary = format!("\\{}", base);
            for (index, entry) in ctx.pbr_entries.iter().enumerate() {
                let field = match slot {
                    TextureSlot::Normal => entry.match_normal.as_deref(),
                    // entries keyed on the normal never match by diffuse
                    TextureSlot::Diffuse if entry.match_normal.is_none() => {
                        entry.match_diffuse.as_deref()
                    }
                    _ => None,
                };
                let Some(field) = field else {
                    continue;
                };
                let key = field_base(field, suffixes);
                if key.is_empty() || !boundary.ends_with(&key) {
                    continue;
                }
                self.accept(mesh, entry, index, &base, suffixes, &mut accepted);
            }
        }

        if let Some(diffuse) = &diffuse_base {
            for (index, entry) in ctx.pbr_entries.iter().enumerate() {
                if entry.match_normal.is_some() {
                    continue;
                }
                let Some(needle) = entry.path_contains.as_deref() else {
                    continue;
                };
                if diffuse.contains(needle) {
                    self.accept(mesh, entry, index, diffuse, suffixes, &mut accepted);
                }
            }
        }
        accepted
    }

    fn accept(
        &self,
        mesh: &MeshInfo<'_>,
        entry: &PbrEntry,
        index: usize,
        base: &str,
        suffixes: &SuffixTable,
        accepted: &mut BTreeMap<usize, String>,
    ) {
        if accepted.contains_key(&index) {
            return;
        }
        if let Some(filter) = entry.nif_filter.as_deref() {
            if !mesh.path.as_str().contains(filter) {
                tracing::trace!("PBR entry {} rejected by nif_filter", index);
                return;
            }
        }

        let mut tex_path = base.to_string();
        if tex_path.starts_with(TEXTURES_PREFIX) && !tex_path.starts_with(PBR_PREFIX) {
            tex_path.replace_range(..TEXTURES_PREFIX.len(), PBR_PREFIX);
        }
        let matched = entry.matched_field_base(suffixes);
        if tex_path.ends_with(&matched) {
            tex_path.truncate(tex_path.len() - matched.len());
        }
        let replacement = entry.rename.as_deref().unwrap_or(&matched);
        let pbr_base = format!("{}{}", tex_path, replacement).to_lowercase();

        let enable_pbr = entry.pbr.unwrap_or(true) && !pbr_base.is_empty();
        let pbr_base = if enable_pbr { pbr_base } else { String::new() };
        tracing::trace!("PBR entry {} accepted: {}", index, pbr_base);
        accepted.insert(index, pbr_base);
    }

    /// Slots after applying every entry of a match.
    fn patched_slots(entries: &[PbrEntry], old: &SlotArray, matched: &PatcherMatch) -> SlotArray {
        let mut slots = old.clone();
        match &matched.data {
            MatchData::Pbr(data) => {
                for (index, pbr_base) in &data.applications {
                    if let Some(entry) = entries.get(*index) {
                        apply_entry_slots(&mut slots, entry, pbr_base);
                    }
                }
            }
            MatchData::None => {
                for slot in slots.iter_mut() {
                    *slot = with_pbr_prefix(slot);
                }
            }
        }
        slots
    }
}

impl ShaderPatcher for TruePbrPatcher {
    fn family(&self) -> ShaderFamily {
        ShaderFamily::TruePbr
    }

    fn can_apply(&self, _ctx: &PatcherContext<'_>, _mesh: &MeshInfo<'_>, shape: &Shape) -> bool {
        match shape.lighting() {
            Some(shader) if shader.has_flag1(flags1::FACEGEN_RGB_TINT) => {
                tracing::trace!("True PBR: face-gen RGB tint");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn should_apply(
        &self,
        ctx: &PatcherContext<'_>,
        mesh: &MeshInfo<'_>,
        shape: &Shape,
    ) -> Vec<PatcherMatch> {
        let slots = shape.texture_slots();
        let accepted = self.collect_entries(ctx, mesh, &slots);
        let check_paths = !ctx
            .family_config(ShaderFamily::TruePbr)
            .has_option(NO_PATH_CHECK_OPTION);

        let mut groups: BTreeMap<&VirtualPath, PatcherMatch> = BTreeMap::new();
        for (index, pbr_base) in &accepted {
            let entry = &ctx.pbr_entries[*index];
            let from = if entry.match_normal.is_some() {
                TextureSlot::Normal
            } else {
                TextureSlot::Diffuse
            };
            let group = groups.entry(&entry.source).or_insert_with(|| PatcherMatch {
                matched_path: entry.source.clone(),
                matched_from: BTreeSet::new(),
                data: MatchData::Pbr(PbrMatchData {
                    applications: Vec::new(),
                }),
            });
            group.matched_from.insert(from);
            if let MatchData::Pbr(data) = &mut group.data {
                data.applications.push((*index, pbr_base.clone()));
            }
        }

        let mut matches: Vec<PatcherMatch> = groups
            .into_values()
            .filter(|m| {
                let deletes = matches!(&m.data, MatchData::Pbr(d) if d.deletes(&ctx.pbr_entries));
                if deletes || !check_paths {
                    return true;
                }
                let new_slots = Self::patched_slots(&ctx.pbr_entries, &slots, m);
                match new_slots.iter().find(|s| !s.is_empty() && !ctx.slot_exists(s)) {
                    Some(missing) => {
                        tracing::trace!("PBR match {} rejected: {} does not exist", m.matched_path, missing);
                        false
                    }
                    None => true,
                }
            })
            .collect();
        matches.sort_by_key(|m| match &m.data {
            MatchData::Pbr(d) => d.applications.iter().map(|(i, _)| *i).min().unwrap_or(usize::MAX),
            MatchData::None => usize::MAX,
        });

        if accepted.is_empty() {
            let rmaos = with_pbr_prefix(&slots[TextureSlot::EnvMask.index()]);
            let rmaos = VirtualPath::new(&rmaos);
            if !rmaos.is_empty() && ctx.textures.get_texture_type(&rmaos) == Some(TextureType::Rmaos) {
                tracing::trace!("Found RMAOS without entry: {}", rmaos);
                matches.push(PatcherMatch {
                    matched_path: rmaos,
                    matched_from: BTreeSet::from([TextureSlot::EnvMask]),
                    data: MatchData::None,
                });
            }
        }

        let already_pbr = shape
            .lighting()
            .map(|s| s.has_flag2(flags2::UNUSED01))
            .unwrap_or(false);
        if already_pbr && ctx.slot_exists(&slots[TextureSlot::EnvMask.index()]) {
            tracing::trace!("Shape already has PBR");
            matches.push(PatcherMatch {
                matched_path: mesh.path.clone(),
                matched_from: BTreeSet::new(),
                data: MatchData::None,
            });
        }

        matches
    }

    fn apply_patch(
        &self,
        ctx: &PatcherContext<'_>,
        _mesh: &MeshInfo<'_>,
        shape: &mut Shape,
        matched: &PatcherMatch,
    ) -> Result<bool> {
        let data = match &matched.data {
            MatchData::Pbr(data) => data,
            MatchData::None => {
                let slots = Self::patched_slots(&ctx.pbr_entries, &shape.texture_slots(), matched);
                return Ok(shape.set_texture_slots(&slots)?);
            }
        };

        let mut changed = false;
        for (index, pbr_base) in &data.applications {
            let entry = ctx
                .pbr_entries
                .get(*index)
                .ok_or_else(|| Error::Other(format!("PBR entry {} is missing", index)))?;
            changed |= apply_entry(shape, entry, pbr_base)?;
        }
        Ok(changed)
    }
}

/// Move a `textures\` slot under `textures\pbr\`.
fn with_pbr_prefix(slot: &str) -> String {
    let lower = slot.to_lowercase();
    if lower.starts_with(TEXTURES_PREFIX) && !lower.starts_with(PBR_PREFIX) {
        format!("{}{}", PBR_PREFIX, &slot[TEXTURES_PREFIX.len()..])
    } else {
        slot.to_string()
    }
}

fn apply_entry_slots(slots: &mut SlotArray, entry: &PbrEntry, pbr_base: &str) {
    if pbr_base.is_empty() {
        return;
    }
    let with_suffix = |suffix: &str| format!("{}{}.dds", pbr_base, suffix);

    if !entry.lock_diffuse {
        slots[TextureSlot::Diffuse.index()] = with_suffix("");
    }
    if !entry.lock_normal {
        slots[TextureSlot::Normal.index()] = with_suffix("_n");
    }
    if let (Some(emissive), false) = (entry.emissive, entry.lock_emissive) {
        slots[TextureSlot::Glow.index()] = if emissive { with_suffix("_g") } else { String::new() };
    }
    if let (Some(parallax), false) = (entry.parallax, entry.lock_parallax) {
        slots[TextureSlot::Parallax.index()] = if parallax { with_suffix("_p") } else { String::new() };
    }
    slots[TextureSlot::Cubemap.index()] = match (&entry.cubemap, entry.lock_cubemap) {
        (Some(cubemap), false) => cubemap.clone(),
        _ => String::new(),
    };
    if !entry.lock_rmaos {
        slots[TextureSlot::EnvMask.index()] = with_suffix("_rmaos");
    }
    if !entry.lock_cnr {
        slots[TextureSlot::Multilayer.index()] = if entry.coat_normal == Some(true) {
            with_suffix("_cnr")
        } else {
            String::new()
        };
    }
    if !entry.lock_subsurface {
        slots[TextureSlot::Backlight.index()] = if entry.subsurface == Some(true) {
            with_suffix("_s")
        } else {
            String::new()
        };
    }
    for index in 0..NUM_TEXTURE_SLOTS - 1 {
        if let Some(value) = entry.slot_override(index) {
            slots[index] = value;
        }
    }
}

fn apply_entry(shape: &mut Shape, entry: &PbrEntry, pbr_base: &str) -> Result<bool> {
    let enable_pbr = !pbr_base.is_empty();
    let enable_env_mapping = entry.env_mapping && !enable_pbr;
    let mut changed = false;

    if entry.delete {
        let shader = lighting(shape)?;
        if shader.alpha > 0.0 {
            changed |= shader.set_alpha(0.0);
        }
        return Ok(changed);
    }

    if let Some(vertex_colors) = entry.vertex_colors {
        changed |= shape.set_vertex_colors(vertex_colors);
    }

    {
        let shader = lighting(shape)?;
        if let Some(level) = entry.specular_level {
            changed |= shader.set_glossiness(level);
        }
        if let Some(scale) = entry.roughness_scale {
            changed |= shader.set_specular_strength(scale);
        }
        if enable_env_mapping {
            changed |= shader.set_shader_type(ShaderType::EnvironmentMap);
            changed |= shader.set_flag1(flags1::ENVIRONMENT_MAPPING, true);
            changed |= shader.set_flag2(flags2::BACK_LIGHTING, true);
            if let Some(scale) = entry.env_map_scale {
                changed |= shader.set_env_map_scale(scale);
            }
        }
        if let Some(scale) = entry.emissive_scale {
            let color = shader.emissive_color;
            changed |= shader.set_emissive(color, scale);
        }
        if let Some(scale) = entry.uv_scale {
            changed |= shader.set_uv_scale([scale, scale]);
        }
    }

    if enable_pbr {
        changed |= enable_pbr_on_shape(shape, entry, pbr_base)?;
    }
    Ok(changed)
}

fn enable_pbr_on_shape(shape: &mut Shape, entry: &PbrEntry, pbr_base: &str) -> Result<bool> {
    let mut slots = shape.texture_slots();
    apply_entry_slots(&mut slots, entry, pbr_base);
    let mut changed = shape.set_texture_slots(&slots)?;

    let shader = lighting(shape)?;
    if let Some(emissive) = entry.emissive {
        changed |= shader.set_flag1(flags1::EXTERNAL_EMITTANCE, emissive);
    }
    changed |= shader.set_flag1(flags1::ENVIRONMENT_MAPPING, false);
    changed |= shader.set_flag1(flags1::HAIR_SOFT_LIGHTING, false);
    changed |= shader.set_flag1(flags1::PARALLAX, false);
    changed |= shader.set_flag2(flags2::GLOW_MAP, false);
    changed |= shader.set_flag2(flags2::UNUSED01, true);

    if let Some(subsurface) = entry.subsurface {
        changed |= shader.set_flag2(flags2::RIM_LIGHTING, subsurface);
    }
    if entry.hair {
        changed |= shader.set_flag2(flags2::BACK_LIGHTING, true);
    }

    if entry.multilayer {
        changed |= shader.set_shader_type(ShaderType::MultiLayerParallax);
        changed |= shader.set_flag2(flags2::MULTI_LAYER_PARALLAX, true);
        if let Some(coat_normal) = entry.coat_normal {
            changed |= shader.set_flag2(flags2::BACK_LIGHTING, coat_normal);
        }
    } else {
        changed |= shader.set_shader_type(ShaderType::Default);
        changed |= shader.set_flag2(flags2::MULTI_LAYER_PARALLAX, false);
        if !entry.hair {
            changed |= shader.set_flag2(flags2::BACK_LIGHTING, false);
        }
        changed |= shader.set_flag2(flags2::SOFT_LIGHTING, false);
    }
    Ok(changed)
}

fn lighting(shape: &mut Shape) -> Result<&mut sp_mesh::LightingShader> {
    shape
        .lighting_mut()
        .ok_or_else(|| Error::Other("shape has no lighting shader".to_string()))
}
