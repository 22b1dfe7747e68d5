//! Mesh container format.
//!
//! A mesh is a flat list of shapes. Each shape names its geometry block kind,
//! carries its geometry as an opaque payload, and owns at most one shader block.
//! Lighting shaders carry the shader type, both flag fields, the scalar material
//! parameters and an optional texture set.
//!
//! All integers are little-endian. Strings and byte payloads are `u32`-length
//! prefixed. Booleans are a single byte.

use crate::error::{Error, Result};
use crate::flags::ShaderType;
use crate::slots::{SlotArray, NUM_TEXTURE_SLOTS};
use binrw::{binrw, BinRead, BinWrite};
use std::borrow::Cow;
use std::io::Cursor;

/// Current container version.
pub const MESH_VERSION: u32 = 1;

/// Length-prefixed byte string. Texture paths are stored verbatim and may not be
/// valid UTF-8, so they are kept as bytes.
#[binrw]
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SizedString {
    #[bw(try_calc(u32::try_from(bytes.len())))]
    len: u32,

    #[br(count = len)]
    pub bytes: Vec<u8>,
}

impl SizedString {
    pub fn new(value: &str) -> Self {
        Self {
            bytes: value.as_bytes().to_vec(),
        }
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn is_ascii(&self) -> bool {
        self.bytes.is_ascii()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// ASCII case-insensitive comparison against `other`.
    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.bytes.eq_ignore_ascii_case(other.as_bytes())
    }
}

/// Geometry block kind of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    NiTriShape,
    NiTriStrips,
    BSTriShape,
    BSLODTriShape,
    BSMeshLODTriShape,
    BSDynamicTriShape,
    BSSubIndexTriShape,
    Other(u16),
}

impl ShapeKind {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => ShapeKind::NiTriShape,
            1 => ShapeKind::NiTriStrips,
            2 => ShapeKind::BSTriShape,
            3 => ShapeKind::BSLODTriShape,
            4 => ShapeKind::BSMeshLODTriShape,
            5 => ShapeKind::BSDynamicTriShape,
            6 => ShapeKind::BSSubIndexTriShape,
            other => ShapeKind::Other(other),
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            ShapeKind::NiTriShape => 0,
            ShapeKind::NiTriStrips => 1,
            ShapeKind::BSTriShape => 2,
            ShapeKind::BSLODTriShape => 3,
            ShapeKind::BSMeshLODTriShape => 4,
            ShapeKind::BSDynamicTriShape => 5,
            ShapeKind::BSSubIndexTriShape => 6,
            ShapeKind::Other(raw) => raw,
        }
    }

    /// Kinds whose shaders the patchers know how to edit.
    pub fn is_patchable(self) -> bool {
        matches!(
            self,
            ShapeKind::NiTriShape
                | ShapeKind::BSTriShape
                | ShapeKind::BSLODTriShape
                | ShapeKind::BSMeshLODTriShape
        )
    }
}

/// Ordered texture slot paths of a lighting shader.
#[binrw]
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TextureSet {
    #[bw(try_calc(u32::try_from(textures.len())))]
    texture_count: u32,

    #[br(count = texture_count)]
    pub textures: Vec<SizedString>,
}

impl TextureSet {
    /// Grow or shrink to exactly `len` slots. Returns whether anything changed.
    pub fn resize(&mut self, len: usize) -> bool {
        if self.textures.len() == len {
            return false;
        }
        self.textures.resize_with(len, SizedString::default);
        true
    }

    pub fn slot(&self, index: usize) -> Option<&SizedString> {
        self.textures.get(index)
    }
}

#[binrw]
#[derive(Debug, Clone, PartialEq)]
pub struct LightingShader {
    pub shader_type: u32,
    pub flags1: u32,
    pub flags2: u32,
    pub uv_offset: [f32; 2],
    pub uv_scale: [f32; 2],
    pub alpha: f32,
    pub emissive_color: [f32; 3],
    pub emissive_multiple: f32,
    pub env_map_scale: f32,
    pub specular_color: [f32; 3],
    pub specular_strength: f32,
    pub glossiness: f32,

    #[bw(calc = u8::from(texture_set.is_some()))]
    has_texture_set: u8,

    #[br(if(has_texture_set != 0))]
    pub texture_set: Option<TextureSet>,
}

impl Default for LightingShader {
    fn default() -> Self {
        Self {
            shader_type: ShaderType::Default.to_raw(),
            flags1: 0,
            flags2: 0,
            uv_offset: [0.0, 0.0],
            uv_scale: [1.0, 1.0],
            alpha: 1.0,
            emissive_color: [0.0; 3],
            emissive_multiple: 1.0,
            env_map_scale: 1.0,
            specular_color: [1.0; 3],
            specular_strength: 1.0,
            glossiness: 80.0,
            texture_set: None,
        }
    }
}

impl LightingShader {
    pub fn shader_type(&self) -> ShaderType {
        ShaderType::from_raw(self.shader_type)
    }

    pub fn set_shader_type(&mut self, shader_type: ShaderType) -> bool {
        set_if_changed(&mut self.shader_type, shader_type.to_raw())
    }

    pub fn has_flag1(&self, flag: u32) -> bool {
        self.flags1 & flag != 0
    }

    pub fn has_flag2(&self, flag: u32) -> bool {
        self.flags2 & flag != 0
    }

    pub fn set_flag1(&mut self, flag: u32, enable: bool) -> bool {
        set_bits(&mut self.flags1, flag, enable)
    }

    pub fn set_flag2(&mut self, flag: u32, enable: bool) -> bool {
        set_bits(&mut self.flags2, flag, enable)
    }

    pub fn set_alpha(&mut self, alpha: f32) -> bool {
        set_if_changed(&mut self.alpha, alpha)
    }

    pub fn set_uv_scale(&mut self, scale: [f32; 2]) -> bool {
        set_if_changed(&mut self.uv_scale, scale)
    }

    pub fn set_env_map_scale(&mut self, scale: f32) -> bool {
        set_if_changed(&mut self.env_map_scale, scale)
    }

    pub fn set_specular_strength(&mut self, strength: f32) -> bool {
        set_if_changed(&mut self.specular_strength, strength)
    }

    pub fn set_glossiness(&mut self, glossiness: f32) -> bool {
        set_if_changed(&mut self.glossiness, glossiness)
    }

    pub fn set_emissive(&mut self, color: [f32; 3], multiple: f32) -> bool {
        let color_changed = set_if_changed(&mut self.emissive_color, color);
        set_if_changed(&mut self.emissive_multiple, multiple) || color_changed
    }
}

#[binrw]
#[derive(Default, Debug, Clone, PartialEq)]
pub struct EffectShader {
    pub flags1: u32,
    pub flags2: u32,
    pub source_texture: SizedString,
    pub greyscale_texture: SizedString,
    pub uv_scale: [f32; 2],
}

/// Shader attached to a shape.
#[binrw]
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderBlock {
    #[brw(magic = 0u8)]
    Unset,

    #[brw(magic = 1u8)]
    Lighting(LightingShader),

    #[brw(magic = 2u8)]
    Effect(EffectShader),
}

#[binrw]
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub name: SizedString,

    #[br(map = ShapeKind::from_raw)]
    #[bw(map = |k: &ShapeKind| k.to_raw())]
    pub kind: ShapeKind,

    #[br(map = |x: u8| x != 0)]
    #[bw(map = |x: &bool| u8::from(*x))]
    pub skinned: bool,

    #[br(map = |x: u8| x != 0)]
    #[bw(map = |x: &bool| u8::from(*x))]
    pub has_vertex_colors: bool,

    #[bw(try_calc(u32::try_from(geometry.len())))]
    geometry_len: u32,

    #[br(count = geometry_len)]
    pub geometry: Vec<u8>,

    pub shader: ShaderBlock,
}

impl Shape {
    /// A shape with a lighting shader and no texture set.
    pub fn new(name: &str, kind: ShapeKind) -> Self {
        Self {
            name: SizedString::new(name),
            kind,
            skinned: false,
            has_vertex_colors: false,
            geometry: Vec::new(),
            shader: ShaderBlock::Lighting(LightingShader::default()),
        }
    }

    pub fn name(&self) -> Cow<'_, str> {
        self.name.to_string_lossy()
    }

    pub fn lighting(&self) -> Option<&LightingShader> {
        match &self.shader {
            ShaderBlock::Lighting(shader) => Some(shader),
            _ => None,
        }
    }

    pub fn lighting_mut(&mut self) -> Option<&mut LightingShader> {
        match &mut self.shader {
            ShaderBlock::Lighting(shader) => Some(shader),
            _ => None,
        }
    }

    pub fn texture_set(&self) -> Option<&TextureSet> {
        self.lighting().and_then(|s| s.texture_set.as_ref())
    }

    /// Whether the patchers can operate on this shape at all.
    pub fn is_patchable(&self) -> bool {
        self.kind.is_patchable() && self.texture_set().is_some()
    }

    /// All slots as strings, padded with empty entries.
    pub fn texture_slots(&self) -> SlotArray {
        let mut slots = SlotArray::default();
        if let Some(set) = self.texture_set() {
            for (slot, tex) in slots.iter_mut().zip(&set.textures) {
                *slot = tex.to_string_lossy().into_owned();
            }
        }
        slots
    }

    /// Whether any slot path contains non-ASCII bytes.
    pub fn has_non_ascii_slot(&self) -> bool {
        self.texture_set()
            .is_some_and(|set| set.textures.iter().any(|t| !t.is_ascii()))
    }

    /// Pad the texture set to the full slot count. Returns whether it changed.
    pub fn normalize_texture_set(&mut self) -> Result<bool> {
        let name = self.name().into_owned();
        let set = self.texture_set_mut().ok_or(Error::NoTextureSet(name))?;
        if set.textures.len() >= NUM_TEXTURE_SLOTS {
            return Ok(false);
        }
        Ok(set.resize(NUM_TEXTURE_SLOTS))
    }

    /// Write new slot paths. Slots that already match case-insensitively are left
    /// untouched so unchanged meshes stay byte-identical.
    pub fn set_texture_slots(&mut self, slots: &SlotArray) -> Result<bool> {
        let mut changed = self.normalize_texture_set()?;
        let name = self.name().into_owned();
        let set = self.texture_set_mut().ok_or(Error::NoTextureSet(name))?;

        for (current, new) in set.textures.iter_mut().zip(slots) {
            if !current.eq_ignore_case(new) {
                *current = SizedString::new(new);
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Toggle vertex colors on both the geometry and the shader flag.
    pub fn set_vertex_colors(&mut self, enable: bool) -> bool {
        let geometry_changed = set_if_changed(&mut self.has_vertex_colors, enable);
        let Some(shader) = self.lighting_mut() else {
            return geometry_changed;
        };
        shader.set_flag2(crate::flags::flags2::VERTEX_COLORS, enable) || geometry_changed
    }

    fn texture_set_mut(&mut self) -> Option<&mut TextureSet> {
        self.lighting_mut().and_then(|s| s.texture_set.as_mut())
    }
}

/// A parsed mesh file.
#[binrw]
#[brw(little, magic = b"SPMF")]
#[derive(Debug, Clone, PartialEq)]
pub struct MeshFile {
    #[br(assert(version == MESH_VERSION, "Unsupported mesh version"))]
    pub version: u32,

    #[br(map = |x: u8| x != 0)]
    #[bw(map = |x: &bool| u8::from(*x))]
    pub has_havok: bool,

    #[bw(try_calc(u32::try_from(shapes.len())))]
    shape_count: u32,

    #[br(count = shape_count)]
    pub shapes: Vec<Shape>,
}

impl Default for MeshFile {
    fn default() -> Self {
        Self {
            version: MESH_VERSION,
            has_havok: false,
            shapes: Vec::new(),
        }
    }
}

impl MeshFile {
    pub fn load(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Empty);
        }
        let mut cursor = Cursor::new(data);
        Ok(Self::read(&mut cursor)?)
    }

    pub fn dump(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.write(&mut buffer)?;
        Ok(buffer.into_inner())
    }
}

fn set_if_changed<T: PartialEq>(field: &mut T, value: T) -> bool {
    if *field == value {
        return false;
    }
    *field = value;
    true
}

fn set_bits(field: &mut u32, flag: u32, enable: bool) -> bool {
    let new = if enable { *field | flag } else { *field & !flag };
    set_if_changed(field, new)
}
