//! Lighting shader types and flag bits.
//!
//! Values follow the engine's `BSLightingShaderProperty` layout: the shader type is
//! a `u32` tag, and two independent `u32` bitfields carry the flags.

/// Shader type tag of a lighting shader block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Default,
    EnvironmentMap,
    GlowMap,
    Parallax,
    FaceTint,
    SkinTint,
    HairTint,
    ParallaxOcclusion,
    MultitextureLandscape,
    LodLandscape,
    Snow,
    MultiLayerParallax,
    TreeAnim,
    LodObjects,
    SparkleSnow,
    LodObjectsHd,
    Eye,
    Cloud,
    LodLandscapeNoise,
    MultitextureLandscapeLodBlend,
    Dismemberment,
    /// A tag this crate does not know about, preserved as-is.
    Other(u32),
}

impl ShaderType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => ShaderType::Default,
            1 => ShaderType::EnvironmentMap,
            2 => ShaderType::GlowMap,
            3 => ShaderType::Parallax,
            4 => ShaderType::FaceTint,
            5 => ShaderType::SkinTint,
            6 => ShaderType::HairTint,
            7 => ShaderType::ParallaxOcclusion,
            8 => ShaderType::MultitextureLandscape,
            9 => ShaderType::LodLandscape,
            10 => ShaderType::Snow,
            11 => ShaderType::MultiLayerParallax,
            12 => ShaderType::TreeAnim,
            13 => ShaderType::LodObjects,
            14 => ShaderType::SparkleSnow,
            15 => ShaderType::LodObjectsHd,
            16 => ShaderType::Eye,
            17 => ShaderType::Cloud,
            18 => ShaderType::LodLandscapeNoise,
            19 => ShaderType::MultitextureLandscapeLodBlend,
            20 => ShaderType::Dismemberment,
            other => ShaderType::Other(other),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            ShaderType::Default => 0,
            ShaderType::EnvironmentMap => 1,
            ShaderType::GlowMap => 2,
            ShaderType::Parallax => 3,
            ShaderType::FaceTint => 4,
            ShaderType::SkinTint => 5,
            ShaderType::HairTint => 6,
            ShaderType::ParallaxOcclusion => 7,
            ShaderType::MultitextureLandscape => 8,
            ShaderType::LodLandscape => 9,
            ShaderType::Snow => 10,
            ShaderType::MultiLayerParallax => 11,
            ShaderType::TreeAnim => 12,
            ShaderType::LodObjects => 13,
            ShaderType::SparkleSnow => 14,
            ShaderType::LodObjectsHd => 15,
            ShaderType::Eye => 16,
            ShaderType::Cloud => 17,
            ShaderType::LodLandscapeNoise => 18,
            ShaderType::MultitextureLandscapeLodBlend => 19,
            ShaderType::Dismemberment => 20,
            ShaderType::Other(raw) => raw,
        }
    }
}

/// Bits of the first shader flag field.
pub mod flags1 {
    pub const SPECULAR: u32 = 1 << 0;
    pub const SKINNED: u32 = 1 << 1;
    pub const VERTEX_ALPHA: u32 = 1 << 3;
    pub const ENVIRONMENT_MAPPING: u32 = 1 << 7;
    pub const RECEIVE_SHADOWS: u32 = 1 << 8;
    pub const CAST_SHADOWS: u32 = 1 << 9;
    pub const PARALLAX: u32 = 1 << 11;
    pub const MODEL_SPACE_NORMALS: u32 = 1 << 12;
    pub const EYE_ENVIRONMENT_MAPPING: u32 = 1 << 17;
    pub const HAIR_SOFT_LIGHTING: u32 = 1 << 18;
    pub const FACEGEN_RGB_TINT: u32 = 1 << 21;
    pub const EXTERNAL_EMITTANCE: u32 = 1 << 22;
    pub const DECAL: u32 = 1 << 26;
    pub const DYNAMIC_DECAL: u32 = 1 << 27;
    pub const PARALLAX_OCCLUSION: u32 = 1 << 28;
    pub const SOFT_EFFECT: u32 = 1 << 30;
    pub const ZBUFFER_TEST: u32 = 1 << 31;
}

/// Bits of the second shader flag field.
pub mod flags2 {
    pub const ZBUFFER_WRITE: u32 = 1 << 0;
    pub const DOUBLE_SIDED: u32 = 1 << 4;
    pub const VERTEX_COLORS: u32 = 1 << 5;
    pub const GLOW_MAP: u32 = 1 << 6;
    pub const ENVMAP_LIGHT_FADE: u32 = 1 << 15;
    /// Marker bit used by PBR-aware renderers.
    pub const UNUSED01: u32 = 1 << 23;
    pub const MULTI_LAYER_PARALLAX: u32 = 1 << 24;
    pub const SOFT_LIGHTING: u32 = 1 << 25;
    pub const RIM_LIGHTING: u32 = 1 << 26;
    pub const BACK_LIGHTING: u32 = 1 << 27;
    pub const TREE_ANIM: u32 = 1 << 29;
}
