//! Texture slot indices of a texture set.

use std::fmt;

/// Number of texture slots in a texture set.
pub const NUM_TEXTURE_SLOTS: usize = 9;

/// A full set of slot paths; empty strings are empty slots.
pub type SlotArray = [String; NUM_TEXTURE_SLOTS];

/// Role of each index in a texture set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureSlot {
    Diffuse = 0,
    Normal = 1,
    Glow = 2,
    Parallax = 3,
    Cubemap = 4,
    EnvMask = 5,
    Multilayer = 6,
    Backlight = 7,
    Unused = 8,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; NUM_TEXTURE_SLOTS] = [
        TextureSlot::Diffuse,
        TextureSlot::Normal,
        TextureSlot::Glow,
        TextureSlot::Parallax,
        TextureSlot::Cubemap,
        TextureSlot::EnvMask,
        TextureSlot::Multilayer,
        TextureSlot::Backlight,
        TextureSlot::Unused,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// Lowercase role name used in configuration and logs.
    pub fn name(self) -> &'static str {
        match self {
            TextureSlot::Diffuse => "diffuse",
            TextureSlot::Normal => "normal",
            TextureSlot::Glow => "glow",
            TextureSlot::Parallax => "height",
            TextureSlot::Cubemap => "cubemap",
            TextureSlot::EnvMask => "environment mask",
            TextureSlot::Multilayer => "tint",
            TextureSlot::Backlight => "backlight",
            TextureSlot::Unused => "unused",
        }
    }
}

impl fmt::Display for TextureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An all-empty slot array.
pub fn empty_slots() -> SlotArray {
    Default::default()
}
