//! Image service boundary.
//!
//! Patchers only need a handful of facts about texture images: dimensions, whether
//! an alpha channel exists, and occasionally a generated derivative. These sit
//! behind [`ImageService`] so the pipeline never depends on a GPU codec.
//! [`DdsImageService`] answers the metadata questions from the DDS header alone.

use crate::error::{Error, Result};
use ddsfile::{D3DFormat, Dds, DxgiFormat};
use std::io::Cursor;

/// Header facts of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub format: ImageFormat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageFormat {
    /// Extended header carrying a DXGI format.
    Dxgi(DxgiFormat),
    /// Legacy header (four-character code or pixel masks).
    D3d(D3DFormat),
    Unknown,
}

pub trait ImageService: Send + Sync {
    /// Read the header of an encoded image.
    fn decode(&self, bytes: &[u8]) -> Result<ImageInfo>;

    /// Whether two images share the same width to height ratio.
    fn check_aspect_ratio_match(&self, a: &[u8], b: &[u8]) -> Result<bool> {
        let a = self.decode(a)?;
        let b = self.decode(b)?;
        Ok(u64::from(a.width) * u64::from(b.height) == u64::from(b.width) * u64::from(a.height))
    }

    /// Build a complex material mask from a height map, keeping the existing
    /// environment mask in the colour channels when one is given.
    fn upgrade_height_to_complex_material(
        &self,
        _height: &[u8],
        _env_mask: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        Err(Error::ImageUnsupported(
            "height to complex material conversion".to_string(),
        ))
    }
}

/// Header-only DDS reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct DdsImageService;

impl DdsImageService {
    pub fn new() -> Self {
        Self
    }
}

impl ImageService for DdsImageService {
    fn decode(&self, bytes: &[u8]) -> Result<ImageInfo> {
        let dds = Dds::read(Cursor::new(bytes))
            .map_err(|e| Error::InvalidImage(format!("Failed to parse DDS: {e}")))?;

        let (format, has_alpha) = if let Some(dxgi) = dds.get_dxgi_format() {
            (ImageFormat::Dxgi(dxgi), dxgi_has_alpha(dxgi))
        } else if let Some(d3d) = dds.get_d3d_format() {
            (ImageFormat::D3d(d3d), d3d_has_alpha(d3d))
        } else {
            (ImageFormat::Unknown, false)
        };

        Ok(ImageInfo {
            width: dds.get_width(),
            height: dds.get_height(),
            has_alpha,
            format,
        })
    }
}

fn dxgi_has_alpha(format: DxgiFormat) -> bool {
    matches!(
        format,
        DxgiFormat::R8G8B8A8_Typeless
            | DxgiFormat::R8G8B8A8_UNorm
            | DxgiFormat::R8G8B8A8_UNorm_sRGB
            | DxgiFormat::B8G8R8A8_Typeless
            | DxgiFormat::B8G8R8A8_UNorm
            | DxgiFormat::B8G8R8A8_UNorm_sRGB
            | DxgiFormat::R16G16B16A16_Float
            | DxgiFormat::R16G16B16A16_UNorm
            | DxgiFormat::R10G10B10A2_UNorm
            | DxgiFormat::A8_UNorm
            | DxgiFormat::B5G5R5A1_UNorm
            | DxgiFormat::B4G4R4A4_UNorm
            | DxgiFormat::BC2_Typeless
            | DxgiFormat::BC2_UNorm
            | DxgiFormat::BC2_UNorm_sRGB
            | DxgiFormat::BC3_Typeless
            | DxgiFormat::BC3_UNorm
            | DxgiFormat::BC3_UNorm_sRGB
            | DxgiFormat::BC7_Typeless
            | DxgiFormat::BC7_UNorm
            | DxgiFormat::BC7_UNorm_sRGB
    )
}

fn d3d_has_alpha(format: D3DFormat) -> bool {
    matches!(
        format,
        D3DFormat::DXT2
            | D3DFormat::DXT3
            | D3DFormat::DXT4
            | D3DFormat::DXT5
            | D3DFormat::A8R8G8B8
            | D3DFormat::A8B8G8R8
            | D3DFormat::A1R5G5B5
            | D3DFormat::A4R4G4B4
            | D3DFormat::A8
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ddsfile::{AlphaMode, D3D10ResourceDimension, NewD3dParams, NewDxgiParams};

    /// Legacy-header DDS with zeroed pixel data.
    pub(crate) fn d3d_dds(width: u32, height: u32, format: D3DFormat) -> Vec<u8> {
        let dds = Dds::new_d3d(NewD3dParams {
            height,
            width,
            depth: None,
            format,
            mipmap_levels: None,
            caps2: None,
        })
        .unwrap();
        let mut out = Vec::new();
        dds.write(&mut out).unwrap();
        out
    }

    /// DX10-header DDS with zeroed pixel data.
    pub(crate) fn dxgi_dds(width: u32, height: u32, format: DxgiFormat) -> Vec<u8> {
        let dds = Dds::new_dxgi(NewDxgiParams {
            height,
            width,
            depth: None,
            format,
            mipmap_levels: None,
            array_layers: None,
            caps2: None,
            is_cubemap: false,
            resource_dimension: D3D10ResourceDimension::Texture2D,
            alpha_mode: AlphaMode::Straight,
        })
        .unwrap();
        let mut out = Vec::new();
        dds.write(&mut out).unwrap();
        out
    }

    #[test]
    fn test_decode_legacy_alpha() {
        let service = DdsImageService::new();
        let dxt1 = service.decode(&d3d_dds(512, 256, D3DFormat::DXT1)).unwrap();
        assert_eq!((dxt1.width, dxt1.height), (512, 256));
        assert!(!dxt1.has_alpha);
        assert_eq!(dxt1.format, ImageFormat::D3d(D3DFormat::DXT1));
        assert!(service.decode(&d3d_dds(4, 4, D3DFormat::DXT5)).unwrap().has_alpha);
        assert!(service.decode(&d3d_dds(4, 4, D3DFormat::A8R8G8B8)).unwrap().has_alpha);
    }

    #[test]
    fn test_decode_dx10() {
        let service = DdsImageService::new();
        let bc7 = service.decode(&dxgi_dds(8, 4, DxgiFormat::BC7_UNorm)).unwrap();
        assert_eq!((bc7.width, bc7.height), (8, 4));
        assert!(bc7.has_alpha);
        assert!(!service.decode(&dxgi_dds(4, 4, DxgiFormat::BC5_UNorm)).unwrap().has_alpha);
        assert!(!service.decode(&dxgi_dds(4, 4, DxgiFormat::BC1_UNorm)).unwrap().has_alpha);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let service = DdsImageService::new();
        assert!(matches!(service.decode(b"nope"), Err(Error::InvalidImage(_))));
        assert!(matches!(service.decode(b"DDS "), Err(Error::InvalidImage(_))));
    }

    #[test]
    fn test_aspect_ratio() {
        let service = DdsImageService::new();
        let a = d3d_dds(1024, 512, D3DFormat::DXT1);
        let b = d3d_dds(512, 256, D3DFormat::DXT1);
        let c = d3d_dds(512, 512, D3DFormat::DXT1);
        assert!(service.check_aspect_ratio_match(&a, &b).unwrap());
        assert!(!service.check_aspect_ratio_match(&a, &c).unwrap());
    }

    #[test]
    fn test_upgrade_unsupported_by_default() {
        let service = DdsImageService::new();
        assert!(matches!(
            service.upgrade_height_to_complex_material(&[], None),
            Err(Error::ImageUnsupported(_))
        ));
    }
}
