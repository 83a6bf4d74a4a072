//! Textures: image pixels staged for upload

use crate::core::{Error, Result};
use crate::pack::{AssetDescriptor, AssetKind, ImageInfo, PixelFormat};

use super::handle::ResourceKind;
use super::state::{MaterializeError, Resource};

/// A 2D texture with an optional mip chain
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    width: u32,
    height: u32,
    mip_levels: u32,
    format: PixelFormat,
}

impl Texture {
    pub fn from_asset(asset: &AssetDescriptor) -> Result<Self> {
        let info = asset.image().ok_or(Error::KindMismatch {
            expected: AssetKind::Image,
            found: asset.kind(),
        })?;
        Ok(Self::from_info(info))
    }

    /// Texture produced at runtime (render targets, generated atlases)
    pub fn synthetic(width: u32, height: u32, format: PixelFormat) -> Self {
        Self { width, height, mip_levels: 1, format }
    }

    fn from_info(info: &ImageInfo) -> Self {
        Self {
            width: info.width,
            height: info.height,
            mip_levels: info.mip_levels.max(1),
            format: info.format,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn byte_size(&self) -> usize {
        ImageInfo {
            width: self.width,
            height: self.height,
            mip_levels: self.mip_levels,
            format: self.format,
        }
        .byte_size()
    }
}

impl Resource for Texture {
    const KIND: ResourceKind = ResourceKind::Texture;

    fn staging_size(&self, _asset: &AssetDescriptor) -> usize {
        self.byte_size()
    }

    fn materialize(
        &mut self,
        _asset: &AssetDescriptor,
        bytes: &[u8],
        staging: &mut [u8],
    ) -> std::result::Result<(), MaterializeError> {
        if bytes.len() != staging.len() {
            return Err(MaterializeError::SizeMismatch {
                expected: staging.len(),
                actual: bytes.len(),
            });
        }
        staging.copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::descriptor::test_descriptor;
    use crate::pack::{AssetInfo, TextInfo};

    fn image(width: u32, height: u32, mips: u32) -> AssetInfo {
        AssetInfo::Image(ImageInfo {
            width,
            height,
            mip_levels: mips,
            format: PixelFormat::Rgba8,
        })
    }

    #[test]
    fn test_from_asset() {
        let asset = test_descriptor(1, image(8, 4, 2), 160);
        let texture = Texture::from_asset(&asset).unwrap();
        assert_eq!(texture.width(), 8);
        assert_eq!(texture.mip_levels(), 2);
        // 8x4 + 4x2 at 4 bytes per pixel
        assert_eq!(texture.staging_size(&asset), 160);
    }

    #[test]
    fn test_wrong_kind() {
        let asset = test_descriptor(1, AssetInfo::Text(TextInfo { length: 4, encoding: 0 }), 4);
        assert!(matches!(
            Texture::from_asset(&asset),
            Err(Error::KindMismatch { expected: AssetKind::Image, found: AssetKind::Text })
        ));
    }

    #[test]
    fn test_materialize_copies_pixels() {
        let asset = test_descriptor(1, image(2, 2, 1), 16);
        let mut texture = Texture::from_asset(&asset).unwrap();
        let pixels: Vec<u8> = (0..16).collect();
        let mut staging = vec![0u8; 16];
        texture.materialize(&asset, &pixels, &mut staging).unwrap();
        assert_eq!(staging, pixels);
    }

    #[test]
    fn test_materialize_rejects_short_payload() {
        let asset = test_descriptor(1, image(2, 2, 1), 16);
        let mut texture = Texture::from_asset(&asset).unwrap();
        let mut staging = vec![0u8; 16];
        let err = texture.materialize(&asset, &[0u8; 8], &mut staging).unwrap_err();
        assert!(matches!(err, MaterializeError::SizeMismatch { expected: 16, actual: 8 }));
    }
}
