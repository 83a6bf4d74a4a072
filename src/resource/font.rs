//! Fonts: glyph metrics decoded on the CPU, pixels live in an atlas texture

use glam::Vec2;

use crate::core::{Error, Result};
use crate::pack::descriptor::GLYPH_RECORD_SIZE;
use crate::pack::{AssetDescriptor, AssetKind};

use super::handle::{Handle, ResourceId, ResourceKind};
use super::state::{MaterializeError, Resource};
use super::texture::Texture;

/// Placement of one glyph in the atlas
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glyph {
    pub codepoint: char,
    /// Atlas rectangle in pixels
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub advance: f32,
    pub bearing: Vec2,
}

impl Glyph {
    fn parse(record: &[u8]) -> std::result::Result<Self, MaterializeError> {
        let u32_at = |at: usize| u32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]]);
        let u16_at = |at: usize| u16::from_le_bytes([record[at], record[at + 1]]);
        let f32_at = |at: usize| f32::from_bits(u32_at(at));

        let raw = u32_at(0);
        let codepoint = char::from_u32(raw)
            .ok_or_else(|| MaterializeError::Invalid(format!("bad codepoint {raw:#x}")))?;
        Ok(Self {
            codepoint,
            x: u16_at(4),
            y: u16_at(6),
            width: u16_at(8),
            height: u16_at(10),
            advance: f32_at(12),
            bearing: Vec2::new(f32_at(16), f32_at(20)),
        })
    }
}

/// Glyph table of a bitmap font
#[derive(Clone, Debug)]
pub struct Font {
    atlas: Handle<Texture>,
    line_height: f32,
    atlas_size: (u32, u32),
    glyph_count: usize,
    /// Sorted by codepoint
    glyphs: Vec<Glyph>,
}

impl Font {
    pub fn from_asset(asset: &AssetDescriptor, atlas: Handle<Texture>) -> Result<Self> {
        let info = asset.font().ok_or(Error::KindMismatch {
            expected: AssetKind::Font,
            found: asset.kind(),
        })?;
        Ok(Self {
            atlas,
            line_height: info.line_height,
            atlas_size: (info.atlas_width, info.atlas_height),
            glyph_count: info.glyph_count as usize,
            glyphs: Vec::new(),
        })
    }

    pub fn atlas(&self) -> Handle<Texture> {
        self.atlas
    }

    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    pub fn atlas_size(&self) -> (u32, u32) {
        self.atlas_size
    }

    /// Empty until materialized
    pub fn glyphs(&self) -> &[Glyph] {
        &self.glyphs
    }

    pub fn glyph(&self, c: char) -> Option<&Glyph> {
        self.glyphs
            .binary_search_by_key(&c, |g| g.codepoint)
            .ok()
            .map(|i| &self.glyphs[i])
    }

    /// Horizontal advance of `text`; unknown characters count as zero.
    pub fn measure(&self, text: &str) -> f32 {
        text.chars().filter_map(|c| self.glyph(c)).map(|g| g.advance).sum()
    }
}

impl Resource for Font {
    const KIND: ResourceKind = ResourceKind::Font;

    fn staging_size(&self, _asset: &AssetDescriptor) -> usize {
        0
    }

    fn materialize(
        &mut self,
        _asset: &AssetDescriptor,
        bytes: &[u8],
        _staging: &mut [u8],
    ) -> std::result::Result<(), MaterializeError> {
        let expected = self.glyph_count * GLYPH_RECORD_SIZE;
        if bytes.len() != expected {
            return Err(MaterializeError::SizeMismatch { expected, actual: bytes.len() });
        }

        let mut glyphs = bytes
            .chunks_exact(GLYPH_RECORD_SIZE)
            .map(Glyph::parse)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let (width, height) = self.atlas_size;
        if let Some(g) = glyphs
            .iter()
            .find(|g| g.x as u32 + g.width as u32 > width || g.y as u32 + g.height as u32 > height)
        {
            return Err(MaterializeError::Invalid(format!(
                "glyph {:?} lies outside the {width}x{height} atlas",
                g.codepoint
            )));
        }
        glyphs.sort_by_key(|g| g.codepoint);
        self.glyphs = glyphs;
        Ok(())
    }

    fn dependencies(&self) -> Vec<ResourceId> {
        vec![self.atlas.id()]
    }

    fn destroy(&mut self) {
        self.glyphs = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::descriptor::test_descriptor;
    use crate::pack::{AssetInfo, FontInfo};

    fn record(c: char, x: u16, advance: f32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(c as u32).to_le_bytes());
        for v in [x, 0, 8, 8] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in [advance, 1.0, 7.0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    fn font(glyphs: u32) -> (std::sync::Arc<AssetDescriptor>, Font) {
        let info = AssetInfo::Font(FontInfo {
            glyph_count: glyphs,
            line_height: 10.0,
            atlas_width: 32,
            atlas_height: 8,
        });
        let asset = test_descriptor(2, info, glyphs as usize * GLYPH_RECORD_SIZE);
        let atlas = Handle::new(ResourceId { index: 0, generation: 0 });
        let font = Font::from_asset(&asset, atlas).unwrap();
        (asset, font)
    }

    #[test]
    fn test_parse_and_lookup() {
        let (asset, mut font) = font(2);
        let bytes = [record('b', 8, 6.0), record('a', 0, 5.0)].concat();
        font.materialize(&asset, &bytes, &mut []).unwrap();

        assert_eq!(font.glyphs()[0].codepoint, 'a');
        let b = font.glyph('b').unwrap();
        assert_eq!(b.x, 8);
        assert_eq!(b.bearing, Vec2::new(1.0, 7.0));
        assert!(font.glyph('z').is_none());
        assert_eq!(font.measure("abz"), 11.0);
    }

    #[test]
    fn test_depends_on_atlas() {
        let (_, font) = font(1);
        assert_eq!(font.dependencies(), vec![font.atlas().id()]);
    }

    #[test]
    fn test_glyph_outside_atlas() {
        let (asset, mut font) = font(1);
        let bytes = record('a', 30, 5.0);
        assert!(matches!(
            font.materialize(&asset, &bytes, &mut []),
            Err(MaterializeError::Invalid(_))
        ));
    }

    #[test]
    fn test_truncated_table() {
        let (asset, mut font) = font(2);
        let bytes = record('a', 0, 5.0);
        assert!(matches!(
            font.materialize(&asset, &bytes, &mut []),
            Err(MaterializeError::SizeMismatch { expected: 48, actual: 24 })
        ));
    }
}
