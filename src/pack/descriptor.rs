//! Immutable asset metadata
//!
//! Each asset's kind header is decoded into one variant of [`AssetInfo`];
//! the fields are enough to size destination storage before any payload
//! bytes are requested.

use glam::Vec3;
use std::fmt;
use std::sync::Arc;

use super::format::{ChunkTag, FieldReader, FieldWriter};
use crate::core::{Error, Result};
use crate::io::PackFile;

/// Size of one glyph record in a font's glyph table
pub const GLYPH_RECORD_SIZE: usize = 24;

/// Manager-wide asset id (pack-local id offset by the pack's reserved base)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId(pub u32);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a loaded pack within its manager
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PackId(pub u32);

/// Asset kind tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Text,
    Image,
    Font,
    Mesh,
    Material,
    Model,
    Catalog,
}

impl AssetKind {
    /// Chunk tag of this kind's header
    pub fn tag(self) -> ChunkTag {
        match self {
            AssetKind::Text => ChunkTag::TEXT,
            AssetKind::Image => ChunkTag::IMAGE,
            AssetKind::Font => ChunkTag::FONT,
            AssetKind::Mesh => ChunkTag::MESH,
            AssetKind::Material => ChunkTag::MATERIAL,
            AssetKind::Model => ChunkTag::MODEL,
            AssetKind::Catalog => ChunkTag::CATALOG,
        }
    }

    pub fn from_tag(tag: ChunkTag) -> Option<Self> {
        Some(match tag {
            ChunkTag::TEXT => AssetKind::Text,
            ChunkTag::IMAGE => AssetKind::Image,
            ChunkTag::FONT => AssetKind::Font,
            ChunkTag::MESH => AssetKind::Mesh,
            ChunkTag::MATERIAL => AssetKind::Material,
            ChunkTag::MODEL => AssetKind::Model,
            ChunkTag::CATALOG => AssetKind::Catalog,
            _ => return None,
        })
    }
}

/// Pixel layout of image payloads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    R8,
    Rg8,
    Rgba8,
    Rgba16Float,
    Rgba32Float,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::R8 => 1,
            PixelFormat::Rg8 => 2,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgba16Float => 8,
            PixelFormat::Rgba32Float => 16,
        }
    }

    fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => PixelFormat::R8,
            1 => PixelFormat::Rg8,
            2 => PixelFormat::Rgba8,
            3 => PixelFormat::Rgba16Float,
            4 => PixelFormat::Rgba32Float,
            _ => return None,
        })
    }

    fn to_u32(self) -> u32 {
        match self {
            PixelFormat::R8 => 0,
            PixelFormat::Rg8 => 1,
            PixelFormat::Rgba8 => 2,
            PixelFormat::Rgba16Float => 3,
            PixelFormat::Rgba32Float => 4,
        }
    }
}

/// Text asset header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextInfo {
    pub length: u32,
    /// 0 = UTF-8
    pub encoding: u32,
}

/// Image asset header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: PixelFormat,
}

impl ImageInfo {
    /// Longest possible mip chain for these dimensions, down to 1x1
    pub fn max_mip_levels(&self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    /// Bytes of the full mip chain, each level halving down to 1x1.
    /// `None` if the size does not fit in `usize`.
    pub fn checked_byte_size(&self) -> Option<usize> {
        let bpp = self.format.bytes_per_pixel();
        (0..self.mip_levels.clamp(1, self.max_mip_levels())).try_fold(0usize, |total, level| {
            let w = (self.width >> level).max(1) as usize;
            let h = (self.height >> level).max(1) as usize;
            w.checked_mul(h)?.checked_mul(bpp)?.checked_add(total)
        })
    }

    /// Saturating form of [`checked_byte_size`](Self::checked_byte_size)
    pub fn byte_size(&self) -> usize {
        self.checked_byte_size().unwrap_or(usize::MAX)
    }
}

/// Mesh asset header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshInfo {
    pub vertex_count: u32,
    pub index_count: u32,
    pub vertex_stride: u32,
    /// 2 or 4
    pub index_size: u32,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
}

impl MeshInfo {
    /// Vertex plus index bytes, `None` on overflow
    pub fn checked_byte_size(&self) -> Option<usize> {
        let vertices = (self.vertex_count as usize).checked_mul(self.vertex_stride as usize)?;
        let indices = (self.index_count as usize).checked_mul(self.index_size as usize)?;
        vertices.checked_add(indices)
    }

    pub fn vertex_bytes(&self) -> usize {
        self.vertex_count as usize * self.vertex_stride as usize
    }

    pub fn index_bytes(&self) -> usize {
        self.index_count as usize * self.index_size as usize
    }
}

/// Material asset header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialInfo {
    pub texture_count: u32,
    /// Number of f32 parameters in the payload
    pub param_count: u32,
}

/// Font asset header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FontInfo {
    pub glyph_count: u32,
    pub line_height: f32,
    pub atlas_width: u32,
    pub atlas_height: u32,
}

impl FontInfo {
    pub fn glyph_table_size(&self) -> usize {
        self.glyph_count as usize * GLYPH_RECORD_SIZE
    }
}

/// Model asset header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelInfo {
    pub mesh_count: u32,
    pub material_count: u32,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
}

/// Catalog asset header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CatalogInfo {
    pub entry_count: u32,
}

/// Kind-specific header, keyed by [`AssetKind`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AssetInfo {
    Text(TextInfo),
    Image(ImageInfo),
    Font(FontInfo),
    Mesh(MeshInfo),
    Material(MaterialInfo),
    Model(ModelInfo),
    Catalog(CatalogInfo),
}

impl AssetInfo {
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetInfo::Text(_) => AssetKind::Text,
            AssetInfo::Image(_) => AssetKind::Image,
            AssetInfo::Font(_) => AssetKind::Font,
            AssetInfo::Mesh(_) => AssetKind::Mesh,
            AssetInfo::Material(_) => AssetKind::Material,
            AssetInfo::Model(_) => AssetKind::Model,
            AssetInfo::Catalog(_) => AssetKind::Catalog,
        }
    }

    /// Decode a kind-header chunk. Returns `Ok(None)` for tags that are not
    /// kind headers.
    pub(crate) fn decode(tag: ChunkTag, bytes: &[u8]) -> Result<Option<Self>> {
        let Some(kind) = AssetKind::from_tag(tag) else {
            return Ok(None);
        };
        let mut r = FieldReader::new(tag, bytes);
        let info = match kind {
            AssetKind::Text => AssetInfo::Text(TextInfo {
                length: r.u32()?,
                encoding: r.u32()?,
            }),
            AssetKind::Image => {
                let width = r.u32()?;
                let height = r.u32()?;
                let mip_levels = r.u32()?;
                let raw_format = r.u32()?;
                let format = PixelFormat::from_u32(raw_format)
                    .ok_or_else(|| Error::Corrupt(format!("unknown pixel format {raw_format}")))?;
                let image = ImageInfo { width, height, mip_levels, format };
                if width == 0 || height == 0 {
                    return Err(Error::Corrupt(format!("image has zero size {width}x{height}")));
                }
                if mip_levels > image.max_mip_levels() {
                    return Err(Error::Corrupt(format!(
                        "{mip_levels} mip levels for a {width}x{height} image (at most {})",
                        image.max_mip_levels()
                    )));
                }
                AssetInfo::Image(image)
            }
            AssetKind::Font => AssetInfo::Font(FontInfo {
                glyph_count: r.u32()?,
                line_height: r.f32()?,
                atlas_width: r.u32()?,
                atlas_height: r.u32()?,
            }),
            AssetKind::Mesh => {
                let mesh = MeshInfo {
                    vertex_count: r.u32()?,
                    index_count: r.u32()?,
                    vertex_stride: r.u32()?,
                    index_size: r.u32()?,
                    bounds_min: r.vec3()?,
                    bounds_max: r.vec3()?,
                };
                if mesh.index_size != 2 && mesh.index_size != 4 {
                    return Err(Error::Corrupt(format!("bad index size {}", mesh.index_size)));
                }
                AssetInfo::Mesh(mesh)
            }
            AssetKind::Material => AssetInfo::Material(MaterialInfo {
                texture_count: r.u32()?,
                param_count: r.u32()?,
            }),
            AssetKind::Model => AssetInfo::Model(ModelInfo {
                mesh_count: r.u32()?,
                material_count: r.u32()?,
                bounds_min: r.vec3()?,
                bounds_max: r.vec3()?,
            }),
            AssetKind::Catalog => AssetInfo::Catalog(CatalogInfo {
                entry_count: r.u32()?,
            }),
        };
        Ok(Some(info))
    }

    /// Payload size the header dictates, for kinds whose header fixes it.
    ///
    /// # Returns
    /// `Ok(None)` for kinds with free-form payloads, `Err` if the header
    /// describes a size that does not fit in `usize`
    pub fn payload_size(&self) -> Result<Option<usize>> {
        let size = match self {
            AssetInfo::Image(i) => i.checked_byte_size(),
            AssetInfo::Mesh(m) => m.checked_byte_size(),
            AssetInfo::Font(f) => (f.glyph_count as usize).checked_mul(GLYPH_RECORD_SIZE),
            AssetInfo::Material(m) => (m.param_count as usize).checked_mul(4),
            AssetInfo::Text(_) | AssetInfo::Model(_) | AssetInfo::Catalog(_) => return Ok(None),
        };
        size.map(Some)
            .ok_or_else(|| Error::Corrupt(format!("{:?} header describes an unaddressable payload", self.kind())))
    }

    /// Encode as a kind-header chunk payload
    pub(crate) fn encode(&self) -> (ChunkTag, Vec<u8>) {
        let mut w = FieldWriter::default();
        match self {
            AssetInfo::Text(t) => {
                w.u32(t.length).u32(t.encoding);
            }
            AssetInfo::Image(i) => {
                w.u32(i.width).u32(i.height).u32(i.mip_levels).u32(i.format.to_u32());
            }
            AssetInfo::Font(f) => {
                w.u32(f.glyph_count).f32(f.line_height).u32(f.atlas_width).u32(f.atlas_height);
            }
            AssetInfo::Mesh(m) => {
                w.u32(m.vertex_count)
                    .u32(m.index_count)
                    .u32(m.vertex_stride)
                    .u32(m.index_size)
                    .vec3(m.bounds_min)
                    .vec3(m.bounds_max);
            }
            AssetInfo::Material(m) => {
                w.u32(m.texture_count).u32(m.param_count);
            }
            AssetInfo::Model(m) => {
                w.u32(m.mesh_count)
                    .u32(m.material_count)
                    .vec3(m.bounds_min)
                    .vec3(m.bounds_max);
            }
            AssetInfo::Catalog(c) => {
                w.u32(c.entry_count);
            }
        }
        (self.kind().tag(), w.bytes)
    }
}

/// Payload encoding inside the container
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    /// LZ4 block with the uncompressed size prepended
    Lz4,
}

/// Location of an asset's payload inside its pack
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataRange {
    /// File offset of the first stored byte
    pub offset: u64,
    /// Bytes stored in the file
    pub stored_size: usize,
    /// Bytes after decompression
    pub size: usize,
    pub compression: Compression,
    /// Checksum of the stored bytes
    pub checksum: u32,
}

/// An open pack file shared by all of its descriptors
pub struct PackSource {
    pub id: PackId,
    pub name: String,
    pub file: Arc<dyn PackFile>,
}

impl fmt::Debug for PackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackSource")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("file", &"<PackFile>")
            .finish()
    }
}

/// Immutable metadata record for one asset
#[derive(Debug)]
pub struct AssetDescriptor {
    id: AssetId,
    info: AssetInfo,
    data: DataRange,
    source: Arc<PackSource>,
}

impl AssetDescriptor {
    pub fn new(id: AssetId, info: AssetInfo, data: DataRange, source: Arc<PackSource>) -> Self {
        Self { id, info, data, source }
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn kind(&self) -> AssetKind {
        self.info.kind()
    }

    pub fn info(&self) -> &AssetInfo {
        &self.info
    }

    /// Uncompressed payload size, i.e. the bytes the cache must hold
    pub fn size(&self) -> usize {
        self.data.size
    }

    pub fn data(&self) -> &DataRange {
        &self.data
    }

    /// The pack this asset was loaded from
    pub fn source(&self) -> &Arc<PackSource> {
        &self.source
    }

    pub fn image(&self) -> Option<&ImageInfo> {
        match &self.info {
            AssetInfo::Image(i) => Some(i),
            _ => None,
        }
    }

    pub fn mesh(&self) -> Option<&MeshInfo> {
        match &self.info {
            AssetInfo::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn font(&self) -> Option<&FontInfo> {
        match &self.info {
            AssetInfo::Font(f) => Some(f),
            _ => None,
        }
    }

    pub fn material(&self) -> Option<&MaterialInfo> {
        match &self.info {
            AssetInfo::Material(m) => Some(m),
            _ => None,
        }
    }
}

/// Descriptor backed by an empty in-memory pack, for tests that never read
/// the payload from disk.
#[cfg(test)]
pub(crate) fn test_descriptor(id: u32, info: AssetInfo, size: usize) -> Arc<AssetDescriptor> {
    use crate::io::{FileSystem, MemoryFileSystem};

    let fs = MemoryFileSystem::new();
    fs.insert("test.pak", Vec::new());
    let source = Arc::new(PackSource {
        id: PackId(0),
        name: "test.pak".into(),
        file: fs.open("test.pak").unwrap(),
    });
    let data = DataRange {
        offset: 0,
        stored_size: size,
        size,
        compression: Compression::None,
        checksum: 0,
    };
    Arc::new(AssetDescriptor::new(AssetId(id), info, data, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_byte_size_with_mips() {
        let info = ImageInfo { width: 4, height: 2, mip_levels: 3, format: PixelFormat::Rgba8 };
        // 4x2 + 2x1 + 1x1 pixels
        assert_eq!(info.byte_size(), (8 + 2 + 1) * 4);
    }

    #[test]
    fn test_image_zero_mips_counts_base_level() {
        let info = ImageInfo { width: 16, height: 16, mip_levels: 0, format: PixelFormat::R8 };
        assert_eq!(info.byte_size(), 256);
    }

    #[test]
    fn test_decode_mesh_header() {
        let info = AssetInfo::Mesh(MeshInfo {
            vertex_count: 3,
            index_count: 3,
            vertex_stride: 12,
            index_size: 2,
            bounds_min: Vec3::ZERO,
            bounds_max: Vec3::new(1.0, 2.0, 3.0),
        });
        let (tag, bytes) = info.encode();
        assert_eq!(tag, ChunkTag::MESH);

        let decoded = AssetInfo::decode(tag, &bytes).unwrap().unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.kind(), AssetKind::Mesh);
    }

    #[test]
    fn test_decode_rejects_bad_index_size() {
        let mut w = FieldWriter::default();
        w.u32(3).u32(3).u32(12).u32(3).vec3(Vec3::ZERO).vec3(Vec3::ONE);
        let err = AssetInfo::decode(ChunkTag::MESH, &w.bytes).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_format() {
        let mut w = FieldWriter::default();
        w.u32(1).u32(1).u32(1).u32(99);
        assert!(AssetInfo::decode(ChunkTag::IMAGE, &w.bytes).is_err());
    }

    #[test]
    fn test_decode_ignores_non_header_tags() {
        assert!(AssetInfo::decode(ChunkTag::DATA, &[]).unwrap().is_none());
    }

    #[test]
    fn test_kind_tags_are_distinct() {
        let kinds = [
            AssetKind::Text,
            AssetKind::Image,
            AssetKind::Font,
            AssetKind::Mesh,
            AssetKind::Material,
            AssetKind::Model,
            AssetKind::Catalog,
        ];
        for kind in kinds {
            assert_eq!(AssetKind::from_tag(kind.tag()), Some(kind));
        }
    }

    #[test]
    fn test_decode_rejects_excess_mips() {
        let info = AssetInfo::Image(ImageInfo { width: 4, height: 4, mip_levels: 40, format: PixelFormat::R8 });
        let (tag, bytes) = info.encode();
        assert!(matches!(AssetInfo::decode(tag, &bytes), Err(Error::Corrupt(_))));

        // 4x4 -> 2x2 -> 1x1 is the longest chain
        let info = AssetInfo::Image(ImageInfo { width: 4, height: 4, mip_levels: 3, format: PixelFormat::R8 });
        let (tag, bytes) = info.encode();
        assert_eq!(AssetInfo::decode(tag, &bytes).unwrap(), Some(info));
    }

    #[test]
    fn test_decode_rejects_zero_sized_image() {
        let info = AssetInfo::Image(ImageInfo { width: 0, height: 8, mip_levels: 1, format: PixelFormat::R8 });
        let (tag, bytes) = info.encode();
        assert!(matches!(AssetInfo::decode(tag, &bytes), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_byte_size_clamps_mip_chain() {
        let info = ImageInfo { width: 4, height: 4, mip_levels: u32::MAX, format: PixelFormat::R8 };
        assert_eq!(info.max_mip_levels(), 3);
        assert_eq!(info.byte_size(), 16 + 4 + 1);
    }

    #[test]
    fn test_payload_size_per_kind() {
        let image = AssetInfo::Image(ImageInfo { width: 2, height: 2, mip_levels: 1, format: PixelFormat::Rgba8 });
        assert_eq!(image.payload_size().unwrap(), Some(16));

        let font = AssetInfo::Font(FontInfo { glyph_count: 2, line_height: 1.0, atlas_width: 8, atlas_height: 8 });
        assert_eq!(font.payload_size().unwrap(), Some(2 * GLYPH_RECORD_SIZE));

        let material = AssetInfo::Material(MaterialInfo { texture_count: 1, param_count: 3 });
        assert_eq!(material.payload_size().unwrap(), Some(12));

        let text = AssetInfo::Text(TextInfo { length: 9, encoding: 0 });
        assert_eq!(text.payload_size().unwrap(), None);
    }

    #[test]
    fn test_payload_size_overflow_is_corrupt() {
        let mesh = AssetInfo::Mesh(MeshInfo {
            vertex_count: u32::MAX,
            index_count: u32::MAX,
            vertex_stride: u32::MAX,
            index_size: 4,
            bounds_min: Vec3::ZERO,
            bounds_max: Vec3::ONE,
        });
        assert!(matches!(mesh.payload_size(), Err(Error::Corrupt(_))));
    }
}
