//! Pack container format: chunked binary files holding asset descriptors and
//! their payload byte ranges.

pub mod format;
pub mod descriptor;
pub mod reader;
pub mod writer;

pub use format::{ChunkTag, checksum, MAGIC, VERSION};
pub use descriptor::{
    AssetDescriptor, AssetId, AssetInfo, AssetKind, CatalogInfo, Compression, DataRange,
    FontInfo, ImageInfo, MaterialInfo, MeshInfo, ModelInfo, PackId, PackSource, PixelFormat,
    TextInfo,
};
pub use reader::{PackEntry, PackReader, PackTable};
pub use writer::PackWriter;
