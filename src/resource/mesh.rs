//! Meshes: vertex and index buffers staged back to back

use glam::Vec3;

use crate::core::{Error, Result};
use crate::pack::{AssetDescriptor, AssetKind, MeshInfo};

use super::handle::ResourceKind;
use super::state::{MaterializeError, Resource};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn size(self) -> usize {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// Indexed triangle mesh
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    vertex_count: u32,
    index_count: u32,
    vertex_stride: u32,
    index_format: IndexFormat,
    bounds_min: Vec3,
    bounds_max: Vec3,
}

impl Mesh {
    pub fn from_asset(asset: &AssetDescriptor) -> Result<Self> {
        let info = asset.mesh().ok_or(Error::KindMismatch {
            expected: AssetKind::Mesh,
            found: asset.kind(),
        })?;
        Ok(Self::from_info(info))
    }

    fn from_info(info: &MeshInfo) -> Self {
        Self {
            vertex_count: info.vertex_count,
            index_count: info.index_count,
            vertex_stride: info.vertex_stride,
            index_format: if info.index_size == 2 { IndexFormat::U16 } else { IndexFormat::U32 },
            bounds_min: info.bounds_min,
            bounds_max: info.bounds_max,
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }

    pub fn index_format(&self) -> IndexFormat {
        self.index_format
    }

    pub fn vertex_bytes(&self) -> usize {
        self.vertex_count as usize * self.vertex_stride as usize
    }

    pub fn index_bytes(&self) -> usize {
        self.index_count as usize * self.index_format.size()
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        (self.bounds_min, self.bounds_max)
    }

    pub fn center(&self) -> Vec3 {
        (self.bounds_min + self.bounds_max) * 0.5
    }

    /// Largest index in `indices`, which must be a whole number of indices
    fn max_index(&self, indices: &[u8]) -> Option<u32> {
        match self.index_format {
            IndexFormat::U16 => indices
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
                .max(),
            IndexFormat::U32 => indices
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .max(),
        }
    }
}

impl Resource for Mesh {
    const KIND: ResourceKind = ResourceKind::Mesh;

    fn staging_size(&self, _asset: &AssetDescriptor) -> usize {
        self.vertex_bytes() + self.index_bytes()
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
        let (_, indices) = bytes.split_at(self.vertex_bytes());
        if let Some(max) = self.max_index(indices).filter(|&max| max >= self.vertex_count) {
            return Err(MaterializeError::Invalid(format!(
                "index {max} out of range for {} vertices",
                self.vertex_count
            )));
        }
        staging.copy_from_slice(bytes);
        Ok(())
    }
}
