//! Materials: a parameter block plus the textures it samples

use crate::core::{Error, Result};
use crate::pack::{AssetDescriptor, AssetKind};

use super::handle::{Handle, ResourceId, ResourceKind};
use super::state::{MaterializeError, Resource};
use super::texture::Texture;

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    textures: Vec<Handle<Texture>>,
    param_count: usize,
    params: Vec<f32>,
}

impl Material {
    /// `textures` must match the asset's texture count, in slot order.
    pub fn from_asset(asset: &AssetDescriptor, textures: &[Handle<Texture>]) -> Result<Self> {
        let info = asset.material().ok_or(Error::KindMismatch {
            expected: AssetKind::Material,
            found: asset.kind(),
        })?;
        if textures.len() != info.texture_count as usize {
            return Err(Error::DependencyMismatch {
                id: asset.id().0,
                expected: info.texture_count as usize,
                found: textures.len(),
            });
        }
        Ok(Self {
            textures: textures.to_vec(),
            param_count: info.param_count as usize,
            params: Vec::new(),
        })
    }

    /// Material built at runtime; ready as soon as its textures are.
    pub fn synthetic(textures: Vec<Handle<Texture>>, params: Vec<f32>) -> Self {
        Self {
            textures,
            param_count: params.len(),
            params,
        }
    }

    pub fn textures(&self) -> &[Handle<Texture>] {
        &self.textures
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn param(&self, index: usize) -> Option<f32> {
        self.params.get(index).copied()
    }
}

impl Resource for Material {
    const KIND: ResourceKind = ResourceKind::Material;

    fn staging_size(&self, _asset: &AssetDescriptor) -> usize {
        self.param_count * 4
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
        self.params = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if let Some(bad) = self.params.iter().position(|p| !p.is_finite()) {
            self.params.clear();
            return Err(MaterializeError::Invalid(format!("parameter {bad} is not finite")));
        }
        staging.copy_from_slice(bytes);
        Ok(())
    }

    fn dependencies(&self) -> Vec<ResourceId> {
        self.textures.iter().map(Handle::id).collect()
    }
}
