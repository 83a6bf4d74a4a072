//! Resource materialization
//!
//! Turns cached asset bytes into usable resources through a polled state
//! machine, staging uploads to an external device and deferring
//! destruction until the device is done with them.

pub mod deferred;
pub mod device;
pub mod font;
pub mod handle;
pub mod manager;
pub mod material;
pub mod mesh;
pub mod staging;
pub mod state;
pub mod texture;

pub use deferred::Token;
pub use device::{ImmediateUpload, UploadDevice, UploadRequest, UploadSignal};
pub use font::{Font, Glyph};
pub use handle::{Handle, ResourceId, ResourceKind};
pub use manager::{ResourceManager, ResourceRef};
pub use material::Material;
pub use mesh::{IndexFormat, Mesh};
pub use staging::{StagingLease, StagingPool};
pub use state::{MaterializeError, Resource, ResourceState};
pub use texture::Texture;
