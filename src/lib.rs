//! Slabstream - slab-based asset streaming cache with a polled resource
//! materializer
//!
//! Packs are opened through [`streaming::AssetManager`], which serves asset
//! bytes out of a fixed-size LRU cache filled by background reads.
//! [`resource::ResourceManager`] turns those bytes into textures, meshes,
//! fonts and materials, staging uploads to an external device.

pub mod core;
pub mod io;
pub mod pack;
pub mod streaming;
pub mod resource;
