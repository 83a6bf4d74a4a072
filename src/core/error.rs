//! Error types for the streaming core

use thiserror::Error;

use crate::pack::{AssetKind, ChunkTag};

/// Main error type for the crate
///
/// Only initialization-time operations (`load`, `create`, config parsing)
/// return this; the per-frame polling paths report not-ready instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Bad pack magic: {0:?}")]
    BadMagic([u8; 4]),

    #[error("Unsupported pack version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Checksum mismatch in {tag} chunk at offset {offset}")]
    ChecksumMismatch { tag: ChunkTag, offset: u64 },

    #[error("Corrupt pack: {0}")]
    Corrupt(String),

    #[error("Asset {id} needs {size} bytes but the cache holds only {capacity}")]
    AssetTooLarge { id: u32, size: usize, capacity: usize },

    #[error("Resource pool exhausted ({capacity} slots)")]
    PoolExhausted { capacity: usize },

    #[error("Asset kind mismatch: expected {expected:?}, found {found:?}")]
    KindMismatch { expected: AssetKind, found: AssetKind },

    #[error("Asset {id} expects {expected} dependencies, got {found}")]
    DependencyMismatch { id: u32, expected: usize, found: usize },
}

impl Error {
    /// Structural or capacity errors that indicate broken content or
    /// under-provisioned configuration rather than a transient condition.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
