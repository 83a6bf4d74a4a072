//! Core crate types: errors, logging, configuration

pub mod error;
pub mod logging;
pub mod config;

pub use error::{Error, Result};
pub use config::StreamingConfig;
