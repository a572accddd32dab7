//! Kiln Core - Image Metadata Types
//!
//! This crate provides the foundational types shared by the kiln image
//! engine and CLI: digests, media types, manifests, the image config
//! document, build stamping and the error type.

pub mod config;
pub mod digest;
pub mod error;
pub mod image_config;
pub mod manifest;
pub mod media_type;
pub mod stamp;

// Re-export commonly used types
pub use config::{KilnConfig, LogConfig, LogFormat};
pub use digest::Hash;
pub use error::{KilnError, Result};
pub use image_config::{Config, ConfigFile, History, RootFs};
pub use manifest::{Descriptor, IndexManifest, Manifest, Platform};
pub use media_type::MediaType;
pub use stamp::Stamper;

/// Kiln version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
