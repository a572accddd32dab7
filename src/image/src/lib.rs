//! Kiln image engine.
//!
//! Builds container image metadata at build time without a daemon:
//!
//! - [`override_config`]: apply build overrides to a base image config
//! - [`assemble`]: synthesize a manifest over a config and layer blobs
//! - [`layout`]: read and write the intermediate directory layout
//! - [`convert`]: re-wrap images and indices as Docker or OCI
//! - [`index`]: compose multi-platform image indices
//! - [`validate`]: check that manifest, config and layers agree

pub mod assemble;
pub mod convert;
pub mod fs;
pub mod image;
pub mod index;
pub mod layer;
pub mod layout;
pub mod override_config;
pub mod validate;

pub use assemble::{from_parts, read_image, AssembledImage, ImageParts};
pub use convert::{
    as_docker_image, as_docker_index, as_oci_image, as_oci_index, retype_image, retype_index,
    ImageFormat, RetypedImage,
};
pub use image::ImageView;
pub use index::{digest_report, ImageIndex, ImageIndexView};
pub use layer::{FileLayer, ForeignLayer, Layer, LayerParts, MemoryBlob};
pub use layout::{
    generate_manifest, write_digest, write_image, IntermediateLayout, LayoutImage, LayoutIndex,
    LayoutState,
};
pub use override_config::{override_image_config, update_config, OverrideOptions};
pub use validate::{validate_image, ValidateOptions};
