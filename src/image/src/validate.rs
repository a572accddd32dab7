//! Consistency checks for images.

use kiln_core::error::{KilnError, Result};
use kiln_core::Hash;

use crate::image::ImageView;

/// Validation knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Re-hash every layer stream and compare it to its descriptor.
    pub verify_blobs: bool,
}

/// Check that an image's manifest, config and layers agree with each other.
///
/// # Errors
///
/// Returns `Validation` describing the first mismatch found.
pub fn validate_image(image: &dyn ImageView, opts: ValidateOptions) -> Result<()> {
    let raw_manifest = image.raw_manifest()?;
    let computed = Hash::sha256(&raw_manifest);
    let reported = image.digest()?;
    if computed != reported {
        return Err(KilnError::Validation(format!(
            "manifest digest mismatch: reported {}, computed {}",
            reported, computed
        )));
    }

    let manifest = image.manifest()?;
    let raw_config = image.raw_config()?;
    let config_digest = Hash::sha256(&raw_config);
    if manifest.config.digest != config_digest {
        return Err(KilnError::Validation(format!(
            "config digest mismatch: manifest says {}, blob is {}",
            manifest.config.digest, config_digest
        )));
    }
    if manifest.config.size != raw_config.len() as u64 {
        return Err(KilnError::Validation(format!(
            "config size mismatch: manifest says {}, blob is {}",
            manifest.config.size,
            raw_config.len()
        )));
    }

    let layers = image.layers()?;
    if layers.len() != manifest.layers.len() {
        return Err(KilnError::Validation(format!(
            "manifest lists {} layers but image has {}",
            manifest.layers.len(),
            layers.len()
        )));
    }
    for (i, (layer, desc)) in layers.iter().zip(&manifest.layers).enumerate() {
        if layer.descriptor() != *desc {
            return Err(KilnError::Validation(format!(
                "layer {} does not match its descriptor ({} vs {})",
                i,
                layer.digest(),
                desc.digest
            )));
        }
        // Foreign blobs are fetched from their urls and never stored.
        if opts.verify_blobs && !desc.media_type.is_foreign() {
            let (digest, size) = Hash::from_reader(layer.compressed()?)?;
            if digest != desc.digest || size != desc.size {
                return Err(KilnError::Validation(format!(
                    "layer {} content is {} ({} bytes), manifest says {} ({} bytes)",
                    i, digest, size, desc.digest, desc.size
                )));
            }
        }
    }

    let config = image.config_file()?;
    config.check_history()?;
    if config.rootfs.diff_ids.len() != layers.len() {
        return Err(KilnError::Validation(format!(
            "config lists {} diff_ids but image has {} layers",
            config.rootfs.diff_ids.len(),
            layers.len()
        )));
    }
    for (i, (layer, diff_id)) in layers.iter().zip(&config.rootfs.diff_ids).enumerate() {
        if let Some(known) = layer.diff_id() {
            if known != *diff_id {
                return Err(KilnError::Validation(format!(
                    "layer {} diff-id {} does not match config diff_id {}",
                    i, known, diff_id
                )));
            }
        }
    }

    tracing::debug!(digest = %reported, layers = layers.len(), "Image validated");
    Ok(())
}
