//! Write an image into an intermediate layout.

use std::path::Path;

use kiln_core::error::{KilnError, Result};

use super::{
    layer_digest_file_name, layer_file_name, IntermediateLayout, CONFIG_FILE, DIGEST_FILE,
    MANIFEST_FILE,
};
use crate::fs::{write_atomic, write_atomic_from};
use crate::image::ImageView;

/// Layer files are numbered `000` through `999`.
pub const MAX_LAYERS: usize = 1000;

/// Write `image` into `dir`, creating the directory if needed.
///
/// Metadata (`config.json`, `manifest.json`, `digest`) is written first,
/// then one `NNN.sha256` / `NNN.tar.gz` pair per layer. Each file is
/// written atomically. Layer bytes are copied exactly as stored, so an
/// uncompressed layer still lands in `NNN.tar.gz` and keeps matching its
/// manifest digest.
///
/// # Errors
///
/// `TooManyLayers` (before anything is written) if the image has more than
/// [`MAX_LAYERS`] layers; `BlobWrite` / `BlobRead` on I/O failures.
pub fn write_image(image: &dyn ImageView, dir: &Path) -> Result<IntermediateLayout> {
    let layers = image.layers()?;
    if layers.len() > MAX_LAYERS {
        return Err(KilnError::TooManyLayers {
            count: layers.len(),
            max: MAX_LAYERS,
        });
    }

    std::fs::create_dir_all(dir).map_err(|e| KilnError::blob_write(dir, e))?;

    let digest = image.digest()?;
    write_atomic(&dir.join(CONFIG_FILE), &image.raw_config()?)?;
    write_atomic(&dir.join(MANIFEST_FILE), &image.raw_manifest()?)?;
    write_atomic(&dir.join(DIGEST_FILE), digest.to_string().as_bytes())?;

    for (i, layer) in layers.iter().enumerate() {
        let layer_digest = layer.digest();
        write_atomic(
            &dir.join(layer_digest_file_name(i)),
            layer_digest.hex().as_bytes(),
        )?;
        let mut reader = layer.compressed()?;
        let size = write_atomic_from(&dir.join(layer_file_name(i)), &mut reader)?;
        tracing::debug!(
            index = i,
            digest = %layer_digest,
            size,
            "Wrote layer"
        );
    }

    tracing::info!(
        dir = %dir.display(),
        digest = %digest,
        layers = layers.len(),
        "Wrote image layout"
    );
    IntermediateLayout::open(dir)
}

/// Write only the image digest (`sha256:<hex>`, no newline) to `dst`.
pub fn write_digest(image: &dyn ImageView, dst: &Path) -> Result<()> {
    let digest = image.digest()?;
    write_atomic(dst, digest.to_string().as_bytes())?;
    tracing::debug!(path = %dst.display(), digest = %digest, "Wrote digest");
    Ok(())
}
