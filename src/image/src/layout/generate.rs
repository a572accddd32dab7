//! Synthesize `manifest.json` for a directory that only has blobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_core::error::{KilnError, Result};
use kiln_core::{Descriptor, Hash, Manifest, MediaType};

use super::{CONFIG_FILE, MANIFEST_FILE};
use crate::fs::{read_blob, write_atomic};
use crate::layer::{compute_diff_id, FileLayer, Layer};

/// Build a Docker schema 2 manifest over `raw_config` and `layers`.
///
/// Also returns each layer's diff-id, computed by decompressing the blob.
pub fn build_manifest(
    raw_config: &[u8],
    layers: &[Arc<dyn Layer>],
) -> Result<(Manifest, Vec<Hash>)> {
    let config = Descriptor::new(
        MediaType::DockerConfigJson,
        raw_config.len() as u64,
        Hash::sha256(raw_config),
    );

    let mut descriptors = Vec::with_capacity(layers.len());
    let mut diff_ids = Vec::with_capacity(layers.len());
    for layer in layers {
        let diff_id = match layer.diff_id() {
            Some(d) => d,
            None => compute_diff_id(layer.as_ref())?,
        };
        descriptors.push(layer.descriptor());
        diff_ids.push(diff_id);
    }

    let manifest = Manifest::new(MediaType::DockerManifestSchema2, config, descriptors);
    Ok((manifest, diff_ids))
}

/// Return the directory's manifest, generating it if it does not exist.
///
/// An existing `manifest.json` is parsed and returned untouched. Otherwise
/// the config (`config.json`, or a file named `config`) and every
/// `*.tar.gz` file, in ascending filename order, make up the new manifest,
/// which is written to `manifest.json`.
///
/// # Errors
///
/// `ManifestSynthesis` if no config file is present.
pub fn generate_manifest(dir: &Path) -> Result<Manifest> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.is_file() {
        tracing::debug!(path = %manifest_path.display(), "Manifest already present");
        return Manifest::from_slice(&read_blob(&manifest_path)?);
    }

    let config_path = [CONFIG_FILE, "config"]
        .into_iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
        .ok_or_else(|| {
            KilnError::ManifestSynthesis(format!("no config file found in {}", dir.display()))
        })?;
    let raw_config = read_blob(&config_path)?;

    let mut layers: Vec<Arc<dyn Layer>> = Vec::new();
    for path in layer_files(dir)? {
        layers.push(Arc::new(FileLayer::open(path, None, None)?));
    }

    let (manifest, diff_ids) = build_manifest(&raw_config, &layers)?;
    write_atomic(&manifest_path, &manifest.to_vec()?)?;

    tracing::info!(
        dir = %dir.display(),
        layers = layers.len(),
        diff_ids = ?diff_ids.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
        "Generated manifest"
    );
    Ok(manifest)
}

fn layer_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| KilnError::blob_read(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| KilnError::blob_read(dir, e))?;
        let path = entry.path();
        let is_layer = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".tar.gz"));
        if is_layer && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
