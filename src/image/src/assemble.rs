//! Assemble an in-memory image from a config file and layer parts.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_core::error::{KilnError, Result};
use kiln_core::{ConfigFile, Descriptor, Hash, Manifest, MediaType};

use crate::fs::read_blob;
use crate::image::ImageView;
use crate::layer::{ForeignLayer, Layer, LayerParts};

/// An image whose manifest was synthesized from a config blob and layers.
///
/// The raw config and layer blobs are referenced, never copied; only the
/// manifest bytes are produced here.
#[derive(Clone)]
pub struct AssembledImage {
    raw_config: Arc<[u8]>,
    raw_manifest: Arc<[u8]>,
    layers: Vec<Arc<dyn Layer>>,
}

impl AssembledImage {
    /// Synthesize a manifest of `manifest_type` over `raw_config` and
    /// `layers`, preserving layer order.
    pub fn new(
        raw_config: impl Into<Arc<[u8]>>,
        config_type: MediaType,
        manifest_type: MediaType,
        layers: Vec<Arc<dyn Layer>>,
    ) -> Result<Self> {
        let raw_config = raw_config.into();
        let config = Descriptor::new(
            config_type,
            raw_config.len() as u64,
            Hash::sha256(&raw_config),
        );
        let descriptors = layers.iter().map(|l| l.descriptor()).collect();
        let manifest = Manifest::new(manifest_type, config, descriptors);
        let raw_manifest: Arc<[u8]> = manifest.to_vec()?.into();

        Ok(Self {
            raw_config,
            raw_manifest,
            layers,
        })
    }
}

impl fmt::Debug for AssembledImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssembledImage")
            .field("config_size", &self.raw_config.len())
            .field("manifest_size", &self.raw_manifest.len())
            .field("layers", &self.layers)
            .finish()
    }
}

impl ImageView for AssembledImage {
    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.raw_manifest.to_vec())
    }

    fn raw_config(&self) -> Result<Vec<u8>> {
        Ok(self.raw_config.to_vec())
    }

    fn layers(&self) -> Result<Vec<Arc<dyn Layer>>> {
        Ok(self.layers.clone())
    }
}

/// The inputs of an image assembled from files on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageParts {
    /// Image config JSON
    pub config: PathBuf,
    /// Manifest of the base image, whose foreign layers are carried over
    pub base_manifest: Option<PathBuf>,
    /// Layer blobs, looked up by diff-id
    pub layers: Vec<LayerParts>,
}

/// Build a Docker schema 2 image from a config file and layer parts.
///
/// Layers are taken in caller order when the config lists no diff-ids, and
/// in `rootfs.diff_ids` order otherwise.
///
/// # Arguments
///
/// * `config_path` - Path to the image config JSON
/// * `parts` - Layer blobs with their diff-id files
///
/// # Errors
///
/// See [`read_image`].
pub fn from_parts(config_path: &Path, parts: &[LayerParts]) -> Result<AssembledImage> {
    read_image(&ImageParts {
        config: config_path.to_path_buf(),
        base_manifest: None,
        layers: parts.to_vec(),
    })
}

/// Build a Docker schema 2 image from a config, its layer parts and an
/// optional base manifest.
///
/// Each diff-id in the config's `rootfs.diff_ids` selects one layer, either
/// from the parts or from the foreign layers of the base manifest. Parts the
/// config does not reference are left out of the manifest.
///
/// # Errors
///
/// `BlobRead` if any file is unreadable, `MalformedDigest` if a diff-id or
/// digest file does not hold a valid hex digest, `Validation` if the base
/// manifest has more layers than the config has diff-ids, and `NotFound` if
/// a diff-id has no layer.
pub fn read_image(parts: &ImageParts) -> Result<AssembledImage> {
    let raw_config = read_blob(&parts.config)?;
    let config = ConfigFile::from_slice(&raw_config)?;
    let diff_ids = &config.rootfs.diff_ids;

    let mut loaded: Vec<Arc<dyn Layer>> = Vec::with_capacity(parts.layers.len());
    for part in &parts.layers {
        let layer = part.load()?;
        tracing::debug!(
            layer = %part.compressed.display(),
            digest = %layer.digest(),
            size = layer.size(),
            "Loaded layer"
        );
        loaded.push(Arc::new(layer));
    }

    let foreign = match &parts.base_manifest {
        Some(path) => foreign_layers(path, diff_ids)?,
        None => Vec::new(),
    };

    let layers = if diff_ids.is_empty() {
        loaded
    } else {
        order_by_diff_id(diff_ids, loaded, foreign)?
    };

    let image = AssembledImage::new(
        raw_config,
        MediaType::DockerConfigJson,
        MediaType::DockerManifestSchema2,
        layers,
    )?;
    let digest = image.digest()?;
    tracing::info!(
        config = %parts.config.display(),
        layers = image.layers.len(),
        digest = %digest,
        "Assembled image"
    );
    Ok(image)
}

/// Foreign layers of the base manifest at `path`, each paired with the
/// config diff-id at its position.
fn foreign_layers(path: &Path, diff_ids: &[Hash]) -> Result<Vec<Arc<dyn Layer>>> {
    let manifest = Manifest::from_slice(&read_blob(path)?)?;
    if diff_ids.len() < manifest.layers.len() {
        return Err(KilnError::Validation(format!(
            "base manifest {} lists {} layers but the config has only {} diff_ids",
            path.display(),
            manifest.layers.len(),
            diff_ids.len()
        )));
    }

    let mut layers: Vec<Arc<dyn Layer>> = Vec::new();
    for (desc, diff_id) in manifest.layers.iter().zip(diff_ids) {
        if !desc.media_type.is_foreign() {
            continue;
        }
        let mut desc = desc.clone();
        desc.media_type = desc.media_type.to_docker()?;
        tracing::debug!(
            digest = %desc.digest,
            diff_id = %diff_id,
            urls = ?desc.urls,
            "Carrying foreign layer"
        );
        layers.push(Arc::new(ForeignLayer::new(&desc, diff_id.clone())));
    }
    Ok(layers)
}

fn order_by_diff_id(
    diff_ids: &[Hash],
    loaded: Vec<Arc<dyn Layer>>,
    foreign: Vec<Arc<dyn Layer>>,
) -> Result<Vec<Arc<dyn Layer>>> {
    let mut lookup: HashMap<Hash, Arc<dyn Layer>> = HashMap::new();
    for layer in loaded.into_iter().chain(foreign) {
        if let Some(diff_id) = layer.diff_id() {
            lookup.insert(diff_id, layer);
        }
    }

    let mut layers = Vec::with_capacity(diff_ids.len());
    for diff_id in diff_ids {
        let layer = lookup.get(diff_id).ok_or_else(|| {
            KilnError::NotFound(format!("unable to locate layer with diff-id {}", diff_id))
        })?;
        layers.push(layer.clone());
    }

    for (diff_id, layer) in &lookup {
        if !diff_ids.contains(diff_id) {
            tracing::warn!(
                diff_id = %diff_id,
                digest = %layer.digest(),
                "Layer is not referenced by the config, skipping"
            );
        }
    }
    Ok(layers)
}
