//! Read-only view of a single-platform image.
//!
//! Different sources (parts on disk, an intermediate layout, a media-type
//! adapter) implement [`ImageView`] and can be handed to the writers, the
//! index builder and validation interchangeably.

use std::fmt;
use std::sync::Arc;

use kiln_core::error::{KilnError, Result};
use kiln_core::{ConfigFile, Hash, Manifest, MediaType};

use crate::layer::{Layer, MemoryBlob};

/// A single-platform image: a manifest, a config blob and ordered layers.
pub trait ImageView: fmt::Debug + Send + Sync {
    /// Exact manifest bytes; the image digest is their SHA-256.
    fn raw_manifest(&self) -> Result<Vec<u8>>;

    /// Exact config bytes.
    fn raw_config(&self) -> Result<Vec<u8>>;

    /// Layers in manifest order.
    fn layers(&self) -> Result<Vec<Arc<dyn Layer>>>;

    fn manifest(&self) -> Result<Manifest> {
        Manifest::from_slice(&self.raw_manifest()?)
    }

    /// Manifest media type; Docker schema 2 when the manifest omits it.
    fn media_type(&self) -> Result<MediaType> {
        Ok(self
            .manifest()?
            .media_type
            .unwrap_or(MediaType::DockerManifestSchema2))
    }

    fn digest(&self) -> Result<Hash> {
        Ok(Hash::sha256(&self.raw_manifest()?))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.raw_manifest()?.len() as u64)
    }

    /// Digest of the config blob.
    fn config_name(&self) -> Result<Hash> {
        Ok(Hash::sha256(&self.raw_config()?))
    }

    fn config_file(&self) -> Result<ConfigFile> {
        ConfigFile::from_slice(&self.raw_config()?)
    }

    /// The config document as a blob, typed as the manifest declares it.
    fn config_layer(&self) -> Result<Arc<dyn Layer>> {
        let media_type = self.manifest()?.config.media_type;
        Ok(Arc::new(MemoryBlob::new(self.raw_config()?, media_type)))
    }

    /// Find a blob by digest: the config blob or one of the layers.
    fn layer_by_digest(&self, digest: &Hash) -> Result<Arc<dyn Layer>> {
        if *digest == self.config_name()? {
            return self.config_layer();
        }
        self.layers()?
            .into_iter()
            .find(|layer| layer.digest() == *digest)
            .ok_or_else(|| KilnError::NotFound(format!("blob {} not found in image", digest)))
    }
}
