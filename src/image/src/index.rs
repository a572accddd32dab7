//! Multi-platform image indices.

use std::fmt;
use std::sync::Arc;

use kiln_core::error::{KilnError, Result};
use kiln_core::{Descriptor, Hash, IndexManifest, MediaType, Platform};

use crate::image::ImageView;

/// Read-only view of an image index / manifest list.
pub trait ImageIndexView: fmt::Debug + Send + Sync {
    /// Exact index manifest bytes; the index digest is their SHA-256.
    fn raw_manifest(&self) -> Result<Vec<u8>>;

    /// The child image with the given manifest digest.
    fn image(&self, digest: &Hash) -> Result<Arc<dyn ImageView>>;

    /// The child index with the given digest.
    fn image_index(&self, digest: &Hash) -> Result<Arc<dyn ImageIndexView>>;

    fn index_manifest(&self) -> Result<IndexManifest> {
        IndexManifest::from_slice(&self.raw_manifest()?)
    }

    fn media_type(&self) -> Result<MediaType> {
        Ok(self
            .index_manifest()?
            .media_type
            .unwrap_or(MediaType::OciImageIndex))
    }

    fn digest(&self) -> Result<Hash> {
        Ok(Hash::sha256(&self.raw_manifest()?))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.raw_manifest()?.len() as u64)
    }
}

/// An index built in memory over a set of platform-specific images.
#[derive(Clone)]
pub struct ImageIndex {
    raw_manifest: Vec<u8>,
    images: Vec<(Hash, Arc<dyn ImageView>)>,
}

impl ImageIndex {
    /// Build a Docker manifest list pairing `platforms[i]` with `images[i]`.
    ///
    /// # Errors
    ///
    /// `InvalidIndexInputs` if the two lists differ in length.
    pub fn new(platforms: Vec<Platform>, images: Vec<Arc<dyn ImageView>>) -> Result<Self> {
        Self::with_media_type(MediaType::DockerManifestList, platforms, images)
    }

    /// Same as [`ImageIndex::new`] with an explicit index media type.
    pub fn with_media_type(
        media_type: MediaType,
        platforms: Vec<Platform>,
        images: Vec<Arc<dyn ImageView>>,
    ) -> Result<Self> {
        if platforms.len() != images.len() {
            return Err(KilnError::InvalidIndexInputs(format!(
                "got {} platforms for {} images",
                platforms.len(),
                images.len()
            )));
        }

        let mut descriptors = Vec::with_capacity(images.len());
        let mut children = Vec::with_capacity(images.len());
        for (platform, image) in platforms.into_iter().zip(images) {
            let digest = image.digest()?;
            let desc = Descriptor::new(image.media_type()?, image.size()?, digest.clone())
                .with_platform(platform);
            tracing::debug!(
                platform = %desc.platform.as_ref().map(|p| p.to_string()).unwrap_or_default(),
                digest = %digest,
                "Added image to index"
            );
            descriptors.push(desc);
            children.push((digest, image));
        }

        let raw_manifest = IndexManifest::new(media_type, descriptors).to_vec()?;
        Ok(Self {
            raw_manifest,
            images: children,
        })
    }
}

impl fmt::Debug for ImageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageIndex")
            .field("digest", &Hash::sha256(&self.raw_manifest))
            .field("images", &self.images.len())
            .finish()
    }
}

impl ImageIndexView for ImageIndex {
    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.raw_manifest.clone())
    }

    fn image(&self, digest: &Hash) -> Result<Arc<dyn ImageView>> {
        self.images
            .iter()
            .find(|(d, _)| d == digest)
            .map(|(_, image)| image.clone())
            .ok_or_else(|| KilnError::NotFound(format!("image {} not found in index", digest)))
    }

    fn image_index(&self, digest: &Hash) -> Result<Arc<dyn ImageIndexView>> {
        Err(KilnError::NestedIndexUnsupported(format!(
            "index children are images, not index {}",
            digest
        )))
    }
}

/// Render the index digest followed by one `os/arch[/variant]\t<digest>`
/// line per child manifest.
///
/// Children without a platform are listed as `linux/amd64`.
pub fn digest_report(index: &dyn ImageIndexView) -> Result<String> {
    let mut out = index.digest()?.to_string();
    for desc in index.index_manifest()?.manifests {
        let platform = desc.platform.unwrap_or_default();
        out.push_str(&format!("\n{}\t{}", platform, desc.digest));
    }
    Ok(out)
}
