//! Re-wrap images and indices between Docker and OCI media types.
//!
//! Only descriptors change. Config and layer bytes are shared with the
//! source image, and a fresh manifest (and therefore digest) is produced
//! over them. Converting to the format an image already has yields the same
//! manifest bytes.

use std::fmt;
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

use kiln_core::error::{KilnError, Result};
use kiln_core::{Hash, MediaType, Platform};

use crate::assemble::AssembledImage;
use crate::image::ImageView;
use crate::index::{ImageIndex, ImageIndexView};
use crate::layer::Layer;

/// Target manifest family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageFormat {
    /// Docker schema 2 / manifest list (default).
    #[default]
    Docker,
    /// OCI image manifest / image index.
    Oci,
}

impl ImageFormat {
    fn map(self, media_type: &MediaType) -> Result<MediaType> {
        match self {
            Self::Docker => media_type.to_docker(),
            Self::Oci => media_type.to_oci(),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Oci => write!(f, "oci"),
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "oci" => Ok(Self::Oci),
            _ => Err(format!("unknown image format: '{}' (supported: docker, oci)", s)),
        }
    }
}

/// A layer shared with another image under a different media type.
#[derive(Debug)]
struct RetypedLayer {
    inner: Arc<dyn Layer>,
    media_type: MediaType,
}

impl Layer for RetypedLayer {
    fn digest(&self) -> Hash {
        self.inner.digest()
    }

    fn diff_id(&self) -> Option<Hash> {
        self.inner.diff_id()
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn media_type(&self) -> MediaType {
        self.media_type.clone()
    }

    fn compressed(&self) -> Result<Box<dyn Read + Send>> {
        self.inner.compressed()
    }

    fn urls(&self) -> Vec<String> {
        self.inner.urls()
    }
}

/// An image viewed under the media types of another format.
///
/// Config bytes are read through the source view; the manifest is rebuilt
/// over the retyped layer descriptors.
#[derive(Clone)]
pub struct RetypedImage {
    source: Arc<dyn ImageView>,
    format: ImageFormat,
    rewrapped: AssembledImage,
}

impl RetypedImage {
    /// The image this one was derived from.
    pub fn source(&self) -> &Arc<dyn ImageView> {
        &self.source
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

impl fmt::Debug for RetypedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetypedImage")
            .field("format", &self.format)
            .field("source", &self.source)
            .finish()
    }
}

impl ImageView for RetypedImage {
    fn raw_manifest(&self) -> Result<Vec<u8>> {
        self.rewrapped.raw_manifest()
    }

    fn raw_config(&self) -> Result<Vec<u8>> {
        self.source.raw_config()
    }

    fn layers(&self) -> Result<Vec<Arc<dyn Layer>>> {
        self.rewrapped.layers()
    }
}

/// Re-wrap `image` with the manifest, config and layer media types of
/// `format`.
///
/// # Errors
///
/// `UnknownMediaType` if the manifest, config or any layer carries a media
/// type with no counterpart in `format`.
pub fn retype_image(image: Arc<dyn ImageView>, format: ImageFormat) -> Result<RetypedImage> {
    let source_type = image.media_type()?;
    if !source_type.is_image_manifest() {
        return Err(KilnError::UnknownMediaType(format!(
            "expected an image manifest, got {}",
            source_type
        )));
    }
    let manifest_type = format.map(&source_type)?;
    let config_type = format.map(&image.manifest()?.config.media_type)?;

    let mut layers: Vec<Arc<dyn Layer>> = Vec::new();
    for layer in image.layers()? {
        let source = layer.media_type();
        if !source.is_layer() {
            return Err(KilnError::UnknownMediaType(format!(
                "layer {} has media type {}",
                layer.digest(),
                source
            )));
        }
        let media_type = format.map(&source)?;
        layers.push(Arc::new(RetypedLayer {
            inner: layer,
            media_type,
        }));
    }

    let rewrapped = AssembledImage::new(image.raw_config()?, config_type, manifest_type, layers)?;
    let (from, to) = (image.digest()?, rewrapped.digest()?);
    tracing::debug!(from = %from, to = %to, format = %format, "Retyped image");
    Ok(RetypedImage {
        source: image,
        format,
        rewrapped,
    })
}

/// Re-wrap `image` as an OCI image.
pub fn as_oci_image(image: Arc<dyn ImageView>) -> Result<RetypedImage> {
    retype_image(image, ImageFormat::Oci)
}

/// Re-wrap `image` as a Docker schema 2 image.
pub fn as_docker_image(image: Arc<dyn ImageView>) -> Result<RetypedImage> {
    retype_image(image, ImageFormat::Docker)
}

/// Re-wrap every child of `index` and build a new index of `format`.
///
/// Platforms are carried over from the source descriptors.
///
/// # Errors
///
/// `NestedIndexUnsupported` if a child is itself an index;
/// `UnknownMediaType` for children that are neither images nor indices.
pub fn retype_index(index: &dyn ImageIndexView, format: ImageFormat) -> Result<ImageIndex> {
    let manifest = index.index_manifest()?;
    let mut platforms: Vec<Platform> = Vec::with_capacity(manifest.manifests.len());
    let mut images: Vec<Arc<dyn ImageView>> = Vec::with_capacity(manifest.manifests.len());

    for desc in &manifest.manifests {
        if desc.media_type.is_index() {
            return Err(KilnError::NestedIndexUnsupported(format!(
                "child {} is an index ({})",
                desc.digest, desc.media_type
            )));
        }
        if !desc.media_type.is_image_manifest() {
            return Err(KilnError::UnknownMediaType(format!(
                "child {} has media type {}",
                desc.digest, desc.media_type
            )));
        }
        let child = index.image(&desc.digest)?;
        images.push(Arc::new(retype_image(child, format)?));
        platforms.push(desc.platform.clone().unwrap_or_default());
    }

    let index_type = format.map(&index.media_type()?)?;
    ImageIndex::with_media_type(index_type, platforms, images)
}

/// Re-wrap an index and its children as OCI.
pub fn as_oci_index(index: &dyn ImageIndexView) -> Result<ImageIndex> {
    retype_index(index, ImageFormat::Oci)
}

/// Re-wrap an index and its children as Docker.
pub fn as_docker_index(index: &dyn ImageIndexView) -> Result<ImageIndex> {
    retype_index(index, ImageFormat::Docker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::MemoryBlob;
    use kiln_core::{Descriptor, IndexManifest};

    fn docker_image(layer_types: &[MediaType]) -> Arc<dyn ImageView> {
        let layers = layer_types
            .iter()
            .enumerate()
            .map(|(i, mt)| {
                Arc::new(MemoryBlob::new(format!("layer{}", i).into_bytes(), mt.clone()))
                    as Arc<dyn Layer>
            })
            .collect();
        Arc::new(
            AssembledImage::new(
                br#"{"architecture":"amd64","os":"linux"}"#.to_vec(),
                MediaType::DockerConfigJson,
                MediaType::DockerManifestSchema2,
                layers,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_as_oci_image_rewrites_media_types() {
        let image = docker_image(&[MediaType::DockerLayer, MediaType::DockerUncompressedLayer]);
        let oci = as_oci_image(image.clone()).unwrap();
        let manifest = oci.manifest().unwrap();

        assert_eq!(manifest.media_type, Some(MediaType::OciManifestSchema1));
        assert_eq!(manifest.config.media_type, MediaType::OciConfigJson);
        assert_eq!(manifest.layers[0].media_type, MediaType::OciLayer);
        assert_eq!(manifest.layers[1].media_type, MediaType::OciUncompressedLayer);

        // Blobs are shared.
        let source = image.manifest().unwrap();
        assert_eq!(manifest.config.digest, source.config.digest);
        assert_eq!(manifest.config.size, source.config.size);
        assert_eq!(manifest.layers[0].digest, source.layers[0].digest);
        assert_ne!(oci.digest().unwrap(), image.digest().unwrap());
    }

    #[test]
    fn test_as_oci_image_is_idempotent() {
        let image = docker_image(&[MediaType::DockerLayer]);
        let once = as_oci_image(image).unwrap();
        let twice = as_oci_image(Arc::new(once.clone())).unwrap();
        assert_eq!(twice.raw_manifest().unwrap(), once.raw_manifest().unwrap());
        assert_eq!(twice.digest().unwrap(), once.digest().unwrap());
    }

    #[test]
    fn test_retyped_image_reads_config_through_source() {
        let image = docker_image(&[MediaType::DockerLayer]);
        let oci = as_oci_image(image.clone()).unwrap();
        assert_eq!(oci.format(), ImageFormat::Oci);
        assert_eq!(oci.source().digest().unwrap(), image.digest().unwrap());
        assert_eq!(oci.raw_config().unwrap(), image.raw_config().unwrap());
        assert_eq!(oci.config_name().unwrap(), image.config_name().unwrap());
    }

    #[test]
    fn test_docker_oci_docker_round_trip() {
        let image = docker_image(&[MediaType::DockerLayer]);
        let oci = as_oci_image(image.clone()).unwrap();
        let back = as_docker_image(Arc::new(oci)).unwrap();
        assert_eq!(back.raw_manifest().unwrap(), image.raw_manifest().unwrap());
    }

    #[test]
    fn test_unknown_layer_type_fails() {
        let image = docker_image(&[MediaType::Other("application/x-foreign".to_string())]);
        assert!(matches!(
            as_oci_image(image),
            Err(KilnError::UnknownMediaType(_))
        ));
    }

    #[test]
    fn test_as_oci_index() {
        let amd = docker_image(&[MediaType::DockerLayer]);
        let arm = docker_image(&[MediaType::DockerLayer, MediaType::DockerLayer]);
        let index = ImageIndex::new(
            vec![Platform::default(), Platform::new("linux", "arm64")],
            vec![amd, arm],
        )
        .unwrap();

        let oci = as_oci_index(&index).unwrap();
        let manifest = oci.index_manifest().unwrap();
        assert_eq!(manifest.media_type, Some(MediaType::OciImageIndex));
        assert_eq!(manifest.manifests.len(), 2);
        for desc in &manifest.manifests {
            assert_eq!(desc.media_type, MediaType::OciManifestSchema1);
            let child = oci.image(&desc.digest).unwrap();
            assert_eq!(child.size().unwrap(), desc.size);
        }
        assert_eq!(
            manifest.manifests[1].platform.as_ref().unwrap().architecture,
            "arm64"
        );

        let again = as_oci_index(&oci).unwrap();
        assert_eq!(again.raw_manifest().unwrap(), oci.raw_manifest().unwrap());
    }

    /// An index whose manifest lists a nested index.
    #[derive(Debug)]
    struct NestedIndex {
        raw: Vec<u8>,
    }

    impl ImageIndexView for NestedIndex {
        fn raw_manifest(&self) -> Result<Vec<u8>> {
            Ok(self.raw.clone())
        }

        fn image(&self, digest: &Hash) -> Result<Arc<dyn ImageView>> {
            Err(KilnError::NotFound(digest.to_string()))
        }

        fn image_index(&self, digest: &Hash) -> Result<Arc<dyn ImageIndexView>> {
            Err(KilnError::NotFound(digest.to_string()))
        }
    }

    #[test]
    fn test_nested_index_child_fails() {
        for child_type in [MediaType::DockerManifestList, MediaType::OciImageIndex] {
            let raw = IndexManifest::new(
                MediaType::OciImageIndex,
                vec![Descriptor::new(child_type, 10, Hash::sha256(b"child"))],
            )
            .to_vec()
            .unwrap();
            let index = NestedIndex { raw };
            assert!(matches!(
                as_oci_index(&index),
                Err(KilnError::NestedIndexUnsupported(_))
            ));
        }
    }

    #[test]
    fn test_unknown_child_type_fails() {
        let raw = IndexManifest::new(
            MediaType::OciImageIndex,
            vec![Descriptor::new(
                MediaType::Other("application/x-artifact".to_string()),
                10,
                Hash::sha256(b"child"),
            )],
        )
        .to_vec()
        .unwrap();
        assert!(matches!(
            as_oci_index(&NestedIndex { raw }),
            Err(KilnError::UnknownMediaType(_))
        ));
    }

    #[test]
    fn test_image_format_parse() {
        assert_eq!("oci".parse::<ImageFormat>().unwrap(), ImageFormat::Oci);
        assert_eq!("Docker".parse::<ImageFormat>().unwrap(), ImageFormat::Docker);
        assert!("tar".parse::<ImageFormat>().is_err());
        assert_eq!(ImageFormat::default().to_string(), "docker");
    }
}
