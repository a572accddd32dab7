//! Intermediate image layout.
//!
//! A flat directory that carries one image between build steps:
//!
//! ```text
//! <dir>/
//! ├── config.json      image config
//! ├── manifest.json    Docker schema 2 (or OCI) manifest
//! ├── digest           "sha256:<hex>" of manifest.json
//! ├── 000.tar.gz       layer 0 blob
//! ├── 000.sha256       layer 0 digest (hex, no prefix)
//! └── ...
//! ```
//!
//! Layer files are named by their position in `manifest.layers`.

mod generate;
mod write;

pub use generate::{build_manifest, generate_manifest};
pub use write::{write_digest, write_image, MAX_LAYERS};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use kiln_core::error::{KilnError, Result};
use kiln_core::{Descriptor, Hash, IndexManifest, MediaType};
use parking_lot::Mutex;

use crate::fs::{read_blob, read_trimmed};
use crate::image::ImageView;
use crate::index::ImageIndexView;
use crate::layer::{FileLayer, Layer};

pub const CONFIG_FILE: &str = "config.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const DIGEST_FILE: &str = "digest";

/// `000.tar.gz` for layer 0.
pub fn layer_file_name(index: usize) -> String {
    format!("{:03}.tar.gz", index)
}

/// `000.sha256` for layer 0.
pub fn layer_digest_file_name(index: usize) -> String {
    format!("{:03}.sha256", index)
}

/// How much of a layout has been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutState {
    /// No metadata files yet
    Empty,
    /// Some files are missing; the listed names still need to be written
    Partial { missing: Vec<String> },
    /// Metadata and every layer pair are present
    Complete,
}

/// A directory holding an intermediate layout.
#[derive(Debug, Clone)]
pub struct IntermediateLayout {
    dir: PathBuf,
}

impl IntermediateLayout {
    /// Open an existing layout.
    ///
    /// # Errors
    ///
    /// Returns `LayoutInvalid` if `config.json`, `manifest.json` or `digest`
    /// is missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let missing: Vec<&str> = [MANIFEST_FILE, CONFIG_FILE, DIGEST_FILE]
            .into_iter()
            .filter(|name| !dir.join(name).is_file())
            .collect();
        if !missing.is_empty() {
            return Err(KilnError::layout_invalid(
                &dir,
                format!("missing {}", missing.join(", ")),
            ));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Inspect which files are present.
    pub fn state(&self) -> Result<LayoutState> {
        state_of(&self.dir)
    }

    /// The image stored in this layout.
    ///
    /// # Errors
    ///
    /// Returns `LayoutInvalid` unless the layout is complete.
    pub fn image(&self) -> Result<LayoutImage> {
        match self.state()? {
            LayoutState::Complete => Ok(LayoutImage::new(self.dir.clone())),
            LayoutState::Empty => Err(KilnError::layout_invalid(&self.dir, "layout is empty")),
            LayoutState::Partial { missing } => Err(KilnError::layout_invalid(
                &self.dir,
                format!("layout is incomplete, missing {}", missing.join(", ")),
            )),
        }
    }

    /// View the layout as a one-entry image index.
    pub fn index(&self) -> Result<LayoutIndex> {
        LayoutIndex::new(Arc::new(self.image()?))
    }
}

fn state_of(dir: &Path) -> Result<LayoutState> {
    let metadata = [MANIFEST_FILE, CONFIG_FILE, DIGEST_FILE];
    let mut missing: Vec<String> = metadata
        .iter()
        .filter(|name| !dir.join(name).is_file())
        .map(|name| name.to_string())
        .collect();
    if missing.len() == metadata.len() {
        return Ok(LayoutState::Empty);
    }

    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.is_file() {
        let manifest = kiln_core::Manifest::from_slice(&read_blob(&manifest_path)?)?;
        for i in 0..manifest.layers.len() {
            for name in [layer_file_name(i), layer_digest_file_name(i)] {
                if !dir.join(&name).is_file() {
                    missing.push(name);
                }
            }
        }
    }

    if missing.is_empty() {
        Ok(LayoutState::Complete)
    } else {
        Ok(LayoutState::Partial { missing })
    }
}

/// An image read lazily from a complete layout.
///
/// The manifest bytes are read once; the first reader takes a lock and
/// later readers go straight to the cached copy.
pub struct LayoutImage {
    dir: PathBuf,
    raw_manifest: OnceLock<Arc<[u8]>>,
    load_lock: Mutex<()>,
}

impl LayoutImage {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            raw_manifest: OnceLock::new(),
            load_lock: Mutex::new(()),
        }
    }

    fn cached_manifest(&self) -> Result<Arc<[u8]>> {
        if let Some(bytes) = self.raw_manifest.get() {
            return Ok(bytes.clone());
        }
        let _guard = self.load_lock.lock();
        if let Some(bytes) = self.raw_manifest.get() {
            return Ok(bytes.clone());
        }
        let bytes: Arc<[u8]> = read_blob(&self.dir.join(MANIFEST_FILE))?.into();
        tracing::debug!(dir = %self.dir.display(), size = bytes.len(), "Loaded layout manifest");
        Ok(self.raw_manifest.get_or_init(|| bytes).clone())
    }

    fn layer_at(
        &self,
        index: usize,
        desc: &Descriptor,
        diff_id: Option<Hash>,
    ) -> Result<FileLayer> {
        if !desc.media_type.is_layer() {
            return Err(KilnError::UnknownMediaType(format!(
                "layer {} has media type {}",
                index, desc.media_type
            )));
        }
        Ok(FileLayer::from_descriptor(
            self.dir.join(layer_file_name(index)),
            desc,
            diff_id,
        ))
    }

    fn diff_ids(&self, layer_count: usize) -> Vec<Option<Hash>> {
        match self.config_file() {
            Ok(config) if config.rootfs.diff_ids.len() == layer_count => {
                config.rootfs.diff_ids.into_iter().map(Some).collect()
            }
            _ => vec![None; layer_count],
        }
    }
}

impl fmt::Debug for LayoutImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutImage").field("dir", &self.dir).finish()
    }
}

impl ImageView for LayoutImage {
    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.cached_manifest()?.to_vec())
    }

    fn raw_config(&self) -> Result<Vec<u8>> {
        read_blob(&self.dir.join(CONFIG_FILE))
    }

    fn layers(&self) -> Result<Vec<Arc<dyn Layer>>> {
        let manifest = self.manifest()?;
        let diff_ids = self.diff_ids(manifest.layers.len());
        manifest
            .layers
            .iter()
            .zip(diff_ids)
            .enumerate()
            .map(|(i, (desc, diff_id))| {
                self.layer_at(i, desc, diff_id)
                    .map(|layer| Arc::new(layer) as Arc<dyn Layer>)
            })
            .collect()
    }

    /// The digest recorded in the layout's `digest` file.
    fn digest(&self) -> Result<Hash> {
        read_trimmed(&self.dir.join(DIGEST_FILE))?.parse()
    }

    fn config_name(&self) -> Result<Hash> {
        Ok(self.manifest()?.config.digest)
    }

    fn config_layer(&self) -> Result<Arc<dyn Layer>> {
        let manifest = self.manifest()?;
        Ok(Arc::new(FileLayer::from_descriptor(
            self.dir.join(CONFIG_FILE),
            &manifest.config,
            None,
        )))
    }

    fn layer_by_digest(&self, digest: &Hash) -> Result<Arc<dyn Layer>> {
        let manifest = self.manifest()?;
        if manifest.config.digest == *digest {
            return self.config_layer();
        }
        let (index, desc) = manifest
            .layers
            .iter()
            .enumerate()
            .find(|(_, desc)| desc.digest == *digest)
            .ok_or_else(|| {
                KilnError::NotFound(format!(
                    "blob {} not found in {}",
                    digest,
                    self.dir.display()
                ))
            })?;
        let diff_id = self.diff_ids(manifest.layers.len()).swap_remove(index);
        Ok(Arc::new(self.layer_at(index, desc, diff_id)?))
    }
}

/// A layout viewed as an image index holding exactly its one image.
#[derive(Debug)]
pub struct LayoutIndex {
    image: Arc<LayoutImage>,
    raw_manifest: Vec<u8>,
}

impl LayoutIndex {
    fn new(image: Arc<LayoutImage>) -> Result<Self> {
        let desc = Descriptor::new(image.media_type()?, image.size()?, image.digest()?);
        let index = IndexManifest::new(MediaType::OciImageIndex, vec![desc]);
        Ok(Self {
            image,
            raw_manifest: index.to_vec()?,
        })
    }
}

impl ImageIndexView for LayoutIndex {
    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.raw_manifest.clone())
    }

    fn image(&self, digest: &Hash) -> Result<Arc<dyn ImageView>> {
        if self.image.digest()? == *digest {
            return Ok(self.image.clone());
        }
        Err(KilnError::NotFound(format!(
            "image {} not found in layout {}",
            digest,
            self.image.dir.display()
        )))
    }

    fn image_index(&self, digest: &Hash) -> Result<Arc<dyn ImageIndexView>> {
        Err(KilnError::NestedIndexUnsupported(format!(
            "intermediate layouts hold a single image, not index {}",
            digest
        )))
    }
}
