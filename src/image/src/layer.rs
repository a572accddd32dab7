//! Layer and blob sources.
//!
//! A layer is an immutable blob with a digest, a size, a media type and
//! (when known) the digest of its uncompressed tarball. The bytes are only
//! read when [`Layer::compressed`] is called, so building manifests never
//! loads layer contents into memory.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use flate2::read::GzDecoder;
use kiln_core::error::{KilnError, Result};
use kiln_core::{Descriptor, Hash, MediaType};

use crate::fs::read_trimmed;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// An immutable blob referenced from a manifest.
pub trait Layer: fmt::Debug + Send + Sync {
    /// Digest of the bytes returned by [`Layer::compressed`].
    fn digest(&self) -> Hash;

    /// Digest of the uncompressed tarball, if known without reading the blob.
    fn diff_id(&self) -> Option<Hash>;

    /// Size in bytes of the stored blob.
    fn size(&self) -> u64;

    fn media_type(&self) -> MediaType;

    /// Open the stored bytes. Each call returns a fresh stream.
    fn compressed(&self) -> Result<Box<dyn Read + Send>>;

    /// Locations a foreign layer is fetched from.
    fn urls(&self) -> Vec<String> {
        Vec::new()
    }

    fn descriptor(&self) -> Descriptor {
        let mut desc = Descriptor::new(self.media_type(), self.size(), self.digest());
        desc.urls = self.urls();
        desc
    }
}

/// A blob backed by a file on disk.
#[derive(Debug, Clone)]
pub struct FileLayer {
    path: PathBuf,
    digest: Hash,
    diff_id: Option<Hash>,
    size: u64,
    media_type: MediaType,
    urls: Vec<String>,
}

impl FileLayer {
    /// Open a layer file, sniffing gzip magic bytes to pick between the
    /// compressed and uncompressed Docker layer types.
    ///
    /// When `digest` is `None` the file is hashed once here.
    pub fn open(
        path: impl Into<PathBuf>,
        digest: Option<Hash>,
        diff_id: Option<Hash>,
    ) -> Result<Self> {
        let path = path.into();
        let media_type = if is_gzip(&path)? {
            MediaType::DockerLayer
        } else {
            MediaType::DockerUncompressedLayer
        };
        Self::with_media_type(path, media_type, digest, diff_id)
    }

    /// Wrap a file whose media type is already known.
    pub fn with_media_type(
        path: impl Into<PathBuf>,
        media_type: MediaType,
        digest: Option<Hash>,
        diff_id: Option<Hash>,
    ) -> Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)
            .map_err(|e| KilnError::blob_read(&path, e))?
            .len();
        let digest = match digest {
            Some(d) => d,
            None => {
                let file = File::open(&path).map_err(|e| KilnError::blob_read(&path, e))?;
                let (hash, _) =
                    Hash::from_reader(file).map_err(|e| KilnError::blob_read(&path, e))?;
                hash
            }
        };
        Ok(Self {
            path,
            digest,
            diff_id,
            size,
            media_type,
            urls: Vec::new(),
        })
    }

    /// Wrap a file described by a manifest descriptor, trusting its digest,
    /// size, media type and urls.
    pub fn from_descriptor(
        path: impl Into<PathBuf>,
        desc: &Descriptor,
        diff_id: Option<Hash>,
    ) -> Self {
        Self {
            path: path.into(),
            digest: desc.digest.clone(),
            diff_id,
            size: desc.size,
            media_type: desc.media_type.clone(),
            urls: desc.urls.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Layer for FileLayer {
    fn digest(&self) -> Hash {
        self.digest.clone()
    }

    fn diff_id(&self) -> Option<Hash> {
        self.diff_id.clone()
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn media_type(&self) -> MediaType {
        self.media_type.clone()
    }

    fn compressed(&self) -> Result<Box<dyn Read + Send>> {
        let file = File::open(&self.path).map_err(|e| KilnError::blob_read(&self.path, e))?;
        Ok(Box::new(file))
    }

    fn urls(&self) -> Vec<String> {
        self.urls.clone()
    }
}

/// A layer whose blob is not part of the image.
///
/// Only the descriptor is carried; the stored stream is empty and the
/// blob is pulled from `urls` by whoever runs the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignLayer {
    digest: Hash,
    diff_id: Hash,
    size: u64,
    media_type: MediaType,
    urls: Vec<String>,
}

impl ForeignLayer {
    /// Carry a foreign descriptor from a base manifest, pairing it with the
    /// diff-id the config lists at the same position.
    pub fn new(desc: &Descriptor, diff_id: Hash) -> Self {
        Self {
            digest: desc.digest.clone(),
            diff_id,
            size: desc.size,
            media_type: desc.media_type.clone(),
            urls: desc.urls.clone(),
        }
    }
}

impl Layer for ForeignLayer {
    fn digest(&self) -> Hash {
        self.digest.clone()
    }

    fn diff_id(&self) -> Option<Hash> {
        Some(self.diff_id.clone())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn media_type(&self) -> MediaType {
        self.media_type.clone()
    }

    fn compressed(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(std::io::empty()))
    }

    fn urls(&self) -> Vec<String> {
        self.urls.clone()
    }
}

/// A blob held in memory, used for config documents.
#[derive(Clone)]
pub struct MemoryBlob {
    data: Arc<[u8]>,
    digest: Hash,
    media_type: MediaType,
}

impl MemoryBlob {
    pub fn new(data: impl Into<Arc<[u8]>>, media_type: MediaType) -> Self {
        let data = data.into();
        let digest = Hash::sha256(&data);
        Self {
            data,
            digest,
            media_type,
        }
    }
}

impl fmt::Debug for MemoryBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlob")
            .field("digest", &self.digest)
            .field("size", &self.data.len())
            .field("media_type", &self.media_type)
            .finish()
    }
}

impl Layer for MemoryBlob {
    fn digest(&self) -> Hash {
        self.digest.clone()
    }

    fn diff_id(&self) -> Option<Hash> {
        None
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn media_type(&self) -> MediaType {
        self.media_type.clone()
    }

    fn compressed(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(std::io::Cursor::new(self.data.clone())))
    }
}

fn is_gzip(path: &Path) -> Result<bool> {
    let mut file = File::open(path).map_err(|e| KilnError::blob_read(path, e))?;
    let mut magic = [0u8; 2];
    let mut read = 0;
    while read < magic.len() {
        let n = file
            .read(&mut magic[read..])
            .map_err(|e| KilnError::blob_read(path, e))?;
        if n == 0 {
            return Ok(false);
        }
        read += n;
    }
    Ok(magic == GZIP_MAGIC)
}

/// Compute the digest of a layer's uncompressed tarball.
///
/// Compressed layers are gunzipped on the fly; uncompressed layers are
/// hashed as stored.
pub fn compute_diff_id(layer: &dyn Layer) -> Result<Hash> {
    let reader = layer.compressed()?;
    let result = if layer.media_type().is_compressed() {
        Hash::from_reader(GzDecoder::new(reader))
    } else {
        Hash::from_reader(reader)
    };
    result
        .map(|(hash, _)| hash)
        .map_err(|e| {
            KilnError::ManifestSynthesis(format!(
                "failed to compute diff-id of {}: {}",
                layer.digest(),
                e
            ))
        })
}

/// Paths describing one layer handed to the assembler:
/// `compressed,diff_id_file[,digest_file]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerParts {
    /// The layer blob (gzip tarball or plain tarball)
    pub compressed: PathBuf,
    /// File holding the hex digest of the uncompressed tarball
    pub diff_id_file: PathBuf,
    /// File holding the hex digest of `compressed`
    pub digest_file: Option<PathBuf>,
}

impl LayerParts {
    /// Resolve the parts into a layer.
    ///
    /// The compressed digest comes from `digest_file` when given, then from
    /// a sibling `<name>.sha256` file, and is computed otherwise.
    pub fn load(&self) -> Result<FileLayer> {
        let diff_id = Hash::from_hex(&read_trimmed(&self.diff_id_file)?)?;
        let digest_file = self.digest_file.clone().or_else(|| {
            let sibling = sibling_digest_path(&self.compressed);
            sibling.is_file().then_some(sibling)
        });
        let digest = match digest_file {
            Some(path) => Some(Hash::from_hex(&read_trimmed(&path)?)?),
            None => None,
        };
        FileLayer::open(&self.compressed, digest, Some(diff_id))
    }
}

/// `layer.tar.gz` → `layer.sha256`, `000.tar` → `000.sha256`.
fn sibling_digest_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".tar.gz")
        .or_else(|| name.strip_suffix(".tgz"))
        .or_else(|| name.strip_suffix(".tar"))
        .unwrap_or(&name);
    path.with_file_name(format!("{}.sha256", stem))
}

impl FromStr for LayerParts {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').collect();
        match parts.as_slice() {
            [compressed, diff_id] if !compressed.is_empty() && !diff_id.is_empty() => Ok(Self {
                compressed: PathBuf::from(compressed),
                diff_id_file: PathBuf::from(diff_id),
                digest_file: None,
            }),
            [compressed, diff_id, digest]
                if !compressed.is_empty() && !diff_id.is_empty() && !digest.is_empty() =>
            {
                Ok(Self {
                    compressed: PathBuf::from(compressed),
                    diff_id_file: PathBuf::from(diff_id),
                    digest_file: Some(PathBuf::from(digest)),
                })
            }
            _ => Err(KilnError::InvalidOptions(format!(
                "invalid layer parts {:?}, expected compressed,diff_id_file[,digest_file]",
                s
            ))),
        }
    }
}
