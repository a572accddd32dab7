//! Content digests.
//!
//! Every blob, manifest and config is addressed by a [`Hash`]: the
//! algorithm name and the lowercase hex encoding of the digest, rendered
//! as `sha256:<hex>`.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{KilnError, Result};

/// The only digest algorithm kiln produces or accepts.
pub const SHA256: &str = "sha256";

/// Hex digest of the empty byte string.
pub const EMPTY_SHA256_HEX: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// A content digest such as `sha256:e3b0c442...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash {
    algorithm: String,
    hex: String,
}

impl Hash {
    /// Build a SHA-256 hash from its hex encoding.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDigest` unless `hex` is exactly 64 lowercase hex
    /// characters.
    pub fn from_hex(hex: &str) -> Result<Self> {
        validate_hex(hex)?;
        Ok(Self {
            algorithm: SHA256.to_string(),
            hex: hex.to_string(),
        })
    }

    /// SHA-256 of an in-memory buffer.
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self {
            algorithm: SHA256.to_string(),
            hex: hex::encode(hasher.finalize()),
        }
    }

    /// Stream `reader` through SHA-256, returning the digest and the number
    /// of bytes consumed.
    pub fn from_reader<R: Read>(mut reader: R) -> std::io::Result<(Self, u64)> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        let mut size = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        let hash = Self {
            algorithm: SHA256.to_string(),
            hex: hex::encode(hasher.finalize()),
        };
        Ok((hash, size))
    }

    /// Digest of zero bytes. Used to mark empty layers.
    pub fn empty() -> Self {
        Self {
            algorithm: SHA256.to_string(),
            hex: EMPTY_SHA256_HEX.to_string(),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn is_empty_digest(&self) -> bool {
        self.hex == EMPTY_SHA256_HEX
    }
}

fn validate_hex(hex: &str) -> Result<()> {
    if hex.len() != 64 {
        return Err(KilnError::MalformedDigest(format!(
            "expected 64 hex characters, got {}: {:?}",
            hex.len(),
            hex
        )));
    }
    if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(KilnError::MalformedDigest(format!(
            "digest is not lowercase hex: {:?}",
            hex
        )));
    }
    Ok(())
}

impl FromStr for Hash {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, hex) = s.split_once(':').ok_or_else(|| {
            KilnError::MalformedDigest(format!("missing algorithm prefix: {:?}", s))
        })?;
        if algorithm != SHA256 {
            return Err(KilnError::MalformedDigest(format!(
                "unsupported algorithm {:?} in {:?}",
                algorithm, s
            )));
        }
        Self::from_hex(hex)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
