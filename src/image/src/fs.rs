//! Filesystem helpers for metadata and blob files.
//!
//! Every file kiln produces is first written to a temporary file in the
//! destination directory and then renamed into place, so readers only ever
//! observe complete files.

use std::io::{Read, Write};
use std::path::Path;

use kiln_core::error::{KilnError, Result};
use tempfile::NamedTempFile;

/// Permission bits for metadata files (`config.json`, `manifest.json`, ...).
pub const METADATA_MODE: u32 = 0o644;

/// Atomically write `data` to `path` with mode 0644.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    write_atomic_from(path, &mut &data[..]).map(|_| ())
}

/// Atomically stream `reader` into `path` with mode 0644, returning the
/// number of bytes written.
pub fn write_atomic_from<R: Read + ?Sized>(path: &Path, reader: &mut R) -> Result<u64> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| KilnError::blob_write(path, e))?;
    let written = std::io::copy(reader, &mut tmp).map_err(|e| KilnError::blob_write(path, e))?;
    tmp.as_file_mut()
        .flush()
        .map_err(|e| KilnError::blob_write(path, e))?;
    set_mode(tmp.path(), METADATA_MODE).map_err(|e| KilnError::blob_write(path, e))?;
    tmp.persist(path)
        .map_err(|e| KilnError::blob_write(path, e.error))?;

    tracing::trace!(path = %path.display(), bytes = written, "Wrote file");
    Ok(written)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Read a whole file, mapping failures to `BlobRead`.
pub fn read_blob(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| KilnError::blob_read(path, e))
}

/// Read a small text file (digest, diff-id) with surrounding whitespace
/// removed.
pub fn read_trimmed(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path).map_err(|e| KilnError::blob_read(path, e))?;
    Ok(contents.trim().to_string())
}
