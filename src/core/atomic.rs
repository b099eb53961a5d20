/*!
 * Write-then-rename file publishing
 */

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Result, RsconnectError};

/// Replace `path` with `data` so readers see either the old or new contents
///
/// The temporary file lives in the destination directory so the final rename
/// never crosses filesystems.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| RsconnectError::filesystem(dir, e))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| RsconnectError::filesystem(dir, e))?;
    temp.write_all(data)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| RsconnectError::filesystem(temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| RsconnectError::filesystem(path, e.error))?;
    Ok(())
}
