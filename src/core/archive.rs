/*!
 * Bundle archiving
 *
 * Writes `manifest.json` followed by every payload file into a gzip
 * compressed tar stream. Headers are normalized so identical input gives a
 * byte-identical bundle. The stream goes to a temporary file that is deleted
 * on any failure; callers either upload it or persist it under a final name.
 */

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::{Compression, GzBuilder};
use tar::{Builder, EntryType, Header};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::cancel::CancelToken;
use super::checksum::{sha256_file, StreamingHasher};
use super::manifest_builder::{BuiltManifest, ContentFile, FileSource};
use crate::error::{Result, RsconnectError};

/// 1980-01-01T00:00:00Z, the earliest timestamp every archive consumer accepts
pub const NORMALIZED_MTIME: u64 = 315_532_800;

const FILE_MODE: u32 = 0o644;
const EXECUTABLE_MODE: u32 = 0o755;

/// A finished bundle staged on disk
#[derive(Debug)]
pub struct Bundle {
    file: NamedTempFile,
    size: u64,
    sha256: String,
    entries: Vec<String>,
}

impl Bundle {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Compressed size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Entry names in archive order; `manifest.json` comes first
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Fresh handle positioned at the start of the bundle
    pub fn reader(&self) -> Result<File> {
        self.file
            .reopen()
            .map_err(|e| RsconnectError::filesystem(self.file.path(), e))
    }

    /// Publish the bundle under `dest` with a single rename
    pub fn persist(self, dest: &Path) -> Result<PathBuf> {
        self.file
            .persist(dest)
            .map_err(|e| RsconnectError::filesystem(dest, e.error))?;
        info!(path = %dest.display(), "Bundle written");
        Ok(dest.to_path_buf())
    }
}

/// Streams a built manifest and its payload into a bundle
pub struct BundleArchiver<'a> {
    cancel: &'a CancelToken,
    staging_dir: PathBuf,
}

impl<'a> BundleArchiver<'a> {
    pub fn new(cancel: &'a CancelToken) -> Self {
        Self {
            cancel,
            staging_dir: std::env::temp_dir(),
        }
    }

    /// Stage in `dir`; use the destination directory when persisting so the
    /// final rename stays on one filesystem
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn archive(&self, built: &BuiltManifest) -> Result<Bundle> {
        let temp = tempfile::Builder::new()
            .prefix(".rsconnect-bundle-")
            .suffix(".tar.gz")
            .tempfile_in(&self.staging_dir)
            .map_err(|e| RsconnectError::filesystem(&self.staging_dir, e))?;
        let handle = temp
            .as_file()
            .try_clone()
            .map_err(|e| RsconnectError::filesystem(temp.path(), e))?;

        let encoder = GzBuilder::new()
            .mtime(0)
            .write(BufWriter::new(handle), Compression::default());
        let mut builder = Builder::new(encoder);
        let mut entries = Vec::with_capacity(built.files.len() + 1);

        let manifest_file = built.manifest_file()?;
        self.append(&mut builder, &manifest_file, temp.path())?;
        entries.push(manifest_file.path);

        for entry in &built.files {
            self.cancel.check("archive")?;
            self.append(&mut builder, entry, temp.path())?;
            entries.push(entry.path.clone());
        }

        let write_err = |e: io::Error| RsconnectError::filesystem(temp.path(), e);
        let encoder = builder.into_inner().map_err(write_err)?;
        let mut writer = encoder.finish().map_err(write_err)?;
        writer.flush().map_err(write_err)?;
        drop(writer);

        let size = temp
            .as_file()
            .metadata()
            .map_err(|e| RsconnectError::filesystem(temp.path(), e))?
            .len();
        let sha256 = sha256_file(temp.path())?;

        info!(
            entries = entries.len(),
            bytes = size,
            sha256 = %sha256,
            "Bundle archived"
        );

        Ok(Bundle {
            file: temp,
            size,
            sha256,
            entries,
        })
    }

    fn append<W: Write>(
        &self,
        builder: &mut Builder<W>,
        entry: &ContentFile,
        archive_path: &Path,
    ) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(entry.size);
        header.set_mode(if entry.executable {
            EXECUTABLE_MODE
        } else {
            FILE_MODE
        });
        header.set_mtime(NORMALIZED_MTIME);
        header.set_uid(0);
        header.set_gid(0);

        debug!(path = %entry.path, bytes = entry.size, "Adding bundle entry");

        match &entry.source {
            FileSource::Buffer(bytes) => builder
                .append_data(&mut header, &entry.path, bytes.as_slice())
                .map_err(|e| RsconnectError::filesystem(archive_path, e)),
            FileSource::Disk(path) => {
                let file = File::open(path).map_err(|e| RsconnectError::filesystem(path, e))?;
                let reader = VerifiedReader::new(file, entry.size, &entry.checksum);
                builder
                    .append_data(&mut header, &entry.path, reader)
                    .map_err(|e| RsconnectError::filesystem(path, e))
            }
        }
    }
}

/// Yields exactly `expected` bytes of a file checksummed earlier
///
/// Fails if the file shrank, grew or changed since its manifest entry was
/// built, so the archive never disagrees with the manifest.
struct VerifiedReader<R> {
    inner: R,
    remaining: u64,
    hasher: Option<StreamingHasher>,
    checksum: String,
}

impl<R: Read> VerifiedReader<R> {
    fn new(inner: R, expected: u64, checksum: &str) -> Self {
        Self {
            inner,
            remaining: expected,
            hasher: Some(StreamingHasher::new()),
            checksum: checksum.to_string(),
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        let Some(hasher) = self.hasher.take() else {
            return Ok(());
        };
        let mut extra = [0u8; 1];
        if self.inner.read(&mut extra)? > 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "file grew while it was being bundled",
            ));
        }
        if hasher.finalize_hex() != self.checksum {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "file changed while it was being bundled",
            ));
        }
        Ok(())
    }
}

impl<R: Read> Read for VerifiedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            if self.remaining == 0 {
                self.finish()?;
            }
            return Ok(0);
        }
        let limit = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..limit])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file shrank while it was being bundled",
            ));
        }
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&buf[..n]);
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}
