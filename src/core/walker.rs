/*!
 * Content directory traversal
 *
 * Walks the content root depth-first, directories before their children,
 * applying a `PathFilter`. Excluded directories are pruned, never entered.
 */

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::cancel::CancelToken;
use super::filter::{to_posix, Decision, PathFilter};
use crate::error::{Result, RsconnectError};

/// A file found on disk that will be bundled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// POSIX path relative to the content root
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub size: u64,
    pub executable: bool,
}

/// Result of a walk: files sorted by relative path
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    root: PathBuf,
    files: Vec<SourceFile>,
    warnings: Vec<String>,
}

impl FileSet {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.rel_path.as_str())
    }

    pub fn contains(&self, rel_path: &str) -> bool {
        self.files
            .binary_search_by(|f| f.rel_path.as_str().cmp(rel_path))
            .is_ok()
    }

    /// Non-fatal problems met during the walk, such as symlink loops
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Walk `root` and collect every file the filter admits
///
/// Symlinks are followed. A symlink loop or dangling link is skipped with a
/// warning; any other read failure aborts the walk.
pub fn walk(root: &Path, filter: &PathFilter, cancel: &CancelToken) -> Result<FileSet> {
    let root_meta = std::fs::metadata(root).map_err(|e| RsconnectError::filesystem(root, e))?;
    if !root_meta.is_dir() {
        return Err(RsconnectError::filesystem(
            root,
            io::Error::other("content path is not a directory"),
        ));
    }

    let mut found: BTreeMap<String, SourceFile> = BTreeMap::new();
    let mut warnings = Vec::new();

    let mut walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .min_depth(1)
        .into_iter();

    while let Some(entry) = walker.next() {
        cancel.check("file scan")?;

        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                if let Some(ancestor) = err.loop_ancestor() {
                    let path = err.path().unwrap_or(root);
                    let message = format!(
                        "Skipping symlink loop at {} (points back to {})",
                        path.display(),
                        ancestor.display()
                    );
                    warn!("{}", message);
                    warnings.push(message);
                    continue;
                }
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                if is_dangling_symlink(&path) {
                    let message = format!("Skipping broken symlink {}", path.display());
                    warn!("{}", message);
                    warnings.push(message);
                    continue;
                }
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("directory walk failed"));
                return Err(RsconnectError::filesystem(path, source));
            }
        };

        let relative_path = match entry.path().strip_prefix(root) {
            Ok(p) => to_posix(p),
            Err(_) => continue,
        };

        if entry.file_type().is_dir() {
            if let Decision::Exclude(class) = filter.decide_dir(&relative_path, entry.path()) {
                debug!(path = %relative_path, ?class, "Pruning directory");
                walker.skip_current_dir();
            }
            continue;
        }

        if !entry.file_type().is_file() {
            debug!(path = %relative_path, "Skipping special file");
            continue;
        }

        if let Decision::Exclude(class) = filter.decide_file(&relative_path) {
            debug!(path = %relative_path, ?class, "Excluding file");
            continue;
        }

        let metadata = entry
            .metadata()
            .map_err(|e| {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("metadata unavailable"));
                RsconnectError::filesystem(entry.path(), source)
            })?;

        found.insert(
            relative_path.clone(),
            SourceFile {
                rel_path: relative_path,
                abs_path: entry.path().to_path_buf(),
                size: metadata.len(),
                executable: is_executable(&metadata),
            },
        );
    }

    // Explicit files win even when an ancestor directory was pruned
    for extra in filter.extra_files() {
        if found.contains_key(extra) {
            continue;
        }
        let abs_path = root.join(extra);
        let metadata =
            std::fs::metadata(&abs_path).map_err(|e| RsconnectError::filesystem(&abs_path, e))?;
        debug!(path = %extra, "Including explicitly requested file");
        found.insert(
            extra.to_string(),
            SourceFile {
                rel_path: extra.to_string(),
                abs_path,
                size: metadata.len(),
                executable: is_executable(&metadata),
            },
        );
    }

    Ok(FileSet {
        root: root.to_path_buf(),
        files: found.into_values().collect(),
        warnings,
    })
}

fn is_dangling_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
        && std::fs::metadata(path).is_err()
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}
