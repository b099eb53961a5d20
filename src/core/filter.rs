use glob::{MatchOptions, Pattern as GlobPattern};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

use crate::error::RsconnectError;

/// Directory names never bundled, wherever they appear in the tree
pub const DEFAULT_EXCLUDED_DIRS: [&str; 10] = [
    ".Rproj.user",
    ".git",
    ".svn",
    "__pycache__",
    "packrat",
    "renv",
    "rsconnect",
    "rsconnect-build",
    "rsconnect-python",
    ".ipynb_checkpoints",
];

/// Top-level files regenerated for every bundle
pub const DEFAULT_EXCLUDED_FILES: [&str; 1] = ["manifest.json"];

/// Subdirectories excluded when the content root is itself an environment
pub const ROOT_ENVIRONMENT_DIRS: [&str; 5] = ["bin/", "lib/", "Lib/", "Scripts/", "Include/"];

/// Interpreter locations that mark a directory as a virtual environment
const ENVIRONMENT_MARKERS: [&str; 4] = [
    "bin/python",
    "bin/python3",
    "Scripts/python.exe",
    "Scripts/Python.exe",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Errors that can occur while building a filter
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("Could not find file {path} under {root}")]
    ExtraFileMissing { path: String, root: String },

    #[error("{path} must be under {root}")]
    ExtraFileOutsideRoot { path: String, root: String },

    #[error("{path} is a directory; only files can be added explicitly")]
    ExtraFileIsDirectory { path: String },
}

impl From<FilterError> for RsconnectError {
    fn from(err: FilterError) -> Self {
        RsconnectError::Config(err.to_string())
    }
}

/// Where an exclusion rule came from; earlier classes take precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RuleClass {
    /// `--exclude` pattern naming files
    User,
    /// `--exclude` pattern ending in `/`
    DirectoryName,
    /// Built-in exclusion list
    Default,
    /// Detected virtual environment
    Environment,
}

/// A single exclusion pattern
#[derive(Debug, Clone)]
pub struct ExclusionRule {
    pattern: String,
    class: RuleClass,
    glob: GlobPattern,
    directory_only: bool,
    recursive: bool,
    literal: bool,
}

impl ExclusionRule {
    /// Compile a pattern; a trailing `/` restricts it to directories
    pub fn new(pattern: &str, class: RuleClass) -> Result<Self, FilterError> {
        let normalized = pattern.replace('\\', "/");
        let normalized = normalized.trim_start_matches("./");
        let directory_only = normalized.ends_with('/');
        let body = normalized.trim_end_matches('/');

        let glob = GlobPattern::new(body).map_err(|e| FilterError::InvalidGlob {
            pattern: pattern.to_string(),
            source: e,
        })?;

        Ok(ExclusionRule {
            pattern: pattern.to_string(),
            class,
            glob,
            directory_only,
            recursive: body.contains("**"),
            literal: !body.contains(['*', '?', '[']),
        })
    }

    /// Match a file's POSIX relative path
    pub fn matches_file(&self, rel_path: &str) -> bool {
        !self.directory_only && self.glob.matches_with(rel_path, MATCH_OPTIONS)
    }

    /// Match a directory's POSIX relative path
    ///
    /// A bare `*` only ever names files; directories are matched by
    /// trailing-slash rules, `**` rules and literal paths.
    pub fn matches_dir(&self, rel_path: &str) -> bool {
        (self.directory_only || self.recursive || self.literal)
            && self.glob.matches_with(rel_path, MATCH_OPTIONS)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn class(&self) -> RuleClass {
        self.class
    }
}

/// Outcome for one traversal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Bundle the file, or descend into the directory
    Include,
    /// Skip the file, or prune the directory entirely
    Exclude(RuleClass),
}

/// Inputs for building a [`PathFilter`]
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// User `--exclude` patterns, in command-line order
    pub excludes: Vec<String>,
    /// Files named explicitly; resolved against the content root
    pub extra_files: Vec<String>,
    /// Root-level files the bundle will carry from memory instead of disk
    pub generated_files: Vec<String>,
}

/// Ordered exclusion rules plus the set of explicitly requested files
///
/// Evaluation order: extra files, then user patterns, then built-in
/// defaults, then virtual-environment detection.
#[derive(Debug, Clone)]
pub struct PathFilter {
    extra_files: BTreeSet<String>,
    user_rules: Vec<ExclusionRule>,
    default_rules: Vec<ExclusionRule>,
    default_dir_names: BTreeSet<String>,
}

impl PathFilter {
    /// Build the filter for a content root
    pub fn new(root: &Path, options: &FilterOptions) -> Result<Self, FilterError> {
        let extra_files = validate_extra_files(root, &options.extra_files)?
            .into_iter()
            .collect();

        let user_rules = options
            .excludes
            .iter()
            .map(|pattern| {
                let class = if pattern.ends_with('/') || pattern.ends_with('\\') {
                    RuleClass::DirectoryName
                } else {
                    RuleClass::User
                };
                ExclusionRule::new(pattern, class)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut default_rules = Vec::new();
        for name in DEFAULT_EXCLUDED_FILES.iter().copied() {
            default_rules.push(ExclusionRule::new(name, RuleClass::Default)?);
        }
        for name in &options.generated_files {
            default_rules.push(ExclusionRule::new(&glob::Pattern::escape(name), RuleClass::Default)?);
        }
        if is_environment_dir(root) {
            tracing::warn!(
                root = %root.display(),
                "Content directory is a virtual environment; excluding its interpreter directories"
            );
            for dir in ROOT_ENVIRONMENT_DIRS {
                default_rules.push(ExclusionRule::new(dir, RuleClass::Environment)?);
            }
        }

        Ok(PathFilter {
            extra_files,
            user_rules,
            default_rules,
            default_dir_names: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Decide whether a file is bundled
    pub fn decide_file(&self, rel_path: &str) -> Decision {
        if self.extra_files.contains(rel_path) {
            return Decision::Include;
        }
        if let Some(rule) = self.user_rules.iter().find(|r| r.matches_file(rel_path)) {
            return Decision::Exclude(rule.class());
        }
        if let Some(rule) = self.default_rules.iter().find(|r| r.matches_file(rel_path)) {
            return Decision::Exclude(rule.class());
        }
        Decision::Include
    }

    /// Decide whether a directory is descended into
    ///
    /// `abs_path` is only consulted for virtual-environment detection, which
    /// runs last.
    pub fn decide_dir(&self, rel_path: &str, abs_path: &Path) -> Decision {
        if let Some(rule) = self.user_rules.iter().find(|r| r.matches_dir(rel_path)) {
            return Decision::Exclude(rule.class());
        }
        let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        if self.default_dir_names.contains(name) {
            return Decision::Exclude(RuleClass::Default);
        }
        if let Some(rule) = self.default_rules.iter().find(|r| r.matches_dir(rel_path)) {
            return Decision::Exclude(rule.class());
        }
        if is_environment_dir(abs_path) {
            return Decision::Exclude(RuleClass::Environment);
        }
        Decision::Include
    }

    /// Explicitly requested files, as POSIX paths relative to the root
    pub fn extra_files(&self) -> impl Iterator<Item = &str> {
        self.extra_files.iter().map(String::as_str)
    }
}

/// Structural check for an interpreter at a conventional location
pub fn is_environment_dir(dir: &Path) -> bool {
    ENVIRONMENT_MARKERS
        .iter()
        .any(|marker| dir.join(marker).exists())
}

/// Resolve extra files against `root`; each must exist and lie under it
pub fn validate_extra_files(root: &Path, extras: &[String]) -> Result<Vec<String>, FilterError> {
    let root_display = root.display().to_string();
    let canonical_root = root
        .canonicalize()
        .map_err(|_| FilterError::ExtraFileMissing {
            path: root_display.clone(),
            root: root_display.clone(),
        })?;

    let mut resolved = Vec::with_capacity(extras.len());
    for extra in extras {
        let candidate = root.join(extra.replace('\\', "/"));
        let canonical = candidate
            .canonicalize()
            .map_err(|_| FilterError::ExtraFileMissing {
                path: extra.clone(),
                root: root_display.clone(),
            })?;
        let relative = canonical.strip_prefix(&canonical_root).map_err(|_| {
            FilterError::ExtraFileOutsideRoot {
                path: extra.clone(),
                root: root_display.clone(),
            }
        })?;
        if canonical.is_dir() {
            return Err(FilterError::ExtraFileIsDirectory { path: extra.clone() });
        }
        resolved.push(to_posix(relative));
    }
    Ok(resolved)
}

/// Join path components with `/` regardless of host convention
pub fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
