/*!
 * Manifest construction
 *
 * Turns a walked file set and an environment descriptor into a validated
 * `Manifest` plus the ordered list of payload entries that the archiver will
 * write. Both are built from the same list, so the manifest and the bundle
 * always agree on their contents.
 */

use std::path::{Path, PathBuf};

use rsconnect_core_manifest::{
    validate_manifest, EnvironmentManagement, EnvironmentSection, IntegrationRequest, Manifest,
    PackageManager, PythonRequirement, PythonSection, MANIFEST_FILENAME,
};
use tracing::{debug, info, warn};

use super::app_config::{AppConfig, EntrypointPolicy};
use super::atomic::atomic_write;
use super::cancel::CancelToken;
use super::checksum::{buffer_checksum, file_checksum};
use super::entrypoint::{discover_entrypoint, Entrypoint};
use super::walker::FileSet;
use crate::environment::EnvironmentDescriptor;
use crate::error::{Result, RsconnectError};

/// Whether a bundle entry is content or the manifest itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Payload,
    Manifest,
}

/// Where an entry's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Disk(PathBuf),
    Buffer(Vec<u8>),
}

/// One file placed in the bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFile {
    /// POSIX path inside the bundle
    pub path: String,
    pub size: u64,
    /// MD5 hex digest
    pub checksum: String,
    pub role: FileRole,
    pub source: FileSource,
    pub executable: bool,
}

/// Caller choices that shape the manifest
#[derive(Debug, Clone)]
pub struct ManifestOptions {
    pub app_config: &'static AppConfig,
    pub entrypoint: Option<String>,
    pub title: Option<String>,
    pub image: Option<String>,
    /// `Some(false)` tells the server not to install Python packages
    pub python_env_management: Option<bool>,
    /// `Some(false)` tells the server not to install R packages
    pub r_env_management: Option<bool>,
    pub integration_requests: Vec<IntegrationRequest>,
}

impl ManifestOptions {
    pub fn new(app_config: &'static AppConfig) -> Self {
        Self {
            app_config,
            entrypoint: None,
            title: None,
            image: None,
            python_env_management: None,
            r_env_management: None,
            integration_requests: Vec::new(),
        }
    }
}

/// A validated manifest and the payload it describes
#[derive(Debug, Clone)]
pub struct BuiltManifest {
    pub manifest: Manifest,
    /// Payload entries, sorted by path, one per manifest file entry
    pub files: Vec<ContentFile>,
    pub entrypoint: Option<Entrypoint>,
    pub warnings: Vec<String>,
}

impl BuiltManifest {
    /// The manifest as a bundle entry
    pub fn manifest_file(&self) -> Result<ContentFile> {
        let text = self.manifest.to_canonical_json()?;
        let bytes = text.into_bytes();
        Ok(ContentFile {
            path: MANIFEST_FILENAME.to_string(),
            size: bytes.len() as u64,
            checksum: buffer_checksum(&bytes),
            role: FileRole::Manifest,
            source: FileSource::Buffer(bytes),
            executable: false,
        })
    }

    pub fn payload_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Builds manifests for one content type
pub struct ManifestBuilder<'a> {
    options: &'a ManifestOptions,
    cancel: &'a CancelToken,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(options: &'a ManifestOptions, cancel: &'a CancelToken) -> Self {
        Self { options, cancel }
    }

    /// Checksum every file, resolve the entrypoint and validate the result
    pub fn build(
        &self,
        files: &FileSet,
        environment: Option<&EnvironmentDescriptor>,
    ) -> Result<BuiltManifest> {
        let config = self.options.app_config;
        let mut warnings = Vec::new();

        let entrypoint = discover_entrypoint(
            files,
            config.entrypoint,
            self.options.entrypoint.as_deref(),
        )?;

        let mut manifest = Manifest::new(config.app_mode);
        manifest.locale = environment.and_then(|env| env.locale.clone());
        manifest.metadata.entrypoint = entrypoint.as_ref().map(|e| e.as_str().to_string());
        if config.entrypoint == EntrypointPolicy::Html {
            manifest.metadata.primary_html = manifest.metadata.entrypoint.clone();
        }
        manifest.metadata.content_category = config.content_category.map(str::to_string);
        manifest.metadata.title = self.options.title.clone();

        let mut entries = Vec::with_capacity(files.len() + 1);
        for source in files.files() {
            self.cancel.check("manifest build")?;
            let checksum = file_checksum(&source.abs_path)?;
            debug!(path = %source.rel_path, %checksum, "Checksummed file");
            entries.push(ContentFile {
                path: source.rel_path.clone(),
                size: source.size,
                checksum,
                role: FileRole::Payload,
                source: FileSource::Disk(source.abs_path.clone()),
                executable: source.executable,
            });
        }

        if let Some((name, contents)) = environment.and_then(|env| env.generated_file()) {
            entries.retain(|entry| entry.path != name);
            entries.push(ContentFile {
                path: name.to_string(),
                size: contents.len() as u64,
                checksum: buffer_checksum(contents),
                role: FileRole::Payload,
                source: FileSource::Buffer(contents.to_vec()),
                executable: false,
            });
            entries.sort_by(|a, b| a.path.cmp(&b.path));
        }

        if config.requires_environment {
            match environment {
                Some(env) => {
                    let package_file = env.package_file();
                    if !entries.iter().any(|e| e.path == package_file) {
                        push_warning(
                            &mut warnings,
                            format!(
                                "{} not found; the server will reconstruct dependencies from the environment snapshot",
                                package_file
                            ),
                        );
                    }
                    manifest.python = Some(PythonSection {
                        version: env.python.clone(),
                        package_manager: PackageManager {
                            name: env.package_manager.clone(),
                            version: env.package_manager_version.clone(),
                            package_file: package_file.to_string(),
                        },
                    });
                }
                None => push_warning(
                    &mut warnings,
                    "No Python environment description; the manifest will not pin an interpreter"
                        .to_string(),
                ),
            }
        }

        if let Some(Entrypoint::Module(module)) = &entrypoint {
            if !module_file_present(module, &entries) {
                return Err(RsconnectError::ManifestValidation(format!(
                    "entrypoint module '{}' has no matching file in the bundle",
                    module
                )));
            }
        }

        let environment_section = EnvironmentSection {
            image: self.options.image.clone(),
            python: environment
                .and_then(|env| env.python_requires.clone())
                .map(|requires| PythonRequirement { requires }),
            environment_management: env_management(
                self.options.python_env_management,
                self.options.r_env_management,
            ),
        };
        if !environment_section.is_empty() {
            manifest.environment = Some(environment_section);
        }

        manifest.integration_requests = self.options.integration_requests.clone();

        for entry in &entries {
            manifest.add_file(entry.path.clone(), entry.checksum.clone());
        }

        validate_manifest(&manifest)?;
        info!(
            appmode = %manifest.metadata.appmode,
            entrypoint = manifest.metadata.entrypoint.as_deref().unwrap_or("-"),
            files = entries.len(),
            "Manifest built"
        );

        Ok(BuiltManifest {
            manifest,
            files: entries,
            entrypoint,
            warnings,
        })
    }
}

fn push_warning(warnings: &mut Vec<String>, message: String) {
    warn!("{}", message);
    warnings.push(message);
}

fn env_management(python: Option<bool>, r: Option<bool>) -> Option<EnvironmentManagement> {
    if python.is_none() && r.is_none() {
        None
    } else {
        Some(EnvironmentManagement { python, r })
    }
}

fn module_file_present(entrypoint: &str, entries: &[ContentFile]) -> bool {
    let module = entrypoint.split(':').next().unwrap_or(entrypoint);
    let base = module.replace('.', "/");
    let as_file = format!("{}.py", base);
    let as_package = format!("{}/__init__.py", base);
    entries
        .iter()
        .any(|e| e.path == as_file || e.path == as_package || e.path == format!("{}.py", module))
}

/// Write `manifest.json` (and a generated dependency file) into `root`
///
/// An existing dependency file on disk is left alone.
pub fn write_manifest(root: &Path, built: &BuiltManifest) -> Result<PathBuf> {
    for entry in &built.files {
        if let FileSource::Buffer(bytes) = &entry.source {
            let target = root.join(&entry.path);
            if target.exists() {
                info!(path = %target.display(), "Keeping existing file");
            } else {
                atomic_write(&target, bytes)?;
                info!(path = %target.display(), "Wrote dependency file");
            }
        }
    }

    let manifest_path = root.join(MANIFEST_FILENAME);
    let text = built.manifest.to_canonical_json()?;
    atomic_write(&manifest_path, text.as_bytes())?;
    info!(path = %manifest_path.display(), "Wrote manifest");
    Ok(manifest_path)
}
