/*!
 * Deployment pipeline
 *
 * walk → manifest → archive → verify server → create/update content →
 * save record → environment variables → upload → deploy → poll → verify content.
 *
 * Everything up to the archive runs without the network, so a broken
 * manifest never reaches the server.
 */

pub mod batch;
pub mod poller;

use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use rsconnect_core_manifest::IntegrationRequest;
use tracing::{info, warn};

use crate::api::{ConnectApi, ContentItem, ContentRequest};
use crate::config::DeployConfig;
use crate::core::app_config::ContentKind;
use crate::core::archive::{Bundle, BundleArchiver};
use crate::core::cancel::CancelToken;
use crate::core::filter::{FilterOptions, PathFilter};
use crate::core::manifest_builder::{BuiltManifest, ManifestBuilder, ManifestOptions};
use crate::core::walker::walk;
use crate::environment::EnvironmentDescriptor;
use crate::error::{Result, RsconnectError};
use crate::metadata::{AppRecord, AppStore, TaskStateStore};

pub use batch::deploy_many;
pub use poller::{DeploymentResult, PollConfig, TaskPoller, TaskTracker};

/// Lines of task output repeated in a failure hint
const FAILURE_HINT_LINES: usize = 10;

/// Everything needed to turn a directory into a bundle
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub directory: PathBuf,
    pub kind: ContentKind,
    pub excludes: Vec<String>,
    pub extra_files: Vec<String>,
    pub entrypoint: Option<String>,
    pub title: Option<String>,
    pub image: Option<String>,
    pub environment: Option<EnvironmentDescriptor>,
    pub disable_env_management_py: bool,
    pub disable_env_management_r: bool,
    pub integration_requests: Vec<IntegrationRequest>,
}

impl BundleRequest {
    pub fn new(directory: impl Into<PathBuf>, kind: ContentKind) -> Self {
        Self {
            directory: directory.into(),
            kind,
            excludes: Vec::new(),
            extra_files: Vec::new(),
            entrypoint: None,
            title: None,
            image: None,
            environment: None,
            disable_env_management_py: false,
            disable_env_management_r: false,
            integration_requests: Vec::new(),
        }
    }

    fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            excludes: self.excludes.clone(),
            extra_files: self.extra_files.clone(),
            generated_files: self
                .environment
                .as_ref()
                .and_then(|env| env.generated_file())
                .map(|(name, _)| vec![name.to_string()])
                .unwrap_or_default(),
        }
    }

    fn manifest_options(&self) -> ManifestOptions {
        let mut options = ManifestOptions::new(self.kind.config());
        options.entrypoint = self.entrypoint.clone();
        options.title = self.title.clone();
        options.image = self.image.clone();
        options.python_env_management = self.disable_env_management_py.then_some(false);
        options.r_env_management = self.disable_env_management_r.then_some(false);
        options.integration_requests = self.integration_requests.clone();
        options
    }

    /// Title used when none was given: the directory name
    pub fn default_title(&self) -> String {
        self.directory
            .canonicalize()
            .unwrap_or_else(|_| self.directory.clone())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "content".to_string())
    }
}

/// Walk the directory and build a validated manifest; no network
pub fn prepare_bundle(request: &BundleRequest, cancel: &CancelToken) -> Result<BuiltManifest> {
    let root = request.directory.as_path();
    if !root.is_dir() {
        return Err(RsconnectError::filesystem(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "content directory not found"),
        ));
    }

    let config = request.kind.config();
    if config.requires_environment && request.environment.is_none() {
        return Err(RsconnectError::Config(format!(
            "{} content needs a Python environment; pass --python-version or --env-descriptor",
            request.kind
        )));
    }

    let filter = PathFilter::new(root, &request.filter_options())?;
    let files = walk(root, &filter, cancel)?;
    info!(
        directory = %root.display(),
        files = files.len(),
        bytes = files.total_size(),
        "Collected content files"
    );

    let options = request.manifest_options();
    let mut built =
        ManifestBuilder::new(&options, cancel).build(&files, request.environment.as_ref())?;
    let mut warnings = files.warnings().to_vec();
    warnings.append(&mut built.warnings);
    built.warnings = warnings;
    Ok(built)
}

/// A bundle request plus where and how to deploy it
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub bundle: BundleRequest,
    /// Existing content to update
    pub app_id: Option<String>,
    /// Ignore saved deployment records and create new content
    pub new: bool,
    pub env_vars: Vec<(String, String)>,
    /// Deploy even if another deployment of the content is running
    pub force: bool,
}

impl DeployRequest {
    pub fn new(bundle: BundleRequest) -> Self {
        Self {
            bundle,
            app_id: None,
            new: false,
            env_vars: Vec::new(),
            force: false,
        }
    }
}

/// Runs deployments against one server
pub struct Deployer<'a> {
    api: &'a dyn ConnectApi,
    config: &'a DeployConfig,
    cancel: &'a CancelToken,
    progress: Option<ProgressBar>,
}

impl<'a> Deployer<'a> {
    pub fn new(api: &'a dyn ConnectApi, config: &'a DeployConfig, cancel: &'a CancelToken) -> Self {
        Self {
            api,
            config,
            cancel,
            progress: None,
        }
    }

    /// Report stage changes on a spinner
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    fn stage(&self, message: &str) {
        info!("{}", message);
        if let Some(progress) = &self.progress {
            progress.set_message(message.to_string());
        }
    }

    fn server_url(&self) -> &str {
        self.config.server.as_deref().unwrap_or_default()
    }

    pub fn deploy(&self, request: &DeployRequest) -> Result<DeploymentResult> {
        self.stage("Building manifest");
        let built = prepare_bundle(&request.bundle, self.cancel)?;

        self.stage("Creating bundle");
        let bundle = BundleArchiver::new(self.cancel).archive(&built)?;

        self.stage("Checking server");
        let server = self.api.verify_server()?;
        info!(
            user = %server.username,
            version = server.version.as_deref().unwrap_or("unknown"),
            "Server verified"
        );
        self.check_integrations(&request.bundle.integration_requests)?;

        let store = AppStore::for_content(&request.bundle.directory);
        let app_id = self.resolve_target(request, &store, &built)?;
        let title = request
            .bundle
            .title
            .clone()
            .unwrap_or_else(|| request.bundle.default_title());

        self.stage("Updating content");
        let item = self.api.create_or_update_content(&ContentRequest {
            app_id,
            name: content_name(&title),
            title: Some(title),
        })?;
        // Content exists on the server from here on, whatever the task does
        self.save_record(&store, request, &built, &item);
        self.api
            .set_environment_variables(&item.guid, &request.env_vars)?;

        self.upload_and_wait(&item, &bundle, request.force)
    }

    fn upload_and_wait(
        &self,
        item: &ContentItem,
        bundle: &Bundle,
        force: bool,
    ) -> Result<DeploymentResult> {
        self.stage("Uploading bundle");
        let bundle_id = self.api.upload_bundle(&item.id, bundle)?;

        self.stage("Deploying");
        let task_id = self.api.deploy(&item.id, &bundle_id, force)?;

        let mut tracker = TaskStateStore::new(&self.config.build_dir, self.server_url(), &item.guid);
        let mut result = TaskPoller::new(self.api, PollConfig::from_config(self.config), self.cancel)
            .for_content(&item.guid, &item.url)
            .poll(&task_id, &mut tracker)?;

        if !result.succeeded() {
            return Err(failure_error(&result));
        }

        match self.api.app_config(&item.id) {
            Ok(url) => result.dashboard_url = Some(url),
            Err(e) => warn!("Could not fetch the dashboard URL: {}", e),
        }

        if self.config.no_verify {
            info!("Skipping content verification");
        } else {
            self.stage("Verifying content");
            self.api.verify_content(&item.guid)?;
        }
        Ok(result)
    }

    /// Explicit id, then the saved record for this server, unless `--new`
    fn resolve_target(
        &self,
        request: &DeployRequest,
        store: &AppStore,
        built: &BuiltManifest,
    ) -> Result<Option<String>> {
        if request.new {
            return Ok(None);
        }
        if let Some(id) = &request.app_id {
            return Ok(Some(id.clone()));
        }

        let Some(record) = store.get(self.server_url())? else {
            return Ok(None);
        };
        let mode = built.manifest.metadata.appmode.name();
        if record.app_mode != mode {
            return Err(RsconnectError::application(
                format!(
                    "This directory was deployed to {} as {} content and cannot be redeployed as {}.",
                    record.server_url, record.app_mode, mode
                ),
                Some("Use --new to deploy as new content."),
            ));
        }
        info!(app_id = %record.app_id, "Updating previously deployed content");
        Ok(Some(record.app_id))
    }

    fn check_integrations(&self, requests: &[IntegrationRequest]) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }
        let available = self.api.integrations()?;
        for request in requests {
            if request.find_match(&available)?.is_none() {
                warn!(
                    name = request.name.as_deref().unwrap_or(""),
                    "No integration on the server matches this request; the server will report it"
                );
            }
        }
        Ok(())
    }

    fn save_record(
        &self,
        store: &AppStore,
        request: &DeployRequest,
        built: &BuiltManifest,
        item: &ContentItem,
    ) {
        let record = AppRecord {
            server_url: self.server_url().to_string(),
            filename: absolute(&request.bundle.directory),
            app_url: item.url.clone(),
            app_id: item.id.clone(),
            app_guid: item.guid.clone(),
            title: item.title.clone(),
            app_mode: built.manifest.metadata.appmode.name().to_string(),
            app_store_version: 0,
        };
        if let Err(e) = store.set(record) {
            warn!("Could not save the deployment record: {}", e);
        }
    }
}

fn failure_error(result: &DeploymentResult) -> RsconnectError {
    let message = result
        .error
        .clone()
        .unwrap_or_else(|| format!("Deployment task {} ended as {}", result.task_id, result.status));
    let tail: Vec<&str> = result
        .log_excerpt
        .iter()
        .rev()
        .take(FAILURE_HINT_LINES)
        .rev()
        .map(String::as_str)
        .collect();
    let hint = (!tail.is_empty()).then(|| format!("Last task output:\n  {}", tail.join("\n  ")));
    RsconnectError::Application { message, hint }
}

/// Server-side content name derived from a title: 3 to 64 characters of
/// `[a-z0-9_]`
pub fn content_name(title: &str) -> String {
    let mut name = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '_' };
        if !(c == '_' && name.ends_with('_')) {
            name.push(c);
        }
    }
    while name.len() < 3 {
        name.push('_');
    }
    name.truncate(64);
    name
}

fn absolute(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}
