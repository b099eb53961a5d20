/*!
 * rsconnect CLI - Command Line Interface
 */

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rsconnect::{
    api::{ConnectApi, ConnectClient},
    cli_style::{
        self, batch_results_table, deployment_record_table, deployment_summary_table,
        file_table, format_bytes, key_value_table, manifest_diff_lines, print_info,
        print_success, print_warning, section_header,
    },
    config::{DeployConfig, LogLevel, TlsMode},
    core::{
        cancel::install_interrupt_handler, write_manifest, BundleArchiver, CancelToken,
        ContentKind,
    },
    deploy::{deploy_many, prepare_bundle, BundleRequest, DeployRequest, Deployer},
    environment::EnvironmentDescriptor,
    error::{Result, RsconnectError, EXIT_SUCCESS},
    logging,
    metadata::{AppStore, TaskStateStore},
};
use rsconnect_core_manifest::{IntegrationRequest, Manifest, MANIFEST_FILENAME};

#[derive(Parser)]
#[command(name = "rsconnect")]
#[command(version, about = "Bundle content directories and deploy them to a Connect server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevelArg,

    /// Write JSON logs to this file instead of stderr
    #[arg(long = "log-file", value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bundle a directory and deploy it
    Deploy {
        #[command(flatten)]
        content: ContentArgs,

        #[command(flatten)]
        server: ServerArgs,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Deploy several directories of the same kind concurrently
    DeployMany {
        #[arg(value_enum)]
        kind: KindArg,

        /// Content directories
        #[arg(required = true)]
        directories: Vec<PathBuf>,

        /// Exclude files matching this glob (repeatable)
        #[arg(short = 'x', long = "exclude", value_name = "GLOB")]
        excludes: Vec<String>,

        /// Python version the content runs on
        #[arg(long, value_name = "VERSION")]
        python_version: Option<String>,

        /// Maximum deployments in flight
        #[arg(long, value_name = "N")]
        max_in_flight: Option<usize>,

        #[command(flatten)]
        server: ServerArgs,

        /// Create new content for every directory
        #[arg(short = 'N', long)]
        new: bool,

        /// Skip the request to the deployed content
        #[arg(long)]
        no_verify: bool,
    },

    /// Write manifest.json into the content directory
    WriteManifest {
        #[command(flatten)]
        content: ContentArgs,

        /// Replace an existing manifest.json
        #[arg(long)]
        overwrite: bool,
    },

    /// Write the bundle to a local file instead of deploying it
    Bundle {
        #[command(flatten)]
        content: ContentArgs,

        /// Bundle file to create
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Show the saved deployments of a content directory
    Info {
        /// Content directory
        directory: PathBuf,
    },

    /// Check that the server is reachable and the API key is accepted
    VerifyServer {
        #[command(flatten)]
        server: ServerArgs,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args)]
struct ContentArgs {
    #[arg(value_enum)]
    kind: KindArg,

    /// Content directory
    directory: PathBuf,

    /// Extra files to include even if an exclude pattern matches them
    extra_files: Vec<String>,

    /// Exclude files matching this glob (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "GLOB")]
    excludes: Vec<String>,

    /// Python module (`module:object`) or document to run
    #[arg(short, long)]
    entrypoint: Option<String>,

    #[arg(short, long)]
    title: Option<String>,

    /// Execution environment image
    #[arg(short = 'I', long)]
    image: Option<String>,

    /// Python version; dependencies are read from requirements.txt
    #[arg(long, value_name = "VERSION", conflicts_with = "env_descriptor")]
    python_version: Option<String>,

    /// JSON environment description produced by an inspector
    #[arg(long, value_name = "FILE")]
    env_descriptor: Option<PathBuf>,

    /// Do not let the server manage Python or R packages
    #[arg(long)]
    disable_env_management: bool,

    #[arg(long)]
    disable_env_management_py: bool,

    #[arg(long)]
    disable_env_management_r: bool,

    /// JSON file with a list of integration requests
    #[arg(long, value_name = "FILE")]
    integration_requests: Option<PathBuf>,
}

#[derive(Args)]
struct ServerArgs {
    /// Server URL (default: $CONNECT_SERVER)
    #[arg(short, long)]
    server: Option<String>,

    /// API key (default: $CONNECT_API_KEY)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Skip TLS certificate verification
    #[arg(short, long)]
    insecure: bool,

    /// PEM bundle of trusted certificate authorities
    #[arg(short, long, value_name = "FILE")]
    cacert: Option<PathBuf>,
}

#[derive(Args)]
struct TargetArgs {
    /// Existing content to update
    #[arg(short, long, conflicts_with = "new")]
    app_id: Option<String>,

    /// Deploy as new content, ignoring earlier deployments
    #[arg(short = 'N', long)]
    new: bool,

    /// Environment variable NAME=VALUE, or NAME to copy from this shell (repeatable)
    #[arg(short = 'E', long = "environment", value_name = "NAME[=VALUE]")]
    environment: Vec<String>,

    /// Skip the request to the deployed content
    #[arg(long)]
    no_verify: bool,

    /// Deploy even if another deployment is running
    #[arg(long)]
    force: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum KindArg {
    Api,
    Fastapi,
    Dash,
    Streamlit,
    Bokeh,
    Shiny,
    Gradio,
    Panel,
    Voila,
    Notebook,
    Html,
    Tensorflow,
}

impl From<KindArg> for ContentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Api => ContentKind::Api,
            KindArg::Fastapi => ContentKind::FastApi,
            KindArg::Dash => ContentKind::Dash,
            KindArg::Streamlit => ContentKind::Streamlit,
            KindArg::Bokeh => ContentKind::Bokeh,
            KindArg::Shiny => ContentKind::Shiny,
            KindArg::Gradio => ContentKind::Gradio,
            KindArg::Panel => ContentKind::Panel,
            KindArg::Voila => ContentKind::Voila,
            KindArg::Notebook => ContentKind::Notebook,
            KindArg::Html => ContentKind::Html,
            KindArg::Tensorflow => ContentKind::TensorFlow,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            cli_style::print_error(&e.to_string(), e.hint().as_deref());
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        use clap::CommandFactory;
        use clap_complete::generate;
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "rsconnect", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => DeployConfig::from_file(path)?,
        None => DeployConfig::default(),
    };
    config.apply_env()?;
    config.log_level = cli.log_level.into();
    config.log_file = cli.log_file.clone();
    config.verbose = config.verbose || cli.verbose;

    if let Err(e) = logging::init_logging(&config) {
        print_warning(&format!("Failed to initialize logging: {}", e));
    }

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone())?;

    match cli.command {
        Commands::Deploy {
            content,
            server,
            target,
        } => handle_deploy(config, &cancel, content, server, target),
        Commands::DeployMany {
            kind,
            directories,
            excludes,
            python_version,
            max_in_flight,
            server,
            new,
            no_verify,
        } => {
            apply_server_args(&mut config, server)?;
            if let Some(n) = max_in_flight {
                config.max_in_flight = n;
            }
            config.no_verify = config.no_verify || no_verify;

            let requests = directories
                .into_iter()
                .map(|directory| {
                    let mut bundle = BundleRequest::new(&directory, kind.into());
                    bundle.excludes = excludes.clone();
                    bundle.environment = python_version
                        .as_ref()
                        .map(|v| EnvironmentDescriptor::from_requirements_file(&directory, v));
                    let mut request = DeployRequest::new(bundle);
                    request.new = new;
                    request
                })
                .collect::<Vec<_>>();
            handle_deploy_many(&config, &cancel, &requests)
        }
        Commands::WriteManifest { content, overwrite } => {
            handle_write_manifest(&cancel, content, overwrite)
        }
        Commands::Bundle { content, output } => handle_bundle(&cancel, content, &output),
        Commands::Info { directory } => handle_info(&config, &directory),
        Commands::VerifyServer { server } => {
            apply_server_args(&mut config, server)?;
            let client = ConnectClient::new(&config)?;
            let info = client.verify_server()?;
            println!(
                "{}",
                key_value_table(&[
                    ("Server", client.server_url().to_string()),
                    ("Version", info.version.unwrap_or_else(|| "unknown".to_string())),
                    ("User", info.username),
                ])
            );
            print_success("Server verified");
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

fn handle_deploy(
    mut config: DeployConfig,
    cancel: &CancelToken,
    content: ContentArgs,
    server: ServerArgs,
    target: TargetArgs,
) -> Result<()> {
    apply_server_args(&mut config, server)?;
    config.no_verify = config.no_verify || target.no_verify;

    let mut request = DeployRequest::new(bundle_request(content)?);
    request.app_id = target.app_id;
    request.new = target.new;
    request.force = target.force;
    request.env_vars = parse_env_vars(&target.environment)?;

    let client = ConnectClient::new(&config)?;
    let progress = spinner();
    let outcome = Deployer::new(&client, &config, cancel)
        .with_progress(progress.clone())
        .deploy(&request);
    progress.finish_and_clear();
    let result = outcome?;

    section_header("Deployment complete");
    println!("{}", deployment_summary_table(&result));
    if let Some(url) = &result.content_url {
        print_success(&format!("Content is live at {}", url));
    }
    Ok(())
}

fn handle_deploy_many(
    config: &DeployConfig,
    cancel: &CancelToken,
    requests: &[DeployRequest],
) -> Result<()> {
    let client = ConnectClient::new(config)?;
    let results = deploy_many(&client, config, cancel, requests)?;

    let failed = results.iter().filter(|result| result.is_err()).count();
    let rows = requests
        .iter()
        .map(|request| request.bundle.directory.display().to_string())
        .zip(&results);
    section_header("Batch deployment");
    println!("{}", batch_results_table(rows));

    if failed > 0 {
        return Err(RsconnectError::application(
            format!("{} of {} deployments failed", failed, requests.len()),
            None,
        ));
    }
    print_success(&format!("Deployed {} directories", requests.len()));
    Ok(())
}

fn handle_write_manifest(cancel: &CancelToken, content: ContentArgs, overwrite: bool) -> Result<()> {
    let directory = content.directory.clone();
    let built = prepare_bundle(&bundle_request(content)?, cancel)?;

    let manifest_path = directory.join(MANIFEST_FILENAME);
    if manifest_path.exists() {
        if !overwrite {
            return Err(RsconnectError::Config(format!(
                "{} already exists; use --overwrite to replace it",
                manifest_path.display()
            )));
        }
        report_manifest_changes(&manifest_path, &built.manifest);
    }

    let written = write_manifest(&directory, &built)?;
    println!("{}", file_table(&built.files));
    print_success(&format!("Wrote {}", written.display()));
    Ok(())
}

fn report_manifest_changes(path: &Path, manifest: &Manifest) {
    let existing = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| Manifest::from_json(&text).map_err(|e| e.to_string()));
    match existing {
        Ok(existing) => {
            let diff = existing.diff(manifest);
            if diff.is_empty() {
                print_info("manifest.json is unchanged");
            }
            for line in manifest_diff_lines(&diff) {
                println!("  {}", line);
            }
        }
        Err(e) => print_warning(&format!("Replacing unreadable manifest: {}", e)),
    }
}

fn handle_bundle(cancel: &CancelToken, content: ContentArgs, output: &Path) -> Result<()> {
    let built = prepare_bundle(&bundle_request(content)?, cancel)?;

    let staging = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let bundle = BundleArchiver::new(cancel)
        .with_staging_dir(staging)
        .archive(&built)?;

    println!(
        "{}",
        key_value_table(&[
            ("Entries", bundle.entries().len().to_string()),
            ("Payload", format_bytes(built.payload_size())),
            ("Compressed", format_bytes(bundle.size())),
            ("SHA-256", bundle.sha256().to_string()),
        ])
    );
    let path = bundle.persist(output)?;
    print_success(&format!("Wrote {}", path.display()));
    Ok(())
}

fn handle_info(config: &DeployConfig, directory: &Path) -> Result<()> {
    if !directory.is_dir() {
        return Err(RsconnectError::Filesystem {
            path: directory.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let store = AppStore::for_content(directory);
    let records = store.all()?;
    let location = match store.location() {
        Some(location) if !records.is_empty() => location,
        _ => {
            print_info("No saved deployment information was found.");
            return Ok(());
        }
    };
    print_info(&format!(
        "Loaded deployment information from {}",
        location.display()
    ));

    for record in &records {
        let tasks = TaskStateStore::new(&config.build_dir, &record.server_url, &record.app_guid);
        let task = tasks.get().unwrap_or_else(|e| {
            print_warning(&format!("Ignoring {}: {}", tasks.path().display(), e));
            None
        });
        section_header(&record.server_url);
        println!("{}", deployment_record_table(record, task.as_ref()));
    }
    Ok(())
}

fn bundle_request(content: ContentArgs) -> Result<BundleRequest> {
    let environment = match (&content.env_descriptor, &content.python_version) {
        (Some(path), _) => Some(EnvironmentDescriptor::from_json_file(path)?),
        (None, Some(version)) => Some(EnvironmentDescriptor::from_requirements_file(
            &content.directory,
            version,
        )),
        (None, None) => None,
    };
    let integration_requests = match &content.integration_requests {
        Some(path) => read_integration_requests(path)?,
        None => Vec::new(),
    };

    let mut request = BundleRequest::new(&content.directory, content.kind.into());
    request.excludes = content.excludes;
    request.extra_files = content.extra_files;
    request.entrypoint = content.entrypoint;
    request.title = content.title;
    request.image = content.image;
    request.environment = environment;
    request.disable_env_management_py =
        content.disable_env_management || content.disable_env_management_py;
    request.disable_env_management_r =
        content.disable_env_management || content.disable_env_management_r;
    request.integration_requests = integration_requests;
    Ok(request)
}

fn read_integration_requests(path: &Path) -> Result<Vec<IntegrationRequest>> {
    let text = std::fs::read_to_string(path).map_err(|e| RsconnectError::filesystem(path, e))?;
    serde_json::from_str(&text).map_err(|e| {
        RsconnectError::Config(format!(
            "{} is not a list of integration requests: {}",
            path.display(),
            e
        ))
    })
}

fn apply_server_args(config: &mut DeployConfig, args: ServerArgs) -> Result<()> {
    if args.server.is_some() {
        config.server = args.server;
    }
    if args.api_key.is_some() {
        config.api_key = args.api_key;
    }
    if args.insecure || args.cacert.is_some() {
        config.tls = TlsMode::from_flags(args.insecure, args.cacert)?;
    }
    Ok(())
}

/// `NAME=VALUE`, or `NAME` to copy the value from this process
fn parse_env_vars(args: &[String]) -> Result<Vec<(String, String)>> {
    args.iter()
        .map(|arg| {
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name.to_string(), value.to_string()),
                None => {
                    let value = std::env::var(arg).map_err(|_| {
                        RsconnectError::Config(format!(
                            "environment variable {} is not set in this shell",
                            arg
                        ))
                    })?;
                    (arg.clone(), value)
                }
            };
            if name.is_empty() {
                return Err(RsconnectError::Config(format!(
                    "'{}' is not NAME=VALUE",
                    arg
                )));
            }
            Ok((name, value))
        })
        .collect()
}

fn spinner() -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap(),
    );
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}
