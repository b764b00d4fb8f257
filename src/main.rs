use anyhow::{Context, Result};
use clap::Parser;
use nodekeeper::state::{MessageObserver, StateObserver};
use nodekeeper::{
    ArtifactInstaller, ComponentId, HostProbe, ProcessServiceFactory, StateMap, Supervisor,
    SupervisorConfig, TomlSettingsStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "nodekeeper")]
#[command(about = "Supervisor for a local ledger node and its companion services")]
#[command(version)]
#[command(long_about = "Checks the host, installs the ledger node and its database, \
starts the node, peer discovery, the transaction stream and the chat services in order, \
and restarts them when they stop answering. Send SIGHUP to re-apply the saved node settings.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "nodekeeper.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting any service")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - build the supervisor but don't start anything
    #[arg(long, help = "Perform dry run - wire up the supervisor but don't start services")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR", help = "Directory for daily rolling log files")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting nodekeeper v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match SupervisorConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }
    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let supervisor = build_supervisor(config).map_err(|e| {
        error!("Failed to create supervisor: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - supervisor wired up but not started");
        println!("✓ Dry run completed successfully");
        return Ok(());
    }

    let reason = supervisor.run().await.map_err(|e| {
        error!("Supervisor error during execution: {}", e);
        e
    })?;

    let exit_code = reason.exit_code();
    info!("nodekeeper exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn build_supervisor(config: SupervisorConfig) -> Result<Supervisor> {
    let storage = config.storage_directory.clone();

    let settings = Arc::new(
        TomlSettingsStore::open(&storage)
            .with_context(|| format!("opening node settings in {:?}", storage))?,
    );
    let probe = Arc::new(HostProbe::new(config.probe.clone(), storage.clone()));
    let iri_installer = Arc::new(ArtifactInstaller::new(
        ComponentId::Iri,
        &config.installers.iri,
        &storage,
    ));
    let database_installer = Arc::new(ArtifactInstaller::new(
        ComponentId::Database,
        &config.installers.database,
        &storage,
    ));
    let factory = Arc::new(ProcessServiceFactory::new(config.clone()));

    let on_state_change: StateObserver = Arc::new(|state: &StateMap| {
        let summary = state
            .iter()
            .map(|(component, state)| format!("{}={:?}", component, state.status))
            .collect::<Vec<_>>()
            .join(" ");
        debug!("State: {}", summary);
    });
    let on_message: MessageObserver =
        Arc::new(|component: ComponentId, text: &str, _log: &[String]| {
            info!(component = %component, "{}", text);
        });

    let supervisor = Supervisor::builder(config)
        .settings_store(settings)
        .system_probe(probe)
        .iri_installer(iri_installer)
        .database_installer(database_installer)
        .service_factory(factory)
        .on_state_change(on_state_change)
        .on_message(on_message)
        .build()?;
    Ok(supervisor)
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
    };

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("nodekeeper={}", log_level)));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };
    layers.push(fmt_layer);

    let guard = match &args.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {:?}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, "nodekeeper.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# nodekeeper configuration file");
    println!("# Every option with its default value");
    println!();
    let rendered = toml::to_string_pretty(&SupervisorConfig::default())
        .context("rendering default configuration")?;
    println!("{}", rendered);
    Ok(())
}
