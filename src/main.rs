// TunnelWatch - main.rs
//
// Service entry point. Handles:
// 1. CLI argument parsing
// 2. Configuration (config.toml, environment, CLI flags)
// 3. Logging initialisation (debug mode support)
// 4. Wiring store, container source, stream hub and HTTP server

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tunnelwatch::app::store::{EventStore, StoreConfig};
use tunnelwatch::app::stream::StreamHub;
use tunnelwatch::platform::config::{self, AppConfig, PlatformPaths};
use tunnelwatch::platform::docker::{DockerLogSource, SourceConfig};
use tunnelwatch::util::{self, constants, error::TunnelWatchError};
use tunnelwatch::web::{Server, WebState};

/// TunnelWatch - live monitor for a tunnel daemon's container logs.
///
/// Follows the tunnel container's output, classifies each line into request,
/// connection or log events, keeps a bounded history on disk and serves it
/// over HTTP with a server-sent-events live feed.
#[derive(Parser, Debug)]
#[command(name = "TunnelWatch", version, about)]
struct Cli {
    /// Listen address (host:port).
    #[arg(short = 'b', long = "bind")]
    bind: Option<String>,

    /// JSON-lines file holding the retained event history.
    #[arg(short = 'e', long = "events-file")]
    events_file: Option<PathBuf>,

    /// Maximum number of retained events.
    #[arg(short = 'n', long = "max-entries")]
    max_entries: Option<usize>,

    /// Container to follow, skipping label discovery.
    #[arg(short = 'c', long = "container")]
    container: Option<String>,

    /// Directory containing config.toml.
    #[arg(long = "config-dir")]
    config_dir: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Resolve platform paths and configuration before logging so the
    // configured level and file take effect.
    let platform_paths = PlatformPaths::resolve();
    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(|| platform_paths.config_dir.clone());
    let (mut app_config, mut warnings) = config::load_config(&config_dir);
    warnings.extend(config::apply_env_overrides(&mut app_config));

    util::logging::init(
        cli.debug,
        app_config.log_level.as_deref(),
        app_config.log_file.as_deref(),
    );

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        config_dir = %config_dir.display(),
        "TunnelWatch starting"
    );
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    if let Err(e) = run(cli, app_config, &platform_paths).await {
        tracing::error!(error = %e, "TunnelWatch stopped");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Apply CLI overrides, build the pipeline and serve until the listener fails.
async fn run(
    cli: Cli,
    mut app_config: AppConfig,
    paths: &PlatformPaths,
) -> util::error::Result<()> {
    if let Some(n) = cli.max_entries {
        app_config.max_entries = config::check_range(
            "--max-entries",
            n,
            constants::MIN_MAX_ENTRIES,
            constants::ABSOLUTE_MAX_ENTRIES,
        )?;
    }
    if let Some(file) = cli.events_file {
        app_config.events_file = Some(file);
    }
    if let Some(container) = cli.container {
        app_config.container = Some(container);
    }
    if let Some(bind) = cli.bind {
        app_config.bind_addr = bind;
    }

    let store = Arc::new(EventStore::open(StoreConfig {
        max_entries: app_config.max_entries,
        path: app_config.events_path(&paths.data_dir),
        trim_interval: app_config.trim_interval,
    }));

    let source = DockerLogSource::new(SourceConfig {
        container: app_config.container.clone(),
        label: app_config.container_label.clone(),
        fallback: app_config.fallback_container.clone(),
    });
    let hub = StreamHub::new(Arc::new(source), store.clone(), app_config.subscriber_buffer);

    let server = Server::bind(
        &app_config.bind_addr,
        WebState {
            store,
            hub,
            keepalive: Duration::from_secs(app_config.keepalive_secs),
        },
    )
    .await?;
    server.serve().await.map_err(TunnelWatchError::from)
}
