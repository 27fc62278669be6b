//! devserve
//!
//! ```text
//!   browser ──▶ listener ──▶ RouteTable ──┬─▶ /_/api/changes  (long-poll)
//!                                         ├─▶ /_/api/*        (project API)
//!                                         ├─▶ /_/*            (dashboard)
//!                                         └─▶ active project  (static files | proxy)
//!
//!   DirectoryWatcher ──▶ dispatcher ──▶ ChangeBroadcaster ──▶ parked long-polls
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use devserve::config::{load_or_default, validate_config};
use devserve::lifecycle::{initialize, shutdown_signal, Shutdown};
use devserve::observability::init_logging;
use devserve::project::{JsonFileStore, ProjectDescriptor, ProjectStore};
use devserve::HttpServer;

#[derive(Parser)]
#[command(name = "devserve", version)]
#[command(about = "Serve a project with live reload, or proxy to its dev server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides listener.bind_address)
    #[arg(short, long)]
    bind: Option<String>,

    /// Project list location (overrides store.path)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Reload the dashboard itself when its resources change
    #[arg(long)]
    dev: bool,

    /// Project directory to activate on startup
    project: Option<PathBuf>,

    /// Upstream dev server for the project, e.g. localhost:4000
    #[arg(long, requires = "project")]
    proxy: Option<String>,

    /// Glob relative to the project that never triggers a reload (repeatable)
    #[arg(long = "mute", requires = "project")]
    mute: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_or_default(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(store) = cli.store {
        config.store.path = Some(store);
    }
    config.dashboard.dev_mode |= cli.dev;
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("invalid configuration: {error}");
        }
        return Err("configuration rejected".into());
    }

    init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "devserve starting");

    let store_path = config.store.resolved_path();
    tracing::info!(
        bind_address = %config.listener.bind_address,
        store = %store_path.display(),
        dashboard = %config.dashboard.resource_dir.display(),
        dev_mode = config.dashboard.dev_mode,
        "Configuration loaded"
    );
    let store: Arc<dyn ProjectStore> = Arc::new(JsonFileStore::new(store_path));

    let bind_address = config.listener.bind_address.clone();
    let services = initialize(config, store).await?;

    if let Some(path) = cli.project {
        let mut descriptor = ProjectDescriptor::new(path);
        if let Some(host) = cli.proxy {
            descriptor = descriptor.with_target_host(host);
        }
        if !cli.mute.is_empty() {
            descriptor = descriptor.with_mute_list(cli.mute);
        }
        match services.switcher.activate(descriptor).await {
            Ok(project) => tracing::info!(path = %project.path.display(), "Serving project"),
            Err(e) => tracing::error!(error = %e, "Could not activate project"),
        }
    }

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let server = HttpServer::new(services);
    let receiver = shutdown.subscribe();

    let trigger = Arc::clone(&shutdown);
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
