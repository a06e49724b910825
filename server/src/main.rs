use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use reportflow::logging::{self, LogFormat};
use reportflow::{load_config, Config, Services};
use reportflow_server::{build_router, AppState};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "reportflow-server", version, about = "Report generation service")]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(short, long, env = "REPORTFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the status store path from the configuration.
    #[arg(long, env = "REPORTFLOW_DATABASE")]
    database: Option<PathBuf>,

    /// Overrides the HTTP bind address from the configuration.
    #[arg(long, env = "REPORTFLOW_BIND")]
    bind: Option<String>,

    #[arg(long, env = "REPORTFLOW_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format)?;

    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(database) = cli.database {
        config.database_path = Some(database.to_string_lossy().into_owned());
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    info!("Starting reportflow v{}", env!("CARGO_PKG_VERSION"));
    let services = Services::open(config)?;
    info!(path = %services.config.database_path().display(), "Status store opened");

    let recovered = services.admission.recover_queued().await?;
    if recovered > 0 {
        info!(recovered, "Re-enqueued jobs left queued by a previous run");
    }

    let pool = services.start_workers()?;

    let addr: SocketAddr = services
        .config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", services.config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Listening");

    let app = build_router(AppState::new(services));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping workers");
    pool.shutdown();
    pool.wait().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
