use anyhow::{Context, Result};
use beacon_identity::{load_or_generate_keypair, TrustedKeyRegistry};
use beacon_runner::{create_app, spawn_workers, AppState, RunnerConfig};
use beacon_runtime::{HttpInferenceClient, InMemoryStore};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Optional TOML configuration file. `BEACON_*` variables override it.
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let config = RunnerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));
    fmt::Subscriber::builder().with_env_filter(filter).init();

    info!("Starting Beacon runner...");
    if config.region_endpoints.is_empty() {
        warn!("No region endpoints configured; every unit will fail with unknown region");
    }

    let trust = match &config.trusted_keys_file {
        Some(path) => TrustedKeyRegistry::load(path).context("Failed to load trusted keys")?,
        None => TrustedKeyRegistry::empty(),
    };
    let signer = load_or_generate_keypair(config.runner_key_path.as_deref())
        .context("Failed to load or generate runner keypair")?;
    info!("Receipts signed by {}", signer.public_key_base64());

    let inference = HttpInferenceClient::new(
        config.region_endpoints.clone(),
        std::time::Duration::from_secs(config.unit_timeout_secs.max(1)),
    )
    .context("Failed to build inference client")?;

    let state = AppState::build(
        &config,
        Arc::new(InMemoryStore::new()),
        Arc::new(inference),
        Arc::new(trust),
        signer,
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = spawn_workers(
        config.job_workers,
        state.queue.clone(),
        state.worker.clone(),
        shutdown_rx.clone(),
    );
    tasks.extend(state.spawn_maintenance(&config, shutdown_rx.clone()));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Listening on {}", config.listen_addr);

    let queue = state.queue.clone();
    let app = create_app(state);
    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal (Ctrl+C)."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            error!("Background task ended abnormally: {}", e);
        }
    }
    queue.close().await;
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server exited with error: {}", e),
        Err(e) => error!("Server task failed: {}", e),
    }

    info!("Beacon runner stopped.");
    Ok(())
}
