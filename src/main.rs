use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use r10k_deployer::actions::ActionRunner;
use r10k_deployer::config::Config;
use r10k_deployer::git::sweep_stale_workdirs;
use r10k_deployer::rundeck::RundeckClient;
use r10k_deployer::server::{AppState, build_router};
use r10k_deployer::spool::JobSpool;
use r10k_deployer::worker::QueueWorker;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "r10k_deployer=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    tracing::debug!(?config, "configuration loaded");

    match sweep_stale_workdirs(&config.actions.workdir_base, config.workdir_max_age) {
        Ok(removed) if !removed.is_empty() => {
            tracing::info!(count = removed.len(), "removed stale working copies");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "could not sweep stale working copies"),
    }

    let spool = Arc::new(JobSpool::open(&config.spool_dir, &config.queue_name)?);
    let deployer = RundeckClient::new(config.rundeck.clone())?;
    let runner = ActionRunner::new(config.actions.clone(), deployer);

    let shutdown = CancellationToken::new();
    let (tx, rx) = mpsc::channel(config.poll.channel_capacity);

    let worker = QueueWorker::new(spool.clone(), runner, config.poll.clone());
    let worker_handle = tokio::spawn(worker.run(rx, shutdown.clone()));

    let app = build_router(AppState::new(
        spool,
        config.puppetfile_url.clone(),
        config.gitlab_token.clone(),
        tx,
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, queue = %config.queue_name, "listening");

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                signal.cancel();
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
        }
    });

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    // Also reached when the server exits first.
    shutdown.cancel();
    worker_handle.await?;
    tracing::info!("stopped");
    Ok(())
}
