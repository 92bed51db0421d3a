//! Daemon entry point.
//!
//! Loads the configuration, brings up the champion registry (embedded data
//! first, CDN refresh best-effort in the background), and runs the
//! supervisor until a termination signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use draftwatch::{
    AgentConfig, ChampionRegistry, Supervisor, SystemOpener, DEFAULT_CDN,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("draftwatch=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("draftwatch.json"));
    let config = AgentConfig::load_or_default(&config_path);
    info!(path = %config_path.display(), "configuration loaded");

    let registry = Arc::new(ChampionRegistry::embedded()?);

    // Refresh champion data in the background; the embedded file remains
    // authoritative if the CDN is unreachable.
    {
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = registry.refresh(DEFAULT_CDN).await {
                warn!(error = %e, "champion data refresh failed, using embedded data");
            }
        });
    }

    let (supervisor, _config_handle) =
        Supervisor::new(registry, Arc::new(SystemOpener), config);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("termination signal received");
            let _ = shutdown_tx.send(());
        }
    });

    supervisor.run(shutdown_rx).await?;
    info!("daemon stopped");
    Ok(())
}
