//! imgreg registry
//!
//! Serves the image manifest collection and image files over HTTP.

use anyhow::Result;
use imgreg_pool::ImagePool;
use imgreg_registry::{api, config, logging, state::AppState};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing; the guard flushes the log file on exit
    let _log_guard = logging::init(&config)?;

    info!("Starting imgreg registry");
    info!(
        listen_addr = %config.listen_addr,
        log_file = ?config.log_file,
        image_dir = %config.image_dir.display(),
        manifests_file = %config.manifests_file.display(),
        save_failure = ?config.save_failure,
        "Configuration loaded"
    );

    // Load the manifest collection; a corrupt file is fatal.
    let images = match ImagePool::open(config.pool_config()) {
        Ok(images) => images,
        Err(e) => {
            error!(error = %e, "Failed to open image pool");
            return Err(e.into());
        }
    };

    let state = AppState::new(images);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await?;

    info!("Registry shutdown complete");
    Ok(())
}
