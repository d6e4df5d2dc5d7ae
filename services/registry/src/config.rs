use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use imgreg_pool::{PoolConfig, SaveFailurePolicy};

/// Registry configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    /// JSON log destination; stdout when unset.
    pub log_file: Option<PathBuf>,
    /// Directory for image content and checksum files.
    pub image_dir: PathBuf,
    /// Manifest collection file.
    pub manifests_file: PathBuf,
    pub save_failure: SaveFailurePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("IMGREG_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .context("IMGREG_LISTEN_ADDR must be a socket address (host:port).")?;

        let log_level = std::env::var("IMGREG_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_file = std::env::var("IMGREG_LOG_FILE")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let data_dir = std::env::var("IMGREG_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/lib/imgreg"));

        let image_dir = std::env::var("IMGREG_IMAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("images"));

        let manifests_file = std::env::var("IMGREG_MANIFESTS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("manifests.json"));

        let save_failure = std::env::var("IMGREG_SAVE_FAILURE")
            .ok()
            .map(|v| v.parse::<SaveFailurePolicy>())
            .transpose()
            .map_err(|e| anyhow!(e))
            .context("IMGREG_SAVE_FAILURE must be 'retain' or 'rollback'.")?
            .unwrap_or_default();

        Ok(Self {
            listen_addr,
            log_level,
            log_file,
            image_dir,
            manifests_file,
            save_failure,
        })
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            image_dir: self.image_dir.clone(),
            manifests_path: self.manifests_file.clone(),
            on_save_failure: self.save_failure,
        }
    }
}
