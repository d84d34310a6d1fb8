use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Bytes per chunk when streaming file content to a response.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    /// Root path of the backing store, reported by `GET /`.
    pub storage_root: PathBuf,
    /// Directories from which `location`-referenced uploads may be read.
    /// Empty means any reachable path is allowed.
    pub upload_allow_dirs: Vec<PathBuf>,
    /// Streaming chunk size in bytes.
    pub chunk_size: usize,
    /// Maximum accepted request body size in bytes.
    pub max_upload_bytes: usize,
    /// Worker threads for the runtime; `None` leaves the default.
    pub worker_threads: Option<usize>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8472".parse().unwrap(),
            storage_root: PathBuf::from("."),
            upload_allow_dirs: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_bytes: 256 * 1024 * 1024,
            worker_threads: None,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Parse configuration from TOML text. Missing fields take defaults.
    pub fn from_toml_str(text: &str) -> GatewayResult<Self> {
        toml::from_str(text).map_err(|e| GatewayError::Config(e.to_string()))
    }
}
