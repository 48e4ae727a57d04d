//! Node configuration, read from a JSON file with camelCase keys.
//!
//! ```json
//! {
//!   "port": 7001,
//!   "peers": ["10.0.0.2:7001"],
//!   "clients": ["http://127.0.0.1:8545", "http://127.0.0.1:9545"],
//!   "index": "0x<bridge on chain A>_0x<bridge on chain B>",
//!   "address": "0x<this relayer's wallet address>",
//!   "datadir": "./data",
//!   "proposeThreshold": 512,
//!   "queryDelay": 10000
//! }
//! ```
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_primitives::{Address, ChainId};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 7001;
pub const DEFAULT_PROPOSE_THRESHOLD: u64 = 512;
pub const DEFAULT_QUERY_DELAY_MS: u64 = 10_000;
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub peers: Vec<String>,
    /// RPC endpoints, in the same order as the chains in `index`.
    pub clients: Vec<String>,
    /// `"<addrA>_<addrB>"`.
    pub index: String,
    /// Wallet address this node proposes and signs as.
    pub address: Address,
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,
    #[serde(default = "default_propose_threshold")]
    pub propose_threshold: u64,
    /// Milliseconds between sync cycles.
    #[serde(default = "default_query_delay")]
    pub query_delay: u64,
    /// Milliseconds before an RPC request is abandoned.
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_datadir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_propose_threshold() -> u64 {
    DEFAULT_PROPOSE_THRESHOLD
}

fn default_query_delay() -> u64 {
    DEFAULT_QUERY_DELAY_MS
}

fn default_rpc_timeout() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (a, b) = self.chains()?;
        if a == b {
            return Err(ConfigError::Invalid(format!(
                "index names the same chain twice: {a}"
            )));
        }
        if self.clients.len() != 2 {
            return Err(ConfigError::Invalid(format!(
                "expected 2 clients, found {}",
                self.clients.len()
            )));
        }
        if self.propose_threshold < 2 {
            return Err(ConfigError::Invalid(
                "proposeThreshold must be at least 2".to_string(),
            ));
        }
        if self.query_delay == 0 {
            return Err(ConfigError::Invalid("queryDelay must be positive".to_string()));
        }
        Ok(())
    }

    /// The two bridge contracts named by `index`, in order.
    pub fn chains(&self) -> Result<(ChainId, ChainId), ConfigError> {
        let (a, b) = self.index.split_once('_').ok_or_else(|| {
            ConfigError::Invalid(format!("index {:?} is not <addrA>_<addrB>", self.index))
        })?;
        let parse = |s: &str| {
            s.parse::<ChainId>()
                .map_err(|e| ConfigError::Invalid(format!("index address {s:?}: {e}")))
        };
        Ok((parse(a)?, parse(b)?))
    }

    pub fn query_delay(&self) -> Duration {
        Duration::from_millis(self.query_delay)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout)
    }
}
