use std::net::SocketAddr;

use relay_primitives::{ChainId, MerkleError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::net::rpc::RpcError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no header log is open for chain {0}")]
    UnknownChain(ChainId),
    #[error("headers up to {requested} requested but only {highest} are stored")]
    NotSynced { requested: u64, highest: u64 },
    #[error("invalid header range [{start}, {end})")]
    InvalidRange { start: u64, end: u64 },
    #[error("header {found} does not follow stored height {expected}")]
    NonContiguous { expected: u64, found: u64 },
    #[error("corrupt header log at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("chain query failed: {0}")]
    Client(#[from] RpcError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The endpoint's header at `block` differs from the stored one.
    #[error("stored header {block} is no longer on the endpoint's chain")]
    Reorg { block: u64 },
}

/// A bridge state read failed; the previous link snapshot is kept.
#[derive(Debug, Error)]
#[error("bridge state query against {bridge} failed: {source}")]
pub struct QueryError {
    pub bridge: ChainId,
    #[source]
    pub source: RpcError,
}

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed peer message: {0}")]
    Malformed(String),
    #[error("peer message exceeds {limit} bytes")]
    Oversized { limit: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} is not accepting requests")]
    Unavailable(&'static str),
    #[error("peer sent nothing for {0:?}")]
    Idle(std::time::Duration),
}

/// Startup failures. Everything past startup is logged and retried instead.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot open header store: {0}")]
    Store(#[from] StoreError),
    #[error("cannot create chain client: {0}")]
    Client(#[from] RpcError),
    #[error("cannot bind peer listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
