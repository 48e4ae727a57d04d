//! Chain access. [`ChainClient`] is the boundary every component talks to;
//! [`rpc::RpcClient`] implements it over Ethereum JSON-RPC.
use async_trait::async_trait;
use relay_primitives::{Address, ChainId, Header};

pub mod rpc;

use rpc::RpcError;

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Height of the latest block the endpoint knows about.
    async fn current_block_number(&self) -> Result<u64, RpcError>;

    /// Headers `from..=to`, ascending.
    async fn get_headers(&self, from: u64, to: u64) -> Result<Vec<Header>, RpcError>;

    /// Last block of the counterpart chain relayed into the bridge contract `bridge`.
    async fn get_last_relayed_block(&self, bridge: &ChainId) -> Result<u64, RpcError>;

    /// Relayer currently allowed to propose to the bridge contract `bridge`.
    async fn get_proposer(&self, bridge: &ChainId) -> Result<Address, RpcError>;
}
