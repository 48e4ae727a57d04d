use std::collections::HashMap;
use std::fmt;

use relay_primitives::{Address, ChainId};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::QueryError;
use crate::net::ChainClient;

/// One direction of a bridge: headers of `query` are relayed into the bridge
/// contract `bridged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    pub query: ChainId,
    pub bridged: ChainId,
}

impl LinkKey {
    pub fn new(query: ChainId, bridged: ChainId) -> Self {
        LinkKey { query, bridged }
    }

    pub fn reversed(&self) -> Self {
        LinkKey {
            query: self.bridged,
            bridged: self.query,
        }
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.query, self.bridged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeLink {
    /// Last block of the query chain the counterpart bridge has accepted.
    pub last_block: u64,
    pub proposer: Address,
}

/// Snapshot of every known bridge direction.
///
/// Refreshes and proposer announcements both go through [`Self::apply`], so
/// readers always see a whole record from before or after an update.
#[derive(Default)]
pub struct BridgeLinkRegistry {
    links: RwLock<HashMap<LinkKey, BridgeLink>>,
}

impl BridgeLinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &LinkKey) -> Option<BridgeLink> {
        self.links.read().await.get(key).copied()
    }

    /// Reads the counterpart bridge's last relayed block and proposer through
    /// `client` (a client of the chain hosting `key.bridged`). The stored link
    /// changes only if both reads succeed.
    pub async fn refresh<C: ChainClient + ?Sized>(
        &self,
        key: LinkKey,
        client: &C,
    ) -> Result<BridgeLink, QueryError> {
        let query_err = |source| QueryError {
            bridge: key.bridged,
            source,
        };
        let last_block = client
            .get_last_relayed_block(&key.bridged)
            .await
            .map_err(query_err)?;
        let proposer = client.get_proposer(&key.bridged).await.map_err(query_err)?;

        let link = BridgeLink {
            last_block,
            proposer,
        };
        self.apply(key, |slot| *slot = Some(link)).await;
        debug!(%key, last_block, %proposer, "bridge link refreshed");
        Ok(link)
    }

    /// Records a proposer announced by a peer. Last writer wins, in receipt
    /// order. Returns `false` when the link has never been refreshed.
    pub async fn announce_proposer(&self, key: LinkKey, proposer: Address) -> bool {
        self.apply(key, |slot| match slot {
            Some(link) => {
                link.proposer = proposer;
                true
            }
            None => false,
        })
        .await
    }

    async fn apply<R>(&self, key: LinkKey, update: impl FnOnce(&mut Option<BridgeLink>) -> R) -> R {
        let mut links = self.links.write().await;
        let mut slot = links.get(&key).copied();
        let out = update(&mut slot);
        if let Some(link) = slot {
            links.insert(key, link);
        }
        out
    }
}
