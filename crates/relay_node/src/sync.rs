use relay_primitives::{ChainId, Header};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::net::ChainClient;
use crate::store::{BATCH_SIZE, HeaderStore, Store};

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub appended: usize,
    pub highest_stored: u64,
    /// Length of the tail cache after the pass.
    pub tail_len: usize,
}

/// Brings `chain`'s header log up to the client's current block.
///
/// Missing headers are fetched and appended one batch at a time, so an error
/// part way through keeps every batch appended before it. Errors are returned
/// to the caller, which retries on its next tick.
pub async fn sync_chain<S, C>(
    store: &HeaderStore<S>,
    chain: &ChainId,
    client: &C,
) -> Result<SyncReport, SyncError>
where
    S: Store,
    C: ChainClient + ?Sized,
{
    // A full tail means a batch was never flushed; refetch it rather than trust it.
    if store.clear_stale_tail(chain).await? {
        warn!("discarded a full but unflushed tail cache");
    }

    let current = client.current_block_number().await?;
    let mut next = store.highest_stored(chain).await?;
    let mut appended = 0;

    while next <= current {
        let to = current.min(next + BATCH_SIZE as u64 - 1);
        // Refetch the last stored header too, so the window is anchored to it.
        let from = next.saturating_sub(1);
        debug!(from, to, "fetching headers");
        let headers = client.get_headers(from, to).await?;
        if next > 0 {
            check_anchor(store, chain, next - 1, &headers).await?;
        }
        appended += store.append(chain, &headers).await?;

        let highest = store.highest_stored(chain).await?;
        if highest == next {
            warn!(block = next, "endpoint returned no new headers");
            break;
        }
        next = highest;
    }

    let report = SyncReport {
        appended,
        highest_stored: store.highest_stored(chain).await?,
        tail_len: store.tail_len(chain).await?,
    };
    if appended > 0 {
        info!(
            appended,
            highest = report.highest_stored,
            tail = report.tail_len,
            "✓ headers synced"
        );
    }
    Ok(report)
}

/// Fails with [`SyncError::Reorg`] if the first fetched header is not the one
/// stored at `anchor`. Flushed batches are never rewritten, so a reorganized
/// chain stops syncing here instead of being extended from a stale header.
async fn check_anchor<S: Store>(
    store: &HeaderStore<S>,
    chain: &ChainId,
    anchor: u64,
    fetched: &[Header],
) -> Result<(), SyncError> {
    let (stored, _) = store.load(chain, anchor, anchor + 1).await?;
    if let Some(first) = fetched.first()
        && Some(first) != stored.first()
    {
        return Err(SyncError::Reorg { block: anchor });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::net::rpc::RpcError;
    use async_trait::async_trait;
    use relay_primitives::{Address, Hash32};

    /// Store whose tail never flushes, to exercise the stale-tail guard.
    #[derive(Default)]
    struct UnflushedStore {
        tail: Vec<Header>,
    }

    impl Store for UnflushedStore {
        fn append(&mut self, headers: &[Header]) -> Result<usize, StoreError> {
            let before = self.tail.len();
            for h in headers {
                if h.number == self.tail.len() as u64 {
                    self.tail.push(*h);
                }
            }
            Ok(self.tail.len() - before)
        }

        fn load(&self, start: u64, end: u64) -> Result<Vec<Header>, StoreError> {
            Ok(self.tail[start as usize..end as usize].to_vec())
        }

        fn highest_stored(&self) -> u64 {
            self.tail.len() as u64
        }

        fn tail(&self) -> &[Header] {
            &self.tail
        }

        fn clear_tail(&mut self) -> Result<(), StoreError> {
            self.tail.clear();
            Ok(())
        }
    }

    struct FixedChain {
        tip: u64,
    }

    #[async_trait]
    impl ChainClient for FixedChain {
        async fn current_block_number(&self) -> Result<u64, RpcError> {
            Ok(self.tip)
        }

        async fn get_headers(&self, from: u64, to: u64) -> Result<Vec<Header>, RpcError> {
            Ok((from..=to)
                .map(|number| Header {
                    number,
                    timestamp: number,
                    prev_header_hash: Hash32::default(),
                    tx_root: Hash32::default(),
                    receipts_root: Hash32::default(),
                })
                .collect())
        }

        async fn get_last_relayed_block(&self, _bridge: &ChainId) -> Result<u64, RpcError> {
            Ok(0)
        }

        async fn get_proposer(&self, _bridge: &ChainId) -> Result<Address, RpcError> {
            Ok(Address::default())
        }
    }

    #[tokio::test]
    async fn full_tail_is_cleared_and_refetched() {
        let chain = ChainId(Address([1; 20]));
        let mut inner = UnflushedStore::default();
        inner.append(&FixedChain { tip: 0 }.get_headers(0, 99).await.unwrap()).unwrap();
        let store = HeaderStore::from_stores([(chain, inner)]);

        let report = sync_chain(&store, &chain, &FixedChain { tip: 119 }).await.unwrap();
        assert_eq!(report.appended, 120);
        assert_eq!(report.highest_stored, 120);
    }
}
