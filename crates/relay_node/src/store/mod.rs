//! Per-chain header persistence.
//!
//! Each chain gets an append-only log of headers batched into lines of
//! [`BATCH_SIZE`] records (see [`file`] for the on-disk format). Only the
//! trailing, incomplete line is ever rewritten; its records are mirrored in
//! memory as the tail cache so appends never rescan the log.
//!
//! [`HeaderStore`] holds one log per chain behind its own mutex: appends for a
//! chain are serialized and reads never observe a half-written flush.
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use relay_primitives::{ChainId, Header};
use tokio::sync::Mutex;

use crate::error::StoreError;

pub mod file;

pub use file::FileStore;

/// Records per persisted line.
pub const BATCH_SIZE: usize = 100;

/// A single chain's header log. Block numbers start at 0, so the header at
/// position `i` has number `i` and [`Store::highest_stored`] is the count.
pub trait Store: Send {
    /// Stores the headers that extend the log, skipping ones already stored.
    /// Returns how many were newly stored.
    fn append(&mut self, headers: &[Header]) -> Result<usize, StoreError>;
    /// Headers `[start, end)`, ascending.
    fn load(&self, start: u64, end: u64) -> Result<Vec<Header>, StoreError>;
    fn highest_stored(&self) -> u64;
    /// Records not yet part of a flushed batch.
    fn tail(&self) -> &[Header];
    /// Drops the tail cache and its on-disk line.
    fn clear_tail(&mut self) -> Result<(), StoreError>;
}

pub struct HeaderStore<S = FileStore> {
    chains: HashMap<ChainId, Arc<Mutex<S>>>,
}

impl HeaderStore<FileStore> {
    /// Opens (or creates) `<datadir>/<chain>/headers.log` for every chain.
    pub fn open<P: AsRef<Path>>(datadir: P, chains: &[ChainId]) -> Result<Self, StoreError> {
        let stores = chains
            .iter()
            .map(|chain| {
                let path = datadir
                    .as_ref()
                    .join(chain.to_string())
                    .join("headers.log");
                FileStore::open(path).map(|store| (*chain, store))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_stores(stores))
    }
}

impl<S: Store> HeaderStore<S> {
    pub fn from_stores(stores: impl IntoIterator<Item = (ChainId, S)>) -> Self {
        HeaderStore {
            chains: stores
                .into_iter()
                .map(|(chain, store)| (chain, Arc::new(Mutex::new(store))))
                .collect(),
        }
    }

    fn chain(&self, chain: &ChainId) -> Result<&Arc<Mutex<S>>, StoreError> {
        self.chains
            .get(chain)
            .ok_or(StoreError::UnknownChain(*chain))
    }

    pub async fn append(&self, chain: &ChainId, headers: &[Header]) -> Result<usize, StoreError> {
        self.chain(chain)?.lock().await.append(headers)
    }

    /// Headers `[start, end)` together with the chain's `highest_stored`, read
    /// under the chain lock.
    pub async fn load(
        &self,
        chain: &ChainId,
        start: u64,
        end: u64,
    ) -> Result<(Vec<Header>, u64), StoreError> {
        let store = self.chain(chain)?.lock().await;
        let headers = store.load(start, end)?;
        Ok((headers, store.highest_stored()))
    }

    pub async fn highest_stored(&self, chain: &ChainId) -> Result<u64, StoreError> {
        Ok(self.chain(chain)?.lock().await.highest_stored())
    }

    pub async fn tail_len(&self, chain: &ChainId) -> Result<usize, StoreError> {
        Ok(self.chain(chain)?.lock().await.tail().len())
    }

    /// Clears a tail cache that has reached a full batch without being
    /// flushed. Returns whether anything was dropped.
    pub async fn clear_stale_tail(&self, chain: &ChainId) -> Result<bool, StoreError> {
        let mut store = self.chain(chain)?.lock().await;
        if store.tail().len() < BATCH_SIZE {
            return Ok(false);
        }
        store.clear_tail()?;
        Ok(true)
    }
}
