//! Collaborators the router hands messages to. Signing and signature
//! aggregation live outside this crate; these are the seams they plug into.
use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use relay_primitives::{ChainId, Hash32};
use tokio::sync::{Mutex, mpsc};

use super::message::SignaturePass;
use crate::error::ProtocolError;
use crate::proposal::ProposalMessage;

#[async_trait]
pub trait SigningService: Send + Sync {
    async fn request_signature(&self, proposal: ProposalMessage) -> Result<(), ProtocolError>;
}

#[async_trait]
pub trait SignatureStore: Send + Sync {
    /// Starts accepting signatures over `key`.
    async fn expect(&self, key: ProposalKey);
    /// Keeps `pass` if its proposal is expected. Returns whether it was kept.
    async fn record(&self, pass: SignaturePass) -> bool;
}

pub trait PeerDirectory: Send + Sync {
    fn peers(&self) -> Vec<String>;
}

/// Queues signature requests for the wallet, which drains the receiver.
pub struct ChannelSigner {
    tx: mpsc::Sender<ProposalMessage>,
}

impl ChannelSigner {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProposalMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ChannelSigner { tx }, rx)
    }
}

#[async_trait]
impl SigningService for ChannelSigner {
    async fn request_signature(&self, proposal: ProposalMessage) -> Result<(), ProtocolError> {
        self.tx
            .send(proposal)
            .await
            .map_err(|_| ProtocolError::Unavailable("signing service"))
    }
}

/// Identifies the proposal a signature is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProposalKey {
    pub chain: ChainId,
    pub start_block: u64,
    pub end_block: u64,
    pub merkle_root: Hash32,
}

impl From<&SignaturePass> for ProposalKey {
    fn from(pass: &SignaturePass) -> Self {
        ProposalKey {
            chain: pass.chain,
            start_block: pass.start_block,
            end_block: pass.end_block,
            merkle_root: pass.merkle_root,
        }
    }
}

impl From<&ProposalMessage> for ProposalKey {
    fn from(p: &ProposalMessage) -> Self {
        ProposalKey {
            chain: p.chain,
            start_block: p.start_block,
            end_block: p.end_block,
            merkle_root: p.merkle_root,
        }
    }
}

/// Proposals a [`SignaturePool`] tracks at once by default.
pub const MAX_TRACKED_PROPOSALS: usize = 64;
/// Distinct signers kept per proposal by default.
pub const MAX_SIGNERS_PER_PROPOSAL: usize = 128;

/// In-memory collection of received signatures, one per signer per proposal.
///
/// Only proposals announced through [`SignatureStore::expect`] are tracked.
/// Once more than `max_proposals` are tracked the oldest is dropped with its
/// signatures.
pub struct SignaturePool {
    max_proposals: usize,
    max_signers: usize,
    inner: Mutex<PoolInner>,
}

#[derive(Default)]
struct PoolInner {
    /// Tracked proposals, oldest first.
    order: VecDeque<ProposalKey>,
    by_proposal: HashMap<ProposalKey, Vec<SignaturePass>>,
}

impl Default for SignaturePool {
    fn default() -> Self {
        Self::with_limits(MAX_TRACKED_PROPOSALS, MAX_SIGNERS_PER_PROPOSAL)
    }
}

impl SignaturePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_proposals: usize, max_signers: usize) -> Self {
        SignaturePool {
            max_proposals,
            max_signers,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    pub async fn signatures(&self, key: &ProposalKey) -> Vec<SignaturePass> {
        self.inner
            .lock()
            .await
            .by_proposal
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn tracked(&self) -> usize {
        self.inner.lock().await.order.len()
    }
}

#[async_trait]
impl SignatureStore for SignaturePool {
    async fn expect(&self, key: ProposalKey) {
        let mut pool = self.inner.lock().await;
        if pool.by_proposal.contains_key(&key) {
            return;
        }
        pool.by_proposal.insert(key, Vec::new());
        pool.order.push_back(key);
        while pool.order.len() > self.max_proposals {
            if let Some(oldest) = pool.order.pop_front() {
                pool.by_proposal.remove(&oldest);
            }
        }
    }

    async fn record(&self, pass: SignaturePass) -> bool {
        let mut pool = self.inner.lock().await;
        let Some(passes) = pool.by_proposal.get_mut(&ProposalKey::from(&pass)) else {
            return false;
        };
        if let Some(existing) = passes.iter_mut().find(|p| p.signer == pass.signer) {
            *existing = pass;
            return true;
        }
        if passes.len() >= self.max_signers {
            return false;
        }
        passes.push(pass);
        true
    }
}

/// The configured peer list.
#[derive(Debug, Clone, Default)]
pub struct StaticPeers(pub Vec<String>);

impl PeerDirectory for StaticPeers {
    fn peers(&self) -> Vec<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_primitives::Address;

    fn key(start_block: u64) -> ProposalKey {
        ProposalKey {
            chain: ChainId(Address([0xaa; 20])),
            start_block,
            end_block: start_block + 256,
            merkle_root: Hash32([start_block as u8; 32]),
        }
    }

    fn pass(key: &ProposalKey, signer: u8) -> SignaturePass {
        SignaturePass {
            chain: key.chain,
            start_block: key.start_block,
            end_block: key.end_block,
            merkle_root: key.merkle_root,
            signer: Address([signer; 20]),
            signature: format!("0x{signer:02x}"),
        }
    }

    #[tokio::test]
    async fn unexpected_proposals_are_not_pooled() {
        let pool = SignaturePool::new();
        for start in 0..1_000 {
            assert!(!pool.record(pass(&key(start), 1)).await);
        }
        assert_eq!(pool.tracked().await, 0);
        assert!(pool.signatures(&key(0)).await.is_empty());
    }

    #[tokio::test]
    async fn oldest_proposal_is_evicted_past_the_limit() {
        let pool = SignaturePool::with_limits(2, 8);
        for start in [1, 2, 3] {
            pool.expect(key(start)).await;
        }
        assert_eq!(pool.tracked().await, 2);
        assert!(!pool.record(pass(&key(1), 9)).await);
        assert!(pool.record(pass(&key(3), 9)).await);

        // Expecting a tracked proposal again keeps its signatures.
        pool.expect(key(3)).await;
        assert_eq!(pool.signatures(&key(3)).await.len(), 1);
    }

    #[tokio::test]
    async fn signers_per_proposal_are_capped() {
        let pool = SignaturePool::with_limits(4, 3);
        let k = key(7);
        pool.expect(k).await;
        for signer in 0..10 {
            pool.record(pass(&k, signer)).await;
        }
        assert_eq!(pool.signatures(&k).await.len(), 3);

        // A known signer may still replace its signature.
        let mut again = pass(&k, 0);
        again.signature = "0xff".to_string();
        assert!(pool.record(again).await);
        assert_eq!(pool.signatures(&k).await[0].signature, "0xff");
    }
}
