use relay_primitives::{Address, ChainId, Hash32, commit, largest_power_of_two};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bridge::{BridgeLink, BridgeLinkRegistry, LinkKey};
use crate::error::{ProposalError, StoreError};
use crate::store::{HeaderStore, Store};

/// Header range `[start_block, end_block)` of `chain` to commit to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalRange {
    pub chain: ChainId,
    pub start_block: u64,
    pub end_block: u64,
}

/// A computed commitment, broadcast to peers for signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalMessage {
    pub chain: ChainId,
    pub start_block: u64,
    pub end_block: u64,
    pub merkle_root: Hash32,
    pub proposer_address: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotEligible {
    /// The bridge link has not been read yet.
    UnknownLink,
    NotProposer { proposer: Address },
    BelowThreshold { pending: u64, threshold: u64 },
    /// Nothing past `last_block + 1` to commit to.
    EmptySpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalDecision {
    NotEligible(NotEligible),
    Eligible(ProposalRange),
}

/// Decides when this node proposes and over which range.
///
/// Ranges start right after the counterpart's last relayed block and span a
/// power of two, so successive commitments have foldable sizes.
#[derive(Debug, Clone, Copy)]
pub struct ProposalGate {
    threshold: u64,
}

impl ProposalGate {
    pub fn new(threshold: u64) -> Self {
        ProposalGate { threshold }
    }

    pub fn decide(
        &self,
        chain: ChainId,
        link: Option<&BridgeLink>,
        local: &Address,
        highest_stored: u64,
    ) -> ProposalDecision {
        let Some(link) = link else {
            return ProposalDecision::NotEligible(NotEligible::UnknownLink);
        };
        if link.proposer != *local {
            return ProposalDecision::NotEligible(NotEligible::NotProposer {
                proposer: link.proposer,
            });
        }

        let pending = highest_stored.saturating_sub(link.last_block);
        if pending < self.threshold {
            return ProposalDecision::NotEligible(NotEligible::BelowThreshold {
                pending,
                threshold: self.threshold,
            });
        }

        let span = largest_power_of_two(pending.saturating_sub(1));
        if span == 0 {
            return ProposalDecision::NotEligible(NotEligible::EmptySpan);
        }
        let start_block = link.last_block + 1;
        ProposalDecision::Eligible(ProposalRange {
            chain,
            start_block,
            end_block: start_block + span,
        })
    }

    /// [`Self::decide`] against the current link snapshot and store height.
    pub async fn try_propose<S: Store>(
        &self,
        registry: &BridgeLinkRegistry,
        store: &HeaderStore<S>,
        key: LinkKey,
        local: &Address,
    ) -> Result<ProposalDecision, StoreError> {
        let link = registry.get(&key).await;
        let highest = store.highest_stored(&key.query).await?;
        Ok(self.decide(key.query, link.as_ref(), local, highest))
    }

    /// Runs the gate and, when eligible, loads the range and computes its root.
    ///
    /// `Ok(None)` means this node should not propose this cycle. A range that
    /// is no longer loadable surfaces as `StoreError::NotSynced`.
    pub async fn build_proposal<S: Store>(
        &self,
        registry: &BridgeLinkRegistry,
        store: &HeaderStore<S>,
        key: LinkKey,
        local: &Address,
    ) -> Result<Option<ProposalMessage>, ProposalError> {
        let range = match self.try_propose(registry, store, key, local).await? {
            ProposalDecision::Eligible(range) => range,
            ProposalDecision::NotEligible(reason) => {
                debug!(%key, ?reason, "not proposing");
                return Ok(None);
            }
        };

        let (headers, _) = store
            .load(&range.chain, range.start_block, range.end_block)
            .await?;
        let merkle_root = commit(&headers)?;
        info!(
            %key,
            start = range.start_block,
            end = range.end_block,
            root = %merkle_root,
            "proposal computed"
        );
        Ok(Some(ProposalMessage {
            chain: range.chain,
            start_block: range.start_block,
            end_block: range.end_block,
            merkle_root,
            proposer_address: *local,
        }))
    }
}
