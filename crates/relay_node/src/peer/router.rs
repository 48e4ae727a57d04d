use std::sync::Arc;

use tracing::{debug, info, warn};

use super::message::{PeerList, PeerMessage};
use super::services::{PeerDirectory, ProposalKey, SignatureStore, SigningService};
use crate::bridge::{BridgeLinkRegistry, LinkKey};
use crate::error::ProtocolError;

/// Dispatches decoded peer messages to their owners.
pub struct PeerMessageRouter {
    registry: Arc<BridgeLinkRegistry>,
    signer: Arc<dyn SigningService>,
    signatures: Arc<dyn SignatureStore>,
    directory: Arc<dyn PeerDirectory>,
}

impl PeerMessageRouter {
    pub fn new(
        registry: Arc<BridgeLinkRegistry>,
        signer: Arc<dyn SigningService>,
        signatures: Arc<dyn SignatureStore>,
        directory: Arc<dyn PeerDirectory>,
    ) -> Self {
        PeerMessageRouter {
            registry,
            signer,
            signatures,
            directory,
        }
    }

    /// Decodes and dispatches one raw message. Returns the reply to send back
    /// on the same connection, if any.
    pub async fn route(&self, raw: &[u8]) -> Result<Option<PeerMessage>, ProtocolError> {
        let message = PeerMessage::decode(raw)?;
        self.dispatch(message).await
    }

    pub async fn dispatch(&self, message: PeerMessage) -> Result<Option<PeerMessage>, ProtocolError> {
        match message {
            PeerMessage::SignatureRequest(proposal) => {
                debug!(
                    chain = %proposal.chain,
                    start = proposal.start_block,
                    end = proposal.end_block,
                    "signature requested"
                );
                self.signatures.expect(ProposalKey::from(&proposal)).await;
                self.signer.request_signature(proposal).await?;
                Ok(None)
            }
            PeerMessage::SignaturePass(pass) => {
                let (signer, root) = (pass.signer, pass.merkle_root);
                if self.signatures.record(pass).await {
                    debug!(%signer, %root, "signature received");
                } else {
                    debug!(%signer, %root, "dropping signature for an untracked proposal");
                }
                Ok(None)
            }
            PeerMessage::ProposerAnnouncement(announcement) => {
                let key = LinkKey::new(announcement.query_chain, announcement.bridged_chain);
                if self
                    .registry
                    .announce_proposer(key, announcement.proposer)
                    .await
                {
                    info!(%key, proposer = %announcement.proposer, "proposer announced");
                } else {
                    warn!(%key, "ignoring proposer announcement for unknown bridge link");
                }
                Ok(None)
            }
            PeerMessage::PeersRequest => Ok(Some(PeerMessage::Peers(PeerList {
                peers: self.directory.peers(),
            }))),
            PeerMessage::Peers(list) => {
                debug!(count = list.peers.len(), "peer list received");
                Ok(None)
            }
            PeerMessage::Unrecognized { tag, .. } => {
                debug!(%tag, "ping");
                Ok(None)
            }
        }
    }
}
