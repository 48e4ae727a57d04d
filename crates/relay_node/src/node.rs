//! Wires the components together and schedules them: one timer-driven task
//! per chain, plus the peer listener.
use std::sync::Arc;
use std::time::Duration;

use relay_primitives::Address;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::bridge::{BridgeLinkRegistry, LinkKey};
use crate::config::Config;
use crate::error::{NodeError, ProposalError, StoreError};
use crate::net::ChainClient;
use crate::net::rpc::RpcClient;
use crate::peer::server::{self, ServerLimits};
use crate::peer::{
    ChannelSigner, PeerDirectory, PeerMessage, PeerMessageRouter, ProposalKey, SignaturePool,
    SignatureStore, StaticPeers,
};
use crate::proposal::{ProposalGate, ProposalMessage};
use crate::store::{FileStore, HeaderStore, Store};
use crate::sync::sync_chain;

/// Pending signature requests the wallet has not picked up yet.
const SIGNER_QUEUE: usize = 64;

/// Drives one direction of the bridge: syncs `key.query`'s headers, refreshes
/// the counterpart bridge's view of them, and proposes when eligible.
pub struct ChainWorker<S = FileStore> {
    pub key: LinkKey,
    pub query_client: Arc<dyn ChainClient>,
    /// Client of the chain hosting the `key.bridged` contract.
    pub bridged_client: Arc<dyn ChainClient>,
    pub store: Arc<HeaderStore<S>>,
    pub registry: Arc<BridgeLinkRegistry>,
    pub gate: ProposalGate,
    pub local: Address,
}

impl<S: Store> ChainWorker<S> {
    /// One sync → refresh → propose pass. Failures are logged and the pass
    /// carries on with whatever state is available.
    pub async fn cycle(&self) -> Option<ProposalMessage> {
        match sync_chain(&self.store, &self.key.query, self.query_client.as_ref()).await {
            Ok(report) => debug!(highest = report.highest_stored, tail = report.tail_len, "sync pass done"),
            Err(e) => warn!("header sync failed: {e}"),
        }

        if let Err(e) = self
            .registry
            .refresh(self.key, self.bridged_client.as_ref())
            .await
        {
            warn!("{e}");
        }

        match self
            .gate
            .build_proposal(&self.registry, &self.store, self.key, &self.local)
            .await
        {
            Ok(proposal) => proposal,
            Err(ProposalError::Store(e @ StoreError::NotSynced { .. })) => {
                warn!("proposal abandoned until headers catch up: {e}");
                None
            }
            Err(e) => {
                warn!("proposal failed: {e}");
                None
            }
        }
    }

    /// Runs [`Self::cycle`] immediately and then every `period`, broadcasting
    /// each new proposal to `peers` until at least one of them receives it.
    /// Signatures for the proposal are accepted into `signatures` from then on.
    pub async fn run(
        self,
        period: Duration,
        peers: Arc<dyn PeerDirectory>,
        signatures: Arc<dyn SignatureStore>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_sent: Option<ProposalMessage> = None;

        loop {
            ticker.tick().await;
            let Some(proposal) = self.cycle().await else {
                continue;
            };
            if last_sent == Some(proposal) {
                debug!("proposal unchanged since last broadcast");
                continue;
            }
            signatures.expect(ProposalKey::from(&proposal)).await;

            let peers = peers.peers();
            let message = PeerMessage::SignatureRequest(proposal);
            match server::broadcast(&peers, &message).await {
                Ok(0) if !peers.is_empty() => {
                    warn!(peers = peers.len(), "proposal reached no peer, retrying next tick");
                }
                Ok(delivered) => {
                    info!(delivered, "proposal broadcast");
                    last_sent = Some(proposal);
                }
                Err(e) => warn!("cannot encode proposal: {e}"),
            }
        }
    }
}

pub struct RelayNode {
    port: u16,
    query_delay: Duration,
    router: Arc<PeerMessageRouter>,
    directory: Arc<dyn PeerDirectory>,
    signatures: Arc<SignaturePool>,
    workers: Vec<ChainWorker>,
}

impl RelayNode {
    /// Opens the header logs and builds the chain clients. The returned
    /// receiver yields the signature requests meant for the wallet.
    pub fn new(config: &Config) -> Result<(Self, mpsc::Receiver<ProposalMessage>), NodeError> {
        let (chain_a, chain_b) = config.chains()?;
        let store = Arc::new(HeaderStore::open(&config.datadir, &[chain_a, chain_b])?);
        let registry = Arc::new(BridgeLinkRegistry::new());

        let client_a: Arc<dyn ChainClient> =
            Arc::new(RpcClient::new(&config.clients[0], config.rpc_timeout())?);
        let client_b: Arc<dyn ChainClient> =
            Arc::new(RpcClient::new(&config.clients[1], config.rpc_timeout())?);

        let gate = ProposalGate::new(config.propose_threshold);
        let worker = |key: LinkKey, query_client: &Arc<dyn ChainClient>, bridged_client: &Arc<dyn ChainClient>| {
            ChainWorker {
                key,
                query_client: query_client.clone(),
                bridged_client: bridged_client.clone(),
                store: store.clone(),
                registry: registry.clone(),
                gate,
                local: config.address,
            }
        };
        let forward = LinkKey::new(chain_a, chain_b);
        let workers = vec![
            worker(forward, &client_a, &client_b),
            worker(forward.reversed(), &client_b, &client_a),
        ];

        let (signer, requests) = ChannelSigner::new(SIGNER_QUEUE);
        let signatures = Arc::new(SignaturePool::new());
        let directory: Arc<dyn PeerDirectory> = Arc::new(StaticPeers(config.peers.clone()));
        let router = Arc::new(PeerMessageRouter::new(
            registry.clone(),
            Arc::new(signer),
            signatures.clone(),
            directory.clone(),
        ));

        Ok((
            RelayNode {
                port: config.port,
                query_delay: config.query_delay(),
                router,
                directory,
                signatures,
                workers,
            },
            requests,
        ))
    }

    pub fn signatures(&self) -> Arc<SignaturePool> {
        self.signatures.clone()
    }

    /// Binds the peer port, starts the per-chain tasks and serves peers.
    /// Only returns if the port cannot be bound.
    pub async fn run(self) -> Result<(), NodeError> {
        let listener = server::bind(self.port).await?;

        for worker in self.workers {
            let span = info_span!("chain", chain = %worker.key.query);
            tokio::spawn(
                worker
                    .run(
                        self.query_delay,
                        self.directory.clone(),
                        self.signatures.clone(),
                    )
                    .instrument(span),
            );
        }

        server::serve(listener, self.router, ServerLimits::default()).await;
        Ok(())
    }
}
