//! Peer control protocol: one JSON object per `\n`-terminated line, tagged by
//! its `type` field (`SIGREQ`, `SIGPASS`, `PROP`, `PEERSREQ`; anything else is
//! a heartbeat).
pub mod message;
pub mod router;
pub mod server;
pub mod services;

pub use message::{PeerList, PeerMessage, ProposerAnnouncement, SignaturePass};
pub use router::PeerMessageRouter;
pub use services::{
    ChannelSigner, PeerDirectory, ProposalKey, SignaturePool, SignatureStore, SigningService,
    StaticPeers,
};
