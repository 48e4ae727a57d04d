//! Bridge relay node.
//!
//! Keeps a resumable header log per bridged chain, tracks each bridge
//! direction's last relayed block and proposer, and, when this node is the
//! proposer and enough headers have piled up, commits a Merkle root over the
//! next power-of-two range and sends it to peers for signing.
pub mod bridge;
pub mod config;
pub mod error;
pub mod net;
pub mod node;
pub mod peer;
pub mod proposal;
pub mod store;
pub mod sync;
