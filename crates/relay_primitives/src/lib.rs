//! Value types and commitment primitives shared by the bridge relay.
//!
//! This crate exposes:
//! - Fixed-size hex types: `Hash32`, `Address`, and `ChainId` (a bridge contract address)
//! - `Header` and its packed commitment record
//! - Merkle commitment over header ranges: `merkle::commit`, `largest_power_of_two`
//! - Keccak-256 helpers: `keccak256`, `function_selector`
pub mod header;
pub mod merkle;
pub mod types;

use sha3::{Digest, Keccak256};

pub use header::{COMMITMENT_RECORD_LEN, Header};
pub use merkle::{MerkleError, commit, largest_power_of_two};
pub use types::{Address, ChainId, Hash32, ParseHexError};

/// Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> Hash32 {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash32(out)
}

/// First four bytes of the Keccak-256 of a Solidity function signature,
/// e.g. `"transfer(address,uint256)"`.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash.0[0], hash.0[1], hash.0[2], hash.0[3]]
}
