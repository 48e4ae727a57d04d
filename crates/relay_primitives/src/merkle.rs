use core::fmt;

use crate::header::Header;
use crate::keccak256;
use crate::types::Hash32;

/// Errors returned by [`commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    /// A commitment over zero headers is undefined.
    EmptyRange,
}

impl fmt::Display for MerkleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MerkleError::EmptyRange => f.write_str("cannot commit to an empty header range"),
        }
    }
}

impl std::error::Error for MerkleError {}

/// Hashes two sibling nodes into their parent.
pub fn hash_pair(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(&left.0);
    buf[32..].copy_from_slice(&right.0);
    keccak256(&buf)
}

/// Computes the Merkle root over an ordered header sequence.
///
/// Leaves are [`Header::commitment_hash`]. Each level is folded pairwise; a
/// level with an odd number of nodes pairs its last node with itself. A single
/// header is its own root.
pub fn commit(headers: &[Header]) -> Result<Hash32, MerkleError> {
    if headers.is_empty() {
        return Err(MerkleError::EmptyRange);
    }

    let mut level: Vec<Hash32> = headers.iter().map(Header::commitment_hash).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    Ok(level[0])
}

/// Largest power of two that is `<= n`, or 0 when `n == 0`.
pub fn largest_power_of_two(n: u64) -> u64 {
    if n == 0 {
        0
    } else {
        1u64 << (63 - n.leading_zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64) -> Header {
        Header {
            number,
            timestamp: 1_600_000_000 + number * 13,
            prev_header_hash: Hash32([number as u8; 32]),
            tx_root: Hash32([0xaa; 32]),
            receipts_root: Hash32([0xbb; 32]),
        }
    }

    #[test]
    fn empty_range_is_rejected() {
        assert_eq!(commit(&[]), Err(MerkleError::EmptyRange));
    }

    #[test]
    fn single_header_root_is_leaf() {
        let h = header(5);
        assert_eq!(commit(&[h]).unwrap(), h.commitment_hash());
    }

    #[test]
    fn odd_level_duplicates_last_node() {
        let hs = [header(1), header(2), header(3)];
        let leaves: Vec<Hash32> = hs.iter().map(Header::commitment_hash).collect();
        let expected = hash_pair(
            &hash_pair(&leaves[0], &leaves[1]),
            &hash_pair(&leaves[2], &leaves[2]),
        );
        assert_eq!(commit(&hs).unwrap(), expected);
    }

    #[test]
    fn power_of_two_rounding() {
        assert_eq!(largest_power_of_two(0), 0);
        assert_eq!(largest_power_of_two(1), 1);
        assert_eq!(largest_power_of_two(2), 2);
        assert_eq!(largest_power_of_two(3), 2);
        assert_eq!(largest_power_of_two(511), 256);
        assert_eq!(largest_power_of_two(512), 512);
        assert_eq!(largest_power_of_two(u64::MAX), 1 << 63);
    }
}
