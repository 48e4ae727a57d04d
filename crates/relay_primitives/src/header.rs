use serde::{Deserialize, Serialize};

use crate::keccak256;
use crate::types::Hash32;

/// Size of the packed commitment record: two big-endian `u64`s and three hashes.
pub const COMMITMENT_RECORD_LEN: usize = 8 + 8 + 32 * 3;

/// Minimal block metadata relayed across the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub number: u64,
    pub timestamp: u64,
    pub prev_header_hash: Hash32,
    pub tx_root: Hash32,
    pub receipts_root: Hash32,
}

impl Header {
    /// Packs the five header fields, in declaration order, into the fixed-size
    /// record that forms a Merkle leaf.
    pub fn commitment_record(&self) -> [u8; COMMITMENT_RECORD_LEN] {
        let mut out = [0u8; COMMITMENT_RECORD_LEN];
        out[0..8].copy_from_slice(&self.number.to_be_bytes());
        out[8..16].copy_from_slice(&self.timestamp.to_be_bytes());
        out[16..48].copy_from_slice(&self.prev_header_hash.0);
        out[48..80].copy_from_slice(&self.tx_root.0);
        out[80..112].copy_from_slice(&self.receipts_root.0);
        out
    }

    /// Keccak-256 of [`Header::commitment_record`].
    pub fn commitment_hash(&self) -> Hash32 {
        keccak256(&self.commitment_record())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_record_layout() {
        let header = Header {
            number: 0x0102,
            timestamp: 7,
            prev_header_hash: Hash32([0x11; 32]),
            tx_root: Hash32([0x22; 32]),
            receipts_root: Hash32([0x33; 32]),
        };
        let rec = header.commitment_record();
        assert_eq!(&rec[6..8], &[0x01, 0x02]);
        assert_eq!(rec[15], 7);
        assert!(rec[16..48].iter().all(|b| *b == 0x11));
        assert!(rec[48..80].iter().all(|b| *b == 0x22));
        assert!(rec[80..].iter().all(|b| *b == 0x33));
    }

    #[test]
    fn serde_uses_camel_case_hex_fields() {
        let header = Header {
            number: 1,
            timestamp: 2,
            prev_header_hash: Hash32::default(),
            tx_root: Hash32::default(),
            receipts_root: Hash32::default(),
        };
        let json = serde_json::to_value(header).unwrap();
        assert_eq!(json["prevHeaderHash"], format!("0x{}", "00".repeat(32)));
        assert!(json.get("receiptsRoot").is_some());
    }
}
