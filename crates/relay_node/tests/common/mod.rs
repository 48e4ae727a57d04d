#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use relay_node::net::ChainClient;
use relay_node::net::rpc::RpcError;
use relay_primitives::{Address, ChainId, Hash32, Header, keccak256};

pub const CHAIN_A: ChainId = ChainId(Address([0xaa; 20]));
pub const CHAIN_B: ChainId = ChainId(Address([0xbb; 20]));
pub const LOCAL: Address = Address([0x11; 20]);
pub const OTHER: Address = Address([0x22; 20]);

pub fn header(number: u64) -> Header {
    Header {
        number,
        timestamp: 1_700_000_000 + number * 12,
        prev_header_hash: keccak256(&number.wrapping_sub(1).to_be_bytes()),
        tx_root: Hash32([(number % 256) as u8; 32]),
        receipts_root: keccak256(&number.to_le_bytes()),
    }
}

pub fn headers(range: std::ops::Range<u64>) -> Vec<Header> {
    range.map(header).collect()
}

/// In-memory chain endpoint with switchable failures.
pub struct MockChain {
    pub tip: Mutex<u64>,
    pub last_relayed: Mutex<u64>,
    pub proposer: Mutex<Address>,
    pub fail_block_number: AtomicBool,
    pub fail_proposer: AtomicBool,
    /// Blocks from here on are served from a competing branch.
    pub fork_at: Mutex<Option<u64>>,
}

impl MockChain {
    pub fn new(tip: u64, last_relayed: u64, proposer: Address) -> Self {
        MockChain {
            tip: Mutex::new(tip),
            last_relayed: Mutex::new(last_relayed),
            proposer: Mutex::new(proposer),
            fail_block_number: AtomicBool::new(false),
            fail_proposer: AtomicBool::new(false),
            fork_at: Mutex::new(None),
        }
    }

    pub fn set_tip(&self, tip: u64) {
        *self.tip.lock().unwrap() = tip;
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn current_block_number(&self) -> Result<u64, RpcError> {
        if self.fail_block_number.load(Ordering::SeqCst) {
            return Err(RpcError::Client("connection refused".to_string()));
        }
        Ok(*self.tip.lock().unwrap())
    }

    async fn get_headers(&self, from: u64, to: u64) -> Result<Vec<Header>, RpcError> {
        let tip = *self.tip.lock().unwrap();
        if to > tip {
            return Err(RpcError::MissingBlock(to));
        }
        let fork_at = *self.fork_at.lock().unwrap();
        Ok((from..=to)
            .map(|n| match fork_at {
                Some(fork) if n >= fork => Header {
                    prev_header_hash: Hash32([0xf0; 32]),
                    ..header(n)
                },
                _ => header(n),
            })
            .collect())
    }

    async fn get_last_relayed_block(&self, _bridge: &ChainId) -> Result<u64, RpcError> {
        Ok(*self.last_relayed.lock().unwrap())
    }

    async fn get_proposer(&self, _bridge: &ChainId) -> Result<Address, RpcError> {
        if self.fail_proposer.load(Ordering::SeqCst) {
            return Err(RpcError::Rpc {
                code: -32000,
                message: "execution reverted".to_string(),
            });
        }
        Ok(*self.proposer.lock().unwrap())
    }
}
