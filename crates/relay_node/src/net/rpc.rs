use async_trait::async_trait;
use reqwest::{self, Client, StatusCode, Url, header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{self, Value, json};
use std::fmt;
use std::time::Duration;

use relay_primitives::{Address, ChainId, Hash32, Header, function_selector};

use super::ChainClient;

/// `uint256` getter on the bridge contract for the last relayed block.
pub const LAST_RELAYED_BLOCK_SIG: &str = "lastRelayedBlock()";
/// `address` getter on the bridge contract for the current proposer.
pub const CURRENT_PROPOSER_SIG: &str = "currentProposer()";

/// Errors that can occur when talking to an Ethereum JSON-RPC endpoint.
#[derive(Debug)]
pub enum RpcError {
    NonHttpUrl,
    Client(String),
    Json(serde_json::Error),
    Status(StatusCode),
    Rpc { code: i64, message: String },
    Hex(hex::FromHexError),
    /// The node returned a value that does not fit the expected shape.
    Decode(String),
    /// The node does not (yet) know the requested block.
    MissingBlock(u64),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::NonHttpUrl => write!(f, "only http(s):// URLs are supported"),
            RpcError::Client(e) => write!(f, "client error: {e}"),
            RpcError::Json(e) => write!(f, "JSON error: {e}"),
            RpcError::Status(status) => write!(f, "unexpected HTTP status: {status}"),
            RpcError::Rpc { code, message } => {
                write!(f, "RPC error {code}: {message}")
            }
            RpcError::Hex(e) => write!(f, "hex decoding error: {e}"),
            RpcError::Decode(e) => write!(f, "failed to decode RPC result: {e}"),
            RpcError::MissingBlock(n) => write!(f, "block {n} is not available"),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Json(e)
    }
}

impl From<hex::FromHexError> for RpcError {
    fn from(e: hex::FromHexError) -> Self {
        RpcError::Hex(e)
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    /// `null` is a valid result (e.g. an unknown block), so it stays raw here.
    #[serde(default)]
    result: Value,
    error: Option<JsonRpcError>,
}

/// Subset of `eth_getBlockByNumber` used to build a [`Header`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    hash: Hash32,
    number: String,
    timestamp: String,
    parent_hash: Hash32,
    transactions_root: Hash32,
    receipts_root: Hash32,
}

impl TryFrom<RpcBlock> for Header {
    type Error = RpcError;

    fn try_from(block: RpcBlock) -> Result<Self, Self::Error> {
        Ok(Header {
            number: parse_quantity(&block.number)?,
            timestamp: parse_quantity(&block.timestamp)?,
            prev_header_hash: block.parent_hash,
            tx_root: block.transactions_root,
            receipts_root: block.receipts_root,
        })
    }
}

/// Minimal JSON-RPC client for an Ethereum-compatible node over HTTP(S).
pub struct RpcClient {
    client: Client,
    url: Url,
}

impl RpcClient {
    /// Creates a client for `url`; every request is abandoned after `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let url = Url::parse(url).map_err(|e| RpcError::Client(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            _ => {
                return Err(RpcError::NonHttpUrl);
            }
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Client(e.to_string()))?;

        Ok(RpcClient { client, url })
    }

    async fn call<T>(&self, method: &str, params: &[Value]) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
    {
        let request_body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let res = self
            .client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| RpcError::Client(e.to_string()))?;

        if !res.status().is_success() {
            return Err(RpcError::Status(res.status()));
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| RpcError::Client(e.to_string()))?;
        let rpc_response: JsonRpcResponse = serde_json::from_slice(&bytes)?;

        if let Some(err) = rpc_response.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        Ok(serde_json::from_value(rpc_response.result)?)
    }

    /// `eth_blockNumber`.
    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let quantity: String = self.call("eth_blockNumber", &[]).await?;
        parse_quantity(&quantity)
    }

    /// `eth_getBlockByNumber` without transaction bodies.
    pub async fn get_header(&self, number: u64) -> Result<Header, RpcError> {
        Ok(self.get_block(number).await?.0)
    }

    /// The header of block `number` and the block's own hash.
    async fn get_block(&self, number: u64) -> Result<(Header, Hash32), RpcError> {
        let block: Option<RpcBlock> = self
            .call(
                "eth_getBlockByNumber",
                &[json!(format!("{number:#x}")), json!(false)],
            )
            .await?;
        let block = block.ok_or(RpcError::MissingBlock(number))?;
        let hash = block.hash;
        let header = Header::try_from(block)?;
        if header.number != number {
            return Err(RpcError::Decode(format!(
                "asked for block {number}, node returned {}",
                header.number
            )));
        }
        Ok((header, hash))
    }

    /// `eth_call` of a zero-argument view function, returning the first 32-byte word.
    async fn call_view(&self, contract: &ChainId, signature: &str) -> Result<[u8; 32], RpcError> {
        let data = format!("0x{}", hex::encode(function_selector(signature)));
        let result: String = self
            .call(
                "eth_call",
                &[json!({ "to": contract.to_string(), "data": data }), json!("latest")],
            )
            .await?;
        let bytes = hex::decode(result.strip_prefix("0x").unwrap_or(&result))?;
        bytes
            .get(..32)
            .and_then(|word| <[u8; 32]>::try_from(word).ok())
            .ok_or_else(|| {
                RpcError::Decode(format!("{signature} returned {} bytes", bytes.len()))
            })
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn current_block_number(&self) -> Result<u64, RpcError> {
        self.block_number().await
    }

    /// Fetches block by block and checks each header's parent hash against
    /// the block before it, so a reorg mid-fetch surfaces as an error.
    async fn get_headers(&self, from: u64, to: u64) -> Result<Vec<Header>, RpcError> {
        let mut headers = Vec::with_capacity(to.saturating_sub(from) as usize + 1);
        let mut parent: Option<Hash32> = None;
        for number in from..=to {
            let (header, hash) = self.get_block(number).await?;
            check_parent(parent.as_ref(), &header)?;
            parent = Some(hash);
            headers.push(header);
        }
        Ok(headers)
    }

    async fn get_last_relayed_block(&self, bridge: &ChainId) -> Result<u64, RpcError> {
        let word = self.call_view(bridge, LAST_RELAYED_BLOCK_SIG).await?;
        word_to_u64(&word)
    }

    async fn get_proposer(&self, bridge: &ChainId) -> Result<Address, RpcError> {
        let word = self.call_view(bridge, CURRENT_PROPOSER_SIG).await?;
        word_to_address(&word)
    }
}

fn check_parent(parent: Option<&Hash32>, header: &Header) -> Result<(), RpcError> {
    match parent {
        Some(parent) if *parent != header.prev_header_hash => Err(RpcError::Decode(format!(
            "block {} does not extend the block fetched before it",
            header.number
        ))),
        _ => Ok(()),
    }
}

/// Parses an Ethereum hex quantity such as `"0x1b4"`.
pub fn parse_quantity(s: &str) -> Result<u64, RpcError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Decode(format!("quantity {s:?} lacks 0x prefix")))?;
    u64::from_str_radix(digits, 16).map_err(|e| RpcError::Decode(format!("quantity {s:?}: {e}")))
}

fn word_to_u64(word: &[u8; 32]) -> Result<u64, RpcError> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(RpcError::Decode("uint256 does not fit in u64".to_string()));
    }
    let mut be = [0u8; 8];
    be.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(be))
}

fn word_to_address(word: &[u8; 32]) -> Result<Address, RpcError> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(RpcError::Decode("word is not an ABI-encoded address".to_string()));
    }
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&word[12..]);
    Ok(Address(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_are_hex() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert!(parse_quantity("436").is_err());
    }

    #[test]
    fn abi_words_decode() {
        let mut word = [0u8; 32];
        word[31] = 0x2a;
        assert_eq!(word_to_u64(&word).unwrap(), 42);
        word[0] = 1;
        assert!(word_to_u64(&word).is_err());

        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&[0xee; 20]);
        assert_eq!(word_to_address(&word).unwrap(), Address([0xee; 20]));
    }

    #[test]
    fn rpc_block_maps_to_header() {
        let block: RpcBlock = serde_json::from_value(json!({
            "hash": format!("0x{}", "0f".repeat(32)),
            "number": "0x10",
            "timestamp": "0x5f5e100",
            "parentHash": format!("0x{}", "01".repeat(32)),
            "transactionsRoot": format!("0x{}", "02".repeat(32)),
            "receiptsRoot": format!("0x{}", "03".repeat(32)),
            "miner": "0x0000000000000000000000000000000000000000"
        }))
        .unwrap();
        let header = Header::try_from(block).unwrap();
        assert_eq!(header.number, 16);
        assert_eq!(header.timestamp, 100_000_000);
        assert_eq!(header.tx_root, Hash32([0x02; 32]));
    }

    #[test]
    fn fetched_blocks_must_link_up() {
        let header = Header {
            number: 8,
            timestamp: 0,
            prev_header_hash: Hash32([7; 32]),
            tx_root: Hash32::default(),
            receipts_root: Hash32::default(),
        };
        assert!(check_parent(None, &header).is_ok());
        assert!(check_parent(Some(&Hash32([7; 32])), &header).is_ok());
        assert!(matches!(
            check_parent(Some(&Hash32([6; 32])), &header),
            Err(RpcError::Decode(_))
        ));
    }

    #[test]
    fn null_result_is_an_absent_block() {
        let response: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert!(response.error.is_none());
        let block: Option<RpcBlock> = serde_json::from_value(response.result).unwrap();
        assert!(block.is_none());
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            RpcClient::new("ws://127.0.0.1:8546", Duration::from_secs(1)),
            Err(RpcError::NonHttpUrl)
        ));
    }
}
