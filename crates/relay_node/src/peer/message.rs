use relay_primitives::{Address, ChainId, Hash32};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::proposal::ProposalMessage;

pub const SIGNATURE_REQUEST: &str = "SIGREQ";
pub const SIGNATURE_PASS: &str = "SIGPASS";
pub const PROPOSER_ANNOUNCEMENT: &str = "PROP";
pub const PEERS_REQUEST: &str = "PEERSREQ";
/// Reply to [`PEERS_REQUEST`].
pub const PEERS: &str = "PEERS";

/// A peer's signature over a proposal. The signature bytes are opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignaturePass {
    pub chain: ChainId,
    pub start_block: u64,
    pub end_block: u64,
    pub merkle_root: Hash32,
    pub signer: Address,
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposerAnnouncement {
    pub query_chain: ChainId,
    pub bridged_chain: ChainId,
    pub proposer: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeerList {
    pub peers: Vec<String>,
}

/// Every message of the peer protocol, decoded once at the connection boundary.
///
/// On the wire each message is a single JSON object whose `type` field holds
/// the tag and whose remaining fields are the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerMessage {
    SignatureRequest(ProposalMessage),
    SignaturePass(SignaturePass),
    ProposerAnnouncement(ProposerAnnouncement),
    PeersRequest,
    Peers(PeerList),
    /// Any other tag. Peers use these as heartbeats.
    Unrecognized {
        tag: String,
        payload: Map<String, Value>,
    },
}

impl PeerMessage {
    pub fn tag(&self) -> &str {
        match self {
            PeerMessage::SignatureRequest(_) => SIGNATURE_REQUEST,
            PeerMessage::SignaturePass(_) => SIGNATURE_PASS,
            PeerMessage::ProposerAnnouncement(_) => PROPOSER_ANNOUNCEMENT,
            PeerMessage::PeersRequest => PEERS_REQUEST,
            PeerMessage::Peers(_) => PEERS,
            PeerMessage::Unrecognized { tag, .. } => tag,
        }
    }

    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_slice(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::Malformed("expected a JSON object".to_string()));
        };
        let tag = match fields.remove("type") {
            Some(Value::String(tag)) => tag,
            Some(other) => {
                return Err(ProtocolError::Malformed(format!(
                    "`type` must be a string, got {other}"
                )));
            }
            None => return Err(ProtocolError::Malformed("missing `type` field".to_string())),
        };

        Ok(match tag.as_str() {
            SIGNATURE_REQUEST => PeerMessage::SignatureRequest(payload(&tag, fields)?),
            SIGNATURE_PASS => PeerMessage::SignaturePass(payload(&tag, fields)?),
            PROPOSER_ANNOUNCEMENT => PeerMessage::ProposerAnnouncement(payload(&tag, fields)?),
            PEERS_REQUEST => PeerMessage::PeersRequest,
            PEERS => PeerMessage::Peers(payload(&tag, fields)?),
            _ => PeerMessage::Unrecognized {
                tag,
                payload: fields,
            },
        })
    }

    /// Serializes to a single JSON object without a trailing newline.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let mut fields = match self {
            PeerMessage::SignatureRequest(p) => to_object(p)?,
            PeerMessage::SignaturePass(p) => to_object(p)?,
            PeerMessage::ProposerAnnouncement(p) => to_object(p)?,
            PeerMessage::PeersRequest => Map::new(),
            PeerMessage::Peers(p) => to_object(p)?,
            PeerMessage::Unrecognized { payload, .. } => payload.clone(),
        };
        fields.insert("type".to_string(), Value::String(self.tag().to_string()));
        Ok(serde_json::to_string(&Value::Object(fields))?)
    }
}

fn payload<T: DeserializeOwned>(tag: &str, fields: Map<String, Value>) -> Result<T, ProtocolError> {
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| ProtocolError::Malformed(format!("{tag} payload: {e}")))
}

fn to_object<T: Serialize>(payload: &T) -> Result<Map<String, Value>, ProtocolError> {
    match serde_json::to_value(payload)? {
        Value::Object(fields) => Ok(fields),
        other => Err(ProtocolError::Malformed(format!(
            "payload must serialize to an object, got {other}"
        ))),
    }
}
