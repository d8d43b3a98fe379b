//! Request and response envelopes exchanged between nodes.

use crate::identity::Receipt;
use crate::types::{HdhtP2pError, HdhtP2pResult};
use hdht_state::prelude::StateError;
use hdht_types::prelude::*;
use serde::{Deserialize, Serialize};

/// A request from `sender`, with the fingerprint of `msg` so the receiver
/// can skip messages it has already applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequest {
    /// The node making the request, which may differ from `msg.from` when a
    /// change is relayed.
    pub sender: PeerInfo,
    /// Fingerprint of `msg`.
    pub fingerprint: MessageFingerprint,
    /// The request.
    pub msg: Message,
}

impl WireRequest {
    /// Wrap `msg`, computing its fingerprint.
    pub fn new(sender: PeerInfo, msg: Message) -> HdhtP2pResult<Self> {
        Ok(Self {
            sender,
            fingerprint: msg.fingerprint()?,
            msg,
        })
    }

    /// The fingerprint in the envelope matches the message.
    pub fn check_fingerprint(&self) -> HdhtP2pResult<()> {
        if self.msg.fingerprint()? != self.fingerprint {
            return Err("request fingerprint does not match message".into());
        }
        Ok(())
    }

    pub fn encode(&self) -> HdhtP2pResult<Vec<u8>> {
        Ok(encode(self)?)
    }

    pub fn decode(bytes: &[u8]) -> HdhtP2pResult<Self> {
        Ok(decode(bytes)?)
    }
}

/// Change log records served in answer to a gossip request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipResp {
    /// Ascending by idx.
    pub puts: Vec<Put>,
}

/// The serializable projection of errors a remote node reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum WireError {
    #[error("hash not found")]
    HashNotFound,
    #[error("hash deleted")]
    HashDeleted,
    /// Carries the replacement so the caller can follow it.
    #[error("hash modified, replaced by {0}")]
    HashModified(EntryHash),
    #[error("hash rejected")]
    HashRejected,
    #[error("link not found")]
    LinkNotFound,
    #[error("sender is blocked")]
    Blocked,
    #[error("unexpected message body type: {0}")]
    UnexpectedMessageBodyType(MsgType),
    #[error("{0}")]
    Other(String),
}

impl From<&StateError> for WireError {
    fn from(e: &StateError) -> Self {
        match e {
            StateError::HashNotFound => WireError::HashNotFound,
            StateError::HashDeleted => WireError::HashDeleted,
            StateError::HashModified(h) => WireError::HashModified(h.clone()),
            StateError::HashRejected => WireError::HashRejected,
            StateError::LinkNotFound => WireError::LinkNotFound,
            e => WireError::Other(e.to_string()),
        }
    }
}

impl From<&HdhtP2pError> for WireError {
    fn from(e: &HdhtP2pError) -> Self {
        match e {
            HdhtP2pError::State(e) => e.into(),
            HdhtP2pError::Remote(e) => e.clone(),
            HdhtP2pError::Blocked(_) => WireError::Blocked,
            HdhtP2pError::UnexpectedMessageBodyType(t) => WireError::UnexpectedMessageBodyType(*t),
            e => WireError::Other(e.to_string()),
        }
    }
}

/// Typed response bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum ResponseBody {
    /// Answer to a change.
    Hold(Receipt),
    /// Answer to a get.
    Get(GetResult),
    /// Answer to a links query.
    Links(Vec<TaggedHash>),
    /// Answer to a gossip request.
    Gossip(GossipResp),
    /// The responder doesn't have the answer; these peers are closer.
    CloserPeers(Vec<PeerInfo>),
    /// The request failed.
    Err(WireError),
}

/// A response from `sender` to the request with `fingerprint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResponse {
    /// The responding node.
    pub sender: PeerInfo,
    /// Fingerprint of the request being answered.
    pub fingerprint: MessageFingerprint,
    /// The answer.
    pub body: ResponseBody,
}

impl WireResponse {
    pub fn encode(&self) -> HdhtP2pResult<Vec<u8>> {
        Ok(encode(self)?)
    }

    pub fn decode(bytes: &[u8]) -> HdhtP2pResult<Self> {
        Ok(decode(bytes)?)
    }

    /// The body, with a remote error lifted into [`HdhtP2pError::Remote`].
    pub fn into_result(self) -> HdhtP2pResult<ResponseBody> {
        match self.body {
            ResponseBody::Err(e) => Err(HdhtP2pError::Remote(e)),
            body => Ok(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AgentKey, HoldCode};
    use pretty_assertions::assert_eq;

    fn request(key: &AgentKey) -> WireRequest {
        let msg = Message::new(
            key.peer_id().clone(),
            Body::Get(GetReq {
                hash: EntryHash::with_data(b"x"),
                status_mask: StatusMask::DEFAULT,
                field_mask: GetMask::ALL,
            }),
        );
        WireRequest::new(PeerInfo::new(key.peer_id().clone(), vec![]), msg).unwrap()
    }

    #[test]
    fn request_codec_keeps_fingerprint() {
        let req = request(&AgentKey::generate());
        let back = WireRequest::decode(&req.encode().unwrap()).unwrap();
        back.check_fingerprint().unwrap();
        assert_eq!(req, back);
    }

    #[test]
    fn tampered_request_fails_fingerprint() {
        let mut req = request(&AgentKey::generate());
        req.msg.time = Timestamp(req.msg.time.0 + 1);
        assert!(req.check_fingerprint().is_err());
    }

    #[test]
    fn response_bodies() {
        let key = AgentKey::generate();
        let req = request(&key);
        let sender = req.sender.clone();
        let receipt = Receipt::sign(&key, &req.msg, HoldCode::Ok).unwrap();
        for body in [
            ResponseBody::Hold(receipt),
            ResponseBody::Err(WireError::HashModified(EntryHash::with_data(b"new"))),
            ResponseBody::CloserPeers(vec![sender.clone()]),
        ] {
            let resp = WireResponse {
                sender: sender.clone(),
                fingerprint: req.fingerprint.clone(),
                body,
            };
            assert_eq!(resp, WireResponse::decode(&resp.encode().unwrap()).unwrap());
        }
    }

    #[test]
    fn state_errors_project() {
        let h = EntryHash::with_data(b"new");
        assert_eq!(
            WireError::HashModified(h.clone()),
            WireError::from(&StateError::HashModified(h))
        );
        assert_eq!(
            WireError::LinkNotFound,
            WireError::from(&HdhtP2pError::State(StateError::LinkNotFound))
        );
        assert!(matches!(
            WireError::from(&StateError::NoSuchChangeIndex(3)),
            WireError::Other(_)
        ));
    }
}
