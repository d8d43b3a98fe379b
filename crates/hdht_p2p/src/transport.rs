//! The seams between the DHT and the network.

use crate::config::HdhtTuningParams;
use crate::types::{BoxFut, HdhtP2pError, HdhtP2pResult};
use crate::wire::{ResponseBody, WireRequest, WireResponse};
use hdht_types::prelude::*;
use std::sync::Arc;

/// Outbound side: reach other nodes.
pub trait HdhtTransport: 'static + Send + Sync + std::fmt::Debug {
    /// The local node as others should address it.
    fn local_info(&self) -> PeerInfo;

    /// An open connection to `peer` exists.
    fn is_connected(&self, peer: &PeerId) -> bool;

    /// Open a connection to `peer`.
    fn dial(&self, peer: PeerInfo) -> BoxFut<'_, HdhtP2pResult<()>>;

    /// Send `req` to `peer` and wait for its answer. Dials if needed.
    fn request(&self, peer: PeerInfo, req: WireRequest) -> BoxFut<'_, HdhtP2pResult<WireResponse>>;
}

/// Trait-object [`HdhtTransport`].
pub type DynHdhtTransport = Arc<dyn HdhtTransport>;

/// Inbound side: answer requests from other nodes.
pub trait HdhtHandler: 'static + Send + Sync {
    /// Handle one request. Application level failures are returned as
    /// [`crate::wire::ResponseBody::Err`], not as `Err`.
    fn handle_request(&self, req: WireRequest) -> BoxFut<'_, HdhtP2pResult<WireResponse>>;
}

/// Trait-object [`HdhtHandler`].
pub type DynHdhtHandler = Arc<dyn HdhtHandler>;

/// Sends requests as the local node, each under the configured request
/// timeout.
#[derive(Clone, Debug)]
pub struct Requester {
    local: PeerInfo,
    transport: DynHdhtTransport,
    tuning: Arc<HdhtTuningParams>,
}

impl Requester {
    pub fn new(transport: DynHdhtTransport, tuning: Arc<HdhtTuningParams>) -> Self {
        Self {
            local: transport.local_info(),
            transport,
            tuning,
        }
    }

    /// The local node.
    pub fn local(&self) -> &PeerInfo {
        &self.local
    }

    pub fn transport(&self) -> &DynHdhtTransport {
        &self.transport
    }

    /// Send `msg` to `peer` as is. A remote error comes back as
    /// [`ResponseBody::Err`].
    pub async fn send_msg(&self, peer: PeerInfo, msg: Message) -> HdhtP2pResult<ResponseBody> {
        let req = WireRequest::new(self.local.clone(), msg)?;
        let fingerprint = req.fingerprint.clone();
        let resp = self
            .tuning
            .request_timeout()
            .bound(self.transport.request(peer, req))
            .await?;
        if resp.fingerprint != fingerprint {
            return Err("response does not answer our request".into());
        }
        Ok(resp.body)
    }

    /// Send a new message with `body` to `peer`. A remote error is returned
    /// as [`HdhtP2pError::Remote`].
    pub async fn send(&self, peer: PeerInfo, body: Body) -> HdhtP2pResult<ResponseBody> {
        let msg = Message::new(self.local.id.clone(), body);
        match self.send_msg(peer, msg).await? {
            ResponseBody::Err(e) => Err(HdhtP2pError::Remote(e)),
            body => Ok(body),
        }
    }
}
