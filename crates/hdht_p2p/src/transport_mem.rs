//! An in-process network for running many nodes in one test.
//!
//! Every request and response is encoded and decoded on the way through, so
//! the wire format is exercised exactly as it would be over a socket.

use crate::transport::{HdhtHandler, HdhtTransport};
use crate::types::{BoxFut, HdhtP2pError, HdhtP2pResult};
use crate::wire::{WireRequest, WireResponse};
use hdht_types::prelude::*;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

struct MemNode {
    handler: Option<Weak<dyn HdhtHandler>>,
    online: bool,
}

/// The switchboard all [`MemTransport`]s of one test share.
#[derive(Default)]
pub struct MemNetwork {
    nodes: Mutex<HashMap<PeerId, MemNode>>,
}

impl std::fmt::Debug for MemNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemNetwork")
            .field("nodes", &self.nodes.lock().len())
            .finish()
    }
}

impl MemNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The address a node with `id` is reachable at.
    pub fn addr_for(id: &PeerId) -> url2::Url2 {
        url2::url2!("mem://{}", id)
    }

    /// A transport for the node `id`. The node is unreachable until a
    /// handler is registered.
    pub fn transport(self: &Arc<Self>, id: PeerId) -> Arc<MemTransport> {
        self.nodes.lock().entry(id.clone()).or_insert(MemNode {
            handler: None,
            online: true,
        });
        Arc::new(MemTransport {
            net: self.clone(),
            local: PeerInfo::new(id.clone(), vec![Self::addr_for(&id)]),
            connected: Mutex::new(HashSet::new()),
        })
    }

    /// Route requests for `id` to `handler`.
    pub fn register(&self, id: PeerId, handler: Weak<dyn HdhtHandler>) {
        let mut nodes = self.nodes.lock();
        let node = nodes.entry(id).or_insert(MemNode {
            handler: None,
            online: true,
        });
        node.handler = Some(handler);
    }

    /// Take a node off the network, or bring it back.
    pub fn set_online(&self, id: &PeerId, online: bool) {
        if let Some(node) = self.nodes.lock().get_mut(id) {
            node.online = online;
        }
    }

    fn online(&self, id: &PeerId) -> bool {
        self.nodes.lock().get(id).map(|n| n.online).unwrap_or(false)
    }

    fn handler(&self, id: &PeerId) -> HdhtP2pResult<Arc<dyn HdhtHandler>> {
        let nodes = self.nodes.lock();
        match nodes.get(id) {
            Some(MemNode {
                handler: Some(h),
                online: true,
            }) => h
                .upgrade()
                .ok_or_else(|| format!("peer {} is gone", id).into()),
            _ => Err(format!("peer {} is unreachable", id).into()),
        }
    }
}

/// One node's view of a [`MemNetwork`].
pub struct MemTransport {
    net: Arc<MemNetwork>,
    local: PeerInfo,
    connected: Mutex<HashSet<PeerId>>,
}

impl std::fmt::Debug for MemTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTransport")
            .field("local", &self.local.id)
            .finish()
    }
}

impl MemTransport {
    /// Forget every open connection, as if the node restarted.
    pub fn disconnect_all(&self) {
        self.connected.lock().clear();
    }

    fn check_route(&self, peer: &PeerId) -> HdhtP2pResult<Arc<dyn HdhtHandler>> {
        if !self.net.online(&self.local.id) {
            return Err("local node is offline".into());
        }
        self.net.handler(peer)
    }
}

impl HdhtTransport for MemTransport {
    fn local_info(&self) -> PeerInfo {
        self.local.clone()
    }

    fn is_connected(&self, peer: &PeerId) -> bool {
        self.connected.lock().contains(peer) && self.net.online(peer)
    }

    fn dial(&self, peer: PeerInfo) -> BoxFut<'_, HdhtP2pResult<()>> {
        Box::pin(async move {
            self.check_route(&peer.id)?;
            self.connected.lock().insert(peer.id);
            Ok(())
        })
    }

    fn request(&self, peer: PeerInfo, req: WireRequest) -> BoxFut<'_, HdhtP2pResult<WireResponse>> {
        Box::pin(async move {
            let handler = self.check_route(&peer.id)?;
            self.connected.lock().insert(peer.id.clone());
            let req = WireRequest::decode(&req.encode()?)?;
            let resp = handler.handle_request(req).await?;
            if !self.net.online(&peer.id) {
                return Err(HdhtP2pError::from("peer went offline"));
            }
            WireResponse::decode(&resp.encode()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ResponseBody;

    struct Echo(PeerInfo);

    impl HdhtHandler for Echo {
        fn handle_request(&self, req: WireRequest) -> BoxFut<'_, HdhtP2pResult<WireResponse>> {
            Box::pin(async move {
                Ok(WireResponse {
                    sender: self.0.clone(),
                    fingerprint: req.fingerprint,
                    body: ResponseBody::CloserPeers(vec![req.sender]),
                })
            })
        }
    }

    fn find(from: &PeerInfo) -> WireRequest {
        let msg = Message::new(
            from.id.clone(),
            Body::FindNode(FindNodeReq {
                target: PeerId::with_data(b"t").into(),
            }),
        );
        WireRequest::new(from.clone(), msg).unwrap()
    }

    #[tokio::test]
    async fn requests_route_by_id() {
        let net = MemNetwork::new();
        let a = net.transport(PeerId::with_data(b"a"));
        let b = net.transport(PeerId::with_data(b"b"));
        let b_info = b.local_info();
        let echo: Arc<dyn HdhtHandler> = Arc::new(Echo(b_info.clone()));
        net.register(b_info.id.clone(), Arc::downgrade(&echo));

        assert!(!a.is_connected(&b_info.id));
        let resp = a.request(b_info.clone(), find(&a.local_info())).await.unwrap();
        assert_eq!(b_info, resp.sender);
        assert_eq!(
            ResponseBody::CloserPeers(vec![a.local_info()]),
            resp.body
        );
        assert!(a.is_connected(&b_info.id));

        net.set_online(&b_info.id, false);
        assert!(!a.is_connected(&b_info.id));
        assert!(a.request(b_info.clone(), find(&a.local_info())).await.is_err());
        assert!(a.dial(b_info.clone()).await.is_err());

        net.set_online(&b_info.id, true);
        a.dial(b_info.clone()).await.unwrap();

        drop(echo);
        assert!(a.request(b_info, find(&a.local_info())).await.is_err());
    }
}
