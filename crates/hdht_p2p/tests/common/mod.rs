#![allow(dead_code)]

use hdht_p2p::prelude::*;
use std::sync::{Arc, Weak};
use std::time::Duration;

pub struct TestNode {
    pub dht: Arc<Dht>,
    pub chain: Arc<MemChain>,
    pub transport: Arc<MemTransport>,
}

impl TestNode {
    pub fn id(&self) -> PeerId {
        self.dht.id().clone()
    }

    pub fn info(&self) -> PeerInfo {
        self.dht.peer_info().clone()
    }

    /// Author an entry and make it a change.
    pub async fn put(&self, value: &[u8]) -> EntryHash {
        let hash = self.chain.commit("post", value.to_vec());
        self.dht
            .change(
                hash.clone(),
                Body::Put(HoldReq {
                    entry_hash: hash.clone(),
                    related_hash: None,
                }),
            )
            .await
            .unwrap();
        hash
    }

    /// Store an entry with a change record, without sending it anywhere.
    pub async fn put_quiet(&self, value: &[u8]) -> (EntryHash, Message) {
        let hash = EntryHash::with_data(value);
        let msg = Message::new(
            self.id(),
            Body::Put(HoldReq {
                entry_hash: hash.clone(),
                related_hash: None,
            }),
        );
        self.dht
            .put(
                Some(msg.clone()),
                "post".into(),
                hash.clone(),
                Some(self.id()),
                value.to_vec(),
                EntryStatus::Live,
            )
            .await
            .unwrap();
        (hash, msg)
    }
}

/// Background rounds and retries are off unless a test turns them on.
pub fn quiet_tuning() -> HdhtTuningParams {
    let mut tp = HdhtTuningParams::default();
    tp.gossip_interval_ms = 1000 * 60 * 60;
    tp.retry_interval_ms = 1000 * 60 * 60;
    tp.request_timeout_ms = 1000 * 5;
    tp.dial_timeout_ms = 1000;
    tp
}

pub async fn node_with(
    net: &Arc<MemNetwork>,
    name: &str,
    tuning: HdhtTuningParams,
    validator: DynChangeValidator,
) -> TestNode {
    hdht_trace::test_run().ok();
    let agent = AgentKey::generate();
    let transport = net.transport(agent.peer_id().clone());
    let chain = MemChain::new();
    let store = DhtStore::test_in_mem(name).unwrap();
    let config = HdhtConfig {
        tuning_params: tuning,
    };
    let dht = Dht::create(
        config,
        agent,
        store,
        transport.clone(),
        chain.clone(),
        validator,
    )
    .await
    .unwrap();
    let handler: Weak<dyn HdhtHandler> = Arc::downgrade(&dht) as Weak<dyn HdhtHandler>;
    net.register(dht.id().clone(), handler);
    TestNode {
        dht,
        chain,
        transport,
    }
}

pub async fn node(net: &Arc<MemNetwork>, name: &str) -> TestNode {
    node_with(net, name, quiet_tuning(), Arc::new(AcceptAll)).await
}

pub async fn nodes(net: &Arc<MemNetwork>, count: usize) -> Vec<TestNode> {
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push(node(net, &format!("n{}", i)).await);
    }
    out
}

/// Make `a` and `b` aware of each other.
pub async fn connect(a: &TestNode, b: &TestNode) {
    a.dht.add_peer(b.info()).await.unwrap();
    b.dht.add_peer(a.info()).await.unwrap();
}

pub async fn connect_all(nodes: &[TestNode]) {
    for (i, a) in nodes.iter().enumerate() {
        for b in nodes.iter().skip(i + 1) {
            connect(a, b).await;
        }
    }
}

/// Poll `f` until it is true, panicking after a few seconds.
pub async fn wait_for<F, Fut>(what: &str, mut f: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..250 {
        if f().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Rejects every entry whose type is "bad".
pub struct RejectBad;

impl ChangeValidator for RejectBad {
    fn validate<'a>(
        &'a self,
        _msg: &'a Message,
        content: Option<&'a EntryContent>,
    ) -> BoxFut<'a, HdhtP2pResult<ValidationOutcome>> {
        let bad = content.map(|c| c.entry_type == "bad").unwrap_or(false);
        Box::pin(async move {
            Ok(if bad {
                ValidationOutcome::Rejected
            } else {
                ValidationOutcome::Valid
            })
        })
    }
}
