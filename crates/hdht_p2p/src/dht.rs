//! The DHT coordinator: local store access, change fan-out, remote queries
//! and the inbound request handler.

use crate::config::{HdhtConfig, HdhtTuningParams};
use crate::gossip::{DhtGossip, GossipReport, ReplayJob};
use crate::host::{DynChainSource, DynChangeValidator, EntryContent, ValidationOutcome};
use crate::identity::{AgentKey, HoldCode, Receipt};
use crate::lookup::{Lookup, QueryFn, QueryStep};
use crate::routing::RoutingTable;
use crate::transport::{DynHdhtTransport, HdhtHandler, Requester};
use crate::types::{BoxFut, HdhtP2pError, HdhtP2pResult};
use crate::wire::{ResponseBody, WireError, WireRequest, WireResponse};
use hdht_state::prelude::*;
use hdht_state::query::EntryRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// A local change waiting to be sent to the peers nearest its key.
#[derive(Debug)]
struct ChangeJob {
    key: EntryHash,
    msg: Message,
}

/// An inbound change that failed to apply.
#[derive(Debug, Clone)]
struct RetryItem {
    msg: Message,
    deliverer: PeerInfo,
    attempts_left: u32,
}

/// What [`Dht::process_retry_once`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Nothing was waiting.
    Empty,
    /// The change applied.
    Applied,
    /// It failed again and went to the back of the queue.
    Requeued,
    /// It failed its last attempt and was dropped.
    Dropped,
}

/// Who acknowledged a published change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeReport {
    /// Peers that validated and stored the change.
    pub held: Vec<PeerId>,
    /// Peers that rejected it.
    pub rejected: Vec<PeerId>,
}

/// One DHT node.
pub struct Dht {
    tuning: Arc<HdhtTuningParams>,
    agent: AgentKey,
    store: DhtStore,
    routing: Arc<RoutingTable>,
    lookup: Lookup,
    requester: Requester,
    chain: DynChainSource,
    validator: DynChangeValidator,
    gossip: DhtGossip,
    change_tx: mpsc::Sender<ChangeJob>,
    retry: Mutex<VecDeque<RetryItem>>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl std::fmt::Debug for Dht {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dht").field("id", self.id()).finish()
    }
}

impl Drop for Dht {
    fn drop(&mut self) {
        self.close();
    }
}

impl HdhtHandler for Dht {
    fn handle_request(&self, req: WireRequest) -> BoxFut<'_, HdhtP2pResult<WireResponse>> {
        Box::pin(self.respond(req))
    }
}

impl Dht {
    /// Start a node. The transport must address the node by `agent`'s id.
    /// Peers on the store's block list are kept out of routing from the start.
    pub async fn create(
        config: HdhtConfig,
        agent: AgentKey,
        store: DhtStore,
        transport: DynHdhtTransport,
        chain: DynChainSource,
        validator: DynChangeValidator,
    ) -> HdhtP2pResult<Arc<Self>> {
        let local = transport.local_info();
        if &local.id != agent.peer_id() {
            return Err(format!(
                "transport id {} does not match agent {}",
                local.id,
                agent.peer_id()
            )
            .into());
        }
        let tuning = Arc::new(config.tuning_params);
        let routing = Arc::new(RoutingTable::new(local.id.clone(), tuning.bucket_size));
        for blocked in store.get_list(PeerListType::Blocked).await? {
            routing.block(blocked.id);
        }
        let lookup = Lookup::new(routing.clone(), transport.clone(), tuning.clone());
        let requester = Requester::new(transport, tuning.clone());

        let (change_tx, change_rx) = mpsc::channel(tuning.change_queue_size.max(1));
        let (gossip_with_tx, gossip_with_rx) = mpsc::channel(tuning.gossip_queue_size.max(1));
        let (replay_tx, replay_rx) = mpsc::channel(tuning.gossip_queue_size.max(1));

        let gossip = DhtGossip::new(
            requester.clone(),
            store.clone(),
            routing.clone(),
            tuning.clone(),
            gossip_with_tx,
            replay_tx,
        );

        let dht = Arc::new_cyclic(|this: &Weak<Self>| {
            let tasks = vec![
                Self::spawn_change_consumer(this.clone(), change_rx),
                Self::spawn_gossip_with_consumer(this.clone(), gossip_with_rx),
                Self::spawn_replay_consumer(this.clone(), replay_rx),
                Self::spawn_periodic_gossip(this.clone(), tuning.gossip_interval()),
                Self::spawn_retry_task(this.clone(), tuning.retry_interval()),
            ];
            Self {
                tuning,
                agent,
                store,
                routing,
                lookup,
                requester,
                chain,
                validator,
                gossip,
                change_tx,
                retry: Mutex::new(VecDeque::new()),
                tasks: Mutex::new(tasks),
            }
        });
        tracing::info!(id = ?dht.id(), "dht started");
        Ok(dht)
    }

    fn spawn_change_consumer(
        this: Weak<Self>,
        mut rx: mpsc::Receiver<ChangeJob>,
    ) -> AbortHandle {
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let Some(dht) = this.upgrade() else { break };
                match dht.publish(job.key.clone(), &job.msg).await {
                    Ok(report) => {
                        tracing::debug!(key = ?job.key, held = report.held.len(), rejected = report.rejected.len(), "change published")
                    }
                    Err(err) => tracing::warn!(key = ?job.key, ?err, "change publish failed"),
                }
            }
        })
        .abort_handle()
    }

    fn spawn_gossip_with_consumer(this: Weak<Self>, mut rx: mpsc::Receiver<PeerId>) -> AbortHandle {
        tokio::spawn(async move {
            while let Some(peer) = rx.recv().await {
                let Some(dht) = this.upgrade() else { break };
                if let Err(err) = dht.gossip.gossip_with(peer.clone()).await {
                    tracing::debug!(?peer, ?err, "queued gossip failed");
                }
            }
        })
        .abort_handle()
    }

    fn spawn_replay_consumer(this: Weak<Self>, mut rx: mpsc::Receiver<ReplayJob>) -> AbortHandle {
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let Some(dht) = this.upgrade() else { break };
                let result = dht.apply_change(&job.put.message, &job.from).await;
                if result.is_err() {
                    dht.queue_retry(job.put.message.clone(), job.from.clone());
                }
                let _ = job.done.send(result);
            }
        })
        .abort_handle()
    }

    fn spawn_periodic_gossip(this: Weak<Self>, interval: std::time::Duration) -> AbortHandle {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(dht) = this.upgrade() else { break };
                match dht.gossip.gossip().await {
                    Ok(_) | Err(HdhtP2pError::NoGossipersAvailable) => (),
                    Err(err) => tracing::debug!(?err, "periodic gossip failed"),
                }
            }
        })
        .abort_handle()
    }

    fn spawn_retry_task(this: Weak<Self>, interval: std::time::Duration) -> AbortHandle {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(dht) = this.upgrade() else { break };
                if let Err(err) = dht.process_retry_once().await {
                    tracing::warn!(?err, "retry failed");
                }
            }
        })
        .abort_handle()
    }

    /// Stop the background tasks. The node still answers requests.
    pub fn close(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    pub fn id(&self) -> &PeerId {
        self.agent.peer_id()
    }

    pub fn peer_info(&self) -> &PeerInfo {
        self.requester.local()
    }

    pub fn store(&self) -> &DhtStore {
        &self.store
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn gossip(&self) -> &DhtGossip {
        &self.gossip
    }

    pub fn tuning(&self) -> &HdhtTuningParams {
        &self.tuning
    }

    // -- store pass-throughs --

    #[tracing::instrument(skip(self, msg, value))]
    pub async fn put(
        &self,
        msg: Option<Message>,
        entry_type: String,
        key: EntryHash,
        source: Option<PeerId>,
        value: Vec<u8>,
        status: EntryStatus,
    ) -> HdhtP2pResult<()> {
        Ok(self
            .store
            .put(msg, entry_type, key, source, value, status)
            .await?)
    }

    #[tracing::instrument(skip(self, msg))]
    pub async fn del(&self, msg: Option<Message>, key: EntryHash) -> HdhtP2pResult<()> {
        Ok(self.store.del(msg, key).await?)
    }

    #[tracing::instrument(skip(self, msg))]
    pub async fn modify(
        &self,
        msg: Option<Message>,
        key: EntryHash,
        new_key: EntryHash,
    ) -> HdhtP2pResult<()> {
        Ok(self.store.modify(msg, key, new_key).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn exists(&self, key: EntryHash, status_mask: StatusMask) -> HdhtP2pResult<()> {
        Ok(self.store.exists(key, status_mask).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn source(&self, key: EntryHash) -> HdhtP2pResult<PeerId> {
        Ok(self.store.source(key).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(
        &self,
        key: EntryHash,
        status_mask: StatusMask,
        field_mask: GetMask,
    ) -> HdhtP2pResult<GetResult> {
        Ok(self.store.get(key, status_mask, field_mask).await?)
    }

    #[tracing::instrument(skip(self, msg))]
    pub async fn put_link(
        &self,
        msg: Option<Message>,
        base: EntryHash,
        target: EntryHash,
        tag: String,
    ) -> HdhtP2pResult<()> {
        Ok(self.store.put_link(msg, base, target, tag).await?)
    }

    #[tracing::instrument(skip(self, msg))]
    pub async fn del_link(
        &self,
        msg: Option<Message>,
        base: EntryHash,
        target: EntryHash,
        tag: String,
    ) -> HdhtP2pResult<()> {
        Ok(self.store.del_link(msg, base, target, tag).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_links(
        &self,
        base: EntryHash,
        tag: String,
        status_mask: StatusMask,
    ) -> HdhtP2pResult<Vec<TaggedHash>> {
        Ok(self.store.get_links(base, tag, status_mask).await?)
    }

    /// Visit every stored entry in ascending hash order until `f` returns
    /// false.
    pub async fn iterate<F>(&self, f: F) -> HdhtP2pResult<usize>
    where
        F: FnMut(EntryRecord) -> bool + Send + 'static,
    {
        Ok(self.store.iterate(f).await?)
    }

    /// Snapshot of the local store.
    pub async fn dump(&self) -> HdhtP2pResult<StateDump> {
        Ok(self.store.dump().await?)
    }

    // -- peers --

    /// A connection to `peer` was made.
    pub async fn add_peer(&self, peer: PeerInfo) -> HdhtP2pResult<()> {
        if self
            .store
            .is_in_list(PeerListType::Blocked, peer.id.clone())
            .await?
        {
            return Err(HdhtP2pError::Blocked(peer.id));
        }
        self.routing.update(peer.clone());
        self.store.add_gossiper(peer.id).await?;
        Ok(())
    }

    /// Forget `peer` as a route and a gossip partner.
    pub async fn remove_peer(&self, peer: PeerId) -> HdhtP2pResult<()> {
        self.routing.remove(&peer);
        self.store.delete_gossiper(peer).await?;
        Ok(())
    }

    /// Refuse all further contact with `peer`.
    #[tracing::instrument(skip(self))]
    pub async fn block_peer(&self, peer: PeerId, warrant: String) -> HdhtP2pResult<()> {
        self.store
            .add_to_list(
                PeerListType::Blocked,
                vec![PeerRecord {
                    id: peer.clone(),
                    warrant,
                }],
            )
            .await?;
        self.routing.block(peer);
        Ok(())
    }

    // -- gossip --

    /// Run a gossip round with `peer` now.
    pub async fn gossip_with(&self, peer: PeerId) -> HdhtP2pResult<GossipReport> {
        self.gossip.gossip_with(peer).await
    }

    /// Queue a gossip round with `peer`.
    pub async fn request_gossip(&self, peer: PeerId) -> HdhtP2pResult<()> {
        self.gossip.request_gossip(peer).await
    }

    // -- changes --

    /// Make a change as this node: apply it locally through the same path a
    /// change from the network takes, then queue it for the peers nearest
    /// `key`. Returns the message once the local write is done.
    #[tracing::instrument(skip(self, body))]
    pub async fn change(&self, key: EntryHash, body: Body) -> HdhtP2pResult<Message> {
        if !body.msg_type().is_change() {
            return Err(HdhtP2pError::UnexpectedMessageBodyType(body.msg_type()));
        }
        let msg = Message::new(self.id().clone(), body);
        let code = self.apply_change(&msg, self.peer_info()).await?;
        if code == HoldCode::Rejected {
            return Err(HdhtP2pError::LocallyRejected);
        }
        self.change_tx
            .send(ChangeJob {
                key,
                msg: msg.clone(),
            })
            .await
            .map_err(|_| HdhtP2pError::from("change queue closed"))?;
        Ok(msg)
    }

    /// Send `msg` to the peers nearest `key` and collect their receipts.
    ///
    /// Per-peer failures are logged. Fails with
    /// [`HdhtP2pError::NoRemoteNodeAcceptedChange`] if no peer holds it.
    pub async fn publish(&self, key: EntryHash, msg: &Message) -> HdhtP2pResult<ChangeReport> {
        let count = match self.tuning.redundancy_factor {
            0 => self.tuning.bucket_size,
            n => n,
        };
        let peers = self.closest_peers(key.into(), count).await?;

        let sends = peers.into_iter().map(|peer| async move {
            let r = self.requester.send_msg(peer.clone(), msg.clone()).await;
            (peer, r)
        });
        let mut report = ChangeReport::default();
        for (peer, r) in futures::future::join_all(sends).await {
            match r {
                Ok(ResponseBody::Hold(receipt)) => match receipt.verify(msg, &peer.id) {
                    Ok(()) => match receipt.code {
                        HoldCode::Ok => report.held.push(peer.id),
                        HoldCode::Rejected => report.rejected.push(peer.id),
                    },
                    Err(err) => tracing::warn!(peer = ?peer.id, ?err, "bad receipt"),
                },
                Ok(ResponseBody::Err(err)) => {
                    tracing::warn!(peer = ?peer.id, ?err, "peer failed to hold change")
                }
                Ok(_) => tracing::warn!(peer = ?peer.id, "unexpected answer to change"),
                Err(err) => tracing::warn!(peer = ?peer.id, ?err, "change send failed"),
            }
        }
        if report.held.is_empty() {
            return Err(HdhtP2pError::NoRemoteNodeAcceptedChange);
        }
        Ok(report)
    }

    /// The `count` peers nearest `target`, found by FIND_NODE lookup.
    pub async fn closest_peers(
        &self,
        target: AnyDhtHash,
        count: usize,
    ) -> HdhtP2pResult<Vec<PeerInfo>> {
        let requester = self.requester.clone();
        let find = target.clone();
        let query: QueryFn<()> = Arc::new(move |peer| {
            let requester = requester.clone();
            let target = find.clone();
            Box::pin(async move {
                match requester.send(peer, Body::FindNode(FindNodeReq { target })).await? {
                    ResponseBody::CloserPeers(peers) => Ok(QueryStep::Closer(peers)),
                    _ => Err(HdhtP2pError::UnexpectedMessageBodyType(MsgType::FindNode)),
                }
            })
        });
        self.lookup.closest_peers(target, count, query).await
    }

    // -- queries --

    /// Answer a Get or GetLinks body from the local store, falling back to
    /// a lookup over remote peers when the hash isn't held here.
    #[tracing::instrument(skip(self, body))]
    pub async fn query(&self, key: AnyDhtHash, body: Body) -> HdhtP2pResult<ResponseBody> {
        match self.answer_locally(&body).await {
            Err(HdhtP2pError::State(StateError::HashNotFound)) => (),
            r => return r,
        }
        let requester = self.requester.clone();
        let query: QueryFn<ResponseBody> = Arc::new(move |peer| {
            let requester = requester.clone();
            let body = body.clone();
            Box::pin(async move {
                match requester.send(peer, body).await {
                    Ok(ResponseBody::CloserPeers(peers)) => Ok(QueryStep::Closer(peers)),
                    Ok(body) => Ok(QueryStep::Found(body)),
                    Err(HdhtP2pError::Remote(WireError::HashNotFound)) => {
                        Ok(QueryStep::Closer(vec![]))
                    }
                    Err(HdhtP2pError::Remote(e)) => Ok(QueryStep::Found(ResponseBody::Err(e))),
                    Err(e) => Err(e),
                }
            })
        });
        match self.lookup.run(key, query).await? {
            ResponseBody::Err(e) => Err(HdhtP2pError::Remote(e)),
            body => Ok(body),
        }
    }

    /// [`Dht::query`] for an entry.
    pub async fn query_get(
        &self,
        hash: EntryHash,
        status_mask: StatusMask,
        field_mask: GetMask,
    ) -> HdhtP2pResult<GetResult> {
        let body = Body::Get(GetReq {
            hash: hash.clone(),
            status_mask,
            field_mask,
        });
        match self.query(hash.into(), body).await? {
            ResponseBody::Get(r) => Ok(r),
            _ => Err(HdhtP2pError::UnexpectedMessageBodyType(MsgType::Get)),
        }
    }

    /// [`Dht::query`] for links.
    pub async fn query_links(
        &self,
        base: EntryHash,
        tag: String,
        status_mask: StatusMask,
    ) -> HdhtP2pResult<Vec<TaggedHash>> {
        let body = Body::GetLinks(LinkQuery {
            base: base.clone(),
            tag,
            status_mask,
        });
        match self.query(base.into(), body).await? {
            ResponseBody::Links(links) => Ok(links),
            _ => Err(HdhtP2pError::UnexpectedMessageBodyType(MsgType::GetLinks)),
        }
    }

    /// Entries this node authored are served even before they are stored.
    async fn local_get(&self, req: &GetReq) -> HdhtP2pResult<GetResult> {
        match self
            .store
            .get(req.hash.clone(), req.status_mask, req.field_mask)
            .await
        {
            Err(StateError::HashNotFound) => (),
            r => return Ok(r?),
        }
        let live = req.status_mask.is_default() || req.status_mask.matches(EntryStatus::Live);
        match self.chain.get_entry(req.hash.clone()).await? {
            Some(content) if live => Ok(GetResult {
                entry: Some(content.value),
                entry_type: req.field_mask.entry_type().then_some(content.entry_type),
                sources: if req.field_mask.sources() {
                    vec![self.id().clone()]
                } else {
                    vec![]
                },
                status: EntryStatus::Live,
            }),
            _ => Err(StateError::HashNotFound.into()),
        }
    }

    async fn answer_locally(&self, body: &Body) -> HdhtP2pResult<ResponseBody> {
        match body {
            Body::Get(req) => Ok(ResponseBody::Get(self.local_get(req).await?)),
            Body::GetLinks(q) => Ok(ResponseBody::Links(
                self.store
                    .get_links(q.base.clone(), q.tag.clone(), q.status_mask)
                    .await?,
            )),
            b => Err(HdhtP2pError::UnexpectedMessageBodyType(b.msg_type())),
        }
    }

    // -- applying changes --

    /// The type and value of `hash`: from our own chain if we authored the
    /// change, else from its author, else from the peer that delivered it.
    async fn fetch_content(
        &self,
        hash: &EntryHash,
        origin: &PeerId,
        deliverer: &PeerInfo,
    ) -> HdhtP2pResult<EntryContent> {
        let content = if origin == self.id() {
            self.chain
                .get_entry(hash.clone())
                .await?
                .ok_or(HdhtP2pError::State(StateError::HashNotFound))?
        } else {
            let origin_info = self
                .routing
                .find(origin)
                .unwrap_or_else(|| PeerInfo::new(origin.clone(), vec![]));
            match self.remote_content(hash, origin_info).await {
                Ok(c) => c,
                Err(err) if &deliverer.id != origin && &deliverer.id != self.id() => {
                    tracing::debug!(?hash, ?err, "author unavailable, asking deliverer");
                    self.remote_content(hash, deliverer.clone()).await?
                }
                Err(err) => return Err(err),
            }
        };
        if &EntryHash::with_data(&content.value) != hash {
            return Err(format!("content for {} does not match its hash", hash).into());
        }
        Ok(content)
    }

    async fn remote_content(&self, hash: &EntryHash, peer: PeerInfo) -> HdhtP2pResult<EntryContent> {
        let body = Body::Get(GetReq {
            hash: hash.clone(),
            status_mask: StatusMask::ANY,
            field_mask: GetMask::ENTRY | GetMask::ENTRY_TYPE,
        });
        match self.requester.send(peer, body).await? {
            ResponseBody::Get(GetResult {
                entry: Some(value),
                entry_type: Some(entry_type),
                ..
            }) => Ok(EntryContent { entry_type, value }),
            ResponseBody::CloserPeers(_) => Err(HdhtP2pError::State(StateError::HashNotFound)),
            _ => Err(HdhtP2pError::UnexpectedMessageBodyType(MsgType::Get)),
        }
    }

    /// Apply a change message, once. A message whose fingerprint is already
    /// recorded is acknowledged without touching the store. The early check
    /// only saves a fetch and a validation; the store repeats it inside the
    /// write transaction, which is what keeps a change delivered twice at
    /// once from being recorded twice.
    pub async fn apply_change(&self, msg: &Message, deliverer: &PeerInfo) -> HdhtP2pResult<HoldCode> {
        if self.store.have_fingerprint(msg.fingerprint()?).await? {
            tracing::trace!(msg_type = %msg.msg_type(), "change already applied");
            return Ok(HoldCode::Ok);
        }
        let hold = msg
            .body
            .as_hold()
            .ok_or(HdhtP2pError::UnexpectedMessageBodyType(msg.msg_type()))?;

        let content = match msg.body {
            Body::Put(_) | Body::Link(_) => Some(
                self.fetch_content(&hold.entry_hash, &msg.from, deliverer)
                    .await?,
            ),
            _ => None,
        };
        let outcome = self.validator.validate(msg, content.as_ref()).await?;
        tracing::debug!(msg_type = %msg.msg_type(), key = ?hold.entry_hash, ?outcome, "applying change");

        match (&msg.body, content) {
            (Body::Put(h), Some(content)) => {
                let status = match outcome {
                    ValidationOutcome::Valid => EntryStatus::Live,
                    ValidationOutcome::Rejected => EntryStatus::Rejected,
                };
                self.store
                    .put(
                        Some(msg.clone()),
                        content.entry_type,
                        h.entry_hash.clone(),
                        Some(msg.from.clone()),
                        content.value,
                        status,
                    )
                    .await?;
            }
            _ if outcome == ValidationOutcome::Rejected => (),
            (Body::Del(h), _) => {
                self.store
                    .del(Some(msg.clone()), h.entry_hash.clone())
                    .await?;
            }
            (Body::Mod(h), _) => {
                let new_key = h
                    .related_hash
                    .clone()
                    .ok_or(HdhtP2pError::from("mod without a replacement hash"))?;
                self.store
                    .modify(Some(msg.clone()), h.entry_hash.clone(), new_key)
                    .await?;
            }
            (Body::Link(h), Some(content)) => {
                let spec = LinkSpec::decode(&content.value)?;
                // keep the link entry so it can be served onwards
                self.store
                    .put(
                        None,
                        content.entry_type,
                        h.entry_hash.clone(),
                        Some(msg.from.clone()),
                        content.value,
                        EntryStatus::Live,
                    )
                    .await?;
                match spec.action {
                    LinkAction::Add => {
                        self.store
                            .put_link(Some(msg.clone()), spec.base, spec.target, spec.tag)
                            .await?
                    }
                    LinkAction::Del => {
                        self.store
                            .del_link(Some(msg.clone()), spec.base, spec.target, spec.tag)
                            .await?
                    }
                }
            }
            _ => return Err(HdhtP2pError::UnexpectedMessageBodyType(msg.msg_type())),
        }
        Ok(match outcome {
            ValidationOutcome::Valid => HoldCode::Ok,
            ValidationOutcome::Rejected => HoldCode::Rejected,
        })
    }

    // -- retries --

    fn queue_retry(&self, msg: Message, deliverer: PeerInfo) {
        let attempts_left = self.tuning.retry_max_attempts;
        if attempts_left == 0 {
            return;
        }
        self.retry.lock().push_back(RetryItem {
            msg,
            deliverer,
            attempts_left,
        });
    }

    /// Changes waiting for a retry.
    pub fn retry_len(&self) -> usize {
        self.retry.lock().len()
    }

    /// Retry the oldest failed inbound change.
    pub async fn process_retry_once(&self) -> HdhtP2pResult<RetryOutcome> {
        let Some(mut item) = self.retry.lock().pop_front() else {
            return Ok(RetryOutcome::Empty);
        };
        match self.apply_change(&item.msg, &item.deliverer).await {
            Ok(_) => Ok(RetryOutcome::Applied),
            Err(err) => {
                item.attempts_left -= 1;
                if item.attempts_left == 0 {
                    tracing::debug!(?err, msg_type = %item.msg.msg_type(), "retries exhausted, dropping change");
                    Ok(RetryOutcome::Dropped)
                } else {
                    self.retry.lock().push_back(item);
                    Ok(RetryOutcome::Requeued)
                }
            }
        }
    }

    // -- inbound --

    async fn respond(&self, req: WireRequest) -> HdhtP2pResult<WireResponse> {
        let fingerprint = req.fingerprint.clone();
        let body = match self.dispatch(req).await {
            Ok(body) => body,
            Err(err) => ResponseBody::Err(WireError::from(&err)),
        };
        Ok(WireResponse {
            sender: self.peer_info().clone(),
            fingerprint,
            body,
        })
    }

    #[tracing::instrument(skip(self, req), fields(local = ?self.id(), from = ?req.sender.id, msg_type = %req.msg.msg_type()))]
    async fn dispatch(&self, req: WireRequest) -> HdhtP2pResult<ResponseBody> {
        req.check_fingerprint()?;
        let WireRequest { sender, msg, .. } = req;
        if self
            .store
            .is_in_list(PeerListType::Blocked, sender.id.clone())
            .await?
        {
            tracing::debug!("refusing blocked peer");
            return Err(HdhtP2pError::Blocked(sender.id));
        }
        self.routing.update(sender.clone());
        self.store.add_gossiper(sender.id.clone()).await?;

        match &msg.body {
            Body::Put(_) | Body::Del(_) | Body::Mod(_) | Body::Link(_) => {
                match self.apply_change(&msg, &sender).await {
                    Ok(code) => Ok(ResponseBody::Hold(Receipt::sign(&self.agent, &msg, code)?)),
                    Err(err) => {
                        tracing::info!(?err, "change failed, queued for retry");
                        self.queue_retry(msg, sender);
                        Err(err)
                    }
                }
            }
            Body::Get(req) => match self.local_get(req).await {
                Err(HdhtP2pError::State(StateError::HashNotFound)) => Ok(
                    ResponseBody::CloserPeers(self.closer_than_me(&req.hash, &sender.id)),
                ),
                r => Ok(ResponseBody::Get(r?)),
            },
            Body::GetLinks(q) => match self
                .store
                .get_links(q.base.clone(), q.tag.clone(), q.status_mask)
                .await
            {
                Err(StateError::HashNotFound) => Ok(ResponseBody::CloserPeers(
                    self.closer_than_me(&q.base, &sender.id),
                )),
                r => Ok(ResponseBody::Links(r?)),
            },
            Body::Gossip(g) => Ok(ResponseBody::Gossip(
                self.gossip.handle_gossip(&sender, *g).await?,
            )),
            Body::FindNode(f) => Ok(ResponseBody::CloserPeers(
                self.closer_than_me(&f.target, &sender.id),
            )),
        }
    }

    /// Our nearest peers to `target`, leaving out the asker.
    fn closer_than_me<T: hdht_hash::HashType>(
        &self,
        target: &hdht_hash::DhtHash<T>,
        asker: &PeerId,
    ) -> Vec<PeerInfo> {
        let mut peers = self
            .routing
            .nearest_peers(target, self.tuning.bucket_size + 1);
        peers.retain(|p| &p.id != asker);
        peers.truncate(self.tuning.bucket_size);
        peers
    }
}
