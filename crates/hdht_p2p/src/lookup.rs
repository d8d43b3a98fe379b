//! Iterative Kademlia lookup.

use crate::config::HdhtTuningParams;
use crate::routing::RoutingTable;
use crate::transport::DynHdhtTransport;
use crate::types::{BoxFut, HdhtP2pError, HdhtP2pResult};
use hdht_hash::Distance;
use hdht_types::prelude::*;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

/// What one peer said to a lookup query.
#[derive(Debug)]
pub enum QueryStep<T> {
    /// The answer. Ends the lookup.
    Found(T),
    /// No answer here; try these.
    Closer(Vec<PeerInfo>),
}

/// A per-peer query run by a lookup.
pub type QueryFn<T> = Arc<dyn Fn(PeerInfo) -> BoxFut<'static, HdhtP2pResult<QueryStep<T>>> + Send + Sync>;

struct Kill {
    closed: AtomicBool,
    kill: Notify,
}

impl Kill {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicBool::new(false),
            kill: Notify::new(),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::Acquire)
    }

    fn kill_all(&self) {
        self.closed
            .store(true, std::sync::atomic::Ordering::Release);
        self.kill.notify_waiters();
    }

    async fn wait(&self) {
        // register before checking so a concurrent kill_all is not missed
        let notified = self.kill.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.is_closed() {
            notified.await;
        }
    }
}

struct LookupState {
    /// Seen but not yet queried, nearest first.
    frontier: BTreeMap<Distance, PeerInfo>,
    /// Every peer ever added to the frontier.
    seen: HashMap<PeerId, PeerInfo>,
    in_flight: usize,
}

struct Shared<T> {
    target: AnyDhtHash,
    local: PeerId,
    state: Mutex<LookupState>,
    found: Mutex<Option<T>>,
    kill: Arc<Kill>,
    wake: Notify,
    sem: Arc<Semaphore>,
}

impl<T> Shared<T> {
    /// Add peers not seen before to the frontier. Returns how many were new.
    fn merge(&self, peers: impl IntoIterator<Item = PeerInfo>) -> usize {
        let mut state = self.state.lock();
        let mut added = 0;
        for p in peers {
            if p.id == self.local || state.seen.contains_key(&p.id) {
                continue;
            }
            state.seen.insert(p.id.clone(), p.clone());
            state.frontier.insert(self.target.distance_to(&p.id), p);
            added += 1;
        }
        added
    }

    fn seen_sorted(&self) -> Vec<PeerInfo> {
        let mut seen: Vec<PeerInfo> = self.state.lock().seen.values().cloned().collect();
        seen.sort_by_cached_key(|p| self.target.distance_to(&p.id));
        seen
    }
}

/// Marks a worker finished and wakes the driver, however the worker exits.
struct InFlight<T>(Arc<Shared<T>>);

impl<T> Drop for InFlight<T> {
    fn drop(&mut self) {
        self.0.state.lock().in_flight -= 1;
        self.0.wake.notify_one();
    }
}

/// Runs lookups against the peers of one routing table.
#[derive(Clone)]
pub struct Lookup {
    routing: Arc<RoutingTable>,
    transport: DynHdhtTransport,
    tuning: Arc<HdhtTuningParams>,
}

impl std::fmt::Debug for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lookup")
            .field("local", self.routing.local())
            .finish()
    }
}

impl Lookup {
    pub fn new(
        routing: Arc<RoutingTable>,
        transport: DynHdhtTransport,
        tuning: Arc<HdhtTuningParams>,
    ) -> Self {
        Self {
            routing,
            transport,
            tuning,
        }
    }

    /// Query peers from nearest to farthest from `target` until one answers.
    ///
    /// At most `lookup_alpha` queries run at once and every peer is queried
    /// at most once. Peers learned along the way are added to the routing
    /// table. If every reachable peer has been asked without an answer the
    /// result is [`HdhtP2pError::LookupFailure`] with every peer seen.
    #[tracing::instrument(skip(self, query), fields(local = ?self.routing.local()))]
    pub async fn run<T>(&self, target: AnyDhtHash, query: QueryFn<T>) -> HdhtP2pResult<T>
    where
        T: 'static + Send,
    {
        let shared = Arc::new(Shared {
            target: target.clone(),
            local: self.routing.local().clone(),
            state: Mutex::new(LookupState {
                frontier: BTreeMap::new(),
                seen: HashMap::new(),
                in_flight: 0,
            }),
            found: Mutex::new(None),
            kill: Kill::new(),
            wake: Notify::new(),
            sem: Arc::new(Semaphore::new(self.tuning.lookup_alpha.max(1))),
        });
        let seeds = self
            .routing
            .nearest_peers(&target, self.tuning.bucket_size);
        shared.merge(seeds);

        let mut workers = tokio::task::JoinSet::new();
        loop {
            let permit = tokio::select! {
                _ = shared.kill.wait() => break,
                p = shared.sem.clone().acquire_owned() => match p {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            let next = {
                let mut state = shared.state.lock();
                let next = state.frontier.pop_first().map(|(_, p)| p);
                if next.is_some() {
                    state.in_flight += 1;
                }
                (next, state.in_flight)
            };
            match next {
                (Some(peer), _) => {
                    workers.spawn(self.clone().worker(shared.clone(), peer, permit, query.clone()));
                }
                (None, 0) => break,
                (None, _) => {
                    drop(permit);
                    tokio::select! {
                        _ = shared.kill.wait() => break,
                        _ = shared.wake.notified() => (),
                    }
                }
            }
        }
        shared.kill.kill_all();
        workers.shutdown().await;

        let found = shared.found.lock().take();
        match found {
            Some(t) => Ok(t),
            None => {
                let seen = shared.seen_sorted();
                tracing::debug!(seen = seen.len(), "lookup exhausted");
                Err(HdhtP2pError::LookupFailure { seen })
            }
        }
    }

    async fn worker<T: 'static + Send>(
        self,
        shared: Arc<Shared<T>>,
        peer: PeerInfo,
        permit: OwnedSemaphorePermit,
        query: QueryFn<T>,
    ) {
        let _in_flight = InFlight(shared.clone());
        let mut permit = Some(permit);

        if !self.transport.is_connected(&peer.id) {
            // dial without holding a query slot
            drop(permit.take());
            let timeout = self.tuning.dial_timeout();
            let dialed = tokio::select! {
                _ = shared.kill.wait() => return,
                r = timeout.bound(self.transport.dial(peer.clone())) => r,
            };
            if let Err(err) = dialed {
                tracing::debug!(peer = ?peer.id, ?err, "lookup dial failed");
                return;
            }
            permit = tokio::select! {
                _ = shared.kill.wait() => return,
                p = shared.sem.clone().acquire_owned() => match p {
                    Ok(p) => Some(p),
                    Err(_) => return,
                },
            };
        }

        let timeout = self.tuning.request_timeout();
        let step = tokio::select! {
            _ = shared.kill.wait() => return,
            r = timeout.bound(query(peer.clone())) => r,
        };
        match step {
            Ok(QueryStep::Found(t)) => {
                tracing::trace!(peer = ?peer.id, "lookup found");
                *shared.found.lock() = Some(t);
                shared.kill.kill_all();
            }
            Ok(QueryStep::Closer(mut peers)) => {
                self.routing.update(peer.clone());
                peers.retain(|p| !self.routing.is_blocked(&p.id));
                for p in peers.iter() {
                    self.routing.update(p.clone());
                }
                let added = shared.merge(peers);
                tracing::trace!(peer = ?peer.id, added, "lookup closer peers");
            }
            Err(err) => {
                tracing::debug!(peer = ?peer.id, ?err, "lookup query failed");
            }
        }
        drop(permit);
    }

    /// The `count` peers nearest `target` found by asking peers for ever
    /// closer peers until no new ones turn up.
    pub async fn closest_peers(
        &self,
        target: AnyDhtHash,
        count: usize,
        query: QueryFn<()>,
    ) -> HdhtP2pResult<Vec<PeerInfo>> {
        match self.run(target, query).await {
            Ok(()) => Err("find node query must not report found".into()),
            Err(HdhtP2pError::LookupFailure { mut seen }) => {
                // a peer blocked while the lookup ran may still be in `seen`
                seen.retain(|p| !self.routing.is_blocked(&p.id));
                seen.truncate(count);
                Ok(seen)
            }
            Err(e) => Err(e),
        }
    }
}
