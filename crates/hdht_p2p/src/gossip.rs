//! Pairwise anti-entropy over the change log.
//!
//! Each node keeps, per known peer, the highest index of that peer's change
//! log it has pulled. A round asks a peer for everything after that cursor,
//! replays what we haven't seen (by message fingerprint) through the
//! replay queue and advances the cursor. A peer that learns from a request
//! that the requester is ahead of it answers with a round of its own.

use crate::config::HdhtTuningParams;
use crate::identity::HoldCode;
use crate::routing::RoutingTable;
use crate::transport::Requester;
use crate::types::{HdhtP2pError, HdhtP2pResult};
use crate::wire::{GossipResp, ResponseBody};
use hdht_state::prelude::*;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A received change waiting to be applied by the replay consumer.
#[derive(Debug)]
pub struct ReplayJob {
    /// The record as the peer logged it.
    pub put: Put,
    /// The peer it came from.
    pub from: PeerInfo,
    /// Receives the outcome once applied.
    pub done: oneshot::Sender<HdhtP2pResult<HoldCode>>,
}

/// What one gossip round did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GossipReport {
    /// Records the peer sent.
    pub received: usize,
    /// Records applied.
    pub applied: usize,
    /// Records skipped because their message was already applied.
    pub skipped: usize,
    /// Records that failed to apply. They wait in the retry queue.
    pub failed: usize,
    /// Our cursor for the peer after the round.
    pub cursor: u64,
}

/// The gossip engine of one node.
pub struct DhtGossip {
    requester: Requester,
    store: DhtStore,
    routing: Arc<RoutingTable>,
    tuning: Arc<HdhtTuningParams>,
    gossip_with_tx: mpsc::Sender<PeerId>,
    replay_tx: mpsc::Sender<ReplayJob>,
    // one round at a time
    round: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for DhtGossip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhtGossip")
            .field("local", &self.requester.local().id)
            .finish()
    }
}

impl DhtGossip {
    pub fn new(
        requester: Requester,
        store: DhtStore,
        routing: Arc<RoutingTable>,
        tuning: Arc<HdhtTuningParams>,
        gossip_with_tx: mpsc::Sender<PeerId>,
        replay_tx: mpsc::Sender<ReplayJob>,
    ) -> Self {
        Self {
            requester,
            store,
            routing,
            tuning,
            gossip_with_tx,
            replay_tx,
            round: tokio::sync::Mutex::new(()),
        }
    }

    fn peer_info(&self, id: &PeerId) -> PeerInfo {
        self.routing
            .find(id)
            .unwrap_or_else(|| PeerInfo::new(id.clone(), vec![]))
    }

    /// Run one round with `peer`.
    #[tracing::instrument(skip(self), fields(local = ?self.requester.local().id))]
    pub async fn gossip_with(&self, peer: PeerId) -> HdhtP2pResult<GossipReport> {
        let _round = self.round.lock().await;

        if self.store.is_in_list(PeerListType::Blocked, peer.clone()).await? {
            return Err(HdhtP2pError::Blocked(peer));
        }
        let cursor = match self.store.get_gossiper(peer.clone()).await? {
            Some(cursor) => cursor,
            None => {
                self.store.add_gossiper(peer.clone()).await?;
                0
            }
        };
        let my_idx = self.store.get_idx().await?;
        let info = self.peer_info(&peer);

        let body = self
            .requester
            .send(
                info.clone(),
                Body::Gossip(GossipReq {
                    my_idx,
                    your_idx: cursor + 1,
                }),
            )
            .await?;
        let puts = match body {
            ResponseBody::Gossip(GossipResp { puts }) => puts,
            _ => return Err(HdhtP2pError::UnexpectedMessageBodyType(MsgType::Gossip)),
        };

        let mut report = GossipReport {
            received: puts.len(),
            cursor,
            ..Default::default()
        };
        for put in puts {
            let idx = put.idx;
            if self.store.have_fingerprint(put.message.fingerprint()?).await? {
                report.skipped += 1;
            } else {
                let (done, applied) = oneshot::channel();
                self.replay_tx
                    .send(ReplayJob {
                        put,
                        from: info.clone(),
                        done,
                    })
                    .await
                    .map_err(|_| HdhtP2pError::from("replay queue closed"))?;
                match applied.await {
                    Ok(Ok(_)) => report.applied += 1,
                    // the replay consumer has queued it for retry
                    Ok(Err(err)) => {
                        tracing::warn!(?peer, idx, ?err, "gossip replay failed");
                        report.failed += 1;
                    }
                    Err(_) => return Err("replay consumer dropped the job".into()),
                }
            }
            report.cursor = report.cursor.max(idx);
        }

        if report.cursor > cursor {
            self.store.update_gossiper(peer.clone(), report.cursor).await?;
        }
        tracing::debug!(?peer, ?report, "gossip round done");
        Ok(report)
    }

    /// Answer a gossip request from `from`.
    ///
    /// Returns every change record from `your_idx` on. When `from` reports a
    /// change index past our cursor for it, a reciprocal round is scheduled
    /// after a delay that grows with the size of the answer.
    pub async fn handle_gossip(&self, from: &PeerInfo, req: GossipReq) -> HdhtP2pResult<GossipResp> {
        let puts = self.store.get_puts(req.your_idx.max(1)).await?;
        let cursor = self
            .store
            .get_gossiper(from.id.clone())
            .await?
            .unwrap_or(0);
        if req.my_idx > cursor {
            let delay = self.tuning.reciprocal_delay(puts.len());
            let tx = self.gossip_with_tx.clone();
            let peer = from.id.clone();
            tracing::trace!(?peer, ?delay, "scheduling reciprocal gossip");
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(err) = tx.try_send(peer) {
                    tracing::debug!(?err, "reciprocal gossip not queued");
                }
            });
        }
        Ok(GossipResp { puts })
    }

    /// Queue a round with `peer`.
    pub async fn request_gossip(&self, peer: PeerId) -> HdhtP2pResult<()> {
        self.gossip_with_tx
            .send(peer)
            .await
            .map_err(|_| HdhtP2pError::from("gossip queue closed"))
    }

    /// The peers a periodic round may pick: known gossipers that are in the
    /// routing table, limited to the `redundancy_factor` nearest when set.
    pub async fn candidates(&self) -> HdhtP2pResult<Vec<PeerInfo>> {
        let mut out = Vec::new();
        for (id, _) in self.store.get_gossipers().await? {
            if let Some(info) = self.routing.find(&id) {
                out.push(info);
            }
        }
        let redundancy = self.tuning.redundancy_factor;
        if redundancy > 0 {
            let local = &self.requester.local().id;
            let near: Vec<PeerId> = self
                .routing
                .nearest_peers(local, redundancy)
                .into_iter()
                .map(|p| p.id)
                .collect();
            out.retain(|p| near.contains(&p.id));
        }
        Ok(out)
    }

    /// Pick a random candidate.
    pub async fn pick_gossiper(&self) -> HdhtP2pResult<PeerId> {
        let candidates = self.candidates().await?;
        candidates
            .choose(&mut rand::thread_rng())
            .map(|p| p.id.clone())
            .ok_or(HdhtP2pError::NoGossipersAvailable)
    }

    /// One periodic round with a random candidate.
    pub async fn gossip(&self) -> HdhtP2pResult<GossipReport> {
        let peer = self.pick_gossiper().await?;
        self.gossip_with(peer).await
    }
}
