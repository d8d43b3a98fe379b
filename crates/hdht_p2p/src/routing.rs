//! Kademlia routing table.
//!
//! Buckets are indexed by the length of the common prefix a peer shares with
//! the local id. Only the last bucket splits; any other full bucket drops
//! its least recently seen peer to make room.

use hdht_hash::{DhtHash, HashType, HASH_CORE_LEN};
use hdht_types::prelude::*;
use parking_lot::RwLock;
use std::collections::HashSet;

/// The most buckets a table can hold: one per bit of the hash core.
const MAX_BUCKETS: usize = HASH_CORE_LEN * 8;

/// What [`RoutingTable::update`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingUpdate {
    /// A new peer went to the front of its bucket.
    Inserted,
    /// A known peer moved to the front of its bucket.
    Promoted,
    /// A new peer was inserted and this least recently seen peer was dropped.
    Evicted(PeerInfo),
    /// The peer is the local node or blocked and was not stored.
    Ignored,
}

/// XOR metric routing table. Most recently seen peers are at the front of
/// each bucket. Blocked peers are never stored, however they are learned.
#[derive(Debug)]
pub struct RoutingTable {
    local: PeerId,
    bucket_size: usize,
    buckets: RwLock<Vec<Vec<PeerInfo>>>,
    blocked: RwLock<HashSet<PeerId>>,
}

impl RoutingTable {
    pub fn new(local: PeerId, bucket_size: usize) -> Self {
        Self {
            local,
            bucket_size: bucket_size.max(1),
            buckets: RwLock::new(vec![Vec::new()]),
            blocked: RwLock::new(HashSet::new()),
        }
    }

    pub fn local(&self) -> &PeerId {
        &self.local
    }

    fn cpl<T: HashType>(&self, id: &DhtHash<T>) -> usize {
        self.local.distance_to(id).common_prefix_len()
    }

    fn bucket_index(cpl: usize, bucket_count: usize) -> usize {
        cpl.min(bucket_count - 1)
    }

    /// Insert `peer`, or move it to the front of its bucket if known.
    pub fn update(&self, peer: PeerInfo) -> RoutingUpdate {
        if peer.id == self.local || self.is_blocked(&peer.id) {
            return RoutingUpdate::Ignored;
        }
        let cpl = self.cpl(&peer.id);
        let mut buckets = self.buckets.write();
        loop {
            let count = buckets.len();
            let idx = Self::bucket_index(cpl, count);
            let bucket = &mut buckets[idx];

            if let Some(pos) = bucket.iter().position(|p| p.id == peer.id) {
                bucket.remove(pos);
                bucket.insert(0, peer);
                return RoutingUpdate::Promoted;
            }

            if bucket.len() < self.bucket_size {
                tracing::trace!(peer = ?peer.id, bucket = idx, "routing insert");
                bucket.insert(0, peer);
                return RoutingUpdate::Inserted;
            }

            if idx == count - 1 && count < MAX_BUCKETS {
                Self::split_last(&self.local, &mut buckets);
                continue;
            }

            let evicted = bucket.pop();
            bucket.insert(0, peer);
            return match evicted {
                Some(evicted) => {
                    tracing::trace!(peer = ?evicted.id, bucket = idx, "routing evict");
                    RoutingUpdate::Evicted(evicted)
                }
                None => RoutingUpdate::Inserted,
            };
        }
    }

    /// Move the peers of the last bucket that share a longer prefix with the
    /// local id into a new last bucket, keeping their order.
    fn split_last(local: &PeerId, buckets: &mut Vec<Vec<PeerInfo>>) {
        let idx = buckets.len() - 1;
        let (stay, go): (Vec<_>, Vec<_>) = buckets[idx]
            .drain(..)
            .partition(|p| local.distance_to(&p.id).common_prefix_len() <= idx);
        buckets[idx] = stay;
        buckets.push(go);
        tracing::trace!(buckets = buckets.len(), "routing split");
    }

    /// Forget `id`. Returns whether it was known.
    pub fn remove(&self, id: &PeerId) -> bool {
        let cpl = self.cpl(id);
        let mut buckets = self.buckets.write();
        let idx = Self::bucket_index(cpl, buckets.len());
        let bucket = &mut buckets[idx];
        match bucket.iter().position(|p| &p.id == id) {
            Some(pos) => {
                bucket.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Forget `id` and refuse to store it again.
    pub fn block(&self, id: PeerId) {
        self.remove(&id);
        tracing::debug!(peer = ?id, "routing block");
        self.blocked.write().insert(id);
    }

    pub fn is_blocked(&self, id: &PeerId) -> bool {
        self.blocked.read().contains(id)
    }

    /// Up to `count` peers ordered by ascending XOR distance to `target`.
    ///
    /// Starts at the bucket `target` falls in and widens to its neighbours
    /// until enough peers are collected.
    pub fn nearest_peers<T: HashType>(&self, target: &DhtHash<T>, count: usize) -> Vec<PeerInfo> {
        if count == 0 {
            return Vec::new();
        }
        let buckets = self.buckets.read();
        let start = Self::bucket_index(self.cpl(target), buckets.len());

        let mut out: Vec<PeerInfo> = buckets[start].clone();
        let mut lo = start;
        let mut hi = start + 1;
        while out.len() < count && (lo > 0 || hi < buckets.len()) {
            if hi < buckets.len() {
                out.extend(buckets[hi].iter().cloned());
                hi += 1;
            }
            if lo > 0 {
                lo -= 1;
                out.extend(buckets[lo].iter().cloned());
            }
        }
        drop(buckets);

        out.sort_by_cached_key(|p| target.distance_to(&p.id));
        out.truncate(count);
        out
    }

    /// `id`, if it is in the table.
    pub fn find(&self, id: &PeerId) -> Option<PeerInfo> {
        self.nearest_peers(id, 1)
            .into_iter()
            .next()
            .filter(|p| &p.id == id)
    }

    /// Number of peers held.
    pub fn size(&self) -> usize {
        self.buckets.read().iter().map(Vec::len).sum()
    }

    /// Every peer, bucket by bucket.
    pub fn list_peers(&self) -> Vec<PeerInfo> {
        self.buckets.read().iter().flatten().cloned().collect()
    }

    /// Peer count of each bucket.
    pub fn bucket_sizes(&self) -> Vec<usize> {
        self.buckets.read().iter().map(Vec::len).collect()
    }
}
