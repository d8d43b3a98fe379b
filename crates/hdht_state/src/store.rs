//! The async store API.

use crate::dump::StateDump;
use crate::error::{StateError, StateResult};
use crate::mutations;
use crate::query::{self, EntryRecord};
use hdht_hash::{EntryHash, MessageFingerprint, PeerId};
use hdht_sqlite::prelude::*;
use hdht_types::prelude::*;

#[cfg(test)]
mod tests;

/// Base entries links may hang off.
const LINKABLE: StatusMask = StatusMask(StatusMask::LIVE.0 | StatusMask::MODIFIED.0);

/// Status-tagged entry and link store for one node.
///
/// Every mutating call that carries a message appends exactly one change
/// log record and records the message's fingerprint; calls without a
/// message change state but are never gossiped. Writes serialize on the
/// database's exclusive transaction, and a message whose fingerprint is
/// already recorded is skipped inside that same transaction, so a change
/// arriving twice at once is applied once.
#[derive(Clone, Debug)]
pub struct DhtStore {
    db: DbWrite,
}

impl DhtStore {
    pub fn new(db: DbWrite) -> Self {
        Self { db }
    }

    /// In-memory store, for tests.
    pub fn test_in_mem(name: &str) -> StateResult<Self> {
        Ok(Self::new(DbWrite::test_in_mem(DbKind::Dht(name.to_string()))?))
    }

    pub fn db(&self) -> &DbWrite {
        &self.db
    }

    /// Write `value` under `key`. Re-putting an existing key overwrites its
    /// value, type and source and keeps its status.
    pub async fn put(
        &self,
        msg: Option<Message>,
        entry_type: impl Into<String>,
        key: EntryHash,
        source: Option<PeerId>,
        value: Vec<u8>,
        status: EntryStatus,
    ) -> StateResult<()> {
        let entry_type = entry_type.into();
        tracing::debug!(?key, %entry_type, ?status, "put");
        self.db
            .write_async(move |txn| -> StateResult<()> {
                if already_applied(txn, msg.as_ref())? {
                    return Ok(());
                }
                mutations::upsert_entry(txn, &key, &value, &entry_type, source.as_ref(), status)?;
                if let Some(msg) = &msg {
                    mutations::record_change(txn, msg)?;
                }
                Ok(())
            })
            .await
    }

    /// Mark `key` deleted. Only a Live entry changes status.
    pub async fn del(&self, msg: Option<Message>, key: EntryHash) -> StateResult<()> {
        tracing::debug!(?key, "del");
        self.db
            .write_async(move |txn| -> StateResult<()> {
                if already_applied(txn, msg.as_ref())? {
                    return Ok(());
                }
                let entry = query::get_entry(txn, &key)?.ok_or(StateError::HashNotFound)?;
                if entry.status == EntryStatus::Live {
                    mutations::set_status(txn, &key, EntryStatus::Deleted)?;
                }
                if let Some(msg) = &msg {
                    mutations::record_change(txn, msg)?;
                }
                Ok(())
            })
            .await
    }

    /// Mark `key` replaced by `new_key` and link the two under
    /// [`SYS_TAG_REPLACED_BY`]. Only a Live entry changes status.
    pub async fn modify(
        &self,
        msg: Option<Message>,
        key: EntryHash,
        new_key: EntryHash,
    ) -> StateResult<()> {
        tracing::debug!(?key, ?new_key, "mod");
        self.db
            .write_async(move |txn| -> StateResult<()> {
                if already_applied(txn, msg.as_ref())? {
                    return Ok(());
                }
                let entry = query::get_entry(txn, &key)?.ok_or(StateError::HashNotFound)?;
                if entry.status == EntryStatus::Live {
                    mutations::set_replaced_by(txn, &key, &new_key)?;
                    mutations::insert_link_event(
                        txn,
                        &key,
                        &new_key,
                        SYS_TAG_REPLACED_BY,
                        &LinkEvent {
                            status: EntryStatus::Live,
                            source: msg.as_ref().map(|m| m.from.clone()),
                            link_hash: Some(new_key.clone()),
                        },
                    )?;
                }
                if let Some(msg) = &msg {
                    mutations::record_change(txn, msg)?;
                }
                Ok(())
            })
            .await
    }

    /// `Ok` if `key` would be returned by a get with `status_mask`.
    pub async fn exists(&self, key: EntryHash, status_mask: StatusMask) -> StateResult<()> {
        self.get(key, status_mask, GetMask::DEFAULT).await.map(|_| ())
    }

    /// The peer `key` was received from.
    pub async fn source(&self, key: EntryHash) -> StateResult<PeerId> {
        self.db
            .read_async(move |txn| -> StateResult<PeerId> {
                query::get_entry(txn, &key)?
                    .and_then(|e| e.source)
                    .ok_or(StateError::HashNotFound)
            })
            .await
    }

    /// Read `key`. See [`query::resolve`] for the status rules.
    pub async fn get(
        &self,
        key: EntryHash,
        status_mask: StatusMask,
        field_mask: GetMask,
    ) -> StateResult<GetResult> {
        self.db
            .read_async(move |txn| -> StateResult<GetResult> {
                let entry = query::get_entry(txn, &key)?.ok_or(StateError::HashNotFound)?;
                query::resolve(entry, status_mask, field_mask)
            })
            .await
    }

    /// Append a Live event for `(base, target, tag)`. The base must be Live
    /// or Modified. Adding a link whose latest event is Deleted brings it back.
    pub async fn put_link(
        &self,
        msg: Option<Message>,
        base: EntryHash,
        target: EntryHash,
        tag: impl Into<String>,
    ) -> StateResult<()> {
        self.link_event(msg, base, target, tag.into(), EntryStatus::Live)
            .await
    }

    /// Append a Deleted event for `(base, target, tag)`. The link must have
    /// at least one earlier event.
    pub async fn del_link(
        &self,
        msg: Option<Message>,
        base: EntryHash,
        target: EntryHash,
        tag: impl Into<String>,
    ) -> StateResult<()> {
        self.link_event(msg, base, target, tag.into(), EntryStatus::Deleted)
            .await
    }

    async fn link_event(
        &self,
        msg: Option<Message>,
        base: EntryHash,
        target: EntryHash,
        tag: String,
        status: EntryStatus,
    ) -> StateResult<()> {
        tracing::debug!(?base, ?target, %tag, ?status, "link");
        self.db
            .write_async(move |txn| -> StateResult<()> {
                if already_applied(txn, msg.as_ref())? {
                    return Ok(());
                }
                query::require_status(txn, &base, LINKABLE)?;
                if status == EntryStatus::Deleted
                    && !query::link_exists(txn, &base, &target, &tag)?
                {
                    return Err(StateError::LinkNotFound);
                }
                let event = LinkEvent {
                    status,
                    source: msg.as_ref().map(|m| m.from.clone()),
                    link_hash: msg
                        .as_ref()
                        .and_then(|m| m.body.as_hold())
                        .map(|h| h.entry_hash.clone()),
                };
                mutations::insert_link_event(txn, &base, &target, &tag, &event)?;
                if let Some(msg) = &msg {
                    mutations::record_change(txn, msg)?;
                }
                Ok(())
            })
            .await
    }

    /// Links under `base` with `tag` (all tags when empty) whose latest event
    /// status is in `status_mask`, in order of first association.
    pub async fn get_links(
        &self,
        base: EntryHash,
        tag: impl Into<String>,
        status_mask: StatusMask,
    ) -> StateResult<Vec<TaggedHash>> {
        let tag = tag.into();
        self.db
            .read_async(move |txn| -> StateResult<Vec<TaggedHash>> {
                query::require_status(txn, &base, LINKABLE)?;
                query::get_links(txn, &base, &tag, status_mask)
            })
            .await
    }

    /// The latest change index; 0 before any change.
    pub async fn get_idx(&self) -> StateResult<u64> {
        self.db
            .read_async(|txn| -> StateResult<u64> { query::current_idx(txn) })
            .await
    }

    /// The message that produced change `idx`.
    pub async fn get_idx_message(&self, idx: u64) -> StateResult<Message> {
        self.db
            .read_async(move |txn| -> StateResult<Message> { query::get_change(txn, idx) })
            .await
    }

    /// All change records with index `>= since`, ascending.
    pub async fn get_puts(&self, since: u64) -> StateResult<Vec<Put>> {
        self.db
            .read_async(move |txn| -> StateResult<Vec<Put>> { query::changes_since(txn, since) })
            .await
    }

    pub async fn have_fingerprint(&self, f: MessageFingerprint) -> StateResult<bool> {
        Ok(self.get_fingerprint(f).await?.is_some())
    }

    /// The change index that first applied the message with fingerprint `f`.
    pub async fn get_fingerprint(&self, f: MessageFingerprint) -> StateResult<Option<u64>> {
        self.db
            .read_async(move |txn| -> StateResult<Option<u64>> { query::get_fingerprint(txn, &f) })
            .await
    }

    /// Visit every entry in ascending hash order until `f` returns false.
    pub async fn iterate<F>(&self, mut f: F) -> StateResult<usize>
    where
        F: FnMut(EntryRecord) -> bool + Send + 'static,
    {
        self.db
            .read_async(move |txn| -> StateResult<usize> { query::iterate_entries(txn, &mut f) })
            .await
    }

    /// The cursor for `peer`, `None` if it is not a known gossiper.
    pub async fn get_gossiper(&self, peer: PeerId) -> StateResult<Option<u64>> {
        self.db
            .read_async(move |txn| -> StateResult<Option<u64>> { query::get_gossiper(txn, &peer) })
            .await
    }

    /// Start tracking `peer` at cursor 0. A known peer keeps its cursor.
    pub async fn add_gossiper(&self, peer: PeerId) -> StateResult<()> {
        self.update_gossiper(peer, 0).await
    }

    /// Raise the cursor for `peer`. Lower values are ignored, and a blocked
    /// peer is removed instead of tracked.
    pub async fn update_gossiper(&self, peer: PeerId, idx: u64) -> StateResult<()> {
        self.db
            .write_async(move |txn| -> StateResult<()> {
                if query::peer_in_list(txn, PeerListType::Blocked, &peer)? {
                    tracing::debug!(?peer, "not tracking blocked gossiper");
                    return mutations::delete_gossiper(txn, &peer);
                }
                mutations::update_gossiper(txn, &peer, idx)
            })
            .await
    }

    pub async fn delete_gossiper(&self, peer: PeerId) -> StateResult<()> {
        self.db
            .write_async(move |txn| -> StateResult<()> { mutations::delete_gossiper(txn, &peer) })
            .await
    }

    /// Every known gossiper with its cursor, ascending by peer id.
    pub async fn get_gossipers(&self) -> StateResult<Vec<(PeerId, u64)>> {
        self.db
            .read_async(|txn| -> StateResult<Vec<(PeerId, u64)>> { query::all_gossipers(txn) })
            .await
    }

    /// Add peers to a list. Blocking a peer also drops its gossip cursor.
    pub async fn add_to_list(
        &self,
        list_type: PeerListType,
        records: Vec<PeerRecord>,
    ) -> StateResult<()> {
        self.db
            .write_async(move |txn| -> StateResult<()> {
                for record in records.iter() {
                    mutations::insert_peer_record(txn, list_type, record)?;
                    if list_type == PeerListType::Blocked {
                        mutations::delete_gossiper(txn, &record.id)?;
                    }
                }
                Ok(())
            })
            .await
    }

    pub async fn get_list(&self, list_type: PeerListType) -> StateResult<Vec<PeerRecord>> {
        self.db
            .read_async(move |txn| -> StateResult<Vec<PeerRecord>> {
                query::get_peer_list(txn, list_type)
            })
            .await
    }

    pub async fn is_in_list(&self, list_type: PeerListType, peer: PeerId) -> StateResult<bool> {
        self.db
            .read_async(move |txn| -> StateResult<bool> {
                query::peer_in_list(txn, list_type, &peer)
            })
            .await
    }

    /// Snapshot of the whole store for diagnostics.
    pub async fn dump(&self) -> StateResult<StateDump> {
        self.db
            .read_async(|txn| -> StateResult<StateDump> { StateDump::collect(txn) })
            .await
    }
}

/// True when `msg` was already recorded by an earlier write.
fn already_applied(txn: &Transaction, msg: Option<&Message>) -> StateResult<bool> {
    let Some(msg) = msg else {
        return Ok(false);
    };
    let fingerprint = msg.fingerprint()?;
    match query::get_fingerprint(txn, &fingerprint)? {
        Some(idx) => {
            tracing::debug!(idx, ?fingerprint, "change already applied");
            Ok(true)
        }
        None => Ok(false),
    }
}
