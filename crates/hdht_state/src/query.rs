//! Read-side queries over an open transaction.
//!
//! Everything here is synchronous and runs inside the closure handed to
//! `DbWrite::read_async` / `write_async`.

use crate::error::{StateError, StateResult};
use hdht_hash::{EntryHash, MessageFingerprint, PeerId};
use hdht_sqlite::prelude::*;
use hdht_sqlite::rusqlite::Row;
use hdht_types::prelude::*;
use serde::{Deserialize, Serialize};

/// One stored entry, all columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub hash: EntryHash,
    pub value: Vec<u8>,
    pub entry_type: String,
    pub source: Option<PeerId>,
    pub status: EntryStatus,
    pub replaced_by: Option<EntryHash>,
}

/// One row of link history, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEventRecord {
    pub base: EntryHash,
    pub target: EntryHash,
    pub tag: String,
    pub event: LinkEvent,
}

pub(crate) fn status_from_sql(v: i64) -> StateResult<EntryStatus> {
    u8::try_from(v)
        .ok()
        .and_then(EntryStatus::from_bits)
        .ok_or(StateError::BadStatus(v))
}

pub(crate) fn hash_from_sql<T: hdht_hash::PrimitiveHashType>(
    bytes: Vec<u8>,
) -> StateResult<hdht_hash::DhtHash<T>> {
    Ok(hdht_hash::DhtHash::from_raw_39(bytes)?)
}

fn opt_hash_from_sql<T: hdht_hash::PrimitiveHashType>(
    bytes: Option<Vec<u8>>,
) -> StateResult<Option<hdht_hash::DhtHash<T>>> {
    bytes.map(hash_from_sql).transpose()
}

type EntryColumns = (Vec<u8>, Vec<u8>, String, Option<Vec<u8>>, i64, Option<Vec<u8>>);

fn entry_columns(row: &Row) -> hdht_sqlite::rusqlite::Result<EntryColumns> {
    Ok((
        row.get("hash")?,
        row.get("value")?,
        row.get("entry_type")?,
        row.get("source")?,
        row.get("status")?,
        row.get("replaced_by")?,
    ))
}

fn entry_from_columns(
    (hash, value, entry_type, source, status, replaced_by): EntryColumns,
) -> StateResult<EntryRecord> {
    Ok(EntryRecord {
        hash: hash_from_sql(hash)?,
        value,
        entry_type,
        source: opt_hash_from_sql(source)?,
        status: status_from_sql(status)?,
        replaced_by: opt_hash_from_sql(replaced_by)?,
    })
}

/// Fetch the full record for `key`, if held.
pub fn get_entry(txn: &Transaction, key: &EntryHash) -> StateResult<Option<EntryRecord>> {
    let row = txn
        .query_row(
            sql_dht::GET_ENTRY,
            named_params! { ":hash": key.get_raw_39() },
            |row| -> hdht_sqlite::rusqlite::Result<EntryColumns> {
                Ok((
                    key.get_raw_39().to_vec(),
                    row.get("value")?,
                    row.get("entry_type")?,
                    row.get("source")?,
                    row.get("status")?,
                    row.get("replaced_by")?,
                ))
            },
        )
        .optional()?;
    row.map(entry_from_columns).transpose()
}

/// Apply the read rules to a record.
///
/// With [`StatusMask::DEFAULT`], Deleted, Modified and Rejected records
/// become their own errors; `HashModified` carries the replacement so the
/// caller can follow it. With an explicit mask the record is returned only
/// when its status is in the mask.
pub fn resolve(
    record: EntryRecord,
    status_mask: StatusMask,
    field_mask: GetMask,
) -> StateResult<GetResult> {
    if status_mask.is_default() {
        match record.status {
            EntryStatus::Live => (),
            EntryStatus::Deleted => return Err(StateError::HashDeleted),
            EntryStatus::Rejected => return Err(StateError::HashRejected),
            EntryStatus::Modified => {
                return Err(match record.replaced_by {
                    Some(new) => StateError::HashModified(new),
                    None => StateError::HashNotFound,
                })
            }
        }
    } else if !status_mask.matches(record.status) {
        return Err(StateError::HashNotFound);
    }

    Ok(GetResult {
        entry: field_mask.entry().then_some(record.value),
        entry_type: field_mask.entry_type().then_some(record.entry_type),
        sources: if field_mask.sources() {
            record.source.into_iter().collect()
        } else {
            Vec::new()
        },
        status: record.status,
    })
}

/// Error unless `key` is held with a status in `mask`.
pub fn require_status(txn: &Transaction, key: &EntryHash, mask: StatusMask) -> StateResult<EntryRecord> {
    match get_entry(txn, key)? {
        Some(e) if mask.matches(e.status) => Ok(e),
        _ => Err(StateError::HashNotFound),
    }
}

/// Visit every entry in ascending hash order until `f` returns false.
/// Returns the number of entries visited.
pub fn iterate_entries<F>(txn: &Transaction, f: &mut F) -> StateResult<usize>
where
    F: FnMut(EntryRecord) -> bool,
{
    let mut stmt = txn.prepare(sql_dht::ITERATE_ENTRIES)?;
    let mut rows = stmt.query([])?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        count += 1;
        if !f(entry_from_columns(entry_columns(row)?)?) {
            break;
        }
    }
    Ok(count)
}

pub fn current_idx(txn: &Transaction) -> StateResult<u64> {
    let idx: i64 = txn.query_row(sql_dht::CURRENT_IDX, [], |row| row.get(0))?;
    Ok(idx as u64)
}

pub fn get_change(txn: &Transaction, idx: u64) -> StateResult<Message> {
    let bytes: Option<Vec<u8>> = txn
        .query_row(
            sql_dht::GET_CHANGE,
            named_params! { ":idx": idx as i64 },
            |row| row.get(0),
        )
        .optional()?;
    let bytes = bytes.ok_or(StateError::NoSuchChangeIndex(idx))?;
    Ok(Message::decode(&bytes)?)
}

pub fn changes_since(txn: &Transaction, since: u64) -> StateResult<Vec<Put>> {
    let mut stmt = txn.prepare(sql_dht::CHANGES_SINCE)?;
    let rows = stmt.query_map(named_params! { ":since": since as i64 }, |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (idx, bytes) = row?;
        out.push(Put {
            idx: idx as u64,
            message: Message::decode(&bytes)?,
        });
    }
    Ok(out)
}

pub fn get_fingerprint(txn: &Transaction, f: &MessageFingerprint) -> StateResult<Option<u64>> {
    let idx: Option<i64> = txn
        .query_row(
            sql_dht::GET_FINGERPRINT,
            named_params! { ":fingerprint": f.get_raw_39() },
            |row| row.get(0),
        )
        .optional()?;
    Ok(idx.map(|i| i as u64))
}

pub fn link_exists(
    txn: &Transaction,
    base: &EntryHash,
    target: &EntryHash,
    tag: &str,
) -> StateResult<bool> {
    Ok(txn.query_row(
        sql_dht::LINK_EXISTS,
        named_params! {
            ":base": base.get_raw_39(),
            ":target": target.get_raw_39(),
            ":tag": tag,
        },
        |row| row.get(0),
    )?)
}

/// Links under `base` whose latest event matches `mask`, in order of the
/// first event recorded for each (target, tag).
pub fn get_links(
    txn: &Transaction,
    base: &EntryHash,
    tag: &str,
    mask: StatusMask,
) -> StateResult<Vec<TaggedHash>> {
    // links have no default resolution, the sentinel reads as Live
    let mask = if mask.is_default() {
        StatusMask::LIVE
    } else {
        mask
    };
    let mut stmt = txn.prepare(sql_dht::GET_LINKS)?;
    let rows = stmt.query_map(
        named_params! {
            ":base": base.get_raw_39(),
            ":tag": tag,
            ":status_mask": mask.0 as i64,
        },
        |row| {
            Ok((
                row.get::<_, Vec<u8>>("target")?,
                row.get::<_, String>("tag")?,
                row.get::<_, Option<Vec<u8>>>("source")?,
            ))
        },
    )?;
    let mut out = Vec::new();
    for row in rows {
        let (target, tag, source) = row?;
        out.push(TaggedHash {
            hash: hash_from_sql(target)?,
            tag,
            source: opt_hash_from_sql(source)?,
        });
    }
    Ok(out)
}

pub fn all_link_events(txn: &Transaction) -> StateResult<Vec<LinkEventRecord>> {
    let mut stmt = txn.prepare(sql_dht::ALL_LINK_EVENTS)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, Vec<u8>>("base")?,
            row.get::<_, Vec<u8>>("target")?,
            row.get::<_, String>("tag")?,
            row.get::<_, i64>("status")?,
            row.get::<_, Option<Vec<u8>>>("source")?,
            row.get::<_, Option<Vec<u8>>>("link_hash")?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (base, target, tag, status, source, link_hash) = row?;
        out.push(LinkEventRecord {
            base: hash_from_sql(base)?,
            target: hash_from_sql(target)?,
            tag,
            event: LinkEvent {
                status: status_from_sql(status)?,
                source: opt_hash_from_sql(source)?,
                link_hash: opt_hash_from_sql(link_hash)?,
            },
        });
    }
    Ok(out)
}

pub fn get_gossiper(txn: &Transaction, peer: &PeerId) -> StateResult<Option<u64>> {
    let idx: Option<i64> = txn
        .query_row(
            sql_dht::gossiper::GET,
            named_params! { ":peer": peer.get_raw_39() },
            |row| row.get(0),
        )
        .optional()?;
    Ok(idx.map(|i| i as u64))
}

pub fn all_gossipers(txn: &Transaction) -> StateResult<Vec<(PeerId, u64)>> {
    let mut stmt = txn.prepare(sql_dht::gossiper::ALL)?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (peer, idx) = row?;
        out.push((hash_from_sql(peer)?, idx as u64));
    }
    Ok(out)
}

pub fn get_peer_list(txn: &Transaction, list_type: PeerListType) -> StateResult<Vec<PeerRecord>> {
    let mut stmt = txn.prepare(sql_dht::peer_list::GET)?;
    let rows = stmt.query_map(named_params! { ":list_type": list_type.as_str() }, |row| {
        Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (peer, warrant) = row?;
        out.push(PeerRecord {
            id: hash_from_sql(peer)?,
            warrant,
        });
    }
    Ok(out)
}

pub fn peer_in_list(txn: &Transaction, list_type: PeerListType, peer: &PeerId) -> StateResult<bool> {
    Ok(txn.query_row(
        sql_dht::peer_list::CONTAINS,
        named_params! {
            ":list_type": list_type.as_str(),
            ":peer": peer.get_raw_39(),
        },
        |row| row.get(0),
    )?)
}
