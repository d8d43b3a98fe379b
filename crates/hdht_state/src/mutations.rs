//! Write-side statements over an open exclusive transaction.

use crate::error::StateResult;
use crate::query;
use hdht_hash::{EntryHash, MessageFingerprint, PeerId};
use hdht_sqlite::prelude::*;
use hdht_types::prelude::*;

#[macro_export]
macro_rules! sql_insert {
    ($txn:expr, $table:ident, { $($field:literal : $val:expr , )+ $(,)? }) => {{
        let table = stringify!($table);
        let fieldnames = &[ $( { $field } ,)+ ].join(",");
        let fieldvars = &[ $( { format!(":{}", $field) } ,)+ ].join(",");
        let sql = format!("INSERT INTO {} ({}) VALUES ({})", table, fieldnames, fieldvars);
        let mut stmt = $txn.prepare_cached(&sql)?;
        stmt.execute(&[$(
            (format!(":{}", $field).as_str(), &$val as &dyn hdht_sqlite::rusqlite::ToSql),
        )+])
    }};
}

/// Append `msg` to the change log at the next index and record its
/// fingerprint. Callers check the fingerprint first in the same
/// transaction; a fingerprint already present keeps its first index.
pub fn record_change(txn: &mut Transaction, msg: &Message) -> StateResult<u64> {
    let idx = query::current_idx(txn)? + 1;
    let bytes = msg.encode()?;
    let fingerprint = MessageFingerprint::with_data(&bytes);
    txn.execute(
        sql_dht::INSERT_CHANGE,
        named_params! {
            ":idx": idx as i64,
            ":message": bytes,
        },
    )?;
    txn.execute(
        sql_dht::INSERT_FINGERPRINT,
        named_params! {
            ":fingerprint": fingerprint.get_raw_39(),
            ":idx": idx as i64,
        },
    )?;
    tracing::trace!(idx, ?fingerprint, msg_type = %msg.msg_type(), "change recorded");
    Ok(idx)
}

/// Insert an entry, or overwrite value, type and source of an existing one.
/// Status is only written on insert.
pub fn upsert_entry(
    txn: &mut Transaction,
    key: &EntryHash,
    value: &[u8],
    entry_type: &str,
    source: Option<&PeerId>,
    status: EntryStatus,
) -> StateResult<()> {
    txn.execute(
        sql_dht::UPSERT_ENTRY,
        named_params! {
            ":hash": key.get_raw_39(),
            ":value": value,
            ":entry_type": entry_type,
            ":source": source.map(|s| s.get_raw_39()),
            ":status": status.bits(),
        },
    )?;
    Ok(())
}

pub fn set_status(txn: &mut Transaction, key: &EntryHash, status: EntryStatus) -> StateResult<()> {
    txn.execute(
        sql_dht::SET_STATUS,
        named_params! {
            ":hash": key.get_raw_39(),
            ":status": status.bits(),
        },
    )?;
    Ok(())
}

pub fn set_replaced_by(
    txn: &mut Transaction,
    key: &EntryHash,
    new_key: &EntryHash,
) -> StateResult<()> {
    txn.execute(
        sql_dht::SET_REPLACED_BY,
        named_params! {
            ":hash": key.get_raw_39(),
            ":status": EntryStatus::Modified.bits(),
            ":replaced_by": new_key.get_raw_39(),
        },
    )?;
    Ok(())
}

pub fn insert_link_event(
    txn: &mut Transaction,
    base: &EntryHash,
    target: &EntryHash,
    tag: &str,
    event: &LinkEvent,
) -> StateResult<()> {
    sql_insert!(txn, LinkEvent, {
        "base": base.get_raw_39(),
        "target": target.get_raw_39(),
        "tag": tag,
        "status": event.status.bits(),
        "source": event.source.as_ref().map(|s| s.get_raw_39()),
        "link_hash": event.link_hash.as_ref().map(|h| h.get_raw_39()),
    })?;
    Ok(())
}

/// Raise the cursor for `peer` to `idx`; lower values are ignored.
pub fn update_gossiper(txn: &mut Transaction, peer: &PeerId, idx: u64) -> StateResult<()> {
    txn.execute(
        sql_dht::gossiper::UPDATE,
        named_params! {
            ":peer": peer.get_raw_39(),
            ":idx": idx as i64,
        },
    )?;
    Ok(())
}

pub fn delete_gossiper(txn: &mut Transaction, peer: &PeerId) -> StateResult<()> {
    txn.execute(
        sql_dht::gossiper::DELETE,
        named_params! { ":peer": peer.get_raw_39() },
    )?;
    Ok(())
}

pub fn insert_peer_record(
    txn: &mut Transaction,
    list_type: PeerListType,
    record: &PeerRecord,
) -> StateResult<()> {
    txn.execute(
        sql_dht::peer_list::INSERT,
        named_params! {
            ":list_type": list_type.as_str(),
            ":peer": record.id.get_raw_39(),
            ":warrant": record.warrant,
        },
    )?;
    Ok(())
}
