//! Human-readable snapshot of a store.

use crate::error::StateResult;
use crate::query;
use hdht_sqlite::prelude::Transaction;
use hdht_types::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDump {
    pub hash: String,
    pub entry_type: String,
    pub status: EntryStatus,
    pub source: Option<String>,
    pub replaced_by: Option<String>,
    pub value_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDump {
    pub base: String,
    pub target: String,
    pub tag: String,
    pub status: EntryStatus,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDump {
    pub idx: u64,
    pub entries: Vec<EntryDump>,
    /// Link events in arrival order.
    pub links: Vec<LinkDump>,
    pub gossipers: Vec<(String, u64)>,
    pub blocked: Vec<String>,
}

impl StateDump {
    pub(crate) fn collect(txn: &Transaction) -> StateResult<Self> {
        let mut entries = Vec::new();
        query::iterate_entries(txn, &mut |e: query::EntryRecord| {
            entries.push(EntryDump {
                hash: e.hash.to_string(),
                entry_type: e.entry_type,
                status: e.status,
                source: e.source.map(|s| s.to_string()),
                replaced_by: e.replaced_by.map(|h| h.to_string()),
                value_len: e.value.len(),
            });
            true
        })?;
        let links = query::all_link_events(txn)?
            .into_iter()
            .map(|l| LinkDump {
                base: l.base.to_string(),
                target: l.target.to_string(),
                tag: l.tag,
                status: l.event.status,
                source: l.event.source.map(|s| s.to_string()),
            })
            .collect();
        let gossipers = query::all_gossipers(txn)?
            .into_iter()
            .map(|(p, idx)| (p.to_string(), idx))
            .collect();
        let blocked = query::get_peer_list(txn, PeerListType::Blocked)?
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        Ok(Self {
            idx: query::current_idx(txn)?,
            entries,
            links,
            gossipers,
            blocked,
        })
    }

    pub fn to_json_pretty(&self) -> StateResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
