//! What the DHT asks of the application hosting it.

use crate::types::{BoxFut, HdhtP2pResult};
use hdht_types::prelude::*;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// An entry's type and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryContent {
    pub entry_type: String,
    pub value: Vec<u8>,
}

/// Read access to entries this node authored.
pub trait ChainSource: 'static + Send + Sync {
    /// The content of `hash`, if this node authored it.
    fn get_entry(&self, hash: EntryHash) -> BoxFut<'_, HdhtP2pResult<Option<EntryContent>>>;
}

/// Trait-object [`ChainSource`].
pub type DynChainSource = Arc<dyn ChainSource>;

/// Outcome of validating a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Rejected,
}

/// Semantic validation of incoming changes.
pub trait ChangeValidator: 'static + Send + Sync {
    /// Judge `msg`. For Put and Link changes `content` is the entry the
    /// change carries.
    fn validate<'a>(
        &'a self,
        msg: &'a Message,
        content: Option<&'a EntryContent>,
    ) -> BoxFut<'a, HdhtP2pResult<ValidationOutcome>>;
}

/// Trait-object [`ChangeValidator`].
pub type DynChangeValidator = Arc<dyn ChangeValidator>;

/// A [`ChainSource`] backed by a map.
#[derive(Default)]
pub struct MemChain {
    entries: RwLock<HashMap<EntryHash, EntryContent>>,
}

impl MemChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Author an entry, returning its hash.
    pub fn commit(&self, entry_type: impl Into<String>, value: Vec<u8>) -> EntryHash {
        let hash = EntryHash::with_data(&value);
        self.entries.write().insert(
            hash.clone(),
            EntryContent {
                entry_type: entry_type.into(),
                value,
            },
        );
        hash
    }

    /// Author the link entry for `spec`, returning its hash.
    pub fn commit_link(&self, spec: &LinkSpec) -> HdhtP2pResult<EntryHash> {
        Ok(self.commit(LINK_ENTRY_TYPE, spec.encode()?))
    }
}

impl ChainSource for MemChain {
    fn get_entry(&self, hash: EntryHash) -> BoxFut<'_, HdhtP2pResult<Option<EntryContent>>> {
        let out = self.entries.read().get(&hash).cloned();
        Box::pin(async move { Ok(out) })
    }
}

/// Accepts every change.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ChangeValidator for AcceptAll {
    fn validate<'a>(
        &'a self,
        _msg: &'a Message,
        _content: Option<&'a EntryContent>,
    ) -> BoxFut<'a, HdhtP2pResult<ValidationOutcome>> {
        Box::pin(async { Ok(ValidationOutcome::Valid) })
    }
}
