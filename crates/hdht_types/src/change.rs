//! Change log records.

use crate::message::Message;
use serde::{Deserialize, Serialize};

/// A change log record: the index a message was applied at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Put {
    /// 1-based change index.
    pub idx: u64,
    /// The message that caused the change.
    pub message: Message,
}
