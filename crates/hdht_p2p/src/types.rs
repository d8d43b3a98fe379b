use crate::wire::WireError;
use hdht_state::prelude::StateError;
use hdht_types::prelude::*;

/// Boxed future type.
pub type BoxFut<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + 'a + Send>>;

/// Error type for the hdht network layer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HdhtP2pError {
    /// No peer is available to gossip with.
    #[error("No gossipers available")]
    NoGossipersAvailable,

    /// A request or response carried a body this call can't handle.
    #[error("Unexpected message body type: {0}")]
    UnexpectedMessageBodyType(MsgType),

    /// An iterative lookup ran out of peers to ask.
    #[error("Lookup failed after seeing {} peers", seen.len())]
    LookupFailure {
        /// Every peer seen during the lookup, nearest first.
        seen: Vec<PeerInfo>,
    },

    /// A change reached no peer that accepted it.
    #[error("No remote node accepted the change")]
    NoRemoteNodeAcceptedChange,

    /// Our own validator rejected a change we tried to make. The entry is
    /// stored as Rejected and nothing is sent.
    #[error("Change rejected by local validation")]
    LocallyRejected,

    /// The peer is on our block list.
    #[error("Peer is blocked: {0}")]
    Blocked(PeerId),

    /// A remote call or dial ran out of time.
    #[error("Timed out")]
    TimedOut,

    /// The remote node answered with an error.
    #[error("Remote error: {0}")]
    Remote(WireError),

    /// Local store error.
    #[error(transparent)]
    State(#[from] StateError),

    /// Encoding or decoding failed.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// Other
    #[error("Other: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// hdht p2p result type.
pub type HdhtP2pResult<T> = std::result::Result<T, HdhtP2pError>;

impl HdhtP2pError {
    /// promote a custom error type to an HdhtP2pError
    pub fn other(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(e.into())
    }

    /// The hash is not held by the node that answered, locally or remotely.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            HdhtP2pError::State(StateError::HashNotFound)
                | HdhtP2pError::Remote(WireError::HashNotFound)
        )
    }
}

impl From<String> for HdhtP2pError {
    fn from(s: String) -> Self {
        #[derive(Debug, thiserror::Error)]
        struct OtherError(String);
        impl std::fmt::Display for OtherError {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        HdhtP2pError::other(OtherError(s))
    }
}

impl From<&str> for HdhtP2pError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}
