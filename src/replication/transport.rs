//! Transport boundary used by the coordinator to reach other peers.
//!
//! Delivery guarantees (reliable, in sender order per recipient), peer
//! discovery and session membership belong to the transport. The
//! coordinator only needs to know who it is, whether a session is live,
//! and how to hand an action off for broadcast.

use serde::{Deserialize, Serialize};

use crate::domain::{PeerId, ReplicationAction};
use crate::error::PoolError;

/// Recipients of a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Every peer, including the sender.
    All,
    /// Every peer except the sender.
    Others,
    /// A single peer.
    Peer(PeerId),
}

impl Target {
    /// Returns `true` if a frame sent by `sender` should reach `recipient`.
    #[must_use]
    pub fn includes(&self, sender: PeerId, recipient: PeerId) -> bool {
        match self {
            Self::All => true,
            Self::Others => sender != recipient,
            Self::Peer(peer) => *peer == recipient,
        }
    }

    /// Parses `"all"` / `"others"` (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "others" => Some(Self::Others),
            _ => None,
        }
    }
}

/// Outbound half of a replication session.
pub trait Transport: Send + Sync {
    /// Identity of this process in the session.
    fn local_peer(&self) -> PeerId;

    /// Returns `true` while the session is live.
    fn is_connected(&self) -> bool;

    /// Sends `action` to `target`, returning the number of recipients.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Transport`] if the session cannot send, or
    /// [`PoolError::Codec`] if the action cannot be encoded.
    fn broadcast(&self, action: ReplicationAction, target: Target) -> Result<usize, PoolError>;
}
