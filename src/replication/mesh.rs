//! In-process broadcast mesh for peers sharing one runtime.
//!
//! [`MeshBus`] wraps a [`tokio::sync::broadcast`] channel. Every peer joins
//! the bus and receives a [`MeshEndpoint`] (the outbound [`Transport`]) and
//! an [`Inbox`] (the inbound queue). Frames travel as encoded
//! [`ReplicationAction`] wire strings inside an [`Envelope`].
//!
//! Delivery into an inbox happens on the channel; nothing touches pool
//! state until the owning loop drains the inbox and hands the actions to
//! the coordinator on its own thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::transport::{Target, Transport};
use crate::domain::{PeerId, ReplicationAction};
use crate::error::PoolError;

/// Frame carried on the mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Peer that sent the frame.
    pub sender: PeerId,
    /// Intended recipients.
    pub target: Target,
    /// Encoded [`ReplicationAction`].
    pub frame: String,
    /// Send timestamp.
    pub sent_at: DateTime<Utc>,
}

/// Shared medium that peers in one process join.
///
/// Every frame sent by any endpoint lands in one ring of `capacity` slots
/// read by every inbox. An inbox that falls a full ring behind loses the
/// frames it missed and logs the gap on its next read.
#[derive(Debug, Clone)]
pub struct MeshBus {
    sender: broadcast::Sender<Envelope>,
}

impl MeshBus {
    /// Opens a bus whose ring holds `capacity` frames.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Joins the bus as a new peer.
    ///
    /// The inbox receives every frame sent after this call.
    #[must_use]
    pub fn join(&self) -> (MeshEndpoint, Inbox) {
        let peer = PeerId::new();
        let endpoint = MeshEndpoint {
            peer,
            sender: self.sender.clone(),
            connected: Arc::new(AtomicBool::new(true)),
        };
        let inbox = Inbox {
            peer,
            receiver: self.sender.subscribe(),
        };
        tracing::debug!(%peer, "peer joined mesh");
        (endpoint, inbox)
    }

    /// Inboxes still listening; dropped inboxes no longer count.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Outbound side of a mesh peer.
#[derive(Debug, Clone)]
pub struct MeshEndpoint {
    peer: PeerId,
    sender: broadcast::Sender<Envelope>,
    connected: Arc<AtomicBool>,
}

impl MeshEndpoint {
    /// Marks the session as closed; later broadcasts fail.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        tracing::debug!(peer = %self.peer, "peer left mesh");
    }

    /// Marks the session as live again.
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::Release);
    }
}

impl Transport for MeshEndpoint {
    fn local_peer(&self) -> PeerId {
        self.peer
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn broadcast(&self, action: ReplicationAction, target: Target) -> Result<usize, PoolError> {
        if !self.is_connected() {
            return Err(PoolError::Transport(format!(
                "peer {} is not connected",
                self.peer
            )));
        }
        let envelope = Envelope {
            sender: self.peer,
            target,
            frame: action.to_wire()?,
            sent_at: Utc::now(),
        };
        // No receivers is not a failure: the frame simply reaches nobody.
        Ok(self.sender.send(envelope).unwrap_or(0))
    }
}

/// Inbound queue of a mesh peer.
#[derive(Debug)]
pub struct Inbox {
    peer: PeerId,
    receiver: broadcast::Receiver<Envelope>,
}

impl Inbox {
    /// Peer this inbox belongs to.
    #[must_use]
    pub const fn peer(&self) -> PeerId {
        self.peer
    }

    /// Takes every frame delivered so far without waiting.
    ///
    /// Frames addressed to other peers and frames that fail to decode are
    /// skipped. Order per sender is preserved.
    pub fn drain(&mut self) -> Vec<ReplicationAction> {
        let mut actions = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) => {
                    if let Some(action) = self.accept(&envelope) {
                        actions.push(action);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(peer = %self.peer, lagged = n, "inbox lagged behind mesh");
                }
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => break,
            }
        }
        actions
    }

    /// Waits for the next frame addressed to this peer.
    ///
    /// Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ReplicationAction> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => {
                    if let Some(action) = self.accept(&envelope) {
                        return Some(action);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(peer = %self.peer, lagged = n, "inbox lagged behind mesh");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn accept(&self, envelope: &Envelope) -> Option<ReplicationAction> {
        if !envelope.target.includes(envelope.sender, self.peer) {
            return None;
        }
        match ReplicationAction::from_wire(&envelope.frame) {
            Ok(action) => Some(action),
            Err(err) => {
                tracing::warn!(
                    peer = %self.peer,
                    sender = %envelope.sender,
                    code = err.error_code(),
                    %err,
                    "dropping undecodable frame"
                );
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ActionKind, StableId};

    fn action(kind: ActionKind) -> ReplicationAction {
        ReplicationAction::new(kind, StableId::new())
    }

    #[test]
    fn broadcast_without_receivers_returns_zero() {
        let bus = MeshBus::new(16);
        let (endpoint, inbox) = bus.join();
        drop(inbox);
        assert!(matches!(endpoint.broadcast(action(ActionKind::Release), Target::Others), Ok(0)));
    }

    #[test]
    fn others_skips_sender() {
        let bus = MeshBus::new(16);
        let (a, mut a_inbox) = bus.join();
        let (_b, mut b_inbox) = bus.join();

        let sent = action(ActionKind::Acquire);
        assert!(matches!(a.broadcast(sent, Target::Others), Ok(2)));
        assert!(a_inbox.drain().is_empty());
        assert_eq!(b_inbox.drain(), vec![sent]);
    }

    #[test]
    fn all_includes_sender() {
        let bus = MeshBus::new(16);
        let (a, mut a_inbox) = bus.join();
        let sent = action(ActionKind::Create);
        let recipients = tokio_test::assert_ok!(a.broadcast(sent, Target::All));
        assert_eq!(recipients, 1);
        assert_eq!(a_inbox.drain(), vec![sent]);
    }

    #[test]
    fn peer_target_reaches_only_that_peer() {
        let bus = MeshBus::new(16);
        let (a, _a_inbox) = bus.join();
        let (_b, mut b_inbox) = bus.join();
        let (_c, mut c_inbox) = bus.join();
        let _ = a.broadcast(action(ActionKind::Release), Target::Peer(c_inbox.peer()));
        assert!(b_inbox.drain().is_empty());
        assert_eq!(c_inbox.drain().len(), 1);
    }

    #[test]
    fn drain_preserves_sender_order() {
        let bus = MeshBus::new(16);
        let (a, _) = bus.join();
        let (_b, mut b_inbox) = bus.join();
        let sent: Vec<ReplicationAction> = [ActionKind::Create, ActionKind::Acquire, ActionKind::Release]
            .into_iter()
            .map(action)
            .collect();
        for item in &sent {
            let _ = a.broadcast(*item, Target::Others);
        }
        assert_eq!(b_inbox.drain(), sent);
    }

    #[test]
    fn disconnected_endpoint_refuses_to_send() {
        let bus = MeshBus::new(16);
        let (a, _inbox) = bus.join();
        a.disconnect();
        assert!(!a.is_connected());
        assert!(matches!(
            a.broadcast(action(ActionKind::Release), Target::Others),
            Err(PoolError::Transport(_))
        ));
        a.reconnect();
        assert!(a.is_connected());
    }

    #[test]
    fn malformed_frame_is_skipped() {
        let bus = MeshBus::new(16);
        let (a, mut inbox) = bus.join();
        let _ = bus.sender.send(Envelope {
            sender: a.local_peer(),
            target: Target::All,
            frame: "{garbage".to_string(),
            sent_at: Utc::now(),
        });
        assert!(inbox.drain().is_empty());
    }

    #[tokio::test]
    async fn recv_waits_for_addressed_frame() {
        let bus = MeshBus::new(16);
        let (a, _a_inbox) = bus.join();
        let (_b, mut b_inbox) = bus.join();

        let sent = action(ActionKind::Release);
        let _ = a.broadcast(sent, Target::Others);
        let Some(received) = b_inbox.recv().await else {
            panic!("expected a frame");
        };
        assert_eq!(received, sent);
    }

    #[test]
    fn receiver_count_tracks_inboxes() {
        let bus = MeshBus::new(16);
        assert_eq!(bus.receiver_count(), 0);
        let (_a, a_inbox) = bus.join();
        let (_b, _b_inbox) = bus.join();
        assert_eq!(bus.receiver_count(), 2);
        drop(a_inbox);
        assert_eq!(bus.receiver_count(), 1);
    }
}
