//! Host-facing surface of one participating process.

use std::sync::Arc;

use crate::domain::{KindId, Pooled, ReleaseOutcome, TypePoolRegistry};
use crate::error::PoolError;
use crate::replication::{
    Applied, IdentityResolver, Inbox, ReplicationCoordinator, Transport,
};

/// One process's pools plus its replication session.
///
/// Construct exactly one per process at startup and pass it by reference
/// to whatever needs pooled instances. All methods must be called from the
/// thread that owns the peer; incoming actions only touch the pools when
/// [`pump`](Self::pump) or [`pump_next`](Self::pump_next) runs.
#[derive(Debug)]
pub struct PoolPeer<T> {
    registry: TypePoolRegistry<T>,
    coordinator: ReplicationCoordinator<T>,
    inbox: Option<Inbox>,
}

impl<T: Pooled + 'static> PoolPeer<T> {
    /// Creates a peer with no session.
    #[must_use]
    pub fn standalone(
        mut registry: TypePoolRegistry<T>,
        identity: Arc<dyn IdentityResolver<T>>,
    ) -> Self {
        let coordinator = ReplicationCoordinator::standalone(identity);
        coordinator.attach(&mut registry);
        Self {
            registry,
            coordinator,
            inbox: None,
        }
    }

    /// Creates a peer bound to a session.
    #[must_use]
    pub fn networked(
        mut registry: TypePoolRegistry<T>,
        coordinator: ReplicationCoordinator<T>,
        inbox: Inbox,
    ) -> Self {
        coordinator.attach(&mut registry);
        Self {
            registry,
            coordinator,
            inbox: Some(inbox),
        }
    }

    /// Convenience constructor from a transport and an inbox.
    #[must_use]
    pub fn connect(
        registry: TypePoolRegistry<T>,
        identity: Arc<dyn IdentityResolver<T>>,
        transport: Arc<dyn Transport>,
        inbox: Inbox,
    ) -> Self {
        let coordinator = ReplicationCoordinator::networked(identity, transport);
        Self::networked(registry, coordinator, inbox)
    }

    /// Checks out an instance of `kind`; `None` if `kind` is not pooled.
    ///
    /// # Errors
    ///
    /// Propagates factory failures.
    pub fn get_item(&mut self, kind: KindId) -> Result<Option<T>, PoolError> {
        self.registry.get_item(kind)
    }

    /// Checks out a freshly constructed instance of `kind`.
    ///
    /// # Errors
    ///
    /// Propagates factory failures.
    pub fn get_new_item(&mut self, kind: KindId) -> Result<Option<T>, PoolError> {
        self.registry.get_new_item(kind)
    }

    /// Returns an instance to its pool; `None` if its kind is not pooled.
    ///
    /// # Errors
    ///
    /// See [`TypePoolRegistry::return_item`].
    pub fn return_item(&mut self, item: T) -> Result<Option<ReleaseOutcome<T>>, PoolError> {
        self.registry.return_item(item)
    }

    /// Iterates available instances of exactly `kind`, most recent first.
    pub fn peek_all(&self, kind: KindId) -> impl Iterator<Item = &T> {
        self.registry.peek_all(kind)
    }

    /// Resets every tracked instance.
    pub fn reset_all(&mut self) -> usize {
        self.registry.reset_all()
    }

    /// Returns every checked-out instance to its pool.
    ///
    /// # Errors
    ///
    /// See [`TypePoolRegistry::recall_all`].
    pub fn recall_all(&mut self) -> Result<usize, PoolError> {
        self.registry.recall_all()
    }

    /// Fills the pool for `kind` with up to `n` new instances and
    /// replicates each of them as a `Create`.
    ///
    /// # Errors
    ///
    /// Propagates factory failures.
    pub fn prewarm(&mut self, kind: KindId, n: usize) -> Result<usize, PoolError> {
        self.registry.prewarm(kind, n)
    }

    /// Host notification that an instance was created outside the pools.
    pub fn on_instance_created(&mut self, item: T) {
        self.registry.track(item);
    }

    /// Registers a host-created instance in its pool and replicates it.
    ///
    /// # Errors
    ///
    /// See [`ReplicationCoordinator::announce_created`].
    pub fn announce_created(&mut self, item: T) -> Result<Option<ReleaseOutcome<T>>, PoolError> {
        self.coordinator.announce_created(&mut self.registry, item)
    }

    /// Applies every incoming action delivered so far.
    ///
    /// Returns how many changed local state. Always `0` for a standalone
    /// peer.
    pub fn pump(&mut self) -> usize {
        let Some(inbox) = self.inbox.as_mut() else {
            return 0;
        };
        let actions = inbox.drain();
        self.coordinator.apply_all(&mut self.registry, actions)
    }

    /// Waits for the next incoming action and applies it.
    ///
    /// Returns `None` for a standalone peer or once the session is gone.
    pub async fn pump_next(&mut self) -> Option<Applied> {
        let action = self.inbox.as_mut()?.recv().await?;
        Some(self.coordinator.apply(&mut self.registry, action))
    }

    /// The underlying registry.
    #[must_use]
    pub const fn registry(&self) -> &TypePoolRegistry<T> {
        &self.registry
    }

    /// The underlying registry, mutably.
    pub fn registry_mut(&mut self) -> &mut TypePoolRegistry<T> {
        &mut self.registry
    }

    /// The replication coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &ReplicationCoordinator<T> {
        &self.coordinator
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ActionKind, ObjectPool, PeerId, Placement, StableId};
    use crate::replication::{IdentityTable, MeshBus};

    const LANTERN: KindId = KindId::of("lantern");

    #[derive(Debug, Clone, PartialEq)]
    struct Lantern {
        id: StableId,
    }

    impl Pooled for Lantern {
        fn kind(&self) -> KindId {
            LANTERN
        }
    }

    fn registry(table: &IdentityTable<Lantern>, local: PeerId) -> TypePoolRegistry<Lantern> {
        let table = table.clone();
        let pool = ObjectPool::new(
            LANTERN,
            "lantern",
            Box::new(move |_: &Placement| {
                let lantern = Lantern { id: StableId::new() };
                table.register(lantern.id, lantern.clone(), local);
                Ok(lantern)
            }),
        );
        let Ok(registry) = TypePoolRegistry::from_pools([pool]) else {
            panic!("registry construction failed");
        };
        registry
    }

    #[test]
    fn standalone_peer_round_trip() {
        let table = IdentityTable::new();
        let mut peer = PoolPeer::standalone(registry(&table, PeerId::new()), Arc::new(table));

        let Ok(Some(lantern)) = peer.get_item(LANTERN) else {
            panic!("get_item failed");
        };
        let _ = peer.return_item(lantern.clone());
        let available: Vec<&Lantern> = peer.peek_all(LANTERN).collect();
        assert_eq!(available, vec![&lantern]);
        assert_eq!(peer.pump(), 0);
        assert_eq!(peer.coordinator().stats().broadcast, 0);
    }

    #[test]
    fn recall_all_via_peer() {
        let table = IdentityTable::new();
        let mut peer = PoolPeer::standalone(registry(&table, PeerId::new()), Arc::new(table));
        for _ in 0..3 {
            let _ = peer.get_item(LANTERN);
        }
        let recalled = tokio_test::assert_ok!(peer.recall_all());
        assert_eq!(recalled, 3);
        assert_eq!(peer.peek_all(LANTERN).count(), 3);
    }

    #[tokio::test]
    async fn pump_next_applies_remote_release() {
        let bus = MeshBus::new(32);
        let table = IdentityTable::new();
        let (a_end, a_inbox) = bus.join();
        let (b_end, b_inbox) = bus.join();
        let a_local = a_end.local_peer();
        let b_local = b_end.local_peer();
        let mut a = PoolPeer::connect(
            registry(&table, a_local),
            Arc::new(table.clone()),
            Arc::new(a_end),
            a_inbox,
        );
        let mut b = PoolPeer::connect(
            registry(&table, b_local),
            Arc::new(table.clone()),
            Arc::new(b_end),
            b_inbox,
        );

        let Ok(Some(lantern)) = a.get_item(LANTERN) else {
            panic!("get_item failed");
        };
        let _ = a.return_item(lantern.clone());

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            let Some(outcome) = b.pump_next().await else {
                panic!("session closed early");
            };
            outcomes.push(outcome);
        }
        assert_eq!(
            outcomes,
            vec![
                Applied::Applied(ActionKind::Create),
                Applied::Applied(ActionKind::Acquire),
                Applied::Applied(ActionKind::Release),
            ]
        );
        let available: Vec<&Lantern> = b.peek_all(LANTERN).collect();
        assert_eq!(available, vec![&lantern]);
    }

    fn available(peer: &PoolPeer<Lantern>) -> Vec<Lantern> {
        peer.peek_all(LANTERN).cloned().collect()
    }

    #[test]
    fn prewarmed_pools_converge() {
        let bus = MeshBus::new(64);
        let table = IdentityTable::new();
        let (a_end, a_inbox) = bus.join();
        let (b_end, b_inbox) = bus.join();
        let a_local = a_end.local_peer();
        let b_local = b_end.local_peer();
        let mut a = PoolPeer::connect(
            registry(&table, a_local),
            Arc::new(table.clone()),
            Arc::new(a_end),
            a_inbox,
        );
        let mut b = PoolPeer::connect(
            registry(&table, b_local),
            Arc::new(table.clone()),
            Arc::new(b_end),
            b_inbox,
        );

        assert!(matches!(b.prewarm(LANTERN, 2), Ok(2)));
        assert_eq!(a.pump(), 2);
        assert!(matches!(a.prewarm(LANTERN, 2), Ok(2)));
        assert_eq!(b.pump(), 2);
        assert_eq!(available(&a).len(), 4);
        assert_eq!(available(&a), available(&b));

        let Ok(Some(lantern)) = a.get_item(LANTERN) else {
            panic!("get_item failed");
        };
        b.pump();
        assert_eq!(available(&a), available(&b));

        let _ = a.return_item(lantern);
        b.pump();
        assert_eq!(available(&b).len(), 4);
        assert_eq!(available(&a), available(&b));
    }

    #[test]
    fn announce_created_tracks_and_pools() {
        let table = IdentityTable::new();
        let mut peer = PoolPeer::standalone(registry(&table, PeerId::new()), Arc::new(table));
        let lantern = Lantern { id: StableId::new() };
        let Ok(Some(outcome)) = peer.announce_created(lantern.clone()) else {
            panic!("announce failed");
        };
        assert!(outcome.is_retained());
        assert_eq!(peer.registry().tracked(), std::slice::from_ref(&lantern));
        peer.on_instance_created(lantern);
        assert_eq!(peer.registry().tracked().len(), 1);
    }
}
