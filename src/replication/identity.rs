//! Identity boundary between local instances and network references.
//!
//! The pooling core never invents identifiers. It asks an
//! [`IdentityResolver`] to map a local instance to its
//! [`NetworkIdentity`] (stable id plus current authority holder) and back.
//! Instances are created through a [`Host`], which must make the new
//! instance resolvable on every peer before any action references it.
//!
//! [`IdentityTable`] and [`TableHost`] are in-memory implementations for
//! peers sharing one process (tests, demos, single-binary simulations).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;

use crate::domain::{Factory, KindId, PeerId, Placement, StableId};
use crate::error::PoolError;

/// Network metadata of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NetworkIdentity {
    /// Network-wide id of the instance.
    pub id: StableId,
    /// Process currently allowed to broadcast actions about the instance.
    pub authority: PeerId,
}

/// Maps instances to network identities and back.
///
/// Both directions must be idempotent and must treat unknown input as a
/// normal outcome (`None`), never as an error.
pub trait IdentityResolver<T>: Send + Sync {
    /// Returns the local instance behind `id`, if it is known here yet.
    fn resolve(&self, id: StableId) -> Option<T>;

    /// Returns the network identity of a local instance.
    fn identify(&self, item: &T) -> Option<NetworkIdentity>;
}

/// Host-level instantiation of networked instances.
pub trait Host<T>: Send {
    /// Creates an instance of `kind` and makes it visible to all peers.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Factory`] if the host cannot create the instance.
    fn instantiate(&mut self, kind: KindId, placement: &Placement)
    -> Result<(T, StableId), PoolError>;
}

/// Adapts a shared [`Host`] into a pool [`Factory`] for `kind`.
pub fn host_factory<T, H>(host: Arc<Mutex<H>>, kind: KindId) -> Factory<T>
where
    T: 'static,
    H: Host<T> + 'static,
{
    Box::new(move |placement: &Placement| {
        let mut host = host
            .lock()
            .map_err(|_| PoolError::Factory("host lock poisoned".to_string()))?;
        let (item, id) = host.instantiate(kind, placement)?;
        tracing::trace!(%kind, %id, "instance instantiated by host");
        Ok(item)
    })
}

#[derive(Debug)]
struct Entry<T> {
    item: T,
    authority: PeerId,
}

/// Shared in-memory identity service.
///
/// Cloning yields another handle to the same table. Lookups by instance
/// scan the table linearly.
#[derive(Debug)]
pub struct IdentityTable<T> {
    entries: Arc<RwLock<HashMap<StableId, Entry<T>>>>,
}

impl<T> Clone for IdentityTable<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T: Clone + PartialEq> IdentityTable<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publishes `item` under `id`, owned by `authority`.
    pub fn register(&self, id: StableId, item: T, authority: PeerId) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(id, Entry { item, authority });
    }

    /// Moves authority over `id` to `authority`.
    ///
    /// Returns `false` if `id` is unknown.
    pub fn transfer(&self, id: StableId, authority: PeerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&id) {
            Some(entry) => {
                entry.authority = authority;
                true
            }
            None => false,
        }
    }

    /// Removes `id` from the table, returning its instance.
    pub fn forget(&self, id: StableId) -> Option<T> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&id).map(|entry| entry.item)
    }

    /// Number of published instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + PartialEq> Default for IdentityTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IdentityResolver<T> for IdentityTable<T>
where
    T: Clone + PartialEq + Send + Sync,
{
    fn resolve(&self, id: StableId) -> Option<T> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&id).map(|entry| entry.item.clone())
    }

    fn identify(&self, item: &T) -> Option<NetworkIdentity> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .find(|(_, entry)| entry.item == *item)
            .map(|(id, entry)| NetworkIdentity {
                id: *id,
                authority: entry.authority,
            })
    }
}

/// Constructor used by [`TableHost`].
pub type MakeInstance<T> = Box<dyn FnMut(KindId, StableId, &Placement) -> T + Send>;

/// [`Host`] that publishes every new instance in an [`IdentityTable`].
pub struct TableHost<T> {
    table: IdentityTable<T>,
    local: PeerId,
    make: MakeInstance<T>,
}

impl<T: Clone + PartialEq> TableHost<T> {
    /// Creates a host instantiating on behalf of `local`.
    #[must_use]
    pub fn new(table: IdentityTable<T>, local: PeerId, make: MakeInstance<T>) -> Self {
        Self { table, local, make }
    }
}

impl<T: Clone + PartialEq + Send + Sync> Host<T> for TableHost<T> {
    fn instantiate(
        &mut self,
        kind: KindId,
        placement: &Placement,
    ) -> Result<(T, StableId), PoolError> {
        let id = StableId::new();
        let item = (self.make)(kind, id, placement);
        self.table.register(id, item.clone(), self.local);
        Ok((item, id))
    }
}

impl<T> fmt::Debug for TableHost<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHost")
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}
