//! Insertion-ordered collection of per-kind pools.
//!
//! [`TypePoolRegistry`] maps each [`KindId`] to exactly one [`ObjectPool`]
//! and remembers the order in which kinds were registered, so pools can be
//! addressed either by kind or by position. It also keeps a record of every
//! instance it has seen, which backs the session-wide
//! [`reset_all`](TypePoolRegistry::reset_all) and
//! [`recall_all`](TypePoolRegistry::recall_all) operations.
//!
//! The registry is built once at startup and passed explicitly to whatever
//! needs it; there is no global instance. All mutation happens on the
//! owner's thread.

use std::collections::HashMap;
use std::fmt;

use super::kind::{FNV_OFFSET, fnv1a};
use super::object_pool::{Hook, ObjectPool, ReleaseOutcome};
use super::{ActionKind, KindId, Placement, Pooled};
use crate::error::PoolError;

/// Replication hook notified after every local pool action.
///
/// Installed with [`TypePoolRegistry::set_observer`]. The registry calls it
/// only for actions that went through its public surface; replicated
/// actions applied directly to a pool do not reach it.
pub trait ActionObserver<T>: Send {
    /// Called once the action has been applied locally.
    fn on_action(&mut self, action: ActionKind, item: &T);
}

/// Type-indexed registry of object pools.
pub struct TypePoolRegistry<T> {
    pools: Vec<ObjectPool<T>>,
    index: HashMap<KindId, usize>,
    instances: Vec<T>,
    placement: Placement,
    reset_hook: Option<Hook<T>>,
    observer: Option<Box<dyn ActionObserver<T>>>,
}

impl<T: Pooled> TypePoolRegistry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pools: Vec::new(),
            index: HashMap::new(),
            instances: Vec::new(),
            placement: Placement::default(),
            reset_hook: None,
            observer: None,
        }
    }

    /// Builds a registry from an ordered list of pools.
    ///
    /// Every process taking part in a session must pass the kinds in the
    /// same order.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::DuplicateKind`] if two pools serve the same kind.
    pub fn from_pools(pools: impl IntoIterator<Item = ObjectPool<T>>) -> Result<Self, PoolError> {
        let mut registry = Self::new();
        for pool in pools {
            registry.register(pool)?;
        }
        Ok(registry)
    }

    /// Appends a pool and returns its registration index.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::DuplicateKind`] if a pool for the same kind is
    /// already registered.
    pub fn register(&mut self, mut pool: ObjectPool<T>) -> Result<usize, PoolError> {
        let kind = pool.kind();
        if self.index.contains_key(&kind) {
            return Err(PoolError::DuplicateKind(kind));
        }
        pool.set_placement(self.placement);
        let position = self.pools.len();
        tracing::debug!(%kind, pool = pool.name(), position, "pool registered");
        self.pools.push(pool);
        self.index.insert(kind, position);
        Ok(position)
    }

    /// Eagerly fills the pool for `kind` with up to `n` new instances.
    ///
    /// Returns how many instances were created; `0` if the kind is not
    /// registered. Each new instance is tracked and reported as a `Create`,
    /// so install the observer first if peers should see it.
    ///
    /// # Errors
    ///
    /// Propagates factory failures. Instances built before the failure stay
    /// pooled and reported.
    pub fn prewarm(&mut self, kind: KindId, n: usize) -> Result<usize, PoolError> {
        let Some(pool) = self.pool_mut(kind) else {
            return Ok(0);
        };
        let created = pool.prewarm(n)?;
        let count = created.len();
        for item in created {
            self.track(item.clone());
            self.notify(ActionKind::Create, &item);
        }
        Ok(count)
    }

    /// Installs the hook run on every tracked instance by
    /// [`reset_all`](Self::reset_all).
    pub fn set_reset_hook(&mut self, hook: Hook<T>) {
        self.reset_hook = Some(hook);
    }

    /// Installs the replication hook, replacing any previous one.
    pub fn set_observer(&mut self, observer: Box<dyn ActionObserver<T>>) {
        self.observer = Some(observer);
    }

    /// Removes the replication hook, reverting to purely local operation.
    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    /// Sets the placement used by every pool factory.
    pub fn set_placement(&mut self, placement: Placement) {
        self.placement = placement;
        for pool in &mut self.pools {
            pool.set_placement(placement);
        }
    }

    /// Returns the pool for `kind`, if registered.
    #[must_use]
    pub fn pool(&self, kind: KindId) -> Option<&ObjectPool<T>> {
        self.index.get(&kind).and_then(|&i| self.pools.get(i))
    }

    /// Returns the pool for `kind` mutably, if registered.
    pub fn pool_mut(&mut self, kind: KindId) -> Option<&mut ObjectPool<T>> {
        let i = *self.index.get(&kind)?;
        self.pools.get_mut(i)
    }

    /// Returns the pool registered at position `i`.
    #[must_use]
    pub fn pool_by_index(&self, i: usize) -> Option<&ObjectPool<T>> {
        self.pools.get(i)
    }

    /// Returns the pool registered at position `i` mutably.
    pub fn pool_by_index_mut(&mut self, i: usize) -> Option<&mut ObjectPool<T>> {
        self.pools.get_mut(i)
    }

    /// Returns the kind registered at position `i`.
    #[must_use]
    pub fn kind_at(&self, i: usize) -> Option<KindId> {
        self.pools.get(i).map(ObjectPool::kind)
    }

    /// Returns the registration position of `kind`.
    #[must_use]
    pub fn index_of(&self, kind: KindId) -> Option<usize> {
        self.index.get(&kind).copied()
    }

    /// Iterates pools in registration order.
    pub fn pools(&self) -> impl Iterator<Item = &ObjectPool<T>> {
        self.pools.iter()
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Returns `true` if no kind is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Digest of the ordered kind list.
    ///
    /// Two registries agree on positional addressing exactly when their
    /// fingerprints match.
    #[must_use]
    pub fn layout_fingerprint(&self) -> u64 {
        self.pools.iter().fold(FNV_OFFSET, |hash, pool| {
            fnv1a(hash, &pool.kind().as_u64().to_le_bytes())
        })
    }

    /// Checks out an instance of `kind`.
    ///
    /// Returns `Ok(None)` when no pool is registered for `kind`; not every
    /// kind has to be pooled. Newly constructed instances are tracked and
    /// reported as a `Create` before the `Acquire`.
    ///
    /// # Errors
    ///
    /// Propagates factory failures.
    pub fn get_item(&mut self, kind: KindId) -> Result<Option<T>, PoolError> {
        self.acquire_item(kind, false)
    }

    /// Like [`get_item`](Self::get_item) but always constructs a new instance.
    ///
    /// # Errors
    ///
    /// Propagates factory failures.
    pub fn get_new_item(&mut self, kind: KindId) -> Result<Option<T>, PoolError> {
        self.acquire_item(kind, true)
    }

    /// Returns an instance to the pool of its kind.
    ///
    /// Returns `Ok(None)` when the instance's kind has no pool. A
    /// [`ReleaseOutcome::Discarded`] instance is back in the caller's hands.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidArgument`] only if the instance's pool
    /// rejects it, which indicates an inconsistent [`Pooled`] impl.
    pub fn return_item(&mut self, item: T) -> Result<Option<ReleaseOutcome<T>>, PoolError> {
        let Some(pool) = self.pool_mut(item.pool_kind()) else {
            return Ok(None);
        };
        let outcome = pool.release(item.clone())?;
        if !matches!(outcome, ReleaseOutcome::AlreadyAvailable) {
            self.notify(ActionKind::Release, &item);
        }
        Ok(Some(outcome))
    }

    /// Iterates available instances whose exact kind is `kind`.
    ///
    /// The pool is looked up by `kind`; instances of sub-kinds stored in the
    /// same pool are skipped.
    pub fn peek_all(&self, kind: KindId) -> impl Iterator<Item = &T> {
        self.pool(kind)
            .into_iter()
            .flat_map(ObjectPool::peek_all)
            .filter(move |item| item.kind() == kind)
    }

    /// Records an instance created outside the pools.
    ///
    /// This is the host's `on_instance_created` notification. Tracking the
    /// same instance twice has no effect.
    pub fn track(&mut self, item: T) {
        if !self.instances.contains(&item) {
            self.instances.push(item);
        }
    }

    /// Every instance created or announced so far.
    #[must_use]
    pub fn tracked(&self) -> &[T] {
        &self.instances
    }

    /// Runs the reset hook on every tracked instance.
    ///
    /// Returns the number of instances visited.
    pub fn reset_all(&mut self) -> usize {
        let Some(hook) = self.reset_hook.as_mut() else {
            return 0;
        };
        for item in &self.instances {
            hook(item);
        }
        tracing::info!(count = self.instances.len(), "all pooled instances reset");
        self.instances.len()
    }

    /// Returns every checked-out tracked instance to its pool.
    ///
    /// Returns the number of instances recalled. Recalls go through
    /// [`return_item`](Self::return_item), so they are replicated like any
    /// other release.
    ///
    /// # Errors
    ///
    /// Stops at the first release the pool rejects.
    pub fn recall_all(&mut self) -> Result<usize, PoolError> {
        let outstanding: Vec<T> = self
            .instances
            .iter()
            .filter(|item| {
                self.pool(item.pool_kind())
                    .is_some_and(|pool| !pool.contains(item))
            })
            .cloned()
            .collect();
        let mut recalled = 0;
        for item in outstanding {
            if self.return_item(item)?.is_some() {
                recalled += 1;
            }
        }
        tracing::info!(recalled, "checked-out instances recalled");
        Ok(recalled)
    }

    fn acquire_item(&mut self, kind: KindId, force_new: bool) -> Result<Option<T>, PoolError> {
        let Some(pool) = self.pool_mut(kind) else {
            return Ok(None);
        };
        let acquired = pool.acquire(force_new)?;
        let created = acquired.is_created();
        let item = acquired.into_inner();
        if created {
            self.track(item.clone());
            self.notify(ActionKind::Create, &item);
        }
        self.notify(ActionKind::Acquire, &item);
        Ok(Some(item))
    }

    fn notify(&mut self, action: ActionKind, item: &T) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_action(action, item);
        }
    }
}

impl<T: Pooled> Default for TypePoolRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TypePoolRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypePoolRegistry")
            .field("pools", &self.pools)
            .field("tracked", &self.instances.len())
            .field("placement", &self.placement)
            .field("observed", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}
