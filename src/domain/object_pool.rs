//! Single-kind pool of reusable instances.
//!
//! [`ObjectPool`] keeps a LIFO stack of available instances for one
//! [`KindId`]. New instances come from a pluggable factory; acquire and
//! release side effects come from pluggable hooks. The pool never disposes
//! of instances itself: anything it declines to keep is handed back to the
//! caller.

use std::fmt;

use serde::Serialize;

use super::{KindId, Placement, Pooled};
use crate::error::PoolError;

/// Factory producing a new instance for a pool.
pub type Factory<T> = Box<dyn FnMut(&Placement) -> Result<T, PoolError> + Send>;

/// Side-effect hook run on acquire or release.
pub type Hook<T> = Box<dyn FnMut(&T) + Send>;

/// Most-recent-first view over a pool's available instances.
///
/// Cloning the iterator restarts the walk from the same snapshot.
pub type PeekAll<'a, T> = std::iter::Rev<std::slice::Iter<'a, T>>;

/// Result of [`ObjectPool::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired<T> {
    /// A previously released instance was reused.
    Reused(T),
    /// The factory constructed a new instance.
    Created(T),
}

impl<T> Acquired<T> {
    /// Unwraps the acquired instance.
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Reused(item) | Self::Created(item) => item,
        }
    }

    /// Returns `true` if the factory constructed the instance.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Result of [`ObjectPool::release`] and [`ObjectPool::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome<T> {
    /// The instance was pushed onto the available stack.
    Retained,
    /// The instance was already available; nothing changed.
    AlreadyAvailable,
    /// The pool is at capacity and did not keep the instance.
    ///
    /// This is backpressure, not a leak: the instance is returned so the
    /// caller can dispose of it.
    Discarded(T),
}

impl<T> ReleaseOutcome<T> {
    /// Returns `true` if the instance now sits in the pool.
    #[must_use]
    pub const fn is_retained(&self) -> bool {
        matches!(self, Self::Retained)
    }
}

/// Lifetime counters for a single pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Instances constructed by the factory.
    pub created: u64,
    /// Successful acquisitions (reused or created).
    pub acquired: u64,
    /// Instances pushed back by `release` or `add`.
    pub released: u64,
    /// Instances turned away because the pool was full.
    pub discarded: u64,
}

/// Bounded LIFO pool of instances of one kind.
///
/// # Invariants
///
/// - `count() <= capacity` at all times.
/// - An instance handed out by [`acquire`](Self::acquire) is not available
///   again until it comes back through [`release`](Self::release) or
///   [`add`](Self::add).
/// - An instance is never present twice in the available stack.
pub struct ObjectPool<T> {
    kind: KindId,
    name: String,
    available: Vec<T>,
    capacity: Option<usize>,
    placement: Placement,
    factory: Factory<T>,
    on_acquire: Option<Hook<T>>,
    on_release: Option<Hook<T>>,
    stats: PoolStats,
}

impl<T: Pooled> ObjectPool<T> {
    /// Creates an empty, unbounded pool for `kind`.
    #[must_use]
    pub fn new(kind: KindId, name: impl Into<String>, factory: Factory<T>) -> Self {
        Self {
            kind,
            name: name.into(),
            available: Vec::new(),
            capacity: None,
            placement: Placement::default(),
            factory,
            on_acquire: None,
            on_release: None,
            stats: PoolStats::default(),
        }
    }

    /// Bounds the number of available instances the pool keeps.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Installs the hook run on every acquired instance.
    #[must_use]
    pub fn with_on_acquire(mut self, hook: Hook<T>) -> Self {
        self.on_acquire = Some(hook);
        self
    }

    /// Installs the hook run on every released instance.
    #[must_use]
    pub fn with_on_release(mut self, hook: Hook<T>) -> Self {
        self.on_release = Some(hook);
        self
    }

    /// Sets the placement passed to the factory.
    pub fn set_placement(&mut self, placement: Placement) {
        self.placement = placement;
    }

    /// Eagerly constructs up to `n` instances and makes them available.
    ///
    /// Stops early once the pool reaches capacity. Returns clones of the
    /// new instances so the owner can track them.
    ///
    /// # Errors
    ///
    /// Propagates the first factory failure. Instances constructed before
    /// the failure stay in the pool.
    pub fn prewarm(&mut self, n: usize) -> Result<Vec<T>, PoolError> {
        let mut created = Vec::with_capacity(n);
        for _ in 0..n {
            if self.is_full() {
                break;
            }
            let item = self.construct()?;
            created.push(item.clone());
            self.available.push(item);
        }
        Ok(created)
    }

    /// Hands out an instance.
    ///
    /// Constructs a new instance when `force_new` is set or nothing is
    /// available; otherwise pops the most recently released one. The
    /// on-acquire hook runs in both cases.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Factory`] if construction fails. The pool is
    /// left unchanged in that case.
    pub fn acquire(&mut self, force_new: bool) -> Result<Acquired<T>, PoolError> {
        let reused = if force_new {
            None
        } else {
            self.available.pop()
        };
        let acquired = match reused {
            Some(item) => Acquired::Reused(item),
            None => Acquired::Created(self.construct()?),
        };
        let item = match &acquired {
            Acquired::Reused(item) | Acquired::Created(item) => item,
        };
        if let Some(hook) = self.on_acquire.as_mut() {
            hook(item);
        }
        self.stats.acquired = self.stats.acquired.saturating_add(1);
        Ok(acquired)
    }

    /// Checks out one specific available instance.
    ///
    /// Runs the on-acquire hook and returns the instance, or `None` if it
    /// is not currently available. Never invokes the factory.
    pub fn take(&mut self, item: &T) -> Option<T> {
        let position = self.available.iter().rposition(|i| i == item)?;
        let taken = self.available.remove(position);
        if let Some(hook) = self.on_acquire.as_mut() {
            hook(&taken);
        }
        self.stats.acquired = self.stats.acquired.saturating_add(1);
        Some(taken)
    }

    /// Returns an instance to the pool.
    ///
    /// Runs the on-release hook, then keeps the instance if there is room.
    /// Releasing an instance that is already available is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidArgument`] if the instance belongs to a
    /// different pool.
    pub fn release(&mut self, item: T) -> Result<ReleaseOutcome<T>, PoolError> {
        self.check_kind(&item)?;
        if self.contains(&item) {
            return Ok(ReleaseOutcome::AlreadyAvailable);
        }
        if let Some(hook) = self.on_release.as_mut() {
            hook(&item);
        }
        Ok(self.push(item))
    }

    /// Registers an externally obtained instance as available.
    ///
    /// Same as [`release`](Self::release) without the on-release hook; used
    /// for instances created on another process.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidArgument`] if the instance belongs to a
    /// different pool.
    pub fn add(&mut self, item: T) -> Result<ReleaseOutcome<T>, PoolError> {
        self.check_kind(&item)?;
        if self.contains(&item) {
            return Ok(ReleaseOutcome::AlreadyAvailable);
        }
        Ok(self.push(item))
    }

    /// Returns the `index`-th most recently available instance.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::OutOfRange`] unless `index < count()`.
    pub fn peek(&self, index: usize) -> Result<&T, PoolError> {
        self.available
            .iter()
            .rev()
            .nth(index)
            .ok_or(PoolError::OutOfRange {
                index,
                count: self.available.len(),
            })
    }

    /// Returns the instance the next non-forced `acquire` would hand out.
    #[must_use]
    pub fn peek_next(&self) -> Option<&T> {
        self.available.last()
    }

    /// Iterates available instances, most recent first.
    #[must_use]
    pub fn peek_all(&self) -> PeekAll<'_, T> {
        self.available.iter().rev()
    }

    /// Returns `true` if `item` is currently available.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.available.iter().any(|i| i == item)
    }

    /// Number of available instances.
    #[must_use]
    pub fn count(&self) -> usize {
        self.available.len()
    }

    /// Maximum number of available instances kept, `None` if unbounded.
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Kind served by this pool.
    #[must_use]
    pub const fn kind(&self) -> KindId {
        self.kind
    }

    /// Human-readable kind name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lifetime counters.
    #[must_use]
    pub const fn stats(&self) -> PoolStats {
        self.stats
    }

    fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.available.len() >= cap)
    }

    fn check_kind(&self, item: &T) -> Result<(), PoolError> {
        let found = item.pool_kind();
        if found == self.kind {
            Ok(())
        } else {
            Err(PoolError::InvalidArgument {
                expected: self.kind,
                found,
            })
        }
    }

    fn construct(&mut self) -> Result<T, PoolError> {
        let item = (self.factory)(&self.placement)?;
        self.stats.created = self.stats.created.saturating_add(1);
        Ok(item)
    }

    fn push(&mut self, item: T) -> ReleaseOutcome<T> {
        if self.is_full() {
            self.stats.discarded = self.stats.discarded.saturating_add(1);
            tracing::debug!(kind = %self.kind, pool = %self.name, "pool at capacity; instance not retained");
            return ReleaseOutcome::Discarded(item);
        }
        self.available.push(item);
        self.stats.released = self.stats.released.saturating_add(1);
        ReleaseOutcome::Retained
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("available", &self.available.len())
            .field("capacity", &self.capacity)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    pub(crate) const WIDGET: KindId = KindId::of("widget");
    pub(crate) const GADGET: KindId = KindId::of("gadget");

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Widget {
        pub(crate) serial: u32,
        pub(crate) kind: KindId,
        pub(crate) pool: KindId,
    }

    impl Widget {
        pub(crate) fn new(serial: u32, kind: KindId) -> Self {
            Self {
                serial,
                kind,
                pool: kind,
            }
        }
    }

    impl Pooled for Widget {
        fn kind(&self) -> KindId {
            self.kind
        }

        fn pool_kind(&self) -> KindId {
            self.pool
        }
    }

    pub(crate) fn counting_factory(kind: KindId, counter: Arc<AtomicU32>) -> Factory<Widget> {
        Box::new(move |_: &Placement| Ok(Widget::new(counter.fetch_add(1, Ordering::SeqCst), kind)))
    }

    fn make_pool() -> (ObjectPool<Widget>, Arc<AtomicU32>) {
        let counter = Arc::new(AtomicU32::new(0));
        let pool = ObjectPool::new(WIDGET, "widget", counting_factory(WIDGET, Arc::clone(&counter)));
        (pool, counter)
    }

    fn acquire(pool: &mut ObjectPool<Widget>) -> Widget {
        let Ok(acquired) = pool.acquire(false) else {
            panic!("acquire failed");
        };
        acquired.into_inner()
    }

    #[test]
    fn empty_pool_creates_on_acquire() {
        let (mut pool, counter) = make_pool();
        let Ok(acquired) = pool.acquire(false) else {
            panic!("acquire failed");
        };
        assert!(acquired.is_created());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.count(), 0);
    }

    #[test]
    fn release_then_acquire_is_lifo() {
        let (mut pool, _) = make_pool();
        let items: Vec<Widget> = (0..4).map(|_| acquire(&mut pool)).collect();
        for item in &items {
            let Ok(outcome) = pool.release(item.clone()) else {
                panic!("release failed");
            };
            assert!(outcome.is_retained());
        }
        assert_eq!(pool.count(), 4);

        let reacquired: Vec<Widget> = (0..4).map(|_| acquire(&mut pool)).collect();
        let expected: Vec<Widget> = items.into_iter().rev().collect();
        assert_eq!(reacquired, expected);
        assert_eq!(pool.count(), 0);
        assert_eq!(pool.stats().created, 4);
    }

    #[test]
    fn force_new_never_reduces_count() {
        let (mut pool, counter) = make_pool();
        let Ok(_) = pool.prewarm(2) else {
            panic!("prewarm failed");
        };
        let before = counter.load(Ordering::SeqCst);

        let Ok(acquired) = pool.acquire(true) else {
            panic!("acquire failed");
        };
        assert!(acquired.is_created());
        assert_eq!(pool.count(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn release_beyond_capacity_discards() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut pool =
            ObjectPool::new(WIDGET, "widget", counting_factory(WIDGET, counter)).with_capacity(2);
        let items: Vec<Widget> = (0..3).map(|_| acquire(&mut pool)).collect();
        let mut outcomes = Vec::new();
        for item in items.iter().cloned() {
            let Ok(outcome) = pool.release(item) else {
                panic!("release failed");
            };
            outcomes.push(outcome);
        }
        assert_eq!(pool.count(), 2);
        let Some(ReleaseOutcome::Discarded(excess)) = outcomes.last() else {
            panic!("third release should be discarded");
        };
        assert!(pool.peek_all().all(|i| i != excess));
        assert_eq!(pool.stats().discarded, 1);
    }

    #[test]
    fn prewarm_stops_at_capacity() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut pool =
            ObjectPool::new(WIDGET, "widget", counting_factory(WIDGET, counter)).with_capacity(3);
        let Ok(created) = pool.prewarm(10) else {
            panic!("prewarm failed");
        };
        assert_eq!(created.len(), 3);
        assert_eq!(pool.count(), 3);
    }

    #[test]
    fn hooks_run_on_acquire_and_release() {
        let acquires = Arc::new(AtomicU32::new(0));
        let releases = Arc::new(AtomicU32::new(0));
        let a = Arc::clone(&acquires);
        let r = Arc::clone(&releases);
        let counter = Arc::new(AtomicU32::new(0));
        let mut pool = ObjectPool::new(WIDGET, "widget", counting_factory(WIDGET, counter))
            .with_on_acquire(Box::new(move |_: &Widget| {
                a.fetch_add(1, Ordering::SeqCst);
            }))
            .with_on_release(Box::new(move |_: &Widget| {
                r.fetch_add(1, Ordering::SeqCst);
            }));

        let item = acquire(&mut pool);
        let _ = pool.release(item.clone());
        let _ = pool.add(Widget::new(99, WIDGET));
        let _ = pool.take(&item);

        assert_eq!(acquires.load(Ordering::SeqCst), 2);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_of_foreign_kind_is_invalid() {
        let (mut pool, _) = make_pool();
        let result = pool.release(Widget::new(1, GADGET));
        let Err(PoolError::InvalidArgument { expected, found }) = result else {
            panic!("expected invalid argument");
        };
        assert_eq!(expected, WIDGET);
        assert_eq!(found, GADGET);
        assert!(pool.add(Widget::new(1, GADGET)).is_err());
    }

    #[test]
    fn double_release_does_not_duplicate() {
        let (mut pool, _) = make_pool();
        let item = acquire(&mut pool);
        let _ = pool.release(item.clone());
        let Ok(second) = pool.release(item) else {
            panic!("release failed");
        };
        assert_eq!(second, ReleaseOutcome::AlreadyAvailable);
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn peek_by_index_and_range() {
        let (mut pool, _) = make_pool();
        let _ = pool.add(Widget::new(10, WIDGET));
        let _ = pool.add(Widget::new(11, WIDGET));

        let Ok(first) = pool.peek(0) else {
            panic!("peek(0) failed");
        };
        assert_eq!(first.serial, 11);
        let Ok(second) = pool.peek(1) else {
            panic!("peek(1) failed");
        };
        assert_eq!(second.serial, 10);
        assert_eq!(pool.peek_next().map(|w| w.serial), Some(11));

        let Err(PoolError::OutOfRange { index, count }) = pool.peek(2) else {
            panic!("expected out of range");
        };
        assert_eq!((index, count), (2, 2));
    }

    #[test]
    fn peek_all_is_restartable_and_read_only() {
        let (mut pool, _) = make_pool();
        for serial in 0..3 {
            let _ = pool.add(Widget::new(serial, WIDGET));
        }
        let view = pool.peek_all();
        let first: Vec<u32> = view.clone().map(|w| w.serial).collect();
        let second: Vec<u32> = view.map(|w| w.serial).collect();
        assert_eq!(first, vec![2, 1, 0]);
        assert_eq!(first, second);
        assert_eq!(pool.count(), 3);
    }

    #[test]
    fn take_removes_specific_instance() {
        let (mut pool, counter) = make_pool();
        for serial in 0..3 {
            let _ = pool.add(Widget::new(serial, WIDGET));
        }
        let target = Widget::new(1, WIDGET);
        assert_eq!(pool.take(&target), Some(target.clone()));
        assert!(!pool.contains(&target));
        assert_eq!(pool.count(), 2);
        assert_eq!(pool.take(&target), None);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn factory_failure_leaves_pool_unchanged() {
        let mut pool: ObjectPool<Widget> = ObjectPool::new(
            WIDGET,
            "widget",
            Box::new(|_: &Placement| Err(PoolError::Factory("out of slots".to_string()))),
        );
        let _ = pool.add(Widget::new(5, WIDGET));
        assert!(matches!(pool.acquire(true), Err(PoolError::Factory(_))));
        assert_eq!(pool.count(), 1);
        assert_eq!(pool.stats().acquired, 0);
    }

    #[test]
    fn factory_receives_placement() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let mut pool: ObjectPool<Widget> = ObjectPool::new(
            WIDGET,
            "widget",
            Box::new(move |placement: &Placement| {
                if let Ok(mut slot) = sink.lock() {
                    *slot = Some(*placement);
                }
                Ok(Widget::new(0, WIDGET))
            }),
        );
        pool.set_placement(Placement::at([1.0, 2.0, 3.0]));
        let _ = pool.acquire(false);
        let Ok(slot) = seen.lock() else {
            panic!("poisoned");
        };
        assert_eq!(*slot, Some(Placement::at([1.0, 2.0, 3.0])));
    }
}
