//! Replication coordinator: decides what to broadcast and applies what
//! arrives.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::identity::{IdentityResolver, NetworkIdentity};
use super::transport::{Target, Transport};
use crate::domain::{
    ActionKind, ActionObserver, Pooled, ReleaseOutcome, ReplicationAction, TypePoolRegistry,
};
use crate::error::PoolError;

/// What happened to a locally performed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No live session: the action stays local.
    Local,
    /// This process is not the authority for the instance (or the instance
    /// has no network identity): the action stays local.
    Suppressed,
    /// The action was handed to the transport.
    Broadcast {
        /// Number of recipients reported by the transport.
        recipients: usize,
    },
    /// The transport failed; the action stays local.
    Failed,
}

/// What happened to an incoming replicated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The action changed the local pool.
    Applied(ActionKind),
    /// The action was already reflected locally; nothing changed.
    Absorbed(ActionKind),
    /// The reference is not known here yet; the action was dropped.
    Unresolved,
    /// The instance's kind has no local pool; the action was dropped.
    UnknownKind,
    /// The local pool rejected the instance; the action was dropped.
    Rejected,
}

/// Counters exposed by [`ReplicationCoordinator::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationStats {
    /// Actions handed to the transport.
    pub broadcast: u64,
    /// Local actions not broadcast because another peer holds authority.
    pub suppressed: u64,
    /// Local actions the transport failed to send.
    pub failed: u64,
    /// Incoming actions that changed local state.
    pub applied: u64,
    /// Incoming actions already reflected locally.
    pub absorbed: u64,
    /// Incoming actions dropped (unresolved, unknown kind, rejected).
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    broadcast: AtomicU64,
    suppressed: AtomicU64,
    failed: AtomicU64,
    applied: AtomicU64,
    absorbed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ReplicationStats {
        ReplicationStats {
            broadcast: self.broadcast.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            absorbed: self.absorbed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Protocol layer mirroring pool actions across processes.
///
/// Cheap to clone: clones share the identity resolver, the session and the
/// counters. One clone is installed in the registry as its
/// [`ActionObserver`]; another stays with the host loop to apply incoming
/// actions.
///
/// Outbound, every action reported by the registry goes through the same
/// decision:
///
/// 1. no live session → [`Dispatch::Local`]
/// 2. the instance has no network identity, or another peer holds
///    authority → [`Dispatch::Suppressed`]
/// 3. otherwise broadcast to the configured [`Target`].
///
/// Inbound, actions are resolved through the identity boundary and applied
/// straight to the owning pool, which bypasses the registry's observer so
/// nothing is re-broadcast. No failure on this path ever reaches the
/// caller.
pub struct ReplicationCoordinator<T> {
    identity: Arc<dyn IdentityResolver<T>>,
    session: Option<Arc<dyn Transport>>,
    target: Target,
    counters: Arc<Counters>,
}

impl<T> Clone for ReplicationCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            session: self.session.as_ref().map(Arc::clone),
            target: self.target,
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T: Pooled + 'static> ReplicationCoordinator<T> {
    /// Creates a coordinator with no session: every action is local.
    #[must_use]
    pub fn standalone(identity: Arc<dyn IdentityResolver<T>>) -> Self {
        Self {
            identity,
            session: None,
            target: Target::Others,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Creates a coordinator bound to a transport session.
    #[must_use]
    pub fn networked(
        identity: Arc<dyn IdentityResolver<T>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            session: Some(transport),
            ..Self::standalone(identity)
        }
    }

    /// Sets the recipients of outbound broadcasts (default [`Target::Others`]).
    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Installs a clone of this coordinator as the registry's replication hook.
    pub fn attach(&self, registry: &mut TypePoolRegistry<T>) {
        registry.set_observer(Box::new(self.clone()));
    }

    /// Returns `true` if a session is attached and live.
    #[must_use]
    pub fn is_networked(&self) -> bool {
        self.live_session().is_some()
    }

    /// Returns the instance's identity if this process may broadcast about it.
    #[must_use]
    pub fn authority_over(&self, item: &T) -> Option<NetworkIdentity> {
        let transport = self.live_session()?;
        self.identity
            .identify(item)
            .filter(|identity| identity.authority == transport.local_peer())
    }

    /// Snapshot of the coordinator counters.
    #[must_use]
    pub fn stats(&self) -> ReplicationStats {
        self.counters.snapshot()
    }

    /// Decides whether a local action is broadcast, and broadcasts it.
    ///
    /// The action must already have been applied locally.
    pub fn report(&self, action: ActionKind, item: &T) -> Dispatch {
        let Some(transport) = self.live_session() else {
            return Dispatch::Local;
        };
        let local = transport.local_peer();
        let identity = match self.identity.identify(item) {
            Some(identity) if identity.authority == local => identity,
            other => {
                Counters::bump(&self.counters.suppressed);
                tracing::trace!(
                    action = action.as_str(),
                    kind = %item.kind(),
                    authority = ?other.map(|i| i.authority),
                    "not authoritative; action kept local"
                );
                return Dispatch::Suppressed;
            }
        };

        let message = ReplicationAction::new(action, identity.id);
        match transport.broadcast(message, self.target) {
            Ok(recipients) => {
                Counters::bump(&self.counters.broadcast);
                tracing::debug!(
                    action = action.as_str(),
                    object_ref = %identity.id,
                    recipients,
                    "pool action broadcast"
                );
                Dispatch::Broadcast { recipients }
            }
            Err(err) => {
                Counters::bump(&self.counters.failed);
                tracing::warn!(
                    action = action.as_str(),
                    object_ref = %identity.id,
                    code = err.error_code(),
                    %err,
                    "broadcast failed; action kept local"
                );
                Dispatch::Failed
            }
        }
    }

    /// Registers an instance created outside the pools.
    ///
    /// Tracks the instance, makes it available in its pool and reports a
    /// `Create`. Returns `None` if the instance's kind has no pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidArgument`] if the pool rejects the
    /// instance.
    pub fn announce_created(
        &self,
        registry: &mut TypePoolRegistry<T>,
        item: T,
    ) -> Result<Option<ReleaseOutcome<T>>, PoolError> {
        registry.track(item.clone());
        let Some(pool) = registry.pool_mut(item.pool_kind()) else {
            return Ok(None);
        };
        let outcome = pool.add(item.clone())?;
        let _ = self.report(ActionKind::Create, &item);
        Ok(Some(outcome))
    }

    /// Applies one incoming action to the local registry.
    ///
    /// Never fails and never broadcasts: anything that cannot be applied is
    /// dropped and counted.
    pub fn apply(&self, registry: &mut TypePoolRegistry<T>, action: ReplicationAction) -> Applied {
        let applied = self.apply_inner(registry, action);
        match applied {
            Applied::Applied(_) => Counters::bump(&self.counters.applied),
            Applied::Absorbed(_) => Counters::bump(&self.counters.absorbed),
            Applied::Unresolved | Applied::UnknownKind | Applied::Rejected => {
                Counters::bump(&self.counters.dropped);
            }
        }
        tracing::trace!(
            action = action.action_id.as_str(),
            object_ref = %action.object_ref,
            outcome = ?applied,
            "replicated action processed"
        );
        applied
    }

    /// Applies a batch of incoming actions in order.
    ///
    /// Returns how many changed local state.
    pub fn apply_all(
        &self,
        registry: &mut TypePoolRegistry<T>,
        actions: impl IntoIterator<Item = ReplicationAction>,
    ) -> usize {
        actions
            .into_iter()
            .filter(|action| matches!(self.apply(registry, *action), Applied::Applied(_)))
            .count()
    }

    fn apply_inner(&self, registry: &mut TypePoolRegistry<T>, action: ReplicationAction) -> Applied {
        let Some(item) = self.identity.resolve(action.object_ref) else {
            tracing::debug!(
                action = action.action_id.as_str(),
                object_ref = %action.object_ref,
                "reference not resolvable yet; dropping action"
            );
            return Applied::Unresolved;
        };

        let kind = item.pool_kind();
        if action.action_id == ActionKind::Create {
            registry.track(item.clone());
        }
        let Some(pool) = registry.pool_mut(kind) else {
            tracing::debug!(%kind, object_ref = %action.object_ref, "no local pool for kind");
            return Applied::UnknownKind;
        };

        let result = match action.action_id {
            ActionKind::Create => pool.add(item).map(|outcome| release_applied(action, &outcome)),
            ActionKind::Release => pool
                .release(item)
                .map(|outcome| release_applied(action, &outcome)),
            ActionKind::Acquire => Ok(match pool.take(&item) {
                Some(_) => Applied::Applied(action.action_id),
                None => Applied::Absorbed(action.action_id),
            }),
        };
        result.unwrap_or_else(|err| {
            tracing::warn!(
                %kind,
                object_ref = %action.object_ref,
                code = err.error_code(),
                %err,
                "pool rejected replicated instance"
            );
            Applied::Rejected
        })
    }

    fn live_session(&self) -> Option<&Arc<dyn Transport>> {
        self.session
            .as_ref()
            .filter(|transport| transport.is_connected())
    }
}

fn release_applied<T>(action: ReplicationAction, outcome: &ReleaseOutcome<T>) -> Applied {
    match outcome {
        ReleaseOutcome::AlreadyAvailable => Applied::Absorbed(action.action_id),
        ReleaseOutcome::Retained | ReleaseOutcome::Discarded(_) => {
            Applied::Applied(action.action_id)
        }
    }
}

impl<T: Pooled + 'static> ActionObserver<T> for ReplicationCoordinator<T> {
    fn on_action(&mut self, action: ActionKind, item: &T) {
        let _ = self.report(action, item);
    }
}

impl<T> fmt::Debug for ReplicationCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationCoordinator")
            .field("session", &self.session.as_ref().map(|t| t.local_peer()))
            .field("target", &self.target)
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}
