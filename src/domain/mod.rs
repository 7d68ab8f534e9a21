//! Domain layer: kind tags, identifiers, pools and the pool registry.
//!
//! This module contains the process-local pooling engine: single-kind
//! [`ObjectPool`]s, the insertion-ordered [`TypePoolRegistry`] that indexes
//! them, and the [`ReplicationAction`] value type that describes a pool
//! state change to other processes.

pub mod kind;
pub mod object_pool;
pub mod placement;
pub mod pool_registry;
pub mod replication_action;
pub mod stable_id;

pub use kind::{KindId, Pooled};
pub use object_pool::{Acquired, Factory, Hook, ObjectPool, PeekAll, PoolStats, ReleaseOutcome};
pub use placement::Placement;
pub use pool_registry::{ActionObserver, TypePoolRegistry};
pub use replication_action::{ActionKind, ReplicationAction, UnknownAction};
pub use stable_id::{PeerId, StableId};
