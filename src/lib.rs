//! # replica-pool
//!
//! Type-indexed object pools whose availability is mirrored across
//! cooperating processes.
//!
//! Each process owns a [`TypePoolRegistry`](domain::TypePoolRegistry) of
//! per-kind [`ObjectPool`](domain::ObjectPool)s. Every acquire, release and
//! create is reported to a
//! [`ReplicationCoordinator`](replication::ReplicationCoordinator), which
//! broadcasts it when the process holds authority over the instance. Peers
//! apply the same action to their own pools without re-broadcasting. With
//! no session attached, everything stays local and the registry behaves as
//! a plain object pool.
//!
//! ## Architecture
//!
//! ```text
//! Host (game loop, simulation, ...)
//!     │
//!     ├── PoolPeer (peer)
//!     │
//!     ├── TypePoolRegistry ── ObjectPool per kind (domain/)
//!     │        │
//!     │        └── ActionObserver ──► ReplicationCoordinator (replication/)
//!     │                                   │
//!     │                                   ├── IdentityResolver (StableId ⇄ instance)
//!     │                                   └── Transport ──► peers
//!     │
//!     └── Inbox ──► ReplicationCoordinator::apply (same thread)
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod peer;
pub mod replication;
