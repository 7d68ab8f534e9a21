//! Kind tags attached to pooled instances.
//!
//! A [`KindId`] is a content-addressed identifier: the 64-bit FNV-1a hash
//! of a stable kind name. Two processes built from different sources still
//! agree on a kind's id as long as they agree on its name, which makes the
//! tag safe to use for cross-process pool addressing.

use std::fmt;

use serde::{Deserialize, Serialize};

pub(crate) const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Folds `bytes` into a running FNV-1a 64 hash.
pub(crate) const fn fnv1a(seed: u64, bytes: &[u8]) -> u64 {
    let mut rest = bytes;
    let mut hash = seed;
    while let [byte, tail @ ..] = rest {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        rest = tail;
    }
    hash
}

/// Logical type of a pooled instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindId(u64);

impl KindId {
    /// Derives a kind id from a stable name.
    ///
    /// Usable in `const` context so kinds can be declared as constants:
    ///
    /// ```
    /// use replica_pool::domain::KindId;
    ///
    /// const CRATE: KindId = KindId::of("crate");
    /// assert_eq!(CRATE, KindId::of("crate"));
    /// ```
    #[must_use]
    pub const fn of(name: &str) -> Self {
        Self(fnv1a(FNV_OFFSET, name.as_bytes()))
    }

    /// Wraps a raw 64-bit id.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit id.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Capability every pooled instance exposes to the pool system.
///
/// Instances are expected to be cheap handles (entity ids, `Arc`s, ...):
/// the registry keeps clones of every instance it has seen so it can
/// reset or recall them later, and equality is used to keep an instance
/// from appearing twice in the same pool.
pub trait Pooled: Clone + PartialEq {
    /// Exact kind tag of this instance. Assigned once at creation.
    fn kind(&self) -> KindId;

    /// Kind of the pool that owns this instance.
    ///
    /// Defaults to [`Pooled::kind`]. Instances of a sub-kind stored in a
    /// polymorphic pool return the parent pool's kind here.
    fn pool_kind(&self) -> KindId {
        self.kind()
    }
}
