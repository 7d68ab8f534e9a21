//! Identifiers shared by every process in a session.
//!
//! A [`StableId`] travels inside every [`ReplicationAction`](super::ReplicationAction)
//! and is the only way peers refer to a pooled instance. A [`PeerId`] tags
//! the sender of a frame and the holder of authority over an instance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session-wide name of a pooled instance.
///
/// The host picks it when it instantiates the instance and publishes it to
/// the identity service before any action can mention it. Two processes
/// holding the same `StableId` hold replicas of the same instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(Uuid);

impl StableId {
    /// Mints a fresh id for a newly instantiated object.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StableId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for StableId {
    type Err = uuid::Error;

    /// Parses the `object_ref` form found in wire frames and logs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A process taking part in a replication session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Picks an id for a process joining a session.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    // First eight hex digits only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Uuid::encode_buffer();
        let simple: &str = self.0.simple().encode_lower(&mut buf);
        f.write_str(simple.get(..8).unwrap_or(simple))
    }
}
