//! Replicated pool actions and their wire shape.
//!
//! A [`ReplicationAction`] describes one pool state change on the process
//! that holds authority over the instance. It is built transiently, encoded
//! as a compact JSON object and applied on every peer:
//!
//! ```json
//! { "action_id": 1, "object_ref": "6f1c...-..." }
//! ```

use serde::{Deserialize, Serialize};

use super::StableId;
use crate::error::PoolError;

/// Discriminant of a replicated pool action.
///
/// Encoded on the wire as its `u8` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ActionKind {
    /// An instance came into existence and should be registered as available.
    Create = 0,
    /// An instance was checked out of its pool.
    Acquire = 1,
    /// An instance was returned to its pool.
    Release = 2,
}

impl ActionKind {
    /// Returns the action name as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Acquire => "acquire",
            Self::Release => "release",
        }
    }
}

impl From<ActionKind> for u8 {
    fn from(kind: ActionKind) -> Self {
        kind as u8
    }
}

/// Wire value that does not name a known [`ActionKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown action id {0}")]
pub struct UnknownAction(pub u8);

impl TryFrom<u8> for ActionKind {
    type Error = UnknownAction;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Create),
            1 => Ok(Self::Acquire),
            2 => Ok(Self::Release),
            other => Err(UnknownAction(other)),
        }
    }
}

/// One replicated pool state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationAction {
    /// What happened.
    pub action_id: ActionKind,
    /// Network-wide reference to the affected instance.
    pub object_ref: StableId,
}

impl ReplicationAction {
    /// Creates a new action.
    #[must_use]
    pub const fn new(action_id: ActionKind, object_ref: StableId) -> Self {
        Self {
            action_id,
            object_ref,
        }
    }

    /// Encodes the action as a JSON wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Codec`] if serialization fails.
    pub fn to_wire(&self) -> Result<String, PoolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes an action from a JSON wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Codec`] if the frame is malformed or carries an
    /// unknown action id.
    pub fn from_wire(frame: &str) -> Result<Self, PoolError> {
        Ok(serde_json::from_str(frame)?)
    }
}
