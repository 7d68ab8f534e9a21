//! Pool and replication error types.
//!
//! [`PoolError`] is the central error type for the crate. Each variant
//! carries a stable numeric code so that diagnostics emitted through
//! `tracing` can be grepped and aggregated across peers.

use crate::domain::KindId;

/// Crate-wide error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category          |
/// |-----------|-------------------|
/// | 1000–1999 | Caller bug        |
/// | 2000–2999 | Instance creation |
/// | 3000–3999 | Transport / wire  |
///
/// Unregistered kinds, unresolvable references and capacity overflow are
/// deliberately **not** represented here: they are expected states and are
/// reported through `Option` results or [`crate::domain::ReleaseOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// An instance was handed to a pool that does not own its kind.
    #[error("invalid argument: instance of kind {found} passed to pool {expected}")]
    InvalidArgument {
        /// Kind served by the pool.
        expected: KindId,
        /// Kind tag carried by the rejected instance.
        found: KindId,
    },

    /// `peek(index)` addressed a slot beyond the current availability.
    #[error("index {index} out of range for pool with {count} available")]
    OutOfRange {
        /// Requested position (0 = most recently released).
        index: usize,
        /// Number of instances available at the time of the call.
        count: usize,
    },

    /// A pool for this kind is already registered.
    #[error("kind {0} already has a pool")]
    DuplicateKind(KindId),

    /// The pool factory or host instantiation failed.
    #[error("factory error: {0}")]
    Factory(String),

    /// The transport refused or failed to send a frame.
    #[error("transport error: {0}")]
    Transport(String),

    /// A wire frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl PoolError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidArgument { .. } => 1001,
            Self::OutOfRange { .. } => 1002,
            Self::DuplicateKind(_) => 1003,
            Self::Factory(_) => 2001,
            Self::Transport(_) => 3001,
            Self::Codec(_) => 3002,
        }
    }

    /// Returns `true` for errors that indicate a bug in the calling code
    /// rather than a runtime condition.
    #[must_use]
    pub const fn is_caller_bug(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. } | Self::OutOfRange { .. } | Self::DuplicateKind(_)
        )
    }
}
