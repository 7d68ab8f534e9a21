//! Replication layer: identity boundary, transport boundary, in-process
//! mesh and the coordinator that ties them to the pool registry.
//!
//! [`ReplicationCoordinator`] mirrors local pool actions to other peers
//! through a [`Transport`] and applies their actions locally through an
//! [`IdentityResolver`].

pub mod coordinator;
pub mod identity;
pub mod mesh;
pub mod transport;

pub use coordinator::{Applied, Dispatch, ReplicationCoordinator, ReplicationStats};
pub use identity::{
    Host, IdentityResolver, IdentityTable, MakeInstance, NetworkIdentity, TableHost, host_factory,
};
pub use mesh::{Envelope, Inbox, MeshBus, MeshEndpoint};
pub use transport::{Target, Transport};
