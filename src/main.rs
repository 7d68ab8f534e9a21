//! replica-pool demo entry point.
//!
//! Wires two in-process peers over a mesh bus and walks one instance
//! through create → acquire → release, logging what each peer sees.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use replica_pool::config::{LogFormat, ReplicaConfig};
use replica_pool::domain::{KindId, ObjectPool, Placement, Pooled, StableId, TypePoolRegistry};
use replica_pool::peer::PoolPeer;
use replica_pool::replication::{
    IdentityTable, MeshBus, ReplicationCoordinator, TableHost, Transport, host_factory,
};

const CRATE: KindId = KindId::of("crate");
const BARREL: KindId = KindId::of("barrel");
const KINDS: [(KindId, &str); 2] = [(CRATE, "crate"), (BARREL, "barrel")];

/// Pooled prop handle used by the demo.
#[derive(Debug, Clone, PartialEq)]
struct Prop {
    id: StableId,
    kind: KindId,
    spawned_at: Placement,
}

impl Pooled for Prop {
    fn kind(&self) -> KindId {
        self.kind
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn build_peer(
    config: &ReplicaConfig,
    bus: &MeshBus,
    table: &IdentityTable<Prop>,
) -> anyhow::Result<PoolPeer<Prop>> {
    let (endpoint, inbox) = bus.join();
    let host = TableHost::new(
        table.clone(),
        endpoint.local_peer(),
        Box::new(|kind: KindId, id: StableId, placement: &Placement| Prop {
            id,
            kind,
            spawned_at: *placement,
        }),
    );
    let host = Arc::new(Mutex::new(host));

    let mut registry = TypePoolRegistry::new();
    registry.set_placement(config.placement);
    for (kind, name) in KINDS {
        let mut pool = ObjectPool::new(kind, name, host_factory(Arc::clone(&host), kind));
        if let Some(cap) = config.default_capacity {
            pool = pool.with_capacity(cap);
        }
        registry.register(pool)?;
    }

    let coordinator = ReplicationCoordinator::networked(Arc::new(table.clone()), Arc::new(endpoint))
        .with_target(config.replication_target);
    Ok(PoolPeer::networked(registry, coordinator, inbox))
}

fn log_peer(name: &str, peer: &PoolPeer<Prop>) {
    for pool in peer.registry().pools() {
        tracing::info!(
            peer = name,
            kind = pool.name(),
            available = pool.count(),
            stats = ?pool.stats(),
            "pool state"
        );
    }
    tracing::info!(peer = name, stats = ?peer.coordinator().stats(), "replication state");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ReplicaConfig::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    init_tracing(config.log_format);
    tracing::info!(
        capacity = ?config.default_capacity,
        prewarm = config.prewarm,
        target = ?config.replication_target,
        "starting replica-pool demo"
    );

    let bus = MeshBus::new(config.mesh_bus_capacity);
    let table = IdentityTable::new();
    let mut alpha = build_peer(&config, &bus, &table)?;
    let mut beta = build_peer(&config, &bus, &table)?;

    anyhow::ensure!(
        alpha.registry().layout_fingerprint() == beta.registry().layout_fingerprint(),
        "peers registered kinds in different orders"
    );

    for (kind, _) in KINDS {
        beta.prewarm(kind, config.prewarm)?;
        alpha.pump();
        alpha.prewarm(kind, config.prewarm)?;
        beta.pump();
    }

    let item = alpha
        .get_item(CRATE)?
        .context("crate kind is not pooled")?;
    tracing::info!(id = %item.id, at = ?item.spawned_at.position, "alpha checked out a crate");
    let applied = beta.pump();
    tracing::info!(applied, "beta caught up after acquire");

    alpha.return_item(item.clone())?;
    let applied = beta.pump();
    tracing::info!(applied, "beta caught up after release");

    let mirrored = beta.peek_all(CRATE).any(|prop| *prop == item);
    tracing::info!(mirrored, "crate availability mirrored on beta");

    log_peer("alpha", &alpha);
    log_peer("beta", &beta);
    Ok(())
}
