use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quiver_cluster::coordinator::UpdatesCoordinator;
use quiver_cluster::message::{Request, Response};
use quiver_cluster::registry::WorkerRegistry;
use quiver_cluster::router::ClusterRouter;
use quiver_cluster::server::RpcServer;
use quiver_cluster::service::ClusterService;
use quiver_common::types::{Address, EdgeTypeId, TxnId, WorkerId};
use quiver_common::value::PropertyValue;
use quiver_storage::wal::{WalConfig, WalReader, wal_files};
use quiver_storage::{DeltaRouter, GraphAccessor, StateDelta, Storage};
use quiver_transaction::TransactionEngine;

fn open_storage(worker: WorkerId, dir: &Path) -> Arc<Storage> {
    Storage::new(
        worker,
        Arc::new(TransactionEngine::new()),
        WalConfig {
            directory: dir.to_path_buf(),
            enabled: true,
            synchronous_commit: true,
            flush_interval: Duration::from_millis(10),
            rotate_deltas_count: 100_000,
        },
        Duration::from_millis(200),
    )
    .unwrap()
}

fn edge_type(raw: u32) -> EdgeTypeId {
    NonZeroU32::new(raw).unwrap()
}

struct RemoteWorker {
    storage: Arc<Storage>,
    server: RpcServer,
}

fn spawn_worker(worker: WorkerId, dir: &Path) -> RemoteWorker {
    let storage = open_storage(worker, dir);
    let coordinator = Arc::new(UpdatesCoordinator::new(Arc::clone(&storage)));
    let registry = Arc::new(WorkerRegistry::new(worker, None));
    let service = ClusterService::new(Arc::clone(&storage), coordinator, registry);
    let server = RpcServer::bind("127.0.0.1:0", service.into_handler()).unwrap();
    RemoteWorker { storage, server }
}

fn wal_deltas(dir: &Path) -> Vec<StateDelta> {
    let mut deltas = Vec::new();
    for file in wal_files(dir).unwrap() {
        for record in WalReader::open(&file).unwrap() {
            deltas.push(record.unwrap());
        }
    }
    deltas
}

#[test]
fn edge_across_workers_buffers_and_applies_on_commit() {
    let dir1 = tempfile::tempdir().unwrap();
    let dir2 = tempfile::tempdir().unwrap();

    let master = open_storage(1, dir1.path());
    let remote = spawn_worker(2, dir2.path());

    let registry = Arc::new(WorkerRegistry::new(1, None));
    registry.discover(2, remote.server.local_addr().to_string());
    let router = Arc::new(ClusterRouter::new(Arc::clone(&registry)));
    master.set_router(router.clone());

    // The `to` vertex lives on worker 2, created there over RPC under the
    // master's transaction.
    let txn = master.begin_transaction().unwrap();
    let client = router.client_for(2).unwrap();
    let to_gid = match client
        .call(&Request::CreateVertex {
            tx: txn.id(),
            labels: vec![],
            properties: vec![(0, PropertyValue::Int(2))],
        })
        .unwrap()
    {
        Response::Created { gid } => gid,
        other => panic!("unexpected response {other:?}"),
    };
    assert_eq!(to_gid.worker_id(), 2);

    // The `from` vertex and the edge live on worker 1.
    let graph = GraphAccessor::new(Arc::clone(&master), txn.clone());
    let from = graph.create_vertex(vec![], vec![]).unwrap();
    let edge = graph
        .create_edge(from.address(), Address::new(2, to_gid), edge_type(7))
        .unwrap();

    // Commit: buffered updates are applied on worker 2 first, then the
    // master commits locally.
    router.apply_remote(txn.id()).unwrap();
    master.commit_transaction(&txn).unwrap();

    // Worker 1 sees the outgoing side.
    let check = master.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&master), check.clone());
    let from_after = graph.find_vertex(from.gid).unwrap();
    assert_eq!(from_after.data.out_edges.len(), 1);
    assert_eq!(from_after.data.out_edges[0].vertex.gid, to_gid);
    master.abort_transaction(&check).unwrap();

    // Worker 2 sees the incoming side.
    let check = remote.storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&remote.storage), check.clone());
    let to_after = graph.find_vertex(to_gid).unwrap();
    assert_eq!(to_after.data.in_edges.len(), 1);
    assert_eq!(to_after.data.in_edges[0].edge.gid, edge.gid);
    assert_eq!(to_after.data.property(0), Some(&PropertyValue::Int(2)));
    remote.storage.abort_transaction(&check).unwrap();

    // Both WALs carry their side's structural delta.
    master.wal.flush().unwrap();
    remote.storage.wal.flush().unwrap();
    assert!(
        wal_deltas(dir1.path())
            .iter()
            .any(|d| matches!(d, StateDelta::AddOutEdge { gid, .. } if *gid == from.gid))
    );
    assert!(
        wal_deltas(dir2.path())
            .iter()
            .any(|d| matches!(d, StateDelta::AddInEdge { gid, .. } if *gid == to_gid))
    );
    // And worker 2 saw the transaction through to its commit marker.
    assert!(
        wal_deltas(dir2.path())
            .iter()
            .any(|d| matches!(d, StateDelta::TransactionCommit { tx } if *tx == txn.id()))
    );
}

#[test]
fn failed_remote_apply_aborts_the_transaction() {
    let dir1 = tempfile::tempdir().unwrap();
    let dir2 = tempfile::tempdir().unwrap();

    let master = open_storage(1, dir1.path());
    let remote = spawn_worker(2, dir2.path());

    let registry = Arc::new(WorkerRegistry::new(1, None));
    registry.discover(2, remote.server.local_addr().to_string());
    let router = Arc::new(ClusterRouter::new(Arc::clone(&registry)));
    master.set_router(router.clone());

    // Route an update for a vertex that does not exist on worker 2: the
    // buffering succeeds, the apply fails.
    let txn = master.begin_transaction().unwrap();
    let bogus = quiver_common::types::Gid::new(2, 999);
    router
        .route(
            Address::new(2, bogus),
            StateDelta::SetPropertyVertex {
                tx: txn.id(),
                gid: bogus,
                property: 0,
                value: PropertyValue::Int(1),
            },
        )
        .unwrap();
    let err = router.apply_remote(txn.id()).unwrap_err();
    let _ = err;
    master.abort_transaction(&txn).unwrap();
}

#[test]
fn cache_eviction_drops_stale_buffers() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(3, dir.path());
    let coordinator = UpdatesCoordinator::new(Arc::clone(&storage));

    coordinator
        .emplace(StateDelta::SetPropertyVertex {
            tx: TxnId::new(5),
            gid: quiver_common::types::Gid::new(3, 1),
            property: 0,
            value: PropertyValue::Int(1),
        })
        .unwrap();
    assert_eq!(coordinator.buffered_transactions(), 1);
    coordinator.clear_transactional_cache(TxnId::new(6));
    assert_eq!(coordinator.buffered_transactions(), 0);
}
