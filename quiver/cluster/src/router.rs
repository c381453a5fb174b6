use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use quiver_common::types::{Address, TxnId, WorkerId};
use quiver_storage::delta::StateDelta;
use quiver_storage::error::{StorageError, StorageResult};
use quiver_storage::graph::DeltaRouter;
use tracing::debug;

use crate::client::RpcClient;
use crate::message::{Request, Response};
use crate::registry::WorkerRegistry;

/// Sends deltas targeting remote records to their owner, where they are
/// buffered until commit. Tracks which workers each transaction touched so
/// commit can fan `Apply` out to exactly those.
pub struct ClusterRouter {
    registry: Arc<WorkerRegistry>,
    clients: DashMap<WorkerId, Arc<RpcClient>>,
    touched: DashMap<TxnId, HashSet<WorkerId>>,
}

impl ClusterRouter {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self {
            registry,
            clients: DashMap::new(),
            touched: DashMap::new(),
        }
    }

    pub fn client_for(&self, worker: WorkerId) -> StorageResult<Arc<RpcClient>> {
        if let Some(client) = self.clients.get(&worker) {
            return Ok(Arc::clone(client.value()));
        }
        let endpoint = self
            .registry
            .endpoint_of(worker)
            .ok_or_else(|| StorageError::Remote(format!("worker {worker} is not registered")))?;
        let client = Arc::new(RpcClient::new(worker, endpoint));
        self.clients.insert(worker, Arc::clone(&client));
        Ok(client)
    }

    fn call(&self, worker: WorkerId, request: Request) -> StorageResult<Response> {
        let client = self.client_for(worker)?;
        let response = client
            .call(&request)
            .map_err(|e| StorageError::Remote(e.to_string()))?;
        response.into_storage_result()
    }

    /// Fans `Apply` out to every worker this transaction buffered updates
    /// on. The first failing worker aborts the commit; the caller then
    /// aborts cluster-wide.
    pub fn apply_remote(&self, tx: TxnId) -> StorageResult<()> {
        let Some((_, workers)) = self.touched.remove(&tx) else {
            return Ok(());
        };
        for worker in workers {
            self.call(worker, Request::Apply { tx })?;
            debug!(tx = %tx, worker, "remote updates applied");
        }
        Ok(())
    }

    /// Drops the touch set without applying (transaction aborted).
    pub fn forget(&self, tx: TxnId) {
        self.touched.remove(&tx);
    }

    /// Periodic cache eviction, mirrored to every known worker.
    pub fn clear_remote_caches(&self, oldest_active: TxnId) {
        for (worker, _) in self.registry.workers() {
            if worker == self.registry.self_id() {
                continue;
            }
            let _ = self.call(
                worker,
                Request::ClearTransactionalCache { oldest_active },
            );
        }
    }
}

impl DeltaRouter for ClusterRouter {
    fn route(&self, target: Address, delta: StateDelta) -> StorageResult<()> {
        let tx = delta.tx();
        self.call(target.worker_id, Request::Update { delta })?;
        self.touched
            .entry(tx)
            .or_default()
            .insert(target.worker_id);
        Ok(())
    }
}
