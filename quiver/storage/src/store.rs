use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use quiver_common::types::{Gid, TxnId, WorkerId};
use quiver_transaction::{Transaction, TransactionEngine};
use tracing::debug;

use crate::delta::StateDelta;
use crate::error::{StorageError, StorageResult};
use crate::graph::DeltaRouter;
use crate::index::Indexes;
use crate::lock::LockStore;
use crate::model::{Edge, Vertex};
use crate::record::Record;
use crate::wal::{Wal, WalConfig};

/// The per-worker record store: versioned vertices and edges keyed by Gid,
/// the record lock table, the indexes and the WAL.
pub struct Storage {
    worker_id: WorkerId,
    pub(crate) vertices: DashMap<Gid, Arc<Record<Vertex>>>,
    pub(crate) edges: DashMap<Gid, Arc<Record<Edge>>>,
    next_local: AtomicU64,
    pub engine: Arc<TransactionEngine>,
    pub(crate) locks: LockStore,
    held_locks: DashMap<TxnId, Vec<Gid>>,
    pub indexes: Indexes,
    pub wal: Arc<Wal>,
    lock_timeout: Duration,
    router: OnceLock<Arc<dyn DeltaRouter>>,
}

impl Storage {
    pub fn new(
        worker_id: WorkerId,
        engine: Arc<TransactionEngine>,
        wal_config: WalConfig,
        lock_timeout: Duration,
    ) -> StorageResult<Arc<Self>> {
        Ok(Arc::new(Self {
            worker_id,
            vertices: DashMap::new(),
            edges: DashMap::new(),
            next_local: AtomicU64::new(1),
            engine,
            locks: LockStore::new(),
            held_locks: DashMap::new(),
            indexes: Indexes::new(),
            wal: Arc::new(Wal::new(wal_config)?),
            lock_timeout,
            router: OnceLock::new(),
        }))
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Wires the cross-worker delta router. Single-worker deployments never
    /// call this; any delta targeting a remote record then fails.
    pub fn set_router(&self, router: Arc<dyn DeltaRouter>) {
        let _ = self.router.set(router);
    }

    pub fn router(&self) -> Option<&Arc<dyn DeltaRouter>> {
        self.router.get()
    }

    /// Allocates a fresh Gid owned by this worker.
    pub fn allocate_gid(&self) -> Gid {
        let local = self.next_local.fetch_add(1, Ordering::SeqCst);
        Gid::new(self.worker_id, local)
    }

    /// Advances the local Gid sequence past `gid`. Replay calls this so
    /// post-recovery allocations do not collide with recovered records.
    pub fn note_allocated(&self, gid: Gid) {
        if gid.worker_id() == self.worker_id {
            self.next_local.fetch_max(gid.local() + 1, Ordering::SeqCst);
        }
    }

    pub fn is_local(&self, gid: Gid) -> bool {
        gid.worker_id() == self.worker_id
    }

    pub(crate) fn vertex_record(&self, gid: Gid) -> Option<Arc<Record<Vertex>>> {
        self.vertices.get(&gid).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn edge_record(&self, gid: Gid) -> Option<Arc<Record<Edge>>> {
        self.edges.get(&gid).map(|r| Arc::clone(r.value()))
    }

    pub fn vertex_gids(&self) -> Vec<Gid> {
        self.vertices.iter().map(|e| *e.key()).collect()
    }

    /// Number of vertex records held, live or not. Good enough for
    /// cardinality estimation.
    pub fn vertex_count(&self) -> u64 {
        self.vertices.len() as u64
    }

    /// Takes the write lock on `gid` for the transaction, remembering it
    /// for release at transaction end.
    pub fn lock_for_write(&self, txn: &Transaction, gid: Gid) -> StorageResult<()> {
        let newly = self
            .locks
            .acquire(gid, txn.id(), self.lock_timeout, &self.engine)?;
        if newly {
            self.held_locks.entry(txn.id()).or_default().push(gid);
        }
        Ok(())
    }

    fn release_locks(&self, tx: TxnId) {
        if let Some((_, held)) = self.held_locks.remove(&tx) {
            for gid in held {
                self.locks.release(gid, tx);
            }
        }
    }

    // ----- transaction lifecycle -----

    pub fn begin_transaction(&self) -> StorageResult<Transaction> {
        let txn = self.engine.begin();
        self.wal
            .emplace(StateDelta::TransactionBegin { tx: txn.id() })?;
        Ok(txn)
    }

    /// Commits: the end marker reaches the WAL (synchronously flushed when
    /// synchronous commit is on) before the engine flips the id to
    /// committed, so an acknowledged commit is durable.
    pub fn commit_transaction(&self, txn: &Transaction) -> StorageResult<()> {
        if self.engine.is_wounded(txn.id()) {
            self.abort_transaction(txn)?;
            return Err(StorageError::Serialization(format!(
                "transaction {} was wounded by an older writer",
                txn.id()
            )));
        }
        if let Err(e) = self
            .wal
            .emplace(StateDelta::TransactionCommit { tx: txn.id() })
        {
            self.engine.abort(txn.id());
            self.release_locks(txn.id());
            return Err(e);
        }
        self.engine.commit(txn.id());
        self.release_locks(txn.id());
        debug!(tx = %txn.id(), "committed");
        Ok(())
    }

    pub fn abort_transaction(&self, txn: &Transaction) -> StorageResult<()> {
        // The abort marker is best-effort: a poisoned WAL must not keep a
        // transaction pinned in the active set.
        let _ = self
            .wal
            .emplace(StateDelta::TransactionAbort { tx: txn.id() });
        self.engine.abort(txn.id());
        self.release_locks(txn.id());
        debug!(tx = %txn.id(), "aborted");
        Ok(())
    }
}
