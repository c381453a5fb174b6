use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use quiver_common::types::{Gid, TxnId};
use quiver_storage::{GraphAccessor, StateDelta, Storage, StorageResult};
use quiver_transaction::Transaction;
use tracing::debug;

/// Buffered deltas of one transaction: per-record FIFO queues. Deltas for
/// the same record apply in arrival order; different records are
/// independent.
#[derive(Default)]
pub struct TxUpdates {
    queues: Mutex<HashMap<Gid, VecDeque<StateDelta>>>,
}

impl TxUpdates {
    fn emplace(&self, gid: Gid, delta: StateDelta) {
        self.queues.lock().entry(gid).or_default().push_back(delta);
    }

    fn drain(&self) -> Vec<(Gid, VecDeque<StateDelta>)> {
        self.queues.lock().drain().collect()
    }
}

/// One per worker: holds the updates other workers buffered here for
/// records this worker owns, keyed by transaction.
///
/// Conflicts are not detected at `emplace`; they surface when `apply`
/// drains the queues through the ordinary accessor write path.
pub struct UpdatesCoordinator {
    storage: Arc<Storage>,
    /// Local registration of remote transactions, created at first
    /// contact under the cluster-wide id.
    transactions: DashMap<TxnId, Transaction>,
    vertex_updates: DashMap<TxnId, Arc<TxUpdates>>,
    edge_updates: DashMap<TxnId, Arc<TxUpdates>>,
}

impl UpdatesCoordinator {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            transactions: DashMap::new(),
            vertex_updates: DashMap::new(),
            edge_updates: DashMap::new(),
        }
    }

    /// The local registration of a cluster-wide transaction id, created on
    /// first contact. Registration writes the begin marker to this
    /// worker's WAL so its recovery sees the transaction open.
    pub fn register_transaction(&self, tx: TxnId) -> Transaction {
        self.transactions
            .entry(tx)
            .or_insert_with(|| {
                let txn = self.storage.engine.begin_replayed(tx);
                let _ = self
                    .storage
                    .wal
                    .emplace(StateDelta::TransactionBegin { tx });
                txn
            })
            .clone()
    }

    fn updates_for(&self, tx: TxnId, edge: bool) -> Arc<TxUpdates> {
        self.register_transaction(tx);
        let map = if edge {
            &self.edge_updates
        } else {
            &self.vertex_updates
        };
        map.entry(tx).or_default().clone()
    }

    /// Enqueues a delta for its target record.
    pub fn emplace(&self, delta: StateDelta) -> StorageResult<()> {
        let Some(gid) = delta.target() else {
            return Ok(());
        };
        let edge = matches!(
            delta,
            StateDelta::CreateEdge { .. }
                | StateDelta::SetPropertyEdge { .. }
                | StateDelta::RemoveEdge { .. }
        );
        self.updates_for(delta.tx(), edge).emplace(gid, delta);
        Ok(())
    }

    /// Applies everything buffered for `tx`: reconstructs an accessor per
    /// record and replays the queue in order. Structural deltas are also
    /// written to this worker's WAL. The first failure wins and the caller
    /// aborts the transaction cluster-wide; on success the transaction is
    /// committed on this worker.
    pub fn apply(&self, tx: TxnId) -> StorageResult<()> {
        let Some((_, txn)) = self.transactions.remove(&tx) else {
            return Ok(());
        };
        let handles: Vec<Arc<TxUpdates>> = self
            .vertex_updates
            .remove(&tx)
            .into_iter()
            .chain(self.edge_updates.remove(&tx))
            .map(|(_, updates)| updates)
            .collect();
        let accessor = GraphAccessor::new(Arc::clone(&self.storage), txn.clone());
        let mut applied = 0usize;
        let result = (|| {
            for updates in &handles {
                for (_, queue) in updates.drain() {
                    for delta in queue {
                        if delta.is_structural() {
                            self.storage.wal.emplace(delta.clone())?;
                        }
                        accessor.apply_local(&delta)?;
                        applied += 1;
                    }
                }
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.storage.commit_transaction(&txn)?;
                debug!(tx = %tx, applied, "applied buffered updates");
                Ok(())
            }
            Err(e) => {
                self.storage.abort_transaction(&txn)?;
                Err(e)
            }
        }
    }

    /// Drops buffers of transactions no active transaction can reference
    /// any more.
    pub fn clear_transactional_cache(&self, oldest_active: TxnId) {
        self.vertex_updates.retain(|tx, _| *tx >= oldest_active);
        self.edge_updates.retain(|tx, _| *tx >= oldest_active);
        self.transactions.retain(|tx, txn| {
            if *tx >= oldest_active {
                return true;
            }
            // An evicted transaction that never saw an `Apply` is dead;
            // make sure it does not linger in the active set.
            if self.storage.engine.is_active(*tx) {
                let _ = self.storage.abort_transaction(txn);
            }
            false
        });
    }

    pub fn buffered_transactions(&self) -> usize {
        let mut ids: Vec<TxnId> = self.vertex_updates.iter().map(|e| *e.key()).collect();
        ids.extend(self.edge_updates.iter().map(|e| *e.key()));
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}
