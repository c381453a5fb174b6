use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use quiver_common::types::TxnId;
use quiver_transaction::Transaction;
use tracing::{info, warn};

use crate::delta::StateDelta;
use crate::error::StorageResult;
use crate::graph::GraphAccessor;
use crate::store::Storage;
use crate::wal::{WalReader, wal_files};

#[derive(Debug, Default)]
pub struct RecoveryInfo {
    pub files: usize,
    pub transactions_replayed: usize,
    pub deltas_applied: usize,
}

/// Replays the WAL into an empty store.
///
/// Two passes over the log: the first collects the set of transactions with
/// a commit marker, the second re-executes the deltas of exactly those
/// transactions, in log order, through the ordinary graph accessor with WAL
/// emission switched off. Transactions with no commit marker are
/// discarded, including ones a crash tore across a rotation boundary.
pub fn recover(storage: &Arc<Storage>) -> StorageResult<RecoveryInfo> {
    let files = wal_files(storage.wal.directory()).map_err(crate::error::WalError::Io)?;
    let mut deltas = Vec::new();
    for (i, path) in files.iter().enumerate() {
        let last = i + 1 == files.len();
        let reader = WalReader::open(path).map_err(crate::error::StorageError::Wal)?;
        for record in reader {
            match record {
                Ok(delta) => deltas.push(delta),
                Err(e) if last => {
                    // A torn tail of the current file is expected after a
                    // hard kill; everything before it is still usable.
                    warn!(file = %path.display(), error = %e, "stopping replay at torn WAL tail");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    let committed: HashSet<TxnId> = deltas
        .iter()
        .filter_map(|d| match d {
            StateDelta::TransactionCommit { tx } => Some(*tx),
            _ => None,
        })
        .collect();

    storage.wal.set_enabled(false);
    let result = replay(storage, &deltas, &committed);
    storage.wal.set_enabled(true);
    let mut info = result?;
    info.files = files.len();
    info!(
        files = info.files,
        transactions = info.transactions_replayed,
        deltas = info.deltas_applied,
        "recovery complete"
    );
    Ok(info)
}

fn replay(
    storage: &Arc<Storage>,
    deltas: &[StateDelta],
    committed: &HashSet<TxnId>,
) -> StorageResult<RecoveryInfo> {
    let mut info = RecoveryInfo::default();
    let mut open: HashMap<TxnId, (Transaction, GraphAccessor)> = HashMap::new();
    for delta in deltas {
        let tx = delta.tx();
        if !committed.contains(&tx) {
            continue;
        }
        match delta {
            StateDelta::TransactionBegin { .. } => {
                let txn = storage.engine.begin_replayed(tx);
                let accessor = GraphAccessor::new(Arc::clone(storage), txn.clone());
                open.insert(tx, (txn, accessor));
                info.transactions_replayed += 1;
            }
            StateDelta::TransactionCommit { .. } => {
                if let Some((txn, _)) = open.remove(&tx) {
                    storage.commit_transaction(&txn)?;
                }
            }
            StateDelta::TransactionAbort { .. } => {
                // Cannot happen for a transaction in the committed set; be
                // tolerant anyway.
                if let Some((txn, _)) = open.remove(&tx) {
                    storage.abort_transaction(&txn)?;
                }
            }
            other => {
                let Some((_, accessor)) = open.get(&tx) else {
                    warn!(tx = %tx, "delta for unopened transaction; skipping");
                    continue;
                };
                // This worker's WAL also records deltas it routed to other
                // workers; those replay on the owner, not here.
                if let Some(target) = other.target() {
                    if !storage.is_local(target) {
                        continue;
                    }
                }
                accessor.apply_local(other)?;
                info.deltas_applied += 1;
            }
        }
    }
    // A transaction can only still be open here if the log is malformed
    // (its commit marker was counted but never reached); abort it so the
    // active set ends up clean.
    for (_, (txn, _)) in open {
        storage.abort_transaction(&txn)?;
    }
    Ok(info)
}
