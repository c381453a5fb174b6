use parking_lot::RwLock;
use quiver_common::types::{Gid, TxnId};
use quiver_transaction::{Transaction, TransactionEngine};

use crate::error::{StorageError, StorageResult};

/// One version of a record's payload.
#[derive(Debug, Clone)]
pub struct Version<T> {
    pub data: T,
    /// Transaction that created this version.
    pub tx_inserted: TxnId,
    /// Transaction that superseded or deleted it; `TxnId::NONE` while live.
    pub tx_expired: TxnId,
    /// Set on the head version a `remove` creates.
    pub tombstone: bool,
}

/// The version list of a single logical record, newest version first.
///
/// Writers must hold the record lock before calling any of the mutating
/// methods; readers only take the internal `RwLock`, so reads never block
/// on the lock store.
#[derive(Debug)]
pub struct Record<T> {
    versions: RwLock<Vec<Version<T>>>,
}

/// Whether transaction `txn` observes the effects of transaction `x`:
/// either its own, or committed before `txn` began and not concurrent
/// with it.
fn observes(txn: &Transaction, engine: &TransactionEngine, x: TxnId) -> bool {
    x == txn.id()
        || (x < txn.id() && engine.is_committed(x) && !txn.snapshot().contains(x))
}

impl<T: Clone> Record<T> {
    /// Creates a record with its initial version, inserted by `tx`.
    pub fn new(data: T, tx: TxnId) -> Self {
        Self {
            versions: RwLock::new(vec![Version {
                data,
                tx_inserted: tx,
                tx_expired: TxnId::NONE,
                tombstone: false,
            }]),
        }
    }

    /// The version visible to `txn`, or `None` if the record does not exist
    /// for it (never inserted as far as it can see, or visibly deleted).
    ///
    /// Walking newest-first, the first version whose insertion `txn`
    /// observes is the visible one: any version a visible expiry points at
    /// would have been found earlier in the walk.
    pub fn visible(&self, txn: &Transaction, engine: &TransactionEngine) -> Option<T> {
        let versions = self.versions.read();
        for version in versions.iter() {
            if observes(txn, engine, version.tx_inserted) {
                if version.tombstone {
                    return None;
                }
                return Some(version.data.clone());
            }
        }
        None
    }

    /// The newest committed version, ignoring transaction context. Used by
    /// index construction and garbage collection.
    pub fn latest_committed(&self, engine: &TransactionEngine) -> Option<T> {
        let versions = self.versions.read();
        for version in versions.iter() {
            if engine.is_committed(version.tx_inserted) {
                if version.tombstone {
                    return None;
                }
                return Some(version.data.clone());
            }
        }
        None
    }

    /// Whether any version (of any visibility) satisfies the predicate.
    /// Garbage collection uses this to decide when an index entry has no
    /// remaining witness.
    pub fn any_version<F: FnMut(&T) -> bool>(&self, mut f: F) -> bool {
        self.versions.read().iter().any(|v| f(&v.data))
    }

    /// Clones the visible version as a new uncommitted head owned by `txn`
    /// (expiring the old head in its name) and applies `mutate` to it.
    /// Idempotent per transaction: a second update mutates the existing
    /// uncommitted head in place.
    pub fn update_with<R>(
        &self,
        gid: Gid,
        txn: &Transaction,
        engine: &TransactionEngine,
        mutate: impl FnOnce(&mut T) -> R,
    ) -> StorageResult<R> {
        let mut versions = self.versions.write();
        Self::prepare_write(&mut versions, gid, txn, engine)?;
        Ok(mutate(&mut versions[0].data))
    }

    /// Like `update_with`, but the new head is a tombstone.
    pub fn remove(
        &self,
        gid: Gid,
        txn: &Transaction,
        engine: &TransactionEngine,
    ) -> StorageResult<()> {
        let mut versions = self.versions.write();
        Self::prepare_write(&mut versions, gid, txn, engine)?;
        versions[0].tombstone = true;
        Ok(())
    }

    /// Ensures the head version is an uncommitted clone owned by `txn`.
    ///
    /// The caller holds the record lock, so the only way another writer's
    /// traces appear here is a finished transaction: committed heads we
    /// cannot observe are serialization conflicts, aborted heads are garbage
    /// to be unlinked on the spot.
    fn prepare_write(
        versions: &mut Vec<Version<T>>,
        gid: Gid,
        txn: &Transaction,
        engine: &TransactionEngine,
    ) -> StorageResult<()> {
        while let Some(head) = versions.first() {
            if engine.is_aborted(head.tx_inserted) {
                versions.remove(0);
            } else {
                break;
            }
        }
        let Some(head) = versions.first_mut() else {
            return Err(StorageError::NotFound(gid));
        };
        if !head.tx_expired.is_none() && engine.is_aborted(head.tx_expired) {
            head.tx_expired = TxnId::NONE;
        }
        if head.tx_inserted == txn.id() {
            return if head.tombstone {
                Err(StorageError::RecordDeleted(gid))
            } else {
                Ok(())
            };
        }
        if !observes(txn, engine, head.tx_inserted) {
            return Err(StorageError::Serialization(format!(
                "version of record {} created by transaction {} is not visible to {}",
                gid,
                head.tx_inserted,
                txn.id()
            )));
        }
        if head.tombstone {
            return Err(StorageError::RecordDeleted(gid));
        }
        let data = head.data.clone();
        head.tx_expired = txn.id();
        versions.insert(0, Version {
            data,
            tx_inserted: txn.id(),
            tx_expired: TxnId::NONE,
            tombstone: false,
        });
        Ok(())
    }

    /// Drops versions no active transaction can observe: versions inserted
    /// by aborted transactions, and versions expired by a committed
    /// transaction below `horizon`. Returns true when the whole record is
    /// garbage (no versions left, or only a tombstone nobody can miss).
    pub fn prune(&self, horizon: TxnId, engine: &TransactionEngine) -> bool {
        let mut versions = self.versions.write();
        versions.retain(|v| !engine.is_aborted(v.tx_inserted));
        for v in versions.iter_mut() {
            if !v.tx_expired.is_none() && engine.is_aborted(v.tx_expired) {
                v.tx_expired = TxnId::NONE;
            }
        }
        versions.retain(|v| {
            v.tx_expired.is_none()
                || !(engine.is_committed(v.tx_expired) && v.tx_expired < horizon)
        });
        match versions.first() {
            None => true,
            Some(head) => {
                head.tombstone
                    && engine.is_committed(head.tx_inserted)
                    && head.tx_inserted < horizon
            }
        }
    }

    pub fn version_count(&self) -> usize {
        self.versions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_writes_are_visible_uncommitted() {
        let engine = TransactionEngine::new();
        let t = engine.begin();
        let record = Record::new(1u32, t.id());
        assert_eq!(record.visible(&t, &engine), Some(1));
        record.update_with(Gid::default(), &t, &engine, |v| *v = 2).unwrap();
        assert_eq!(record.visible(&t, &engine), Some(2));
        // Still a single uncommitted head: the initial version was created
        // by the same transaction, so the update mutates in place.
        assert_eq!(record.version_count(), 1);
    }

    #[test]
    fn concurrent_snapshot_does_not_see_later_commit() {
        let engine = TransactionEngine::new();
        let a = engine.begin();
        let b = engine.begin();
        let record = Record::new(10u32, b.id());
        engine.commit(b.id());
        // b began after a, so a must not observe b's insert.
        assert_eq!(record.visible(&a, &engine), None);
        let c = engine.begin();
        assert_eq!(record.visible(&c, &engine), Some(10));
        engine.abort(a.id());
        engine.abort(c.id());
    }

    #[test]
    fn update_by_later_committed_writer_conflicts() {
        let engine = TransactionEngine::new();
        let setup = engine.begin();
        let record = Record::new(0u32, setup.id());
        engine.commit(setup.id());

        let a = engine.begin();
        let b = engine.begin();
        record.update_with(Gid::default(), &b, &engine, |v| *v = 2).unwrap();
        engine.commit(b.id());
        // a cannot observe b's committed head.
        let err = record.update_with(Gid::default(), &a, &engine, |v| *v = 1).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
        engine.abort(a.id());
    }

    #[test]
    fn aborted_head_is_unlinked_by_next_writer() {
        let engine = TransactionEngine::new();
        let setup = engine.begin();
        let record = Record::new(0u32, setup.id());
        engine.commit(setup.id());

        let a = engine.begin();
        record.update_with(Gid::default(), &a, &engine, |v| *v = 5).unwrap();
        engine.abort(a.id());

        let b = engine.begin();
        record.update_with(Gid::default(), &b, &engine, |v| *v += 1).unwrap();
        assert_eq!(record.visible(&b, &engine), Some(1));
        engine.commit(b.id());
    }

    #[test]
    fn removed_record_rejects_updates() {
        let engine = TransactionEngine::new();
        let setup = engine.begin();
        let record = Record::new(0u32, setup.id());
        engine.commit(setup.id());

        let a = engine.begin();
        record.remove(Gid::default(), &a, &engine).unwrap();
        engine.commit(a.id());

        let b = engine.begin();
        assert_eq!(record.visible(&b, &engine), None);
        let err = record.update_with(Gid::default(), &b, &engine, |_| ()).unwrap_err();
        assert!(matches!(err, StorageError::RecordDeleted(_)));
        engine.abort(b.id());
    }

    #[test]
    fn prune_keeps_versions_visible_to_old_snapshots() {
        let engine = TransactionEngine::new();
        let setup = engine.begin();
        let record = Record::new(1u32, setup.id());
        engine.commit(setup.id());

        let reader = engine.begin();
        let writer = engine.begin();
        record.update_with(Gid::default(), &writer, &engine, |v| *v = 2).unwrap();
        engine.commit(writer.id());

        // The reader's snapshot predates the writer: the old version must
        // survive a prune at the current horizon.
        assert!(!record.prune(engine.gc_horizon(), &engine));
        assert_eq!(record.visible(&reader, &engine), Some(1));
        assert_eq!(record.version_count(), 2);

        engine.abort(reader.id());
        assert!(!record.prune(engine.gc_horizon(), &engine));
        assert_eq!(record.version_count(), 1);
    }

    #[test]
    fn prune_reports_dead_tombstones() {
        let engine = TransactionEngine::new();
        let setup = engine.begin();
        let record = Record::new(1u32, setup.id());
        engine.commit(setup.id());

        let t = engine.begin();
        record.remove(Gid::default(), &t, &engine).unwrap();
        engine.commit(t.id());

        assert!(record.prune(engine.gc_horizon(), &engine));
    }
}
