use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use quiver_common::types::{Gid, TxnId};
use quiver_transaction::TransactionEngine;

use crate::error::{StorageError, StorageResult};

const SHARD_COUNT: usize = 64;

/// Striped table of per-record write locks.
///
/// Acquisition blocks up to the caller's timeout. Deadlocks are broken with
/// wound-wait on transaction ids: an older requester marks a younger holder
/// wounded (the victim aborts at its next cancellation point) and keeps
/// waiting; a younger requester just waits out its timeout.
pub struct LockStore {
    shards: Vec<Shard>,
}

#[derive(Default)]
struct Shard {
    holders: Mutex<HashMap<Gid, TxnId>>,
    released: Condvar,
}

impl Default for LockStore {
    fn default() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Shard::default()).collect(),
        }
    }
}

impl LockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, gid: Gid) -> &Shard {
        // Fibonacci hash of the raw id; the worker bits alone would land
        // every local record in one shard.
        let h = gid.raw().wrapping_mul(0x9E37_79B9_7F4A_7C15);
        &self.shards[(h >> 58) as usize % SHARD_COUNT]
    }

    /// Acquires the write lock on `gid` for `txn`. Returns `true` when the
    /// lock was newly taken (the caller records it for release), `false`
    /// when `txn` already held it.
    pub fn acquire(
        &self,
        gid: Gid,
        txn: TxnId,
        timeout: Duration,
        engine: &TransactionEngine,
    ) -> StorageResult<bool> {
        let shard = self.shard(gid);
        let deadline = Instant::now() + timeout;
        let mut holders = shard.holders.lock();
        loop {
            match holders.get(&gid) {
                None => {
                    holders.insert(gid, txn);
                    return Ok(true);
                }
                Some(&holder) if holder == txn => return Ok(false),
                Some(&holder) => {
                    if txn < holder {
                        engine.wound(holder);
                    }
                    if shard
                        .released
                        .wait_until(&mut holders, deadline)
                        .timed_out()
                    {
                        return Err(StorageError::LockTimeout(timeout));
                    }
                }
            }
        }
    }

    /// Releases `gid` if held by `txn`.
    pub fn release(&self, gid: Gid, txn: TxnId) {
        let shard = self.shard(gid);
        let mut holders = shard.holders.lock();
        if holders.get(&gid) == Some(&txn) {
            holders.remove(&gid);
            shard.released.notify_all();
        }
    }

    /// Current holder of `gid`, if any. Diagnostics only.
    pub fn holder(&self, gid: Gid) -> Option<TxnId> {
        self.shard(gid).holders.lock().get(&gid).copied()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn reacquire_is_a_no_op() {
        let engine = TransactionEngine::new();
        let locks = LockStore::new();
        let t = engine.begin();
        let gid = Gid::new(0, 1);
        assert!(locks.acquire(gid, t.id(), Duration::from_millis(10), &engine).unwrap());
        assert!(!locks.acquire(gid, t.id(), Duration::from_millis(10), &engine).unwrap());
        locks.release(gid, t.id());
        assert_eq!(locks.holder(gid), None);
    }

    #[test]
    fn contended_acquire_times_out() {
        let engine = TransactionEngine::new();
        let locks = LockStore::new();
        let a = engine.begin();
        let b = engine.begin();
        let gid = Gid::new(0, 2);
        locks.acquire(gid, a.id(), Duration::from_millis(10), &engine).unwrap();
        let err = locks
            .acquire(gid, b.id(), Duration::from_millis(20), &engine)
            .unwrap_err();
        assert!(matches!(err, StorageError::LockTimeout(_)));
    }

    #[test]
    fn older_requester_wounds_younger_holder() {
        let engine = TransactionEngine::new();
        let locks = LockStore::new();
        let older = engine.begin();
        let younger = engine.begin();
        let gid = Gid::new(0, 3);
        locks
            .acquire(gid, younger.id(), Duration::from_millis(10), &engine)
            .unwrap();
        let _ = locks.acquire(gid, older.id(), Duration::from_millis(20), &engine);
        assert!(engine.is_wounded(younger.id()));
    }

    #[test]
    fn release_wakes_waiter() {
        let engine = Arc::new(TransactionEngine::new());
        let locks = Arc::new(LockStore::new());
        let a = engine.begin();
        let b = engine.begin();
        let gid = Gid::new(0, 4);
        locks.acquire(gid, a.id(), Duration::from_millis(10), &engine).unwrap();

        let waiter = {
            let engine = engine.clone();
            let locks = locks.clone();
            let b_id = b.id();
            thread::spawn(move || {
                locks.acquire(gid, b_id, Duration::from_secs(5), &engine).unwrap()
            })
        };
        thread::sleep(Duration::from_millis(30));
        locks.release(gid, a.id());
        assert!(waiter.join().unwrap());
        assert_eq!(locks.holder(gid), Some(b.id()));
    }
}
