use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_skiplist::SkipMap;
use dashmap::DashSet;
use parking_lot::Mutex;
use quiver_common::types::TxnId;

use crate::snapshot::Snapshot;

/// A running transaction: its id plus the snapshot taken at begin.
///
/// The handle is plain data; all state transitions go through the
/// [`TransactionEngine`].
#[derive(Debug, Clone)]
pub struct Transaction {
    id: TxnId,
    snapshot: Snapshot,
}

impl Transaction {
    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

/// Issues transaction ids and tracks which ids are active, committed or
/// aborted.
///
/// `begin` holds a short mutex so that id allocation, the snapshot copy and
/// the active-set insert are one atomic step; every read path
/// (`is_committed`, `oldest_active`, ...) is lock-free.
pub struct TransactionEngine {
    /// Guards the begin sequence only.
    begin_lock: Mutex<()>,
    next_id: AtomicU64,
    /// Active id → the oldest id that transaction can still observe (the
    /// front of its snapshot, or its own id). Values are non-decreasing in
    /// key order, so the front entry carries the global GC horizon.
    active: SkipMap<TxnId, TxnId>,
    committed: DashSet<TxnId>,
    aborted: DashSet<TxnId>,
    /// Ids below this are finalized and dropped from `committed`; below
    /// the line an id was committed iff it is absent from `aborted`.
    finalized_below: AtomicU64,
    last_committed: AtomicU64,
    /// Transactions marked for abort by wound-wait; polled cooperatively.
    wounded: DashSet<TxnId>,
}

impl Default for TransactionEngine {
    fn default() -> Self {
        Self {
            begin_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            active: SkipMap::new(),
            committed: DashSet::new(),
            aborted: DashSet::new(),
            finalized_below: AtomicU64::new(1),
            last_committed: AtomicU64::new(0),
            wounded: DashSet::new(),
        }
    }
}

impl TransactionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a new transaction: allocates the next id, captures the active
    /// set as the snapshot (excluding the new id) and marks the id active.
    pub fn begin(&self) -> Transaction {
        let _guard = self.begin_lock.lock();
        let raw = self.next_id.fetch_add(1, Ordering::SeqCst);
        assert!(raw != u64::MAX, "transaction id space exhausted");
        self.register(TxnId::new(raw))
    }

    /// Re-registers a transaction under a fixed id. Used by WAL replay,
    /// which must reproduce the original ids; also advances the id counter
    /// past the replayed id.
    pub fn begin_replayed(&self, id: TxnId) -> Transaction {
        let _guard = self.begin_lock.lock();
        self.next_id.fetch_max(id.raw() + 1, Ordering::SeqCst);
        self.register(id)
    }

    fn register(&self, id: TxnId) -> Transaction {
        // SkipMap iterates in ascending key order, so the snapshot comes out
        // sorted for free. The id itself caps the horizon: replayed ids can
        // be registered out of order.
        let snapshot = Snapshot::from_sorted(self.active.iter().map(|e| *e.key()).collect());
        let horizon = snapshot.oldest().map_or(id, |oldest| oldest.min(id));
        self.active.insert(id, horizon);
        Transaction { id, snapshot }
    }

    pub fn commit(&self, id: TxnId) {
        self.active.remove(&id);
        self.committed.insert(id);
        self.last_committed.fetch_max(id.raw(), Ordering::SeqCst);
        self.wounded.remove(&id);
    }

    pub fn abort(&self, id: TxnId) {
        self.active.remove(&id);
        self.aborted.insert(id);
        self.wounded.remove(&id);
    }

    /// A fresh snapshot of the currently active set.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_sorted(self.active.iter().map(|e| *e.key()).collect())
    }

    /// The most recently issued transaction id.
    pub fn global_last(&self) -> TxnId {
        TxnId::new(self.next_id.load(Ordering::SeqCst) - 1)
    }

    pub fn last_committed(&self) -> TxnId {
        TxnId::new(self.last_committed.load(Ordering::SeqCst))
    }

    /// The oldest active transaction id, or `last_committed + 1` when the
    /// active set is empty.
    pub fn oldest_active(&self) -> TxnId {
        self.active
            .front()
            .map(|e| *e.key())
            .unwrap_or_else(|| TxnId::new(self.last_committed.load(Ordering::SeqCst) + 1))
    }

    /// The oldest id any active transaction can still observe. Versions
    /// finalized strictly below this are invisible to everyone and safe to
    /// collect. Stricter than [`Self::oldest_active`]: an active transaction
    /// may hold a snapshot reaching further back than its own id.
    pub fn gc_horizon(&self) -> TxnId {
        self.active
            .front()
            .map(|e| *e.value())
            .unwrap_or_else(|| TxnId::new(self.last_committed.load(Ordering::SeqCst) + 1))
    }

    pub fn is_active(&self, id: TxnId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn is_committed(&self, id: TxnId) -> bool {
        if id.raw() < self.finalized_below.load(Ordering::Acquire) {
            return !self.aborted.contains(&id);
        }
        self.committed.contains(&id)
    }

    pub fn is_aborted(&self, id: TxnId) -> bool {
        self.aborted.contains(&id)
    }

    /// Marks a transaction for abort so an older lock waiter can proceed.
    /// The victim observes the flag at its next cancellation point.
    pub fn wound(&self, id: TxnId) {
        if self.is_active(id) {
            self.wounded.insert(id);
        }
    }

    pub fn is_wounded(&self, id: TxnId) -> bool {
        self.wounded.contains(&id)
    }

    /// Drops finalized ids below `horizon` from the committed set.
    ///
    /// Below the horizon "not aborted" is read as committed, so the aborted
    /// set is kept as the (much smaller) exception list. Callers must pick a
    /// horizon at or below the oldest active snapshot.
    pub fn compact(&self, horizon: TxnId) {
        let current = self.finalized_below.load(Ordering::Acquire);
        if horizon.raw() <= current {
            return;
        }
        self.committed.retain(|id| id.raw() >= horizon.raw());
        self.finalized_below.store(horizon.raw(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_excludes_self_and_sees_concurrents() {
        let engine = TransactionEngine::new();
        let a = engine.begin();
        let b = engine.begin();
        assert!(a.snapshot().is_empty());
        assert!(b.snapshot().contains(a.id()));
        assert!(!b.snapshot().contains(b.id()));
    }

    #[test]
    fn state_transitions() {
        let engine = TransactionEngine::new();
        let t = engine.begin();
        assert!(engine.is_active(t.id()));
        engine.commit(t.id());
        assert!(!engine.is_active(t.id()));
        assert!(engine.is_committed(t.id()));
        assert!(!engine.is_aborted(t.id()));
        assert_eq!(engine.last_committed(), t.id());

        let u = engine.begin();
        engine.abort(u.id());
        assert!(engine.is_aborted(u.id()));
        assert!(!engine.is_committed(u.id()));
    }

    #[test]
    fn oldest_active_tracks_front_then_falls_back() {
        let engine = TransactionEngine::new();
        let a = engine.begin();
        let b = engine.begin();
        assert_eq!(engine.oldest_active(), a.id());
        engine.commit(a.id());
        assert_eq!(engine.oldest_active(), b.id());
        engine.commit(b.id());
        assert_eq!(engine.oldest_active(), TxnId::new(b.id().raw() + 1));
    }

    #[test]
    fn compaction_keeps_commit_answers() {
        let engine = TransactionEngine::new();
        let a = engine.begin();
        let b = engine.begin();
        engine.commit(a.id());
        engine.abort(b.id());
        engine.compact(TxnId::new(b.id().raw() + 1));
        // Compaction drops a from the committed set but the answer must not
        // change; b stays on the aborted exception list.
        assert!(engine.is_committed(a.id()));
        assert!(!engine.is_committed(b.id()));
        assert!(engine.is_aborted(b.id()));
    }

    #[test]
    fn gc_horizon_respects_old_snapshots() {
        let engine = TransactionEngine::new();
        let a = engine.begin();
        let b = engine.begin(); // snapshot contains a
        engine.commit(a.id());
        // b can still observe the pre-a state, so the horizon must not move
        // past a even though a is committed and b is the only active txn.
        assert_eq!(engine.oldest_active(), b.id());
        assert_eq!(engine.gc_horizon(), a.id());
        engine.commit(b.id());
        assert_eq!(engine.gc_horizon(), TxnId::new(b.id().raw() + 1));
    }

    #[test]
    fn wound_flags_are_per_transaction() {
        let engine = TransactionEngine::new();
        let t = engine.begin();
        assert!(!engine.is_wounded(t.id()));
        engine.wound(t.id());
        assert!(engine.is_wounded(t.id()));
        engine.abort(t.id());
        assert!(!engine.is_wounded(t.id()));
    }
}
