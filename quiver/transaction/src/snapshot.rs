use quiver_common::types::TxnId;
use serde::{Deserialize, Serialize};

/// The set of transaction ids that were active when a transaction began.
///
/// Kept as a sorted vector: snapshots are built once at `begin` and then
/// only queried, so binary search beats a hash set on both footprint and
/// locality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    ids: Vec<TxnId>,
}

impl Snapshot {
    /// Builds a snapshot from ids in ascending order.
    pub(crate) fn from_sorted(ids: Vec<TxnId>) -> Self {
        debug_assert!(ids.is_sorted());
        Self { ids }
    }

    pub fn contains(&self, id: TxnId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[TxnId] {
        &self.ids
    }

    /// The smallest id in the snapshot, if any.
    pub fn oldest(&self) -> Option<TxnId> {
        self.ids.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_is_exact() {
        let snapshot =
            Snapshot::from_sorted(vec![TxnId::new(2), TxnId::new(5), TxnId::new(9)]);
        assert!(snapshot.contains(TxnId::new(5)));
        assert!(!snapshot.contains(TxnId::new(4)));
        assert_eq!(snapshot.oldest(), Some(TxnId::new(2)));
    }
}
