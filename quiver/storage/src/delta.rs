use quiver_common::types::{Address, EdgeTypeId, Gid, LabelId, PropertyId, TxnId};
use quiver_common::value::PropertyValue;
use serde::{Deserialize, Serialize};

/// One logical change made by a transaction.
///
/// Deltas are the unit of both durability (WAL records) and cross-worker
/// replication (buffered on the owning worker, applied at commit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateDelta {
    TransactionBegin {
        tx: TxnId,
    },
    TransactionCommit {
        tx: TxnId,
    },
    TransactionAbort {
        tx: TxnId,
    },
    CreateVertex {
        tx: TxnId,
        gid: Gid,
    },
    CreateEdge {
        tx: TxnId,
        gid: Gid,
        from: Address,
        to: Address,
        edge_type: EdgeTypeId,
    },
    SetPropertyVertex {
        tx: TxnId,
        gid: Gid,
        property: PropertyId,
        value: PropertyValue,
    },
    SetPropertyEdge {
        tx: TxnId,
        gid: Gid,
        property: PropertyId,
        value: PropertyValue,
    },
    AddLabel {
        tx: TxnId,
        gid: Gid,
        label: LabelId,
    },
    RemoveLabel {
        tx: TxnId,
        gid: Gid,
        label: LabelId,
    },
    /// Append an outgoing edge reference to the vertex `gid`.
    AddOutEdge {
        tx: TxnId,
        gid: Gid,
        to: Address,
        edge: Address,
        edge_type: EdgeTypeId,
    },
    /// Append an incoming edge reference to the vertex `gid`.
    AddInEdge {
        tx: TxnId,
        gid: Gid,
        from: Address,
        edge: Address,
        edge_type: EdgeTypeId,
    },
    RemoveVertex {
        tx: TxnId,
        gid: Gid,
        check_empty: bool,
    },
    RemoveEdge {
        tx: TxnId,
        gid: Gid,
    },
    RemoveOutEdge {
        tx: TxnId,
        gid: Gid,
        edge: Address,
    },
    RemoveInEdge {
        tx: TxnId,
        gid: Gid,
        edge: Address,
    },
    BuildIndex {
        tx: TxnId,
        label: LabelId,
        property: PropertyId,
    },
}

impl StateDelta {
    /// The transaction this delta belongs to.
    pub fn tx(&self) -> TxnId {
        match self {
            StateDelta::TransactionBegin { tx }
            | StateDelta::TransactionCommit { tx }
            | StateDelta::TransactionAbort { tx }
            | StateDelta::CreateVertex { tx, .. }
            | StateDelta::CreateEdge { tx, .. }
            | StateDelta::SetPropertyVertex { tx, .. }
            | StateDelta::SetPropertyEdge { tx, .. }
            | StateDelta::AddLabel { tx, .. }
            | StateDelta::RemoveLabel { tx, .. }
            | StateDelta::AddOutEdge { tx, .. }
            | StateDelta::AddInEdge { tx, .. }
            | StateDelta::RemoveVertex { tx, .. }
            | StateDelta::RemoveEdge { tx, .. }
            | StateDelta::RemoveOutEdge { tx, .. }
            | StateDelta::RemoveInEdge { tx, .. }
            | StateDelta::BuildIndex { tx, .. } => *tx,
        }
    }

    /// Whether this delta terminates its transaction (commit or abort).
    /// Transaction ends are the WAL's synchronous-flush and rotation points.
    pub fn is_transaction_end(&self) -> bool {
        matches!(
            self,
            StateDelta::TransactionCommit { .. } | StateDelta::TransactionAbort { .. }
        )
    }

    /// The record the delta targets, when it targets one.
    pub fn target(&self) -> Option<Gid> {
        match self {
            StateDelta::TransactionBegin { .. }
            | StateDelta::TransactionCommit { .. }
            | StateDelta::TransactionAbort { .. }
            | StateDelta::BuildIndex { .. } => None,
            StateDelta::CreateVertex { gid, .. }
            | StateDelta::CreateEdge { gid, .. }
            | StateDelta::SetPropertyVertex { gid, .. }
            | StateDelta::SetPropertyEdge { gid, .. }
            | StateDelta::AddLabel { gid, .. }
            | StateDelta::RemoveLabel { gid, .. }
            | StateDelta::AddOutEdge { gid, .. }
            | StateDelta::AddInEdge { gid, .. }
            | StateDelta::RemoveVertex { gid, .. }
            | StateDelta::RemoveEdge { gid, .. }
            | StateDelta::RemoveOutEdge { gid, .. }
            | StateDelta::RemoveInEdge { gid, .. } => Some(*gid),
        }
    }

    /// Whether the delta edits a vertex's edge lists. Structural deltas are
    /// the ones a remote `apply` additionally writes to the owner's WAL.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            StateDelta::AddOutEdge { .. }
                | StateDelta::AddInEdge { .. }
                | StateDelta::RemoveOutEdge { .. }
                | StateDelta::RemoveInEdge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;

    #[test]
    fn encode_decode_preserves_all_fields() {
        let delta = StateDelta::CreateEdge {
            tx: TxnId::new(7),
            gid: Gid::new(1, 99),
            from: Address::new(1, Gid::new(1, 3)),
            to: Address::new(2, Gid::new(2, 4)),
            edge_type: NonZeroU32::new(5).unwrap(),
        };
        let bytes = postcard::to_allocvec(&delta).unwrap();
        let decoded: StateDelta = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, delta);

        let delta = StateDelta::SetPropertyVertex {
            tx: TxnId::new(8),
            gid: Gid::new(0, 1),
            property: 2,
            value: PropertyValue::List(vec![
                PropertyValue::Int(1),
                PropertyValue::from("x"),
                PropertyValue::from(2.5),
            ]),
        };
        let bytes = postcard::to_allocvec(&delta).unwrap();
        let decoded: StateDelta = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, delta);
    }

    #[test]
    fn transaction_ends_are_flagged() {
        assert!(StateDelta::TransactionCommit { tx: TxnId::new(1) }.is_transaction_end());
        assert!(StateDelta::TransactionAbort { tx: TxnId::new(1) }.is_transaction_end());
        assert!(!StateDelta::TransactionBegin { tx: TxnId::new(1) }.is_transaction_end());
    }
}
