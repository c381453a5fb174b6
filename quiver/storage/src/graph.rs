use std::sync::Arc;

use quiver_common::types::{Address, EdgeTypeId, Gid, LabelId, PropertyId};
use quiver_common::value::PropertyValue;
use quiver_transaction::Transaction;

use crate::delta::StateDelta;
use crate::error::{StorageError, StorageResult};
use crate::index::{IndexKey, PropertyBound};
use crate::model::{Edge, EdgeRef, Vertex};
use crate::record::Record;
use crate::store::Storage;

/// Routes a delta to the worker owning its target record, where it is
/// buffered until the transaction commits. Implemented by the cluster
/// layer; a store without a router is single-worker.
pub trait DeltaRouter: Send + Sync {
    fn route(&self, target: Address, delta: StateDelta) -> StorageResult<()>;
}

/// A transaction-bound handle to a vertex: the Gid plus the payload of the
/// version that was visible when the accessor was resolved.
#[derive(Debug, Clone)]
pub struct VertexAccessor {
    pub gid: Gid,
    pub data: Vertex,
}

impl VertexAccessor {
    pub fn address(&self) -> Address {
        Address::new(self.gid.worker_id(), self.gid)
    }
}

/// A transaction-bound handle to an edge.
#[derive(Debug, Clone)]
pub struct EdgeAccessor {
    pub gid: Gid,
    pub data: Edge,
}

impl EdgeAccessor {
    pub fn address(&self) -> Address {
        Address::new(self.gid.worker_id(), self.gid)
    }
}

/// Typed view over the record store bound to one transaction.
///
/// Every mutation goes out as a stream of [`StateDelta`]s: each delta is
/// written to the WAL and then either applied to the local record or, when
/// the target record lives on another worker, routed to that worker's
/// update buffer.
#[derive(Clone)]
pub struct GraphAccessor {
    storage: Arc<Storage>,
    txn: Transaction,
}

impl GraphAccessor {
    pub fn new(storage: Arc<Storage>, txn: Transaction) -> Self {
        Self { storage, txn }
    }

    pub fn txn(&self) -> &Transaction {
        &self.txn
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Logs the delta, then applies it locally or routes it to the owner.
    fn dispatch(&self, delta: StateDelta) -> StorageResult<()> {
        let target = delta
            .target()
            .expect("dispatched deltas always target a record");
        self.storage.wal.emplace(delta.clone())?;
        if self.storage.is_local(target) {
            self.apply_local(&delta)
        } else {
            let router = self.storage.router().ok_or_else(|| {
                StorageError::Remote(format!(
                    "record {target} is owned by worker {} but no cluster is configured",
                    target.worker_id()
                ))
            })?;
            router.route(Address::new(target.worker_id(), target), delta)
        }
    }

    // ----- vertex operations -----

    pub fn create_vertex(
        &self,
        labels: Vec<LabelId>,
        properties: Vec<(PropertyId, PropertyValue)>,
    ) -> StorageResult<VertexAccessor> {
        let gid = self.storage.allocate_gid();
        self.dispatch(StateDelta::CreateVertex {
            tx: self.txn.id(),
            gid,
        })?;
        for label in labels {
            self.dispatch(StateDelta::AddLabel {
                tx: self.txn.id(),
                gid,
                label,
            })?;
        }
        for (property, value) in properties {
            self.dispatch(StateDelta::SetPropertyVertex {
                tx: self.txn.id(),
                gid,
                property,
                value,
            })?;
        }
        self.find_vertex(gid)
    }

    pub fn find_vertex(&self, gid: Gid) -> StorageResult<VertexAccessor> {
        if !self.storage.is_local(gid) {
            return Err(StorageError::Remote(format!(
                "vertex {gid} is not resolvable on worker {}",
                self.storage.worker_id()
            )));
        }
        let record = self
            .storage
            .vertex_record(gid)
            .ok_or(StorageError::NotFound(gid))?;
        let data = record
            .visible(&self.txn, &self.storage.engine)
            .ok_or(StorageError::NotFound(gid))?;
        Ok(VertexAccessor { gid, data })
    }

    /// Re-resolves the visible version, picking up this transaction's own
    /// later writes.
    pub fn reconstruct_vertex(&self, accessor: &mut VertexAccessor) -> StorageResult<()> {
        *accessor = self.find_vertex(accessor.gid)?;
        Ok(())
    }

    pub fn add_label(&self, gid: Gid, label: LabelId) -> StorageResult<()> {
        self.dispatch(StateDelta::AddLabel {
            tx: self.txn.id(),
            gid,
            label,
        })
    }

    pub fn remove_label(&self, gid: Gid, label: LabelId) -> StorageResult<()> {
        self.dispatch(StateDelta::RemoveLabel {
            tx: self.txn.id(),
            gid,
            label,
        })
    }

    pub fn set_vertex_property(
        &self,
        gid: Gid,
        property: PropertyId,
        value: PropertyValue,
    ) -> StorageResult<()> {
        self.dispatch(StateDelta::SetPropertyVertex {
            tx: self.txn.id(),
            gid,
            property,
            value,
        })
    }

    /// Removes a vertex. With `check_empty` the removal fails while the
    /// vertex still has incident edges; detaching deletes go through the
    /// edge removals first.
    pub fn remove_vertex(&self, gid: Gid, check_empty: bool) -> StorageResult<()> {
        if self.storage.is_local(gid) && check_empty {
            let accessor = self.find_vertex(gid)?;
            if accessor.data.degree() > 0 {
                return Err(StorageError::UnableToDeleteVertex(gid));
            }
        }
        self.dispatch(StateDelta::RemoveVertex {
            tx: self.txn.id(),
            gid,
            check_empty,
        })
    }

    // ----- edge operations -----

    /// Creates an edge record on this worker and emits the structural
    /// updates to both endpoints' owners (which may be this worker).
    pub fn create_edge(
        &self,
        from: Address,
        to: Address,
        edge_type: EdgeTypeId,
    ) -> StorageResult<EdgeAccessor> {
        self.create_edge_with(from, to, edge_type, true)
    }

    /// Like [`Self::create_edge`], but a worker serving a remote edge
    /// creation skips the in-edge when `to` lives elsewhere: the calling
    /// worker reaches the to-owner itself.
    pub fn create_edge_with(
        &self,
        from: Address,
        to: Address,
        edge_type: EdgeTypeId,
        include_in_edge: bool,
    ) -> StorageResult<EdgeAccessor> {
        let gid = self.storage.allocate_gid();
        let edge_address = Address::new(self.storage.worker_id(), gid);
        self.dispatch(StateDelta::CreateEdge {
            tx: self.txn.id(),
            gid,
            from,
            to,
            edge_type,
        })?;
        self.dispatch(StateDelta::AddOutEdge {
            tx: self.txn.id(),
            gid: from.gid,
            to,
            edge: edge_address,
            edge_type,
        })?;
        if include_in_edge {
            self.dispatch(StateDelta::AddInEdge {
                tx: self.txn.id(),
                gid: to.gid,
                from,
                edge: edge_address,
                edge_type,
            })?;
        }
        self.find_edge(gid)
    }

    pub fn find_edge(&self, gid: Gid) -> StorageResult<EdgeAccessor> {
        if !self.storage.is_local(gid) {
            return Err(StorageError::Remote(format!(
                "edge {gid} is not resolvable on worker {}",
                self.storage.worker_id()
            )));
        }
        let record = self
            .storage
            .edge_record(gid)
            .ok_or(StorageError::NotFound(gid))?;
        let data = record
            .visible(&self.txn, &self.storage.engine)
            .ok_or(StorageError::NotFound(gid))?;
        Ok(EdgeAccessor { gid, data })
    }

    pub fn set_edge_property(
        &self,
        gid: Gid,
        property: PropertyId,
        value: PropertyValue,
    ) -> StorageResult<()> {
        self.dispatch(StateDelta::SetPropertyEdge {
            tx: self.txn.id(),
            gid,
            property,
            value,
        })
    }

    /// Removes the edge record plus both endpoints' edge-list entries.
    pub fn remove_edge(&self, gid: Gid) -> StorageResult<()> {
        let accessor = self.find_edge(gid)?;
        let edge_address = accessor.address();
        self.dispatch(StateDelta::RemoveEdge {
            tx: self.txn.id(),
            gid,
        })?;
        self.dispatch(StateDelta::RemoveOutEdge {
            tx: self.txn.id(),
            gid: accessor.data.from.gid,
            edge: edge_address,
        })?;
        self.dispatch(StateDelta::RemoveInEdge {
            tx: self.txn.id(),
            gid: accessor.data.to.gid,
            edge: edge_address,
        })?;
        Ok(())
    }

    // ----- index management -----

    /// Builds a label+property index over the currently committed vertex
    /// set and logs the build so recovery re-creates it.
    pub fn build_index(&self, label: LabelId, property: PropertyId) -> StorageResult<()> {
        self.storage.wal.emplace(StateDelta::BuildIndex {
            tx: self.txn.id(),
            label,
            property,
        })?;
        self.populate_index(label, property);
        Ok(())
    }

    fn populate_index(&self, label: LabelId, property: PropertyId) {
        if !self.storage.indexes.register_label_property(label, property) {
            return;
        }
        for gid in self.storage.vertex_gids() {
            let Some(record) = self.storage.vertex_record(gid) else {
                continue;
            };
            let Some(vertex) = record.latest_committed(&self.storage.engine) else {
                continue;
            };
            if vertex.has_label(label) {
                if let Some(value) = vertex.property(property) {
                    self.storage
                        .indexes
                        .add_label_property(label, property, value, gid);
                }
            }
        }
    }

    // ----- scans -----

    pub fn vertices(&self) -> Vec<VertexAccessor> {
        self.storage
            .vertex_gids()
            .into_iter()
            .filter_map(|gid| self.find_vertex(gid).ok())
            .collect()
    }

    pub fn vertices_by_label(&self, label: LabelId) -> Vec<VertexAccessor> {
        self.storage
            .indexes
            .label_entries(label)
            .into_iter()
            .filter_map(|gid| self.find_vertex(gid).ok())
            .filter(|v| v.data.has_label(label))
            .collect()
    }

    pub fn vertices_by_label_property_value(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
    ) -> Vec<VertexAccessor> {
        let key = IndexKey::from_value(value);
        self.storage
            .indexes
            .value_entries(label, property, value)
            .into_iter()
            .filter_map(|gid| self.find_vertex(gid).ok())
            .filter(|v| {
                v.data.has_label(label)
                    && v.data.property(property).is_some_and(|stored| {
                        if key.is_degenerate() {
                            stored == value
                        } else {
                            IndexKey::from_value(stored) == key
                        }
                    })
            })
            .collect()
    }

    pub fn vertices_by_label_property_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<&PropertyBound>,
        upper: Option<&PropertyBound>,
    ) -> Vec<VertexAccessor> {
        self.storage
            .indexes
            .range_entries(label, property, lower, upper)
            .into_iter()
            .filter_map(|gid| self.find_vertex(gid).ok())
            .filter(|v| {
                v.data.has_label(label)
                    && v.data
                        .property(property)
                        .is_some_and(|stored| bounds_admit(stored, lower, upper))
            })
            .collect()
    }

    // ----- delta application -----

    /// Applies one delta to the local store under this accessor's
    /// transaction. Recovery replays through this, and the distributed
    /// coordinator drains its per-transaction buffers through it.
    pub fn apply_local(&self, delta: &StateDelta) -> StorageResult<()> {
        match delta {
            StateDelta::CreateVertex { gid, .. } => {
                self.storage.note_allocated(*gid);
                self.storage.lock_for_write(&self.txn, *gid)?;
                self.storage.vertices.insert(
                    *gid,
                    Arc::new(Record::new(Vertex::new(*gid), self.txn.id())),
                );
                Ok(())
            }
            StateDelta::CreateEdge {
                gid,
                from,
                to,
                edge_type,
                ..
            } => {
                self.storage.note_allocated(*gid);
                self.storage.lock_for_write(&self.txn, *gid)?;
                self.storage.edges.insert(
                    *gid,
                    Arc::new(Record::new(
                        Edge::new(*gid, *from, *to, *edge_type),
                        self.txn.id(),
                    )),
                );
                Ok(())
            }
            StateDelta::AddLabel { gid, label, .. } => {
                self.vertex_write(*gid, |v| {
                    v.add_label(*label);
                })?;
                self.storage.indexes.add_label(*label, *gid);
                self.index_vertex_properties(*gid, *label)?;
                Ok(())
            }
            StateDelta::RemoveLabel { gid, label, .. } => {
                // Stale index entries are left behind for GC; concurrent
                // snapshots may still need them.
                self.vertex_write(*gid, |v| {
                    v.remove_label(*label);
                })
            }
            StateDelta::SetPropertyVertex {
                gid,
                property,
                value,
                ..
            } => {
                let labels = self.vertex_write(*gid, |v| {
                    v.set_property(*property, value.clone());
                    v.labels.clone()
                })?;
                if !value.is_null() {
                    for label in labels {
                        self.storage
                            .indexes
                            .add_label_property(label, *property, value, *gid);
                    }
                }
                Ok(())
            }
            StateDelta::SetPropertyEdge {
                gid,
                property,
                value,
                ..
            } => self.edge_write(*gid, |e| {
                e.set_property(*property, value.clone());
            }),
            StateDelta::AddOutEdge {
                gid,
                to,
                edge,
                edge_type,
                ..
            } => self.vertex_write(*gid, |v| {
                if !v.out_edges.iter().any(|r| r.edge == *edge) {
                    v.out_edges.push(EdgeRef::new(*to, *edge, *edge_type));
                }
            }),
            StateDelta::AddInEdge {
                gid,
                from,
                edge,
                edge_type,
                ..
            } => self.vertex_write(*gid, |v| {
                if !v.in_edges.iter().any(|r| r.edge == *edge) {
                    v.in_edges.push(EdgeRef::new(*from, *edge, *edge_type));
                }
            }),
            StateDelta::RemoveVertex {
                gid, check_empty, ..
            } => {
                if *check_empty {
                    let accessor = self.find_vertex(*gid)?;
                    if accessor.data.degree() > 0 {
                        return Err(StorageError::UnableToDeleteVertex(*gid));
                    }
                }
                self.storage.lock_for_write(&self.txn, *gid)?;
                let record = self
                    .storage
                    .vertex_record(*gid)
                    .ok_or(StorageError::NotFound(*gid))?;
                record.remove(*gid, &self.txn, &self.storage.engine)
            }
            StateDelta::RemoveEdge { gid, .. } => {
                self.storage.lock_for_write(&self.txn, *gid)?;
                let record = self
                    .storage
                    .edge_record(*gid)
                    .ok_or(StorageError::NotFound(*gid))?;
                record.remove(*gid, &self.txn, &self.storage.engine)
            }
            StateDelta::RemoveOutEdge { gid, edge, .. } => self.vertex_write(*gid, |v| {
                v.out_edges.retain(|r| r.edge != *edge);
            }),
            StateDelta::RemoveInEdge { gid, edge, .. } => self.vertex_write(*gid, |v| {
                v.in_edges.retain(|r| r.edge != *edge);
            }),
            StateDelta::BuildIndex {
                label, property, ..
            } => {
                self.populate_index(*label, *property);
                Ok(())
            }
            StateDelta::TransactionBegin { .. }
            | StateDelta::TransactionCommit { .. }
            | StateDelta::TransactionAbort { .. } => Ok(()),
        }
    }

    fn vertex_write<R>(&self, gid: Gid, f: impl FnOnce(&mut Vertex) -> R) -> StorageResult<R> {
        self.storage.lock_for_write(&self.txn, gid)?;
        let record = self
            .storage
            .vertex_record(gid)
            .ok_or(StorageError::NotFound(gid))?;
        record.update_with(gid, &self.txn, &self.storage.engine, f)
    }

    fn edge_write<R>(&self, gid: Gid, f: impl FnOnce(&mut Edge) -> R) -> StorageResult<R> {
        self.storage.lock_for_write(&self.txn, gid)?;
        let record = self
            .storage
            .edge_record(gid)
            .ok_or(StorageError::NotFound(gid))?;
        record.update_with(gid, &self.txn, &self.storage.engine, f)
    }

    /// After a label is added, the vertex's existing properties become
    /// index candidates under that label.
    fn index_vertex_properties(&self, gid: Gid, label: LabelId) -> StorageResult<()> {
        let accessor = self.find_vertex(gid)?;
        for (property, value) in &accessor.data.properties {
            self.storage
                .indexes
                .add_label_property(label, *property, value, gid);
        }
        Ok(())
    }
}

/// Re-checks a stored value against the scan bounds; the index walk is a
/// superset because entries can be stale until GC.
fn bounds_admit(
    value: &PropertyValue,
    lower: Option<&PropertyBound>,
    upper: Option<&PropertyBound>,
) -> bool {
    let key = IndexKey::from_value(value);
    if key.is_degenerate() && (lower.is_some() || upper.is_some()) {
        return false;
    }
    if let Some(bound) = lower {
        let bound_key = IndexKey::from_value(&bound.value);
        if bound.inclusive {
            if key < bound_key {
                return false;
            }
        } else if key <= bound_key {
            return false;
        }
    }
    if let Some(bound) = upper {
        let bound_key = IndexKey::from_value(&bound.value);
        if bound.inclusive {
            if key > bound_key {
                return false;
            }
        } else if key >= bound_key {
            return false;
        }
    }
    true
}
