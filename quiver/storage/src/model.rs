use std::collections::BTreeMap;

use quiver_common::types::{Address, EdgeTypeId, Gid, LabelId, PropertyId};
use quiver_common::value::PropertyValue;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One entry of a vertex's edge list: the far vertex, the edge record and
/// the edge's type, all by address so the entry is valid regardless of
/// which worker owns the far end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRef {
    pub vertex: Address,
    pub edge: Address,
    pub edge_type: EdgeTypeId,
}

impl EdgeRef {
    pub fn new(vertex: Address, edge: Address, edge_type: EdgeTypeId) -> Self {
        Self {
            vertex,
            edge,
            edge_type,
        }
    }
}

/// Vertex payload of one MVCC version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub gid: Gid,
    pub labels: SmallVec<[LabelId; 4]>,
    pub properties: BTreeMap<PropertyId, PropertyValue>,
    pub in_edges: Vec<EdgeRef>,
    pub out_edges: Vec<EdgeRef>,
}

impl Vertex {
    pub fn new(gid: Gid) -> Self {
        Self {
            gid,
            labels: SmallVec::new(),
            properties: BTreeMap::new(),
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        }
    }

    pub fn has_label(&self, label: LabelId) -> bool {
        self.labels.contains(&label)
    }

    /// Adds the label; returns false if it was already present.
    pub fn add_label(&mut self, label: LabelId) -> bool {
        if self.has_label(label) {
            return false;
        }
        self.labels.push(label);
        true
    }

    pub fn remove_label(&mut self, label: LabelId) -> bool {
        let before = self.labels.len();
        self.labels.retain(|l| *l != label);
        self.labels.len() != before
    }

    pub fn property(&self, property: PropertyId) -> Option<&PropertyValue> {
        self.properties.get(&property)
    }

    /// Sets a property; `Null` clears it. Returns the previous value.
    pub fn set_property(&mut self, property: PropertyId, value: PropertyValue) -> PropertyValue {
        let old = if value.is_null() {
            self.properties.remove(&property)
        } else {
            self.properties.insert(property, value)
        };
        old.unwrap_or(PropertyValue::Null)
    }

    pub fn degree(&self) -> usize {
        self.in_edges.len() + self.out_edges.len()
    }
}

/// Edge payload of one MVCC version: endpoints by address plus the type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub gid: Gid,
    pub from: Address,
    pub to: Address,
    pub edge_type: EdgeTypeId,
    pub properties: BTreeMap<PropertyId, PropertyValue>,
}

impl Edge {
    pub fn new(gid: Gid, from: Address, to: Address, edge_type: EdgeTypeId) -> Self {
        Self {
            gid,
            from,
            to,
            edge_type,
            properties: BTreeMap::new(),
        }
    }

    pub fn property(&self, property: PropertyId) -> Option<&PropertyValue> {
        self.properties.get(&property)
    }

    pub fn set_property(&mut self, property: PropertyId, value: PropertyValue) -> PropertyValue {
        let old = if value.is_null() {
            self.properties.remove(&property)
        } else {
            self.properties.insert(property, value)
        };
        old.unwrap_or(PropertyValue::Null)
    }
}
