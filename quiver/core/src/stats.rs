use std::sync::Arc;

use quiver_common::types::{EdgeTypeId, LabelId, PropertyId};
use quiver_common::value::PropertyValue;
use quiver_planner::PlanningContext;
use quiver_storage::Storage;
use quiver_storage::index::PropertyBound;

use crate::names_store::NameStore;

/// Bridges the planner's catalog needs onto the storage indexes and the
/// durable name tables.
pub struct CatalogBridge {
    storage: Arc<Storage>,
    names: Arc<NameStore>,
}

impl CatalogBridge {
    pub fn new(storage: Arc<Storage>, names: Arc<NameStore>) -> Self {
        Self { storage, names }
    }
}

fn bound(raw: Option<(&PropertyValue, bool)>) -> Option<PropertyBound> {
    raw.map(|(value, inclusive)| PropertyBound {
        value: value.clone(),
        inclusive,
    })
}

impl PlanningContext for CatalogBridge {
    fn intern_label(&self, name: &str) -> LabelId {
        self.names.label_id(name)
    }

    fn intern_edge_type(&self, name: &str) -> EdgeTypeId {
        self.names.edge_type_id(name)
    }

    fn intern_property(&self, name: &str) -> PropertyId {
        self.names.property_id(name)
    }

    fn vertices_count(&self) -> u64 {
        self.storage.vertex_count()
    }

    fn label_count(&self, label: LabelId) -> u64 {
        self.storage.indexes.label_count(label)
    }

    fn has_index(&self, label: LabelId, property: PropertyId) -> bool {
        self.storage.indexes.is_registered(label, property)
    }

    fn label_property_count(&self, label: LabelId, property: PropertyId) -> u64 {
        self.storage.indexes.label_property_count(label, property)
    }

    fn value_count(&self, label: LabelId, property: PropertyId, value: &PropertyValue) -> u64 {
        self.storage.indexes.value_count(label, property, value)
    }

    fn range_count(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<(&PropertyValue, bool)>,
        upper: Option<(&PropertyValue, bool)>,
    ) -> u64 {
        self.storage.indexes.range_count(
            label,
            property,
            bound(lower).as_ref(),
            bound(upper).as_ref(),
        )
    }
}
