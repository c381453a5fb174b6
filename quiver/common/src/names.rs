use std::num::NonZeroU32;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::types::{EdgeTypeId, LabelId, PropertyId};

/// Interns label / edge-type / property names to dense ids.
///
/// Ids are issued on first use and never recycled; the reverse table is an
/// append-only vector so id → name lookups are a plain index.
#[derive(Debug, Default)]
pub struct NameRegistry {
    ids: DashMap<String, u32>,
    names: RwLock<Vec<String>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `name`, interning it if unseen. The first issued id is 1.
    pub fn get_or_intern(&self, name: &str) -> u32 {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let mut names = self.names.write();
        // Re-check under the write lock: another thread may have interned
        // the name between the fast path and here.
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        names.push(name.to_string());
        let id = names.len() as u32;
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Id for `name` if it was interned before.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.ids.get(name).map(|id| *id)
    }

    pub fn name_of(&self, id: u32) -> Option<String> {
        self.names.read().get(id as usize - 1).cloned()
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The three name spaces of the data model, shared between the planner
/// (name → id at plan time) and the executor (id → name for `labels()`
/// and friends).
#[derive(Debug, Default)]
pub struct NameTables {
    pub labels: NameRegistry,
    pub edge_types: NameRegistry,
    pub properties: NameRegistry,
}

impl NameTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label_id(&self, name: &str) -> LabelId {
        NonZeroU32::new(self.labels.get_or_intern(name)).expect("label ids start at 1")
    }

    pub fn edge_type_id(&self, name: &str) -> EdgeTypeId {
        NonZeroU32::new(self.edge_types.get_or_intern(name)).expect("edge type ids start at 1")
    }

    pub fn property_id(&self, name: &str) -> PropertyId {
        self.properties.get_or_intern(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let registry = NameRegistry::new();
        let a = registry.get_or_intern("Person");
        let b = registry.get_or_intern("City");
        assert_ne!(a, b);
        assert_eq!(registry.get_or_intern("Person"), a);
        assert_eq!(registry.name_of(a).as_deref(), Some("Person"));
        assert_eq!(registry.get("unknown"), None);
    }
}
