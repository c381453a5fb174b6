use quiver_common::types::{EdgeTypeId, LabelId, PropertyId};
use quiver_common::value::PropertyValue;

/// What the planner needs from the catalog: name interning and index
/// statistics. The database implements this over its storage; planner
/// tests use a synthetic table.
pub trait PlanningContext {
    fn intern_label(&self, name: &str) -> LabelId;
    fn intern_edge_type(&self, name: &str) -> EdgeTypeId;
    fn intern_property(&self, name: &str) -> PropertyId;

    /// Total number of vertices on this worker.
    fn vertices_count(&self) -> u64;
    fn label_count(&self, label: LabelId) -> u64;
    fn has_index(&self, label: LabelId, property: PropertyId) -> bool;
    fn label_property_count(&self, label: LabelId, property: PropertyId) -> u64;
    fn value_count(&self, label: LabelId, property: PropertyId, value: &PropertyValue) -> u64;
    fn range_count(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<(&PropertyValue, bool)>,
        upper: Option<(&PropertyValue, bool)>,
    ) -> u64;
}
