use std::ops::Bound;
use std::sync::Arc;

use crossbeam_skiplist::{SkipMap, SkipSet};
use dashmap::{DashMap, DashSet};
use ordered_float::OrderedFloat;
use quiver_common::types::{Gid, LabelId, PropertyId};
use quiver_common::value::PropertyValue;

/// Key of the label+property index: a total order over property values.
///
/// Bools, numbers and strings are mutually ordered by type rank; ints and
/// doubles collapse into one numeric rank so `1` and `1.0` index equally.
/// Everything else (null, lists, maps) lands in the degenerate bucket,
/// which sorts last and which range scans never enter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    Bool(bool),
    Number(OrderedFloat<f64>),
    String(String),
    Degenerate,
}

impl IndexKey {
    pub fn from_value(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Bool(b) => IndexKey::Bool(*b),
            PropertyValue::Int(i) => IndexKey::Number(OrderedFloat(*i as f64)),
            PropertyValue::Double(d) => IndexKey::Number(*d),
            PropertyValue::String(s) => IndexKey::String(s.clone()),
            _ => IndexKey::Degenerate,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, IndexKey::Degenerate)
    }

    /// Smallest key of the same type rank; used to clamp half-open ranges
    /// so they stay inside one rank.
    fn rank_min(&self) -> IndexKey {
        match self {
            IndexKey::Bool(_) => IndexKey::Bool(false),
            IndexKey::Number(_) => IndexKey::Number(OrderedFloat(f64::NEG_INFINITY)),
            IndexKey::String(_) => IndexKey::String(String::new()),
            IndexKey::Degenerate => IndexKey::Degenerate,
        }
    }

    /// Largest key of the same type rank.
    fn rank_max(&self) -> IndexKey {
        match self {
            IndexKey::Bool(_) => IndexKey::Bool(true),
            IndexKey::Number(_) => IndexKey::Number(OrderedFloat(f64::INFINITY)),
            // No largest string exists; the caller uses an exclusive bound
            // on the next rank instead.
            IndexKey::String(_) | IndexKey::Degenerate => IndexKey::Degenerate,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            IndexKey::Bool(_) => 0,
            IndexKey::Number(_) => 1,
            IndexKey::String(_) => 2,
            IndexKey::Degenerate => 3,
        }
    }
}

/// One side of a range scan.
#[derive(Debug, Clone)]
pub struct PropertyBound {
    pub value: PropertyValue,
    pub inclusive: bool,
}

impl PropertyBound {
    pub fn inclusive(value: PropertyValue) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }

    pub fn exclusive(value: PropertyValue) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }
}

type ValueMap = SkipMap<IndexKey, SkipSet<Gid>>;

/// Label index plus label+property indexes over vertices.
///
/// Entries are added eagerly when a transaction mutates a vertex and
/// filtered through MVCC visibility at scan time; garbage collection drops
/// entries that no surviving version witnesses any more.
#[derive(Default)]
pub struct Indexes {
    labels: DashMap<LabelId, Arc<SkipSet<Gid>>>,
    label_properties: DashMap<(LabelId, PropertyId), Arc<ValueMap>>,
    registered: DashSet<(LabelId, PropertyId)>,
}

impl Indexes {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- label index -----

    pub fn add_label(&self, label: LabelId, gid: Gid) {
        self.labels
            .entry(label)
            .or_insert_with(|| Arc::new(SkipSet::new()))
            .insert(gid);
    }

    pub fn label_entries(&self, label: LabelId) -> Vec<Gid> {
        self.labels
            .get(&label)
            .map(|set| set.iter().map(|e| *e.value()).collect())
            .unwrap_or_default()
    }

    pub fn label_count(&self, label: LabelId) -> u64 {
        self.labels.get(&label).map(|set| set.len() as u64).unwrap_or(0)
    }

    // ----- label+property index -----

    /// Registers a (label, property) index. Returns false if it already
    /// existed. The caller is responsible for back-filling existing
    /// vertices and for logging the build.
    pub fn register_label_property(&self, label: LabelId, property: PropertyId) -> bool {
        if !self.registered.insert((label, property)) {
            return false;
        }
        self.label_properties
            .entry((label, property))
            .or_insert_with(|| Arc::new(SkipMap::new()));
        true
    }

    pub fn is_registered(&self, label: LabelId, property: PropertyId) -> bool {
        self.registered.contains(&(label, property))
    }

    pub fn registered_pairs(&self) -> Vec<(LabelId, PropertyId)> {
        self.registered.iter().map(|e| *e.key()).collect()
    }

    /// Records `gid` under the value, if the pair is indexed.
    pub fn add_label_property(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
        gid: Gid,
    ) {
        let Some(map) = self.label_properties.get(&(label, property)) else {
            return;
        };
        map.get_or_insert_with(IndexKey::from_value(value), SkipSet::new)
            .value()
            .insert(gid);
    }

    pub fn value_entries(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
    ) -> Vec<Gid> {
        let Some(map) = self.label_properties.get(&(label, property)) else {
            return Vec::new();
        };
        map.get(&IndexKey::from_value(value))
            .map(|entry| entry.value().iter().map(|e| *e.value()).collect())
            .unwrap_or_default()
    }

    /// Gids with the property in the given range, in index-key order.
    /// Both bounds absent degenerates to the full label+property scan.
    pub fn range_entries(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<&PropertyBound>,
        upper: Option<&PropertyBound>,
    ) -> Vec<Gid> {
        let Some(map) = self.label_properties.get(&(label, property)) else {
            return Vec::new();
        };
        let collect =
            |it: &mut dyn Iterator<Item = (IndexKey, Vec<Gid>)>| -> Vec<Gid> {
                it.flat_map(|(_, gids)| gids).collect()
            };
        match (lower, upper) {
            (None, None) => {
                let mut it = map
                    .iter()
                    .map(|e| (e.key().clone(), e.value().iter().map(|g| *g.value()).collect()));
                collect(&mut it)
            }
            _ => {
                let lower_key = lower.map(|b| (IndexKey::from_value(&b.value), b.inclusive));
                let upper_key = upper.map(|b| (IndexKey::from_value(&b.value), b.inclusive));
                // Scans over non-orderable values are empty, as are ranges
                // whose bounds live in different type ranks.
                if lower_key.as_ref().is_some_and(|(k, _)| k.is_degenerate())
                    || upper_key.as_ref().is_some_and(|(k, _)| k.is_degenerate())
                {
                    return Vec::new();
                }
                if let (Some((lo, _)), Some((hi, _))) = (&lower_key, &upper_key) {
                    if lo.rank() != hi.rank() {
                        return Vec::new();
                    }
                }
                let lo = match &lower_key {
                    Some((k, true)) => Bound::Included(k.clone()),
                    Some((k, false)) => Bound::Excluded(k.clone()),
                    // Clamp to the start of the upper bound's rank so a
                    // half-open numeric range does not sweep up bools.
                    None => Bound::Included(
                        upper_key.as_ref().map(|(k, _)| k.rank_min()).unwrap(),
                    ),
                };
                let hi = match &upper_key {
                    Some((k, true)) => Bound::Included(k.clone()),
                    Some((k, false)) => Bound::Excluded(k.clone()),
                    None => {
                        let max = lower_key.as_ref().map(|(k, _)| k.rank_max()).unwrap();
                        if max.is_degenerate() {
                            Bound::Excluded(IndexKey::Degenerate)
                        } else {
                            Bound::Included(max)
                        }
                    }
                };
                let mut it = map.range((lo, hi)).map(|e| {
                    (e.key().clone(), e.value().iter().map(|g| *g.value()).collect())
                });
                collect(&mut it)
            }
        }
    }

    pub fn label_property_count(&self, label: LabelId, property: PropertyId) -> u64 {
        self.label_properties
            .get(&(label, property))
            .map(|map| map.iter().map(|e| e.value().len() as u64).sum())
            .unwrap_or(0)
    }

    pub fn value_count(&self, label: LabelId, property: PropertyId, value: &PropertyValue) -> u64 {
        self.value_entries(label, property, value).len() as u64
    }

    pub fn range_count(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<&PropertyBound>,
        upper: Option<&PropertyBound>,
    ) -> u64 {
        self.range_entries(label, property, lower, upper).len() as u64
    }

    // ----- garbage collection -----

    /// Drops every index entry for which `witness(label, property, gid)`
    /// reports no surviving version. `property == None` probes label-only
    /// entries.
    pub fn prune<F>(&self, mut witness: F)
    where
        F: FnMut(LabelId, Option<(PropertyId, &IndexKey)>, Gid) -> bool,
    {
        for entry in self.labels.iter() {
            let label = *entry.key();
            for gid in entry.value().iter() {
                if !witness(label, None, *gid.value()) {
                    entry.value().remove(gid.value());
                }
            }
        }
        for entry in self.label_properties.iter() {
            let (label, property) = *entry.key();
            for value_entry in entry.value().iter() {
                for gid in value_entry.value().iter() {
                    if !witness(label, Some((property, value_entry.key())), *gid.value()) {
                        value_entry.value().remove(gid.value());
                    }
                }
                if value_entry.value().is_empty() {
                    value_entry.remove();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(raw: u32) -> LabelId {
        LabelId::new(raw).unwrap()
    }

    #[test]
    fn label_index_counts() {
        let indexes = Indexes::new();
        indexes.add_label(label(1), Gid::new(0, 1));
        indexes.add_label(label(1), Gid::new(0, 2));
        indexes.add_label(label(2), Gid::new(0, 3));
        assert_eq!(indexes.label_count(label(1)), 2);
        assert_eq!(indexes.label_count(label(2)), 1);
        assert_eq!(indexes.label_count(label(3)), 0);
    }

    #[test]
    fn value_lookup_merges_int_and_double() {
        let indexes = Indexes::new();
        indexes.register_label_property(label(1), 0);
        indexes.add_label_property(label(1), 0, &PropertyValue::Int(1), Gid::new(0, 1));
        indexes.add_label_property(label(1), 0, &PropertyValue::from(1.0), Gid::new(0, 2));
        assert_eq!(indexes.value_count(label(1), 0, &PropertyValue::Int(1)), 2);
    }

    #[test]
    fn range_scan_respects_bounds() {
        let indexes = Indexes::new();
        indexes.register_label_property(label(1), 0);
        for i in 0..10i64 {
            indexes.add_label_property(
                label(1),
                0,
                &PropertyValue::Int(i),
                Gid::new(0, i as u64),
            );
        }
        let lower = PropertyBound::exclusive(PropertyValue::Int(2));
        let upper = PropertyBound::inclusive(PropertyValue::Int(5));
        let hits = indexes.range_entries(label(1), 0, Some(&lower), Some(&upper));
        assert_eq!(hits.len(), 3); // 3, 4, 5
    }

    #[test]
    fn half_open_range_stays_in_rank() {
        let indexes = Indexes::new();
        indexes.register_label_property(label(1), 0);
        indexes.add_label_property(label(1), 0, &PropertyValue::Bool(true), Gid::new(0, 1));
        indexes.add_label_property(label(1), 0, &PropertyValue::Int(4), Gid::new(0, 2));
        indexes.add_label_property(label(1), 0, &PropertyValue::from("zed"), Gid::new(0, 3));
        let upper = PropertyBound::inclusive(PropertyValue::Int(12));
        let hits = indexes.range_entries(label(1), 0, None, Some(&upper));
        assert_eq!(hits, vec![Gid::new(0, 2)]);
    }

    #[test]
    fn unbounded_range_is_full_scan() {
        let indexes = Indexes::new();
        indexes.register_label_property(label(1), 0);
        indexes.add_label_property(label(1), 0, &PropertyValue::Int(4), Gid::new(0, 1));
        indexes.add_label_property(
            label(1),
            0,
            &PropertyValue::List(vec![]),
            Gid::new(0, 2),
        );
        let hits = indexes.range_entries(label(1), 0, None, None);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn degenerate_range_is_empty() {
        let indexes = Indexes::new();
        indexes.register_label_property(label(1), 0);
        indexes.add_label_property(
            label(1),
            0,
            &PropertyValue::List(vec![]),
            Gid::new(0, 1),
        );
        let bound = PropertyBound::inclusive(PropertyValue::List(vec![]));
        assert!(
            indexes
                .range_entries(label(1), 0, Some(&bound), None)
                .is_empty()
        );
    }

    #[test]
    fn prune_drops_dead_entries() {
        let indexes = Indexes::new();
        indexes.register_label_property(label(1), 0);
        indexes.add_label(label(1), Gid::new(0, 1));
        indexes.add_label(label(1), Gid::new(0, 2));
        indexes.add_label_property(label(1), 0, &PropertyValue::Int(9), Gid::new(0, 1));
        indexes.prune(|_, _, gid| gid == Gid::new(0, 2));
        assert_eq!(indexes.label_entries(label(1)), vec![Gid::new(0, 2)]);
        assert_eq!(indexes.label_property_count(label(1), 0), 0);
    }
}
