mod common;

use std::sync::Arc;

use common::{label, open_storage};
use quiver_common::value::PropertyValue;
use quiver_storage::gc::collect_garbage;
use quiver_storage::index::PropertyBound;
use quiver_storage::GraphAccessor;

#[test]
fn gc_unlinks_superseded_versions_and_dead_records() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(dir.path());

    let setup = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), setup.clone());
    let keep = graph
        .create_vertex(vec![], vec![(0, PropertyValue::Int(0))])
        .unwrap();
    let doomed = graph.create_vertex(vec![], vec![]).unwrap();
    storage.commit_transaction(&setup).unwrap();

    for i in 1..5i64 {
        let t = storage.begin_transaction().unwrap();
        let graph = GraphAccessor::new(Arc::clone(&storage), t.clone());
        graph
            .set_vertex_property(keep.gid, 0, PropertyValue::Int(i))
            .unwrap();
        storage.commit_transaction(&t).unwrap();
    }
    let t = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), t.clone());
    graph.remove_vertex(doomed.gid, true).unwrap();
    storage.commit_transaction(&t).unwrap();

    let stats = collect_garbage(&storage);
    assert_eq!(stats.vertices_removed, 1);

    // The surviving record still answers with its newest committed value.
    let check = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), check.clone());
    assert_eq!(
        graph.find_vertex(keep.gid).unwrap().data.property(0),
        Some(&PropertyValue::Int(4))
    );
    assert!(graph.find_vertex(doomed.gid).is_err());
    storage.abort_transaction(&check).unwrap();
}

#[test]
fn gc_respects_active_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(dir.path());

    let setup = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), setup.clone());
    let v = graph
        .create_vertex(vec![], vec![(0, PropertyValue::Int(1))])
        .unwrap();
    storage.commit_transaction(&setup).unwrap();

    let reader = storage.begin_transaction().unwrap();
    let writer = storage.begin_transaction().unwrap();
    let graph_w = GraphAccessor::new(Arc::clone(&storage), writer.clone());
    graph_w
        .set_vertex_property(v.gid, 0, PropertyValue::Int(2))
        .unwrap();
    storage.commit_transaction(&writer).unwrap();

    collect_garbage(&storage);

    // The old version is still what the reader's snapshot sees.
    let graph_r = GraphAccessor::new(Arc::clone(&storage), reader.clone());
    assert_eq!(
        graph_r.find_vertex(v.gid).unwrap().data.property(0),
        Some(&PropertyValue::Int(1))
    );
    storage.abort_transaction(&reader).unwrap();
}

#[test]
fn stale_index_entries_disappear_after_gc() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(dir.path());

    let setup = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), setup.clone());
    graph.build_index(label(1), 0).unwrap();
    let v = graph
        .create_vertex(vec![label(1)], vec![(0, PropertyValue::Int(7))])
        .unwrap();
    storage.commit_transaction(&setup).unwrap();

    let t = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), t.clone());
    graph.remove_label(v.gid, label(1)).unwrap();
    storage.commit_transaction(&t).unwrap();

    // Until GC runs the entry may linger, but scans filter it out.
    let check = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), check.clone());
    assert!(graph.vertices_by_label(label(1)).is_empty());
    storage.abort_transaction(&check).unwrap();

    collect_garbage(&storage);
    assert_eq!(storage.indexes.label_count(label(1)), 0);
    assert_eq!(storage.indexes.label_property_count(label(1), 0), 0);
}

#[test]
fn index_scans_and_counts_match_committed_state() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(dir.path());

    let setup = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), setup.clone());
    graph.build_index(label(1), 0).unwrap();
    // 100 vertices, 30 labeled, property set on 20 of the labeled ones.
    for i in 0..100i64 {
        let labels = if i < 30 { vec![label(1)] } else { vec![] };
        let props = if i < 20 {
            vec![(0u32, PropertyValue::Int(i))]
        } else {
            vec![]
        };
        graph.create_vertex(labels, props).unwrap();
    }
    storage.commit_transaction(&setup).unwrap();

    let t = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), t.clone());
    assert_eq!(graph.vertices().len(), 100);
    assert_eq!(graph.vertices_by_label(label(1)).len(), 30);
    assert_eq!(storage.indexes.label_count(label(1)), 30);
    assert_eq!(storage.indexes.label_property_count(label(1), 0), 20);
    assert_eq!(
        graph
            .vertices_by_label_property_value(label(1), 0, &PropertyValue::Int(12))
            .len(),
        1
    );
    let upper = PropertyBound::inclusive(PropertyValue::Int(12));
    assert_eq!(
        graph
            .vertices_by_label_property_range(label(1), 0, None, Some(&upper))
            .len(),
        13
    );
    assert_eq!(
        storage
            .indexes
            .range_count(label(1), 0, None, Some(&upper)),
        13
    );
    storage.abort_transaction(&t).unwrap();
}
