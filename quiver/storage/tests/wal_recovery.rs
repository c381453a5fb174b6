mod common;

use std::sync::Arc;

use common::{edge_type, label, open_storage};
use quiver_common::value::PropertyValue;
use quiver_storage::recovery::recover;
use quiver_storage::GraphAccessor;

#[test]
fn committed_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut gids = Vec::new();
    {
        let storage = open_storage(dir.path());
        for i in 0..10i64 {
            let t = storage.begin_transaction().unwrap();
            let graph = GraphAccessor::new(Arc::clone(&storage), t.clone());
            let v = graph
                .create_vertex(vec![label(1)], vec![(0, PropertyValue::Int(i))])
                .unwrap();
            gids.push(v.gid);
            storage.commit_transaction(&t).unwrap();
        }
        // Dropped without shutdown: synchronous commit already flushed
        // every end marker, so this models a hard kill after the commits.
    }

    let storage = open_storage(dir.path());
    let info = recover(&storage).unwrap();
    assert_eq!(info.transactions_replayed, 10);

    let t = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), t.clone());
    for (i, gid) in gids.iter().enumerate() {
        let v = graph.find_vertex(*gid).unwrap();
        assert!(v.data.has_label(label(1)));
        assert_eq!(v.data.property(0), Some(&PropertyValue::Int(i as i64)));
    }
    assert_eq!(graph.vertices().len(), 10);
    storage.abort_transaction(&t).unwrap();
}

#[test]
fn uncommitted_transactions_are_discarded_on_replay() {
    let dir = tempfile::tempdir().unwrap();
    let committed_gid;
    {
        let storage = open_storage(dir.path());
        let t = storage.begin_transaction().unwrap();
        let graph = GraphAccessor::new(Arc::clone(&storage), t.clone());
        committed_gid = graph.create_vertex(vec![label(1)], vec![]).unwrap().gid;
        storage.commit_transaction(&t).unwrap();

        // This transaction never commits; its deltas reach the WAL but must
        // not survive replay.
        let dangling = storage.begin_transaction().unwrap();
        let graph = GraphAccessor::new(Arc::clone(&storage), dangling.clone());
        graph.create_vertex(vec![label(1)], vec![]).unwrap();
        graph
            .set_vertex_property(committed_gid, 0, PropertyValue::Int(123))
            .unwrap();
        storage.wal.flush().unwrap();
    }

    let storage = open_storage(dir.path());
    recover(&storage).unwrap();

    let t = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), t.clone());
    assert_eq!(graph.vertices().len(), 1);
    let v = graph.find_vertex(committed_gid).unwrap();
    assert_eq!(v.data.property(0), None);
    storage.abort_transaction(&t).unwrap();
}

#[test]
fn recovered_graph_keeps_edges_and_indexes() {
    let dir = tempfile::tempdir().unwrap();
    let (from_gid, to_gid, edge_gid);
    {
        let storage = open_storage(dir.path());
        let t = storage.begin_transaction().unwrap();
        let graph = GraphAccessor::new(Arc::clone(&storage), t.clone());
        graph.build_index(label(1), 0).unwrap();
        let from = graph
            .create_vertex(vec![label(1)], vec![(0, PropertyValue::Int(1))])
            .unwrap();
        let to = graph
            .create_vertex(vec![label(1)], vec![(0, PropertyValue::Int(2))])
            .unwrap();
        let edge = graph
            .create_edge(from.address(), to.address(), edge_type(1))
            .unwrap();
        (from_gid, to_gid, edge_gid) = (from.gid, to.gid, edge.gid);
        storage.commit_transaction(&t).unwrap();
    }

    let storage = open_storage(dir.path());
    recover(&storage).unwrap();

    let t = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), t.clone());
    let from = graph.find_vertex(from_gid).unwrap();
    assert_eq!(from.data.out_edges.len(), 1);
    assert_eq!(from.data.out_edges[0].edge.gid, edge_gid);
    assert_eq!(from.data.out_edges[0].vertex.gid, to_gid);
    let edge = graph.find_edge(edge_gid).unwrap();
    assert_eq!(edge.data.from.gid, from_gid);

    // The BUILD_INDEX delta was replayed, so indexed scans work again.
    let hits = graph.vertices_by_label_property_value(label(1), 0, &PropertyValue::Int(2));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].gid, to_gid);
    storage.abort_transaction(&t).unwrap();

    // Fresh allocations must not collide with recovered gids.
    let t = storage.begin_transaction().unwrap();
    let graph = GraphAccessor::new(Arc::clone(&storage), t.clone());
    let fresh = graph.create_vertex(vec![], vec![]).unwrap();
    assert!(![from_gid, to_gid, edge_gid].contains(&fresh.gid));
    storage.abort_transaction(&t).unwrap();
}
