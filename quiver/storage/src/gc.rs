use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use quiver_common::types::Gid;
use tracing::debug;

use crate::index::IndexKey;
use crate::store::Storage;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    pub vertices_removed: usize,
    pub edges_removed: usize,
}

/// One garbage-collection cycle: prunes version chains every active
/// transaction has moved past, unlinks dead records, drops index entries
/// with no surviving witness and compacts the engine's finalized sets.
pub fn collect_garbage(storage: &Storage) -> GcStats {
    let horizon = storage.engine.gc_horizon();
    let mut stats = GcStats::default();

    let mut dead_vertices: Vec<Gid> = Vec::new();
    for entry in storage.vertices.iter() {
        if entry.value().prune(horizon, &storage.engine) {
            dead_vertices.push(*entry.key());
        }
    }
    for gid in dead_vertices {
        storage.vertices.remove(&gid);
        stats.vertices_removed += 1;
    }

    let mut dead_edges: Vec<Gid> = Vec::new();
    for entry in storage.edges.iter() {
        if entry.value().prune(horizon, &storage.engine) {
            dead_edges.push(*entry.key());
        }
    }
    for gid in dead_edges {
        storage.edges.remove(&gid);
        stats.edges_removed += 1;
    }

    storage.indexes.prune(|label, property, gid| {
        let Some(record) = storage.vertex_record(gid) else {
            return false;
        };
        record.any_version(|v| {
            v.has_label(label)
                && property.is_none_or(|(property, key)| {
                    v.property(property)
                        .is_some_and(|value| IndexKey::from_value(value) == *key)
                })
        })
    });

    storage.engine.compact(horizon);
    debug!(?stats, horizon = %horizon, "garbage collection cycle");
    stats
}

/// Background garbage-collection thread.
pub struct GcRunner {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl GcRunner {
    pub fn start(storage: Arc<Storage>, period: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::spawn(move || {
            let tick = Duration::from_millis(50).min(period);
            loop {
                // Sleep in short ticks so shutdown does not wait out a
                // full GC period.
                let mut slept = Duration::ZERO;
                while slept < period {
                    if flag.load(Ordering::Acquire) {
                        return;
                    }
                    std::thread::sleep(tick);
                    slept += tick;
                }
                collect_garbage(&storage);
            }
        });
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GcRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
