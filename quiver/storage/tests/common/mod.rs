use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quiver_common::types::{EdgeTypeId, LabelId};
use quiver_storage::wal::WalConfig;
use quiver_storage::Storage;
use quiver_transaction::TransactionEngine;

pub fn wal_config(dir: &Path) -> WalConfig {
    WalConfig {
        directory: dir.to_path_buf(),
        enabled: true,
        synchronous_commit: true,
        flush_interval: Duration::from_millis(10),
        rotate_deltas_count: 100_000,
    }
}

pub fn open_storage(dir: &Path) -> Arc<Storage> {
    Storage::new(
        0,
        Arc::new(TransactionEngine::new()),
        wal_config(dir),
        Duration::from_millis(100),
    )
    .unwrap()
}

pub fn label(raw: u32) -> LabelId {
    NonZeroU32::new(raw).unwrap()
}

pub fn edge_type(raw: u32) -> EdgeTypeId {
    NonZeroU32::new(raw).unwrap()
}
