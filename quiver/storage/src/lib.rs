//! Transactional storage engine: MVCC record store, record locks, label and
//! label+property indexes, graph accessor, write-ahead log and recovery.

pub mod delta;
pub mod error;
pub mod gc;
pub mod graph;
pub mod index;
pub mod lock;
pub mod model;
pub mod record;
pub mod recovery;
pub mod store;
pub mod wal;

pub use delta::StateDelta;
pub use error::{StorageError, StorageResult, WalError};
pub use graph::{DeltaRouter, EdgeAccessor, GraphAccessor, VertexAccessor};
pub use model::{Edge, EdgeRef, Vertex};
pub use store::Storage;
pub use wal::{Wal, WalConfig};
