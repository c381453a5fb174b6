//! Cross-worker coordination: the RPC surface between workers, the
//! per-transaction update buffers on the owning side, and the router that
//! sends deltas to the right place.

pub mod client;
pub mod codec;
pub mod coordinator;
pub mod error;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod service;

pub use client::RpcClient;
pub use coordinator::UpdatesCoordinator;
pub use error::{ClusterError, ClusterResult};
pub use message::{Request, Response};
pub use registry::WorkerRegistry;
pub use router::ClusterRouter;
pub use server::RpcServer;
