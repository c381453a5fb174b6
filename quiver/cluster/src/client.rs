use std::net::TcpStream;
use std::time::Duration;

use parking_lot::Mutex;
use quiver_common::types::WorkerId;

use crate::codec::{read_frame, write_frame};
use crate::error::{ClusterError, ClusterResult};
use crate::message::{Request, Response};

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Client side of one worker-to-worker channel: a small pool of idle
/// connections to a fixed endpoint, round-tripping one request per call.
pub struct RpcClient {
    worker: WorkerId,
    endpoint: String,
    pool: Mutex<Vec<TcpStream>>,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(worker: WorkerId, endpoint: impl Into<String>) -> Self {
        Self {
            worker,
            endpoint: endpoint.into(),
            pool: Mutex::new(Vec::new()),
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn call(&self, request: &Request) -> ClusterResult<Response> {
        let mut stream = self.checkout()?;
        let result = self.round_trip(&mut stream, request);
        match result {
            Ok(response) => {
                // Healthy connections go back to the pool.
                self.pool.lock().push(stream);
                Ok(response)
            }
            Err(e) => Err(ClusterError::RpcFailure {
                worker: self.worker,
                message: e.to_string(),
            }),
        }
    }

    fn checkout(&self) -> ClusterResult<TcpStream> {
        if let Some(stream) = self.pool.lock().pop() {
            return Ok(stream);
        }
        let stream = TcpStream::connect(&self.endpoint).map_err(|e| ClusterError::RpcFailure {
            worker: self.worker,
            message: format!("connect to {} failed: {e}", self.endpoint),
        })?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }

    fn round_trip(&self, stream: &mut TcpStream, request: &Request) -> ClusterResult<Response> {
        write_frame(stream, request)?;
        read_frame(stream)
    }
}
