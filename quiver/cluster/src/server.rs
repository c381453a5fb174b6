use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{debug, warn};

use crate::codec::{read_frame, write_frame};
use crate::message::{Request, Response};

pub type Handler = Arc<dyn Fn(Request) -> Response + Send + Sync>;

const DEFAULT_POOL_SIZE: usize = 8;
const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Synchronous RPC server: an accept thread pushes connections onto a
/// bounded queue, a fixed pool of worker threads drains it and serves
/// request/response pairs until the peer closes.
pub struct RpcServer {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl RpcServer {
    pub fn bind(endpoint: &str, handler: Handler) -> std::io::Result<Self> {
        Self::bind_with(endpoint, handler, DEFAULT_POOL_SIZE, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn bind_with(
        endpoint: &str,
        handler: Handler,
        pool_size: usize,
        queue_capacity: usize,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(endpoint)?;
        let local_addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let (sender, receiver): (Sender<TcpStream>, Receiver<TcpStream>) =
            bounded(queue_capacity);

        let mut worker_handles = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let receiver = receiver.clone();
            let handler = Arc::clone(&handler);
            let shutdown = Arc::clone(&shutdown);
            worker_handles.push(std::thread::spawn(move || {
                // The loop ends when the accept thread drops the sender.
                while let Ok(stream) = receiver.recv() {
                    serve_connection(stream, &handler, &shutdown);
                }
            }));
        }

        let accept_handle = {
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || {
                for stream in listener.incoming() {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    match stream {
                        // A full queue back-pressures into the listener's
                        // backlog by blocking here.
                        Ok(stream) => {
                            if sender.send(stream).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                        }
                    }
                }
            })
        };

        Ok(Self {
            local_addr,
            shutdown,
            accept_handle: Some(accept_handle),
            worker_handles,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stops accepting, drains the workers and joins every thread.
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        // Wake the accept thread with a throwaway connection.
        let _ = TcpStream::connect(self.local_addr);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve_connection(mut stream: TcpStream, handler: &Handler, shutdown: &AtomicBool) {
    // Bounded reads: an idle connection re-checks the shutdown flag once a
    // second instead of pinning its worker thread forever.
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(1)));
    loop {
        if shutdown.load(Ordering::Acquire) {
            return;
        }
        let request: Request = match read_frame(&mut stream) {
            Ok(request) => request,
            Err(crate::error::ClusterError::Io(e))
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(crate::error::ClusterError::Io(e))
                if e.kind() == ErrorKind::UnexpectedEof || e.kind() == ErrorKind::ConnectionReset =>
            {
                return;
            }
            Err(e) => {
                debug!(error = %e, "dropping connection after bad frame");
                return;
            }
        };
        let stop = matches!(request, Request::StopWorker);
        let response = handler(request);
        if write_frame(&mut stream, &response).is_err() {
            return;
        }
        if stop {
            shutdown.store(true, Ordering::Release);
            return;
        }
    }
}
