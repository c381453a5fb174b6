//! Request dispatch: maps each RPC onto the storage and coordinator
//! operations of this worker.

use std::sync::Arc;

use quiver_storage::{GraphAccessor, StateDelta, Storage};
use tracing::info;

use crate::coordinator::UpdatesCoordinator;
use crate::message::{Request, Response};
use crate::registry::WorkerRegistry;
use crate::server::Handler;

pub struct ClusterService {
    storage: Arc<Storage>,
    coordinator: Arc<UpdatesCoordinator>,
    registry: Arc<WorkerRegistry>,
}

impl ClusterService {
    pub fn new(
        storage: Arc<Storage>,
        coordinator: Arc<UpdatesCoordinator>,
        registry: Arc<WorkerRegistry>,
    ) -> Self {
        Self {
            storage,
            coordinator,
            registry,
        }
    }

    /// The synchronous handler the RPC server's worker threads run.
    pub fn into_handler(self) -> Handler {
        Arc::new(move |request| self.handle(request))
    }

    fn handle(&self, request: Request) -> Response {
        match request {
            Request::Update { delta } => match self.coordinator.emplace(delta) {
                Ok(()) => Response::Done,
                Err(e) => Response::from_storage_error(&e),
            },
            Request::CreateVertex {
                tx,
                labels,
                properties,
            } => {
                let txn = self.coordinator.register_transaction(tx);
                let graph = GraphAccessor::new(Arc::clone(&self.storage), txn);
                match graph.create_vertex(labels, properties) {
                    Ok(accessor) => Response::Created { gid: accessor.gid },
                    Err(e) => Response::from_storage_error(&e),
                }
            }
            Request::CreateEdge {
                tx,
                from,
                to,
                edge_type,
            } => {
                let txn = self.coordinator.register_transaction(tx);
                let graph = GraphAccessor::new(Arc::clone(&self.storage), txn);
                // The in-edge is only ours to emit when `to` lives here;
                // the caller reaches the to-owner itself otherwise.
                let include_in_edge = to.is_local_to(self.registry.self_id());
                match graph.create_edge_with(from, to, edge_type, include_in_edge) {
                    Ok(accessor) => Response::Created { gid: accessor.gid },
                    Err(e) => Response::from_storage_error(&e),
                }
            }
            Request::RemoveVertex {
                tx,
                gid,
                check_empty,
            } => {
                let delta = StateDelta::RemoveVertex {
                    tx,
                    gid,
                    check_empty,
                };
                match self.coordinator.emplace(delta) {
                    Ok(()) => Response::Done,
                    Err(e) => Response::from_storage_error(&e),
                }
            }
            Request::RemoveEdge { tx, gid, from, to } => {
                let edge_address =
                    quiver_common::types::Address::new(gid.worker_id(), gid);
                let deltas = [
                    Some(StateDelta::RemoveEdge { tx, gid }),
                    Some(StateDelta::RemoveOutEdge {
                        tx,
                        gid: from.gid,
                        edge: edge_address,
                    }),
                    to.is_local_to(self.registry.self_id())
                        .then_some(StateDelta::RemoveInEdge {
                            tx,
                            gid: to.gid,
                            edge: edge_address,
                        }),
                ];
                for delta in deltas.into_iter().flatten() {
                    if let Err(e) = self.coordinator.emplace(delta) {
                        return Response::from_storage_error(&e);
                    }
                }
                Response::Done
            }
            Request::Apply { tx } => match self.coordinator.apply(tx) {
                Ok(()) => Response::Done,
                Err(e) => Response::from_storage_error(&e),
            },
            Request::ClearTransactionalCache { oldest_active } => {
                self.coordinator.clear_transactional_cache(oldest_active);
                Response::Done
            }
            Request::RegisterWorker {
                desired_id,
                endpoint,
            } => {
                let (granted, assigned_id) = self.registry.register(desired_id, endpoint);
                Response::Registered {
                    registration_successful: granted,
                    assigned_id,
                    workers: self.registry.workers(),
                }
            }
            Request::ClusterDiscovery { worker_id, endpoint } => {
                self.registry.discover(worker_id, endpoint);
                Response::Done
            }
            Request::StopWorker => {
                info!("stop requested over RPC");
                Response::Done
            }
        }
    }
}
