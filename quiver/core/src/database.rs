use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use quiver_cluster::coordinator::UpdatesCoordinator;
use quiver_cluster::message::{Request, Response};
use quiver_cluster::registry::WorkerRegistry;
use quiver_cluster::router::ClusterRouter;
use quiver_cluster::server::RpcServer;
use quiver_cluster::service::ClusterService;
use quiver_cluster::RpcClient;
use quiver_common::config::DatabaseConfig;
use quiver_common::value::PropertyValue;
use quiver_execution::{ExecutionContext, QueryResults, execute};
use quiver_planner::{CostEstimate, CostEstimator, CostParams, ast, plan_query};
use quiver_storage::gc::GcRunner;
use quiver_storage::recovery::recover;
use quiver_storage::wal::WalConfig;
use quiver_storage::{GraphAccessor, Storage};
use quiver_transaction::{Transaction, TransactionEngine};
use tracing::info;

use crate::error::DatabaseResult;
use crate::names_store::NameStore;
use crate::stats::CatalogBridge;

struct ClusterHandle {
    registry: Arc<WorkerRegistry>,
    router: Arc<ClusterRouter>,
    server: Mutex<RpcServer>,
}

/// One worker's database instance: the storage engine with its WAL and GC
/// threads, the query layer, and (when configured) the cluster plumbing.
pub struct Database {
    config: DatabaseConfig,
    engine: Arc<TransactionEngine>,
    storage: Arc<Storage>,
    names: Arc<NameStore>,
    cost_params: CostParams,
    gc: Mutex<Option<GcRunner>>,
    cluster: Option<ClusterHandle>,
}

impl Database {
    /// Opens (and recovers) a database under the given configuration.
    pub fn open(config: DatabaseConfig) -> DatabaseResult<Arc<Self>> {
        let engine = Arc::new(TransactionEngine::new());
        let storage = Storage::new(
            config.worker_id,
            Arc::clone(&engine),
            WalConfig {
                directory: config.durability_directory.clone(),
                enabled: config.durability_enabled,
                synchronous_commit: config.synchronous_commit,
                flush_interval: config.wal_flush_interval(),
                rotate_deltas_count: config.wal_rotate_deltas_count,
            },
            config.lock_timeout(),
        )?;

        let names = if config.durability_enabled {
            let info = recover(&storage)?;
            info!(
                transactions = info.transactions_replayed,
                deltas = info.deltas_applied,
                "opened with recovered state"
            );
            NameStore::open(&config.durability_directory)?
        } else {
            NameStore::ephemeral()
        };
        storage.wal.start_flusher();

        let cluster = Self::wire_cluster(&config, &storage)?;

        let database = Arc::new(Self {
            gc: Mutex::new(Some(GcRunner::start(
                Arc::clone(&storage),
                config.gc_cycle(),
            ))),
            engine,
            storage,
            names: Arc::new(names),
            cost_params: CostParams::default(),
            cluster,
            config,
        });
        Ok(database)
    }

    fn wire_cluster(
        config: &DatabaseConfig,
        storage: &Arc<Storage>,
    ) -> DatabaseResult<Option<ClusterHandle>> {
        let Some(listen) = &config.listen_endpoint else {
            return Ok(None);
        };
        let registry = Arc::new(WorkerRegistry::new(
            config.worker_id,
            Some(listen.clone()),
        ));
        let coordinator = Arc::new(UpdatesCoordinator::new(Arc::clone(storage)));
        let service = ClusterService::new(
            Arc::clone(storage),
            Arc::clone(&coordinator),
            Arc::clone(&registry),
        );
        let server = RpcServer::bind(listen, service.into_handler())?;
        let endpoint = server.local_addr().to_string();

        if let Some(master) = &config.master_endpoint {
            let client = RpcClient::new(0, master.clone());
            let response = client
                .call(&Request::RegisterWorker {
                    desired_id: config.worker_id,
                    endpoint,
                })
                .map_err(crate::error::DatabaseError::Cluster)?;
            if let Response::Registered { workers, .. } = response {
                for (worker, endpoint) in workers {
                    registry.discover(worker, endpoint);
                }
            }
        }

        let router = Arc::new(ClusterRouter::new(Arc::clone(&registry)));
        storage.set_router(router.clone());
        info!(worker = config.worker_id, "cluster wiring up");
        Ok(Some(ClusterHandle {
            registry,
            router,
            server: Mutex::new(server),
        }))
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn names(&self) -> &Arc<NameStore> {
        &self.names
    }

    pub fn workers(&self) -> Vec<(i32, String)> {
        self.cluster
            .as_ref()
            .map(|c| c.registry.workers())
            .unwrap_or_default()
    }

    // ----- transactions -----

    pub fn begin(&self) -> DatabaseResult<Transaction> {
        Ok(self.storage.begin_transaction()?)
    }

    /// Commits, first applying this transaction's buffered updates on
    /// every remote worker it touched. A failing worker aborts the
    /// transaction cluster-wide.
    pub fn commit(&self, txn: &Transaction) -> DatabaseResult<()> {
        if let Some(cluster) = &self.cluster {
            if let Err(e) = cluster.router.apply_remote(txn.id()) {
                cluster.router.forget(txn.id());
                self.storage.abort_transaction(txn)?;
                return Err(e.into());
            }
        }
        self.storage.commit_transaction(txn)?;
        if let Some(cluster) = &self.cluster {
            cluster
                .router
                .clear_remote_caches(self.engine.oldest_active());
        }
        Ok(())
    }

    pub fn abort(&self, txn: &Transaction) -> DatabaseResult<()> {
        if let Some(cluster) = &self.cluster {
            cluster.router.forget(txn.id());
        }
        self.storage.abort_transaction(txn)?;
        Ok(())
    }

    // ----- queries -----

    /// Plans and runs a query inside `txn`. On any error the transaction
    /// is aborted before the error is returned, so no partial writes
    /// remain observable.
    pub fn execute(
        &self,
        txn: &Transaction,
        query: &ast::Query,
        parameters: HashMap<String, PropertyValue>,
    ) -> DatabaseResult<QueryResults> {
        let catalog = CatalogBridge::new(Arc::clone(&self.storage), Arc::clone(&self.names));
        let plan = match plan_query(query, &catalog) {
            Ok(plan) => plan,
            Err(e) => {
                // Semantic errors abort too: the transaction may already
                // hold writes from earlier statements the client will not
                // be able to commit coherently.
                self.abort(txn)?;
                return Err(e.into());
            }
        };
        let graph = GraphAccessor::new(Arc::clone(&self.storage), txn.clone());
        let mut ctx = ExecutionContext::new(graph, Arc::clone(self.names.tables()))
            .with_parameters(parameters)
            .with_deadline(Instant::now() + self.config.query_execution_timeout());
        match execute(&plan, &mut ctx) {
            Ok(results) => Ok(results),
            Err(e) => {
                self.abort(txn)?;
                Err(e.into())
            }
        }
    }

    /// One-shot query in its own transaction.
    pub fn run(
        &self,
        query: &ast::Query,
        parameters: HashMap<String, PropertyValue>,
    ) -> DatabaseResult<QueryResults> {
        let txn = self.begin()?;
        let results = self.execute(&txn, query, parameters)?;
        self.commit(&txn)?;
        Ok(results)
    }

    /// Estimated cost of a query against current index statistics.
    pub fn estimate(&self, query: &ast::Query) -> DatabaseResult<CostEstimate> {
        let catalog = CatalogBridge::new(Arc::clone(&self.storage), Arc::clone(&self.names));
        let plan = plan_query(query, &catalog)?;
        let estimator = CostEstimator::new(&catalog, &self.cost_params);
        Ok(estimator.estimate(&plan.plan))
    }

    /// Builds a label+property index over the committed vertex set.
    pub fn build_index(&self, label: &str, property: &str) -> DatabaseResult<()> {
        let label = self.names.label_id(label);
        let property = self.names.property_id(property);
        let txn = self.begin()?;
        let graph = GraphAccessor::new(Arc::clone(&self.storage), txn.clone());
        match graph.build_index(label, property) {
            Ok(()) => {
                self.commit(&txn)?;
                Ok(())
            }
            Err(e) => {
                self.abort(&txn)?;
                Err(e.into())
            }
        }
    }

    /// Stops the background threads and flushes the WAL. Further use of
    /// the handle is not supported.
    pub fn shutdown(&self) {
        if let Some(mut gc) = self.gc.lock().take() {
            gc.stop();
        }
        if let Some(cluster) = &self.cluster {
            cluster.server.lock().shutdown();
        }
        self.storage.wal.shutdown();
        info!("database shut down");
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.shutdown();
    }
}
