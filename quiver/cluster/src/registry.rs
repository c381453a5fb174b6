use dashmap::DashMap;
use quiver_common::types::WorkerId;
use tracing::info;

/// Cluster membership as this worker sees it: worker id → RPC endpoint.
/// The master answers `RegisterWorker`, everyone ingests
/// `ClusterDiscovery` announcements.
pub struct WorkerRegistry {
    self_id: WorkerId,
    workers: DashMap<WorkerId, String>,
}

impl WorkerRegistry {
    pub fn new(self_id: WorkerId, self_endpoint: Option<String>) -> Self {
        let workers = DashMap::new();
        if let Some(endpoint) = self_endpoint {
            workers.insert(self_id, endpoint);
        }
        Self { self_id, workers }
    }

    pub fn self_id(&self) -> WorkerId {
        self.self_id
    }

    pub fn endpoint_of(&self, worker: WorkerId) -> Option<String> {
        self.workers.get(&worker).map(|e| e.clone())
    }

    pub fn workers(&self) -> Vec<(WorkerId, String)> {
        let mut workers: Vec<(WorkerId, String)> = self
            .workers
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        workers.sort_by_key(|(id, _)| *id);
        workers
    }

    /// Master-side registration: grants the desired id when free (or
    /// already held by the same endpoint), otherwise assigns the next free
    /// one.
    pub fn register(&self, desired_id: WorkerId, endpoint: String) -> (bool, WorkerId) {
        let granted = match self.workers.get(&desired_id) {
            None => desired_id,
            Some(existing) if *existing == endpoint => desired_id,
            Some(_) => {
                let mut candidate = desired_id.max(1);
                while self.workers.contains_key(&candidate) {
                    candidate += 1;
                }
                candidate
            }
        };
        self.workers.insert(granted, endpoint.clone());
        info!(worker = granted, endpoint = %endpoint, "worker registered");
        (granted == desired_id, granted)
    }

    /// Ingests a discovery announcement from the master.
    pub fn discover(&self, worker: WorkerId, endpoint: String) {
        self.workers.insert(worker, endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_grants_or_reassigns() {
        let registry = WorkerRegistry::new(0, Some("127.0.0.1:7000".to_string()));
        let (ok, id) = registry.register(1, "127.0.0.1:7001".to_string());
        assert!(ok);
        assert_eq!(id, 1);

        // Same id from a different endpoint gets the next free one.
        let (ok, id) = registry.register(1, "127.0.0.1:7002".to_string());
        assert!(!ok);
        assert_eq!(id, 2);

        // Re-registration from the same endpoint keeps its id.
        let (ok, id) = registry.register(1, "127.0.0.1:7001".to_string());
        assert!(ok);
        assert_eq!(id, 1);
        assert_eq!(registry.workers().len(), 3);
    }
}
