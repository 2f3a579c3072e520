use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use attila_definitions::{Topology as TopologySnapshot, TopologyOverview};
use tokio::sync::oneshot;

use crate::nomad::Clients;

mod collector;
use self::collector::Collector;

/// How often each region collector refreshes its snapshot.
pub const COLLECTION_INTERVAL: Duration = Duration::from_secs(60);

struct RegionHandle {
    result: Arc<RwLock<Option<TopologySnapshot>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

/// Tracks one long-lived collector task per region.
///
/// Collectors share nothing with each other; coordination happens only
/// through this registry, which spawns and stops them as regions come and
/// go. Readers get the last published snapshot without blocking collection.
pub struct Topology {
    clients: Clients,
    regions: RwLock<HashMap<String, RegionHandle>>,
}

impl Topology {
    pub fn new(clients: Clients) -> Topology {
        Topology {
            clients,
            regions: RwLock::new(HashMap::new()),
        }
    }

    /// Ensure a collector runs for the named region. A no-op for regions
    /// already tracked: the collector resolves its client from the registry
    /// on every tick, so a client refresh needs no respawn.
    pub fn region_set(&self, name: &str) {
        let mut regions = self.regions.write().unwrap();
        if regions.contains_key(name) {
            return;
        }

        let result = Arc::new(RwLock::new(None));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let collector = Collector::new(name, self.clients.clone(), result.clone());
        actix_rt::spawn(collector.run(shutdown_rx));

        regions.insert(
            name.to_string(),
            RegionHandle {
                result,
                shutdown: Some(shutdown_tx),
            },
        );
    }

    /// Stop and forget the named region's collector.
    pub fn region_delete(&self, name: &str) {
        let mut regions = self.regions.write().unwrap();
        if let Some(mut handle) = regions.remove(name) {
            if let Some(shutdown) = handle.shutdown.take() {
                let _ = shutdown.send(());
            }
        }
    }

    /// Overviews for every region that has collected at least once, sorted
    /// by region name for stable output.
    pub fn list(&self) -> Vec<TopologyOverview> {
        let regions = self.regions.read().unwrap();

        let mut out: Vec<TopologyOverview> = regions
            .values()
            .filter_map(|handle| {
                handle
                    .result
                    .read()
                    .unwrap()
                    .as_ref()
                    .map(|topology| topology.overview.clone())
            })
            .collect();

        out.sort_by(|a, b| a.region_name.cmp(&b.region_name));
        out
    }

    /// The full snapshot for one region; `None` until the first successful
    /// collection, or when the region is not tracked.
    pub fn get(&self, name: &str) -> Option<TopologySnapshot> {
        let regions = self.regions.read().unwrap();
        regions
            .get(name)
            .and_then(|handle| handle.result.read().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attila_definitions::{Region, RegionApi};
    use mockito::{mock, Matcher};
    use serde_json::json;

    fn make_clients(region_name: &str, address: &str) -> Clients {
        let region = Region {
            name: region_name.into(),
            group: "eu".into(),
            auth: None,
            api: vec![RegionApi {
                address: address.into(),
                default: true,
            }],
            tls: None,
            metadata: None,
        };
        let clients = Clients::new();
        clients.set(region_name, crate::nomad::api::Client::new(&region).unwrap());
        clients
    }

    #[actix_rt::test]
    async fn collector_publishes_snapshot() {
        let _members = mock("GET", "/v1/agent/members")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"Members": [
                    {"Name": "server-1", "Status": "alive",
                     "Tags": {"id": "srv1", "build": "1.7.5", "raft_vsn": "3"}}
                ]})
                .to_string(),
            )
            .create();

        let _nodes = mock("GET", Matcher::Regex(r"^/v1/nodes.*$".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([{
                    "ID": "n1", "Name": "node-1", "NodePool": "default", "Status": "ready",
                    "NodeResources": {"Cpu": {"CpuShares": 4000}, "Memory": {"MemoryMB": 8192}},
                    "ReservedResources": {"Cpu": {"CpuShares": 200}, "Memory": {"MemoryMB": 512}}
                }])
                .to_string(),
            )
            .create();

        let _allocs = mock("GET", "/v1/node/n1/allocations")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    {"ID": "a1", "JobID": "svc", "Namespace": "default",
                     "ClientStatus": "running",
                     "Resources": {"CPU": 500, "MemoryMB": 256}},
                    {"ID": "a2", "JobID": "svc", "Namespace": "default",
                     "ClientStatus": "complete",
                     "Resources": {"CPU": 500, "MemoryMB": 256}}
                ])
                .to_string(),
            )
            .create();

        let clients = make_clients("euw1", &mockito::server_url());
        let topology = Topology::new(clients);
        topology.region_set("euw1");

        // The collector fires immediately; give it a moment to finish.
        tokio::time::delay_for(Duration::from_millis(250)).await;

        let snapshot = topology.get("euw1").expect("snapshot should be published");
        assert_eq!(snapshot.overview.num_servers, 1);
        assert_eq!(snapshot.overview.num_clients, 1);
        assert_eq!(snapshot.overview.num_allocs, 1);
        assert_eq!(snapshot.overview.cpu_allocatable, 3800);
        assert_eq!(snapshot.overview.cpu_allocated, 500);
        assert_eq!(
            snapshot.overview.num_clients as usize,
            snapshot.detail.nodes.len()
        );

        let overviews = topology.list();
        assert_eq!(overviews.len(), 1);
        assert_eq!(overviews[0].region_name, "euw1");

        topology.region_delete("euw1");
        assert!(topology.get("euw1").is_none());
        assert!(topology.list().is_empty());
    }

    #[actix_rt::test]
    async fn failed_collection_keeps_no_snapshot() {
        // No client registered at all: the collector logs and skips.
        let topology = Topology::new(Clients::new());
        topology.region_set("euw1");

        tokio::time::delay_for(Duration::from_millis(100)).await;

        assert!(topology.get("euw1").is_none());
        assert!(topology.list().is_empty());
    }

    #[actix_rt::test]
    async fn region_set_is_idempotent() {
        let topology = Topology::new(Clients::new());
        topology.region_set("euw1");
        topology.region_set("euw1");
        assert_eq!(topology.regions.read().unwrap().len(), 1);
        topology.region_delete("euw1");
    }
}
