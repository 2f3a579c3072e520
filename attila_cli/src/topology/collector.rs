use std::sync::{Arc, RwLock};
use std::time::Instant;

use attila_definitions::Topology as TopologySnapshot;
use tokio::sync::oneshot;
use tokio::time::interval;

use crate::nomad::{api, Clients};

use super::COLLECTION_INTERVAL;

/// One region's long-lived topology worker.
///
/// Each tick rebuilds the snapshot from scratch and swaps it in atomically;
/// a failed tick leaves the previous snapshot in place and the next tick
/// retries from nothing.
pub(super) struct Collector {
    name: String,
    clients: Clients,
    result: Arc<RwLock<Option<TopologySnapshot>>>,
}

impl Collector {
    pub(super) fn new(
        name: &str,
        clients: Clients,
        result: Arc<RwLock<Option<TopologySnapshot>>>,
    ) -> Collector {
        Collector {
            name: name.to_string(),
            clients,
            result,
        }
    }

    pub(super) async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        // Collect as soon as the region is tracked rather than waiting a
        // full interval for the first snapshot.
        self.collect().await;

        info!(
            "started periodic topology collector region_name={} interval_secs={}",
            self.name,
            COLLECTION_INTERVAL.as_secs()
        );

        let mut ticker = interval(COLLECTION_INTERVAL);
        ticker.tick().await; // the first tick completes immediately

        loop {
            tokio::select! {
                _ = ticker.tick() => self.collect().await,
                _ = &mut shutdown => {
                    info!("shutting down topology collector region_name={}", self.name);
                    return;
                }
            }
        }
    }

    async fn collect(&self) {
        let started = Instant::now();
        debug!("performing topology collection region_name={}", self.name);

        let client = match self.clients.get(&self.name) {
            Ok(client) => client,
            Err(e) => {
                warn!(
                    "failed to get API client region_name={} error={}",
                    self.name, e
                );
                return;
            }
        };

        let mut snapshot = TopologySnapshot::new(&self.name);

        if let Err(e) = self.collect_servers(&client, &mut snapshot).await {
            warn!(
                "failed to collect server topology region_name={} error={}",
                self.name,
                crate::error_chain_text(&e)
            );
            return;
        }

        if let Err(e) = self.collect_nodes(&client, &mut snapshot).await {
            warn!(
                "failed to collect node topology region_name={} error={}",
                self.name,
                crate::error_chain_text(&e)
            );
            return;
        }

        *self.result.write().unwrap() = Some(snapshot);

        debug!(
            "finished topology collection region_name={} duration_ms={}",
            self.name,
            started.elapsed().as_millis()
        );
    }

    async fn collect_servers(
        &self,
        client: &api::Client,
        snapshot: &mut TopologySnapshot,
    ) -> crate::Result<()> {
        let members = client.agent_members().await?;
        for member in &members.members {
            snapshot.add_server(member);
        }
        Ok(())
    }

    async fn collect_nodes(
        &self,
        client: &api::Client,
        snapshot: &mut TopologySnapshot,
    ) -> crate::Result<()> {
        let nodes = client.node_list().await?;
        for node in &nodes {
            let allocs = client.node_allocations(&node.id).await?;
            snapshot.add_node(node, &allocs);
        }
        Ok(())
    }
}
