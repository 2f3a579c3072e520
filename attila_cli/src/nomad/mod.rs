use attila_definitions::{Job, JobRegisterPlan, JobRegisterPlanRun, Topology, TopologyOverview};
use attila_state::State;
use ulid::Ulid;

use crate::job::{Planner, Register};
use crate::topology;
use crate::Result;

/// Typed API client for one region
pub mod api;

/// Concurrent region name to client mapping
pub mod client;
pub use self::client::Clients;

/// The facade composing the client registry, the topology collectors and
/// the job registration pipeline. Region lifecycle events fan out from here
/// so the registry and the collectors never drift apart.
pub struct Controller {
    clients: Clients,
    topology: topology::Topology,
}

impl Controller {
    pub fn new() -> Controller {
        let clients = Clients::new();
        Controller {
            topology: topology::Topology::new(clients.clone()),
            clients,
        }
    }

    /// Track a region: register its client and ensure a topology collector
    /// is running. Re-setting an already-tracked region refreshes the client
    /// only; the collector picks the new client up on its next tick.
    pub fn region_set(&self, name: &str, client: api::Client) {
        self.clients.set(name, client);
        self.topology.region_set(name);
    }

    pub fn region_delete(&self, name: &str) {
        self.clients.delete(name);
        self.topology.region_delete(name);
    }

    pub fn region_num(&self) -> usize {
        self.clients.len()
    }

    pub async fn plan_create(&self, job: &Job, state: &dyn State) -> Result<JobRegisterPlan> {
        Planner::new(&self.clients, state, job).run().await
    }

    pub async fn plan_run(
        &self,
        plan_id: Ulid,
        job: &Job,
        state: &dyn State,
    ) -> Result<(JobRegisterPlanRun, Option<String>)> {
        Register::new(&self.clients, state, job, plan_id).run().await
    }

    pub fn topology_list(&self) -> Vec<TopologyOverview> {
        self.topology.list()
    }

    pub fn topology_get(&self, name: &str) -> Option<Topology> {
        self.topology.get(name)
    }
}

impl Default for Controller {
    fn default() -> Controller {
        Controller::new()
    }
}
