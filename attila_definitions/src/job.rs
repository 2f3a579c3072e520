use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// A submitted job.
///
/// Attila only cares about the identity fields; the remainder of the document
/// is carried opaquely and handed to each region's API untouched. Field names
/// follow the orchestrator's wire format.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Namespace", default = "default_namespace")]
    pub namespace: String,

    #[serde(flatten)]
    pub remainder: Map<String, Value>,
}

fn default_namespace() -> String {
    "default".into()
}

/// The raw plan response returned by a region.
///
/// `JobModifyIndex` is the optimistic-concurrency token asserted at register
/// time; everything else is passed through for the operator.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobPlanResponse {
    #[serde(rename = "JobModifyIndex", default)]
    pub job_modify_index: u64,

    #[serde(flatten)]
    pub remainder: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobRegisterResponse {
    #[serde(rename = "EvalID", default)]
    pub eval_id: String,

    #[serde(rename = "JobModifyIndex", default)]
    pub job_modify_index: u64,

    #[serde(rename = "Warnings", default)]
    pub warnings: String,

    #[serde(flatten)]
    pub remainder: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Objects consumed by the topology collectors.

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AgentMembers {
    #[serde(rename = "Members", default)]
    pub members: Vec<AgentMember>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AgentMember {
    #[serde(rename = "Name", default)]
    pub name: String,

    #[serde(rename = "Status", default)]
    pub status: String,

    #[serde(rename = "Tags", default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NodeListStub {
    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(rename = "Name", default)]
    pub name: String,

    #[serde(rename = "NodePool", default)]
    pub node_pool: String,

    #[serde(rename = "Status", default)]
    pub status: String,

    /// Total resources; only present when listed with `resources=true`
    #[serde(rename = "NodeResources", default)]
    pub node_resources: Option<NodeResources>,

    #[serde(rename = "ReservedResources", default)]
    pub reserved_resources: Option<NodeResources>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NodeResources {
    #[serde(rename = "Cpu", default)]
    pub cpu: NodeCpuResources,

    #[serde(rename = "Memory", default)]
    pub memory: NodeMemoryResources,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NodeCpuResources {
    #[serde(rename = "CpuShares", default)]
    pub cpu_shares: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NodeMemoryResources {
    #[serde(rename = "MemoryMB", default)]
    pub memory_mb: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Allocation {
    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(rename = "JobID", default)]
    pub job_id: String,

    #[serde(rename = "Namespace", default)]
    pub namespace: String,

    #[serde(rename = "ClientStatus", default)]
    pub client_status: String,

    #[serde(rename = "Resources", default)]
    pub resources: Option<AllocationResources>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AllocationResources {
    #[serde(rename = "CPU", default)]
    pub cpu: i64,

    #[serde(rename = "MemoryMB", default)]
    pub memory_mb: i64,
}

impl Allocation {
    /// Whether the allocation has reached a terminal state on its client and
    /// should be excluded from capacity accounting.
    pub fn client_terminal(&self) -> bool {
        matches!(self.client_status.as_str(), "complete" | "failed" | "lost")
    }

    pub fn cpu(&self) -> i64 {
        self.resources.as_ref().map_or(0, |r| r.cpu)
    }

    pub fn memory_mb(&self) -> i64 {
        self.resources.as_ref().map_or(0, |r| r.memory_mb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_carries_unknown_fields() {
        let doc = json!({
            "ID": "svc",
            "Namespace": "platform",
            "TaskGroups": [{"Name": "web", "Count": 3}],
        });
        let job: Job = serde_json::from_value(doc).unwrap();
        assert_eq!(job.id, "svc");
        assert_eq!(job.namespace, "platform");

        let out = serde_json::to_value(&job).unwrap();
        assert_eq!(out["TaskGroups"][0]["Count"], 3);
    }

    #[test]
    fn job_namespace_defaults() {
        let job: Job = serde_json::from_value(json!({"ID": "svc"})).unwrap();
        assert_eq!(job.namespace, "default");
    }

    #[test]
    fn allocation_terminal_states() {
        let mut alloc = Allocation::default();
        for status in &["complete", "failed", "lost"] {
            alloc.client_status = status.to_string();
            assert!(alloc.client_terminal());
        }
        alloc.client_status = "running".into();
        assert!(!alloc.client_terminal());
    }
}
