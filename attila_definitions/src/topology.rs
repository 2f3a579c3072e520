use chrono::{DateTime, Utc};

use super::job::{AgentMember, Allocation, NodeListStub};

/// A point-in-time view of a region's capacity.
///
/// `create_time` marks when the collection ran so callers can judge how
/// stale the data is.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Topology {
    pub overview: TopologyOverview,
    pub detail: TopologyDetail,
    pub create_time: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TopologyOverview {
    pub region_name: String,
    pub num_servers: u64,
    pub num_clients: u64,
    pub num_allocs: u64,
    pub cpu_allocatable: i64,
    pub cpu_allocated: i64,
    pub memory_allocatable: i64,
    pub memory_allocated: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TopologyDetail {
    pub servers: Vec<ServerTopology>,
    pub nodes: Vec<NodeTopology>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServerTopology {
    pub id: String,
    pub name: String,
    pub status: String,
    pub version: String,
    pub raft_version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NodeTopology {
    pub id: String,
    pub name: String,
    pub node_pool: String,
    pub status: String,
    pub cpu_allocatable: i64,
    pub cpu_allocated: i64,
    pub memory_allocatable: i64,
    pub memory_allocated: i64,
    pub allocations: Vec<AllocationTopology>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AllocationTopology {
    pub id: String,
    pub job_id: String,
    pub namespace: String,
    pub cpu: i64,
    pub memory: i64,
}

impl Topology {
    pub fn new(region_name: &str) -> Topology {
        Topology {
            overview: TopologyOverview {
                region_name: region_name.to_string(),
                ..Default::default()
            },
            detail: TopologyDetail::default(),
            create_time: Utc::now(),
        }
    }

    pub fn add_server(&mut self, member: &AgentMember) {
        self.overview.num_servers += 1;

        let tag = |key: &str| member.tags.get(key).cloned().unwrap_or_default();
        self.detail.servers.push(ServerTopology {
            id: tag("id"),
            name: member.name.clone(),
            status: member.status.clone(),
            version: tag("build"),
            raft_version: tag("raft_vsn"),
        });
    }

    /// Fold a node and its allocations into the topology. The caller must
    /// ensure the allocation list belongs to the passed node.
    pub fn add_node(&mut self, node: &NodeListStub, allocs: &[Allocation]) {
        let resources = node.node_resources.clone().unwrap_or_default();
        let reserved = node.reserved_resources.clone().unwrap_or_default();

        let cpu_allocatable = resources.cpu.cpu_shares - reserved.cpu.cpu_shares;
        let memory_allocatable = resources.memory.memory_mb - reserved.memory.memory_mb;

        self.overview.num_clients += 1;
        self.overview.cpu_allocatable += cpu_allocatable;
        self.overview.memory_allocatable += memory_allocatable;

        let mut node_topology = NodeTopology {
            id: node.id.clone(),
            name: node.name.clone(),
            node_pool: node.node_pool.clone(),
            status: node.status.clone(),
            cpu_allocatable,
            cpu_allocated: 0,
            memory_allocatable,
            memory_allocated: 0,
            allocations: vec![],
        };

        for alloc in allocs {
            if alloc.client_terminal() {
                continue;
            }

            self.overview.num_allocs += 1;
            self.overview.cpu_allocated += alloc.cpu();
            self.overview.memory_allocated += alloc.memory_mb();
            node_topology.cpu_allocated += alloc.cpu();
            node_topology.memory_allocated += alloc.memory_mb();

            node_topology.allocations.push(AllocationTopology {
                id: alloc.id.clone(),
                job_id: alloc.job_id.clone(),
                namespace: alloc.namespace.clone(),
                cpu: alloc.cpu(),
                memory: alloc.memory_mb(),
            });
        }

        self.detail.nodes.push(node_topology);
    }
}

impl TopologyDetail {
    /// Presentation helper: nodes by pool then name.
    pub fn sort_nodes(&mut self) {
        self.nodes
            .sort_by(|a, b| (&a.node_pool, &a.name).cmp(&(&b.node_pool, &b.name)));
        for node in &mut self.nodes {
            node.allocations.sort_by(|a, b| {
                (&a.namespace, &a.job_id, &a.id).cmp(&(&b.namespace, &b.job_id, &b.id))
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{AllocationResources, NodeCpuResources, NodeMemoryResources, NodeResources};
    use std::collections::BTreeMap;

    fn node(id: &str, cpu: i64, cpu_reserved: i64, mem: i64, mem_reserved: i64) -> NodeListStub {
        NodeListStub {
            id: id.into(),
            name: format!("node-{}", id),
            node_pool: "default".into(),
            status: "ready".into(),
            node_resources: Some(NodeResources {
                cpu: NodeCpuResources { cpu_shares: cpu },
                memory: NodeMemoryResources { memory_mb: mem },
            }),
            reserved_resources: Some(NodeResources {
                cpu: NodeCpuResources {
                    cpu_shares: cpu_reserved,
                },
                memory: NodeMemoryResources {
                    memory_mb: mem_reserved,
                },
            }),
        }
    }

    fn alloc(id: &str, status: &str, cpu: i64, mem: i64) -> Allocation {
        Allocation {
            id: id.into(),
            job_id: "svc".into(),
            namespace: "default".into(),
            client_status: status.into(),
            resources: Some(AllocationResources {
                cpu,
                memory_mb: mem,
            }),
        }
    }

    #[test]
    fn overview_sums_match_detail() {
        let mut topo = Topology::new("euw1");

        topo.add_server(&AgentMember {
            name: "server-1".into(),
            status: "alive".into(),
            tags: BTreeMap::new(),
        });

        topo.add_node(
            &node("n1", 4000, 200, 8192, 512),
            &[
                alloc("a1", "running", 500, 256),
                alloc("a2", "complete", 500, 256),
            ],
        );
        topo.add_node(&node("n2", 2000, 0, 4096, 0), &[alloc("a3", "pending", 250, 128)]);

        let ov = &topo.overview;
        assert_eq!(ov.num_servers as usize, topo.detail.servers.len());
        assert_eq!(ov.num_clients as usize, topo.detail.nodes.len());

        let alloc_count: usize = topo.detail.nodes.iter().map(|n| n.allocations.len()).sum();
        assert_eq!(ov.num_allocs as usize, alloc_count);

        let cpu_allocated: i64 = topo.detail.nodes.iter().map(|n| n.cpu_allocated).sum();
        assert_eq!(ov.cpu_allocated, cpu_allocated);
        assert_eq!(ov.cpu_allocated, 750);

        let mem_allocated: i64 = topo.detail.nodes.iter().map(|n| n.memory_allocated).sum();
        assert_eq!(ov.memory_allocated, mem_allocated);

        // allocatable = resources - reserved
        assert_eq!(ov.cpu_allocatable, 3800 + 2000);
        assert_eq!(ov.memory_allocatable, 7680 + 4096);
    }

    #[test]
    fn terminal_allocs_excluded() {
        let mut topo = Topology::new("euw1");
        topo.add_node(
            &node("n1", 1000, 0, 1024, 0),
            &[
                alloc("a1", "failed", 100, 64),
                alloc("a2", "lost", 100, 64),
                alloc("a3", "complete", 100, 64),
            ],
        );
        assert_eq!(topo.overview.num_allocs, 0);
        assert_eq!(topo.overview.cpu_allocated, 0);
        assert!(topo.detail.nodes[0].allocations.is_empty());
    }

    #[test]
    fn server_tags_mapped() {
        let mut tags = BTreeMap::new();
        tags.insert("id".to_string(), "abc123".to_string());
        tags.insert("build".to_string(), "1.7.5".to_string());
        tags.insert("raft_vsn".to_string(), "3".to_string());

        let mut topo = Topology::new("euw1");
        topo.add_server(&AgentMember {
            name: "server-1".into(),
            status: "alive".into(),
            tags,
        });

        let server = &topo.detail.servers[0];
        assert_eq!(server.id, "abc123");
        assert_eq!(server.version, "1.7.5");
        assert_eq!(server.raft_version, "3");
    }

    #[test]
    fn node_sorting() {
        let mut detail = TopologyDetail::default();
        let mut topo = Topology::new("euw1");
        let mut n = node("n2", 0, 0, 0, 0);
        n.node_pool = "gpu".into();
        topo.add_node(&n, &[]);
        topo.add_node(&node("n1", 0, 0, 0, 0), &[]);
        detail.nodes = topo.detail.nodes;
        detail.sort_nodes();
        assert_eq!(detail.nodes[0].node_pool, "default");
        assert_eq!(detail.nodes[1].node_pool, "gpu");
    }
}
