use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub metrics_backend_url: String,
    pub poll_interval: Duration,
    pub query_timeout: Duration,
    pub cycle_deadline: Duration,
    pub cluster_config_path: Option<String>,
    pub history_limit: usize,
    pub max_failed_cycles: u32,
}

/// One pod and the node it is scheduled on. `node_name` is `None` while the
/// pod is pending scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodPlacement {
    pub pod_name: String,
    pub namespace: String,
    pub node_name: Option<String>,
}

/// A single value from one query result, keyed by the pod or instance label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub entity_key: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// A named, statically configured backend query.
#[derive(Debug, Clone, Copy)]
pub struct MetricQuery {
    pub name: &'static str,
    pub expression: &'static str,
}

pub const NODE_CPU: MetricQuery = MetricQuery {
    name: "node_cpu",
    expression: r#"avg(rate(node_cpu_seconds_total{mode!="idle"}[5m])) by (instance)"#,
};

pub const NODE_MEMORY: MetricQuery = MetricQuery {
    name: "node_memory",
    expression: "node_memory_MemTotal_bytes - node_memory_MemAvailable_bytes",
};

pub const POD_CPU: MetricQuery = MetricQuery {
    name: "pod_cpu",
    expression: "sum(rate(container_cpu_usage_seconds_total[5m])) by (pod)",
};

pub const POD_MEMORY: MetricQuery = MetricQuery {
    name: "pod_memory",
    expression: "sum(container_memory_usage_bytes) by (pod)",
};

pub const NODE_QUERIES: [MetricQuery; 2] = [NODE_CPU, NODE_MEMORY];
pub const POD_QUERIES: [MetricQuery; 2] = [POD_CPU, POD_MEMORY];

/// The five inputs gathered each cycle; used to tag what a degraded snapshot
/// is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Placements,
    NodeCpu,
    NodeMemory,
    PodCpu,
    PodMemory,
}

impl Component {
    pub fn for_query(name: &str) -> Option<Component> {
        match name {
            "node_cpu" => Some(Component::NodeCpu),
            "node_memory" => Some(Component::NodeMemory),
            "pod_cpu" => Some(Component::PodCpu),
            "pod_memory" => Some(Component::PodMemory),
            _ => None,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Component::Placements => "placements",
            Component::NodeCpu => "node_cpu",
            Component::NodeMemory => "node_memory",
            Component::PodCpu => "pod_cpu",
            Component::PodMemory => "pod_memory",
        };
        f.write_str(s)
    }
}
