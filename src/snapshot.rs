use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::{Component, MetricSample, PodPlacement};

/// One poll cycle's correlated view of the cluster: every pod's node
/// assignment plus the node- and pod-level samples gathered in the same
/// cycle. Immutable once built and self-contained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub placements: Vec<PodPlacement>,
    pub node_metrics: BTreeMap<String, Vec<MetricSample>>,
    pub pod_metrics: BTreeMap<String, Vec<MetricSample>>,
    /// Components that failed this cycle. Empty for a full snapshot;
    /// `Placements` here with a non-empty placement list means the listing
    /// was partial.
    pub missing: Vec<Component>,
}

impl Snapshot {
    /// Build a snapshot from one cycle's results. Deterministic: the caller
    /// supplies `taken_at`, and equal inputs produce an equal snapshot.
    pub fn build(
        taken_at: DateTime<Utc>,
        placements: Vec<PodPlacement>,
        node_samples: Vec<(String, Vec<MetricSample>)>,
        pod_samples: Vec<(String, Vec<MetricSample>)>,
        mut missing: Vec<Component>,
    ) -> Self {
        missing.sort();
        missing.dedup();
        Self {
            taken_at,
            placements,
            node_metrics: node_samples.into_iter().collect(),
            pod_metrics: pod_samples.into_iter().collect(),
            missing,
        }
    }

    /// Node the named pod is scheduled on, derived from the placement list.
    /// `None` when the pod is unknown or still pending.
    pub fn node_for_pod(&self, pod_name: &str) -> Option<&str> {
        self.placements
            .iter()
            .find(|p| p.pod_name == pod_name)
            .and_then(|p| p.node_name.as_deref())
    }

    pub fn is_degraded(&self) -> bool {
        !self.missing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(key: &str, value: f64) -> MetricSample {
        MetricSample {
            entity_key: key.to_string(),
            value,
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    fn placement(pod: &str, ns: &str, node: Option<&str>) -> PodPlacement {
        PodPlacement {
            pod_name: pod.to_string(),
            namespace: ns.to_string(),
            node_name: node.map(|n| n.to_string()),
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let taken_at = DateTime::from_timestamp(1_700_000_100, 0).unwrap();
        let build = || {
            Snapshot::build(
                taken_at,
                vec![placement("a", "default", Some("n1"))],
                vec![("node_cpu".to_string(), vec![sample("n1", 0.42)])],
                vec![("pod_cpu".to_string(), vec![sample("a", 0.1)])],
                vec![],
            )
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_node_for_pod_join() {
        let snapshot = Snapshot::build(
            Utc::now(),
            vec![
                placement("a", "default", Some("n1")),
                placement("b", "default", None),
            ],
            vec![("node_cpu".to_string(), vec![sample("n1", 0.42)])],
            vec![],
            vec![],
        );

        assert_eq!(snapshot.node_for_pod("a"), Some("n1"));
        assert_eq!(snapshot.node_for_pod("b"), None); // pending
        assert_eq!(snapshot.node_for_pod("ghost"), None); // not placed
        // the joined sample passes through unchanged
        let cpu = &snapshot.node_metrics["node_cpu"];
        assert_eq!(cpu.len(), 1);
        assert_eq!(cpu[0].entity_key, "n1");
        assert!((cpu[0].value - 0.42).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_components_are_sorted_and_deduped() {
        let snapshot = Snapshot::build(
            Utc::now(),
            vec![],
            vec![],
            vec![],
            vec![
                Component::PodMemory,
                Component::NodeCpu,
                Component::PodMemory,
            ],
        );
        assert_eq!(
            snapshot.missing,
            vec![Component::NodeCpu, Component::PodMemory]
        );
        assert!(snapshot.is_degraded());
    }

    #[test]
    fn test_serialized_snapshot_carries_markers() {
        let snapshot = Snapshot::build(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            vec![placement("a", "default", Some("n1"))],
            vec![("node_cpu".to_string(), vec![sample("n1", 0.42)])],
            vec![],
            vec![Component::PodCpu, Component::PodMemory],
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["taken_at"].is_string());
        assert_eq!(json["node_metrics"]["node_cpu"][0]["value"], 0.42);
        assert_eq!(json["missing"][0], "pod_cpu");
        assert_eq!(json["missing"][1], "pod_memory");
    }
}
