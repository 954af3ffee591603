use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::SourceError;
use crate::placement::PlacementSource;
use crate::prometheus::MetricsSource;
use crate::sink::SnapshotSink;
use crate::snapshot::Snapshot;
use crate::types::{Component, Config, MetricQuery, MetricSample, PodPlacement, NODE_QUERIES, POD_QUERIES};

/// Where the loop currently is in its cycle. `Halted` is terminal and
/// requires an external restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Polling,
    Publishing,
    Degraded,
    Halted,
}

/// The single outcome record every cycle emits: a published snapshot (full
/// when `missing` is empty, partial otherwise) or a failed cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Published {
        taken_at: DateTime<Utc>,
        missing: Vec<Component>,
    },
    Failed {
        reason: String,
    },
}

/// Periodic driver joining the placement listing with the four fixed metric
/// queries into one snapshot per cycle. Exactly one cycle is in flight at a
/// time; cycle N+1 never starts before cycle N has published.
pub struct CollectorLoop<P, M, S> {
    config: Config,
    placements: P,
    metrics: M,
    sink: S,
    state: LoopState,
    consecutive_failures: u32,
    history: VecDeque<Snapshot>,
}

/// Everything one cycle gathered, with failed inputs folded into `missing`.
struct CycleInputs {
    placements: Vec<PodPlacement>,
    node_samples: Vec<(String, Vec<MetricSample>)>,
    pod_samples: Vec<(String, Vec<MetricSample>)>,
    missing: Vec<Component>,
    failed_inputs: usize,
}

const CYCLE_INPUTS: usize = 5;

impl CycleInputs {
    fn all_failed(&self) -> bool {
        self.failed_inputs == CYCLE_INPUTS
    }
}

impl<P, M, S> CollectorLoop<P, M, S>
where
    P: PlacementSource,
    M: MetricsSource,
    S: SnapshotSink,
{
    pub fn new(config: Config, placements: P, metrics: M, sink: S) -> Self {
        Self {
            config,
            placements,
            metrics,
            sink,
            state: LoopState::Idle,
            consecutive_failures: 0,
            history: VecDeque::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Snapshots retained from past cycles, oldest first, bounded by
    /// `history_limit`.
    pub fn history(&self) -> impl Iterator<Item = &Snapshot> {
        self.history.iter()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.history.back()
    }

    /// Poll on `poll_interval` until shutdown is signalled or the loop halts.
    /// A shutdown arriving mid-cycle cancels the in-flight cycle wholesale
    /// and discards its partial results.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.state == LoopState::Halted {
                return Err(anyhow!(
                    "collector halted after {} consecutive fully-failed cycles",
                    self.consecutive_failures
                ));
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("shutdown requested, cancelling in-flight cycle");
                    return Ok(());
                }
                outcome = async {
                    ticker.tick().await;
                    self.poll_once().await
                } => {
                    match &outcome {
                        CycleOutcome::Published { taken_at, missing } if missing.is_empty() => {
                            info!(%taken_at, "cycle complete: full snapshot");
                        }
                        CycleOutcome::Published { taken_at, missing } => {
                            let missing: Vec<String> =
                                missing.iter().map(|c| c.to_string()).collect();
                            warn!(%taken_at, missing = missing.join(","), "cycle degraded: partial snapshot");
                        }
                        CycleOutcome::Failed { reason } => {
                            error!(reason = %reason, failures = self.consecutive_failures, "cycle failed");
                        }
                    }
                }
            }
        }
    }

    /// Run one full cycle: gather, build, publish. Exposed separately so the
    /// state machine is drivable without timers.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        if self.state == LoopState::Halted {
            return CycleOutcome::Failed {
                reason: "collector is halted".to_string(),
            };
        }

        self.state = LoopState::Polling;
        let taken_at = Utc::now();

        let gathered = timeout(
            self.config.cycle_deadline,
            gather(&self.placements, &self.metrics),
        )
        .await;
        let inputs = match gathered {
            Ok(inputs) => inputs,
            // Partial results from an expired cycle are discarded, and the
            // cycle counts as fully failed.
            Err(_) => return self.fail_cycle("cycle deadline exceeded"),
        };

        if inputs.all_failed() {
            return self.fail_cycle("placement listing and all queries failed");
        }
        self.consecutive_failures = 0;

        if !inputs.missing.is_empty() {
            self.state = LoopState::Degraded;
        }
        let snapshot = Snapshot::build(
            taken_at,
            inputs.placements,
            inputs.node_samples,
            inputs.pod_samples,
            inputs.missing,
        );

        self.state = LoopState::Publishing;
        let outcome = match self.sink.publish(&snapshot).await {
            Ok(()) => CycleOutcome::Published {
                taken_at: snapshot.taken_at,
                missing: snapshot.missing.clone(),
            },
            Err(e) => CycleOutcome::Failed {
                reason: format!("sink rejected snapshot: {}", e),
            },
        };

        while self.history.len() >= self.config.history_limit.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);

        self.state = LoopState::Idle;
        outcome
    }

    fn fail_cycle(&mut self, reason: &str) -> CycleOutcome {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.max_failed_cycles {
            error!(
                failures = self.consecutive_failures,
                "halting: no source has responded for {} cycles", self.consecutive_failures
            );
            self.state = LoopState::Halted;
        } else {
            self.state = LoopState::Idle;
        }
        CycleOutcome::Failed {
            reason: reason.to_string(),
        }
    }
}

/// Issue the placement listing and the four queries concurrently. The five
/// reads are independent; none blocks another, and each resolves or fails on
/// its own.
async fn gather<P: PlacementSource, M: MetricsSource>(placements: &P, metrics: &M) -> CycleInputs {
    let (placements_res, node_results, pod_results) = tokio::join!(
        placements.list_placements(),
        run_group(metrics, &NODE_QUERIES),
        run_group(metrics, &POD_QUERIES),
    );

    let mut missing = Vec::new();
    let mut failed_inputs = 0;

    let placements = match placements_res {
        Ok(placements) => placements,
        Err(SourceError::PartialListing { placements, reason }) => {
            // Usable data arrived; tag the listing as incomplete.
            warn!(reason = %reason, pods = placements.len(), "placement listing partial");
            missing.push(Component::Placements);
            placements
        }
        Err(e) => {
            warn!(error = %e, "placement listing failed");
            missing.push(Component::Placements);
            failed_inputs += 1;
            Vec::new()
        }
    };

    let mut fold = |results: [(&'static str, Result<Vec<MetricSample>, SourceError>); 2]| {
        let mut groups = Vec::new();
        for (name, result) in results {
            match result {
                Ok(samples) => groups.push((name.to_string(), samples)),
                Err(e) => {
                    warn!(query = name, error = %e, retryable = e.is_retryable(), "query failed");
                    if let Some(component) = Component::for_query(name) {
                        missing.push(component);
                    }
                    failed_inputs += 1;
                }
            }
        }
        groups
    };

    let node_samples = fold(node_results);
    let pod_samples = fold(pod_results);

    CycleInputs {
        placements,
        node_samples,
        pod_samples,
        missing,
        failed_inputs,
    }
}

async fn run_group<M: MetricsSource>(
    metrics: &M,
    queries: &[MetricQuery; 2],
) -> [(&'static str, Result<Vec<MetricSample>, SourceError>); 2] {
    let (first, second) = tokio::join!(
        metrics.run_query(queries[0].expression),
        metrics.run_query(queries[1].expression),
    );
    [(queries[0].name, first), (queries[1].name, second)]
}
