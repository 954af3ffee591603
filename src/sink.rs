use anyhow::{Context, Result};
use std::collections::VecDeque;
use tracing::info;

use crate::snapshot::Snapshot;

/// Destination for finished snapshots. Swappable so output format is an
/// integration decision and tests observe published data directly.
pub trait SnapshotSink {
    fn publish(
        &mut self,
        snapshot: &Snapshot,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Emits each snapshot as one structured JSON log line.
#[derive(Debug, Default)]
pub struct LogSink;

impl SnapshotSink for LogSink {
    async fn publish(&mut self, snapshot: &Snapshot) -> Result<()> {
        let body = serde_json::to_string(snapshot).context("serialize snapshot")?;
        info!(
            taken_at = %snapshot.taken_at,
            pods = snapshot.placements.len(),
            degraded = snapshot.is_degraded(),
            snapshot = %body,
            "snapshot published"
        );
        Ok(())
    }
}

/// Keeps the most recent snapshots in memory, dropping the oldest past
/// `capacity`. Used by tests and by embedders that poll state out-of-band.
#[derive(Debug)]
pub struct MemorySink {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl SnapshotSink for MemorySink {
    async fn publish(&mut self, snapshot: &Snapshot) -> Result<()> {
        while self.snapshots.len() >= self.capacity.max(1) {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot.clone());
        Ok(())
    }
}
