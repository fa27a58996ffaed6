//! Snapshot history ring and process resource sampling.

use parking_lot::Mutex;
use sellerbridge_types::{MetricsSnapshot, ResourceUsage};
use std::collections::VecDeque;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Default history depth.
pub const DEFAULT_HISTORY_CAP: usize = 1_000;

/// Bounded ring of metrics snapshots, oldest dropped.
#[derive(Debug)]
pub struct SnapshotHistory {
    ring: Mutex<VecDeque<MetricsSnapshot>>,
    cap: usize,
}

impl SnapshotHistory {
    pub fn new(cap: usize) -> Self {
        Self { ring: Mutex::new(VecDeque::new()), cap: cap.max(1) }
    }

    pub fn push(&self, snapshot: MetricsSnapshot) {
        let mut ring = self.ring.lock();
        if ring.len() >= self.cap {
            ring.pop_front();
        }
        ring.push_back(snapshot);
    }

    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.ring.lock().back().cloned()
    }

    /// Most recent `limit` snapshots, oldest first.
    pub fn list(&self, limit: usize) -> Vec<MetricsSnapshot> {
        let ring = self.ring.lock();
        let skip = ring.len().saturating_sub(limit);
        ring.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }
}

/// Samples this process's memory and CPU usage.
pub struct ResourceSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self { system: Mutex::new(System::new()), pid: sysinfo::get_current_pid().ok() }
    }

    pub fn sample(&self) -> ResourceUsage {
        let Some(pid) = self.pid else {
            return ResourceUsage::default();
        };
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        system.process(pid).map_or_else(ResourceUsage::default, |process| ResourceUsage {
            memory_bytes: process.memory(),
            cpu_percent: process.cpu_usage(),
        })
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}
