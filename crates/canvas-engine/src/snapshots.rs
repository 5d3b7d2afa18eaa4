//! Snapshot queue
//!
//! Decides when the engine keeps a full copy of its replay state and holds
//! the most recent copies. Playback seeks backwards by restarting from the
//! nearest snapshot instead of from the start of the recording.

use std::collections::VecDeque;

use tessera_config::SnapshotConfig;
use tracing::debug;

/// A kept copy of replay state.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    /// Number of messages applied when the snapshot was taken.
    pub position: u64,
    pub time_ms: u64,
    pub state: T,
}

#[derive(Debug, Clone)]
pub struct SnapshotQueue<T> {
    config: SnapshotConfig,
    since_last: u64,
    last_time_ms: Option<u64>,
    snapshots: VecDeque<Snapshot<T>>,
}

impl<T: Clone> SnapshotQueue<T> {
    pub fn new(config: SnapshotConfig) -> Self {
        Self {
            config,
            since_last: 0,
            last_time_ms: None,
            snapshots: VecDeque::new(),
        }
    }

    /// Count one applied message toward the next snapshot.
    #[inline]
    pub fn message_applied(&mut self) {
        self.since_last += 1;
    }

    /// Whether enough messages and enough time have passed for a new snapshot.
    pub fn is_due(&self, now_ms: u64) -> bool {
        if self.config.max_count == 0 || self.since_last < self.config.message_interval.max(1) {
            return false;
        }
        match self.last_time_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.config.min_delay_ms,
            None => true,
        }
    }

    /// Keep `state` as the snapshot at `position`, dropping the oldest past the limit.
    ///
    /// Snapshots stay sorted by position; any snapshot at or after
    /// `position` is replaced.
    pub fn push(&mut self, position: u64, now_ms: u64, state: T) {
        while self.snapshots.back().is_some_and(|s| s.position >= position) {
            self.snapshots.pop_back();
        }
        self.snapshots.push_back(Snapshot {
            position,
            time_ms: now_ms,
            state,
        });
        while self.snapshots.len() > self.config.max_count {
            self.snapshots.pop_front();
        }
        self.since_last = 0;
        self.last_time_ms = Some(now_ms);
        debug!("Snapshot at message {} ({} kept)", position, self.snapshots.len());
    }

    /// Latest snapshot taken at or before `position`.
    pub fn nearest_before(&self, position: u64) -> Option<&Snapshot<T>> {
        self.snapshots.iter().rev().find(|s| s.position <= position)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot<T>> {
        self.snapshots.iter()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.since_last = 0;
        self.last_time_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> SnapshotQueue<u32> {
        SnapshotQueue::new(SnapshotConfig {
            max_count: 2,
            min_delay_ms: 100,
            message_interval: 3,
        })
    }

    #[test]
    fn test_due_after_interval_and_delay() {
        let mut q = queue();
        assert!(!q.is_due(0));
        for _ in 0..3 {
            q.message_applied();
        }
        assert!(q.is_due(0));
        q.push(3, 0, 1);
        for _ in 0..3 {
            q.message_applied();
        }
        assert!(!q.is_due(50));
        assert!(q.is_due(100));
    }

    #[test]
    fn test_capacity_and_nearest() {
        let mut q = queue();
        q.push(10, 0, 1);
        q.push(20, 0, 2);
        q.push(30, 0, 3);
        assert_eq!(q.len(), 2);
        assert!(q.nearest_before(15).is_none());
        assert_eq!(q.nearest_before(25).map(|s| s.state), Some(2));
        assert_eq!(q.nearest_before(99).map(|s| s.state), Some(3));
    }

    #[test]
    fn test_push_replaces_later_snapshots() {
        let mut q = queue();
        q.push(10, 0, 1);
        q.push(20, 0, 2);
        q.push(15, 0, 9);
        assert_eq!(q.iter().map(|s| s.position).collect::<Vec<_>>(), vec![10, 15]);
    }
}
