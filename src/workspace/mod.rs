//! Global workspace: the engine-owned shared state.
//!
//! The workspace holds the current "conscious content" (the latest
//! broadcast entry) and a bounded FIFO history of earlier entries.
//!
//! # Single Writer
//!
//! Only the ignition engine mutates the workspace, through
//! [`GlobalWorkspace::broadcast`], which takes `&mut self`. Cycles run
//! sequentially, so the borrow checker alone rules out concurrent writes.
//!
//! # Snapshot Reads
//!
//! Readers never observe in-place mutation. Every broadcast publishes an
//! immutable [`WorkspaceSnapshot`] on a `tokio::sync::watch` channel;
//! [`WorkspaceReader`]s see either the pre- or post-cycle snapshot, never a
//! half-written cycle.
//!
//! - [`summary`] - text rendering of snapshots for presentation layers

pub mod summary;

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{Dropout, IgnitionError};
use crate::judgment::Judgment;
use crate::monitor::MonitorReport;
use crate::stimulus::Stimulus;

/// The broadcast unit: one cycle's winner plus everything it competed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    /// Index of the cycle that produced this entry, counted from 0.
    pub cycle: u64,
    /// Stimulus the cycle ran on.
    pub stimulus: Stimulus,
    /// The ignition winner.
    pub winner: Judgment,
    /// Every validated judgment of the cycle, in registration order.
    pub competitors: Vec<Judgment>,
    /// Analyzers that contributed nothing, with reasons.
    #[serde(default)]
    pub dropouts: Vec<Dropout>,
    /// Metacognitive review, when a monitor is configured and succeeded.
    #[serde(default)]
    pub monitor: Option<MonitorReport>,
    /// When the entry was broadcast.
    pub broadcast_at: DateTime<Utc>,
}

impl WorkspaceEntry {
    #[cfg(test)]
    pub(crate) fn for_test(cycle: u64, winner: Judgment) -> Self {
        Self {
            cycle,
            stimulus: Stimulus::text("test"),
            competitors: vec![winner.clone()],
            winner,
            dropouts: Vec::new(),
            monitor: None,
            broadcast_at: Utc::now(),
        }
    }
}

/// Immutable view of the workspace at one point in time.
#[derive(Debug, Clone)]
pub struct WorkspaceSnapshot {
    current: Option<Arc<WorkspaceEntry>>,
    history: Arc<[Arc<WorkspaceEntry>]>,
    bound: usize,
}

impl WorkspaceSnapshot {
    fn empty(bound: usize) -> Self {
        Self {
            current: None,
            history: Arc::from(Vec::new()),
            bound,
        }
    }

    /// The most recent entry, if any cycle has completed.
    pub fn current(&self) -> Option<&Arc<WorkspaceEntry>> {
        self.current.as_ref()
    }

    /// Retained entries, oldest first.
    pub fn history(&self) -> &[Arc<WorkspaceEntry>] {
        &self.history
    }

    /// Maximum history length.
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Whether no cycle has completed yet.
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

/// Subscription to workspace snapshots.
#[derive(Debug, Clone)]
pub struct WorkspaceReader {
    rx: watch::Receiver<WorkspaceSnapshot>,
}

impl WorkspaceReader {
    /// The latest published snapshot.
    pub fn latest(&self) -> WorkspaceSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next broadcast and return its snapshot.
    ///
    /// Returns `None` once the workspace has been dropped.
    pub async fn changed(&mut self) -> Option<WorkspaceSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Engine-owned workspace state.
#[derive(Debug)]
pub struct GlobalWorkspace {
    bound: usize,
    current: Option<Arc<WorkspaceEntry>>,
    history: VecDeque<Arc<WorkspaceEntry>>,
    /// Entries dropped from the front of `history` so far.
    evicted: u64,
    publisher: watch::Sender<WorkspaceSnapshot>,
}

impl GlobalWorkspace {
    /// Create an empty workspace retaining at most `bound` entries.
    pub fn new(bound: usize) -> Result<Self, IgnitionError> {
        if bound == 0 {
            return Err(IgnitionError::config("workspace history bound must be at least 1"));
        }
        let (publisher, _) = watch::channel(WorkspaceSnapshot::empty(bound));
        Ok(Self {
            bound,
            current: None,
            history: VecDeque::with_capacity(bound.min(1024)),
            evicted: 0,
            publisher,
        })
    }

    /// Commit `entry` as the new current content.
    ///
    /// Appends to history, evicting the oldest entry when the bound is
    /// exceeded, then publishes a fresh snapshot to readers.
    pub fn broadcast(&mut self, entry: WorkspaceEntry) -> Arc<WorkspaceEntry> {
        let entry = Arc::new(entry);
        self.history.push_back(Arc::clone(&entry));
        while self.history.len() > self.bound {
            if let Some(old) = self.history.pop_front() {
                self.evicted += 1;
                log::debug!("workspace evicted cycle {}", old.cycle);
            }
        }
        self.current = Some(Arc::clone(&entry));
        self.publisher.send_replace(self.snapshot());
        entry
    }

    /// The most recent entry, if any cycle has completed.
    pub fn current(&self) -> Option<&Arc<WorkspaceEntry>> {
        self.current.as_ref()
    }

    /// Retained entries, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Arc<WorkspaceEntry>> + '_ {
        self.history.iter()
    }

    /// Look up a retained entry by cycle index.
    pub fn entry(&self, cycle: u64) -> Option<&Arc<WorkspaceEntry>> {
        let offset = cycle.checked_sub(self.evicted)?;
        self.history.get(usize::try_from(offset).ok()?)
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Entries evicted so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Immutable view of the current state.
    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            current: self.current.clone(),
            history: self.history.iter().cloned().collect(),
            bound: self.bound,
        }
    }

    /// Subscribe to the snapshots published after each broadcast.
    pub fn subscribe(&self) -> WorkspaceReader {
        WorkspaceReader {
            rx: self.publisher.subscribe(),
        }
    }
}
