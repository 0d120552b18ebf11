//! Ignition engine: fan-out, arbitration and broadcast.
//!
//! One cycle:
//!
//! 1. **Fan-out**: every registered analyzer receives the same stimulus and
//!    the same workspace context (the entry current at cycle start).
//! 2. **Collection**: all calls are awaited to completion; failures are
//!    recorded as dropouts rather than aborting the cycle.
//! 3. **Arbitration**: see [`arbitration::arbitrate`].
//! 4. **Review**: an optional [`Monitor`] comments on the outcome.
//! 5. **Broadcast**: the entry is committed to the [`GlobalWorkspace`].
//!
//! Nothing is written before step 5, so a failed or cancelled cycle leaves
//! the workspace exactly as it was.
//!
//! - [`arbitration`] - winner selection
//! - [`cancel`] - cooperative cancellation token
//! - [`autonomous`] - the re-injection loop

pub mod arbitration;
pub mod autonomous;
pub mod cancel;

pub use arbitration::{arbitrate, Arbitration};
pub use autonomous::{LoopBounds, RunSummary, StopPredicate, StopReason};
pub use cancel::CancelToken;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use uuid::Uuid;

use crate::analyzers::Analyzer;
use crate::config::EngineConfig;
use crate::error::{AnalyzerError, IgnitionError, Result};
use crate::judgment::Judgment;
use crate::monitor::Monitor;
use crate::stimulus::Stimulus;
use crate::workspace::{GlobalWorkspace, WorkspaceEntry, WorkspaceReader};

/// Default workspace history length.
pub const DEFAULT_HISTORY_BOUND: usize = 64;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`IgnitionEngine`].
///
/// Analyzer order is registration order, which is the tie-break order.
#[derive(Debug)]
pub struct EngineBuilder {
    analyzers: Vec<Arc<dyn Analyzer>>,
    monitor: Option<Arc<dyn Monitor>>,
    history_bound: usize,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            analyzers: Vec::new(),
            monitor: None,
            history_bound: DEFAULT_HISTORY_BOUND,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-loaded with engine settings from configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new().history_bound(config.history_bound)
    }

    /// Register one analyzer after those already registered.
    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzers.push(analyzer);
        self
    }

    /// Register several analyzers, in iteration order.
    pub fn analyzers(mut self, analyzers: impl IntoIterator<Item = Arc<dyn Analyzer>>) -> Self {
        self.analyzers.extend(analyzers);
        self
    }

    pub fn monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn history_bound(mut self, bound: usize) -> Self {
        self.history_bound = bound;
        self
    }

    /// Validate and build the engine.
    ///
    /// Fails on an empty analyzer set, duplicate analyzer ids or a zero
    /// history bound.
    pub fn build(self) -> Result<IgnitionEngine> {
        if self.analyzers.is_empty() {
            return Err(IgnitionError::config(
                "an ignition engine needs at least one analyzer",
            ));
        }
        let mut seen = HashSet::new();
        for analyzer in &self.analyzers {
            if !seen.insert(analyzer.id()) {
                return Err(IgnitionError::config(format!(
                    "duplicate analyzer id '{}'",
                    analyzer.id()
                )));
            }
        }
        let workspace = GlobalWorkspace::new(self.history_bound)?;
        let session_id = Uuid::new_v4();

        log::debug!(
            "ignition session {} ready: analyzers [{}], history bound {}, monitor {}",
            session_id,
            self.analyzers
                .iter()
                .map(|a| a.id())
                .collect::<Vec<_>>()
                .join(", "),
            self.history_bound,
            if self.monitor.is_some() { "on" } else { "off" }
        );

        Ok(IgnitionEngine {
            analyzers: self.analyzers,
            monitor: self.monitor,
            workspace,
            cycles_completed: 0,
            session_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs ignition cycles and owns the workspace they write to.
///
/// All cycle methods take `&mut self`: cycles never overlap, and the engine
/// is the workspace's only writer.
#[derive(Debug)]
pub struct IgnitionEngine {
    analyzers: Vec<Arc<dyn Analyzer>>,
    monitor: Option<Arc<dyn Monitor>>,
    workspace: GlobalWorkspace,
    cycles_completed: u64,
    session_id: Uuid,
}

impl IgnitionEngine {
    /// Engine over `analyzers` (in tie-break order) with no monitor.
    pub fn new(analyzers: Vec<Arc<dyn Analyzer>>, history_bound: usize) -> Result<Self> {
        EngineBuilder::new()
            .analyzers(analyzers)
            .history_bound(history_bound)
            .build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Run one cycle and return the broadcast entry.
    ///
    /// Fails with [`IgnitionError::NoViableJudgment`] when no analyzer
    /// produced a valid judgment; the workspace is then left unchanged.
    pub async fn run_cycle(&mut self, stimulus: impl Into<Stimulus>) -> Result<Arc<WorkspaceEntry>> {
        self.cycle(stimulus.into(), None).await
    }

    /// Like [`run_cycle`](Self::run_cycle), abandoning the cycle when
    /// `cancel` fires before broadcast.
    ///
    /// In-flight analyzer calls are dropped and [`IgnitionError::Cancelled`]
    /// is returned. The workspace is left unchanged.
    pub async fn run_cycle_with_cancel(
        &mut self,
        stimulus: impl Into<Stimulus>,
        cancel: &CancelToken,
    ) -> Result<Arc<WorkspaceEntry>> {
        self.cycle(stimulus.into(), Some(cancel)).await
    }

    pub(crate) async fn cycle(
        &mut self,
        stimulus: Stimulus,
        cancel: Option<&CancelToken>,
    ) -> Result<Arc<WorkspaceEntry>> {
        if cancel.map_or(false, CancelToken::is_cancelled) {
            return Err(IgnitionError::Cancelled);
        }

        let index = self.cycles_completed;
        let context = self.workspace.current().cloned();
        log::debug!(
            "cycle {}: fan-out to {} analyzers on {:?}",
            index,
            self.analyzers.len(),
            stimulus.as_text()
        );

        let outcomes = until_cancelled(self.fan_out(&stimulus, context.as_deref()), cancel)
            .await
            .map_err(|e| {
                log::info!("cycle {} cancelled before join", index);
                e
            })?;

        let Arbitration {
            winner,
            judgments,
            dropouts,
        } = arbitrate(outcomes).map_err(|e| {
            log::error!("cycle {}: {}", index, e);
            e
        })?;
        let winner = judgments[winner].clone();

        let review = match &self.monitor {
            Some(monitor) => {
                until_cancelled(monitor.review(&stimulus, &judgments, &winner), cancel)
                    .await
                    .map_err(|e| {
                        log::info!("cycle {} cancelled during review", index);
                        e
                    })?
                    .map_err(|e| log::warn!("cycle {}: monitor failed: {}", index, e))
                    .ok()
            }
            None => None,
        };

        log::info!(
            "[{}] cycle {} ignition: {} wins at priority {} ({} competing, {} dropped)",
            self.session_id,
            index,
            winner.source(),
            winner.priority(),
            judgments.len(),
            dropouts.len()
        );

        let entry = WorkspaceEntry {
            cycle: index,
            stimulus,
            winner,
            competitors: judgments,
            dropouts,
            monitor: review,
            broadcast_at: Utc::now(),
        };
        let committed = self.workspace.broadcast(entry);
        self.cycles_completed += 1;
        Ok(committed)
    }

    /// Call every analyzer concurrently and collect outcomes in
    /// registration order.
    async fn fan_out(
        &self,
        stimulus: &Stimulus,
        context: Option<&WorkspaceEntry>,
    ) -> Vec<(String, std::result::Result<Judgment, AnalyzerError>)> {
        let calls = self.analyzers.iter().map(|analyzer| async move {
            let outcome = analyzer.analyze(stimulus, context).await;
            (analyzer.id().to_string(), outcome)
        });
        join_all(calls).await
    }

    /// The workspace, for reading.
    pub fn workspace(&self) -> &GlobalWorkspace {
        &self.workspace
    }

    /// Subscribe to snapshots published after every broadcast.
    pub fn subscribe(&self) -> WorkspaceReader {
        self.workspace.subscribe()
    }

    /// Registered analyzers in tie-break order.
    pub fn analyzers(&self) -> &[Arc<dyn Analyzer>] {
        &self.analyzers
    }

    pub fn has_monitor(&self) -> bool {
        self.monitor.is_some()
    }

    /// Identifier of this engine's session, used to correlate log lines.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Number of cycles broadcast so far; also the next cycle's index.
    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }
}

/// Await `future`, giving up early if `cancel` fires.
async fn until_cancelled<F: Future>(future: F, cancel: Option<&CancelToken>) -> Result<F::Output> {
    match cancel {
        None => Ok(future.await),
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(IgnitionError::Cancelled),
            output = future => Ok(output),
        },
    }
}
