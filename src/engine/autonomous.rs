//! Autonomous loop: repeated cycles with winner re-injection.
//!
//! Cycle 0 runs on the initial stimulus. Every later cycle runs on the
//! previous winner's content, verbatim. There is no convergence guarantee;
//! the loop may oscillate, which is why every run needs an explicit bound.

use std::fmt;

use super::cancel::CancelToken;
use super::IgnitionEngine;
use crate::config::EngineConfig;
use crate::error::{IgnitionError, Result};
use crate::stimulus::Stimulus;
use crate::workspace::{GlobalWorkspace, WorkspaceSnapshot};

/// Predicate over the workspace, evaluated after each broadcast.
pub struct StopPredicate {
    check: Box<dyn Fn(&GlobalWorkspace) -> bool + Send + Sync>,
    label: String,
}

impl StopPredicate {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&GlobalWorkspace) -> bool + Send + Sync + 'static,
    {
        Self {
            check: Box::new(check),
            label: "custom".to_string(),
        }
    }

    /// Stop once the current entry's monitor certainty reaches `target`.
    ///
    /// Entries without a monitor report never satisfy it.
    pub fn certainty_at_least(target: u8) -> Self {
        Self {
            check: Box::new(move |workspace: &GlobalWorkspace| {
                workspace
                    .current()
                    .and_then(|entry| entry.monitor.as_ref())
                    .map_or(false, |report| report.certainty >= target)
            }),
            label: format!("certainty >= {}%", target),
        }
    }

    pub fn should_stop(&self, workspace: &GlobalWorkspace) -> bool {
        (self.check)(workspace)
    }
}

impl fmt::Debug for StopPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StopPredicate").field(&self.label).finish()
    }
}

/// Termination contract for [`IgnitionEngine::run`].
///
/// At least one of the three must be set.
#[derive(Debug, Default)]
pub struct LoopBounds {
    pub max_cycles: Option<usize>,
    pub stop_when: Option<StopPredicate>,
    pub cancel: Option<CancelToken>,
}

impl LoopBounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds from configuration: `max_cycles` and `target_certainty`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_cycles: config.max_cycles,
            stop_when: config.target_certainty.map(StopPredicate::certainty_at_least),
            cancel: None,
        }
    }

    pub fn max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = Some(max_cycles);
        self
    }

    pub fn stop_when(mut self, predicate: StopPredicate) -> Self {
        self.stop_when = Some(predicate);
        self
    }

    pub fn cancel_on(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_cycles.is_none() && self.stop_when.is_none() && self.cancel.is_none() {
            return Err(IgnitionError::config(
                "an autonomous run needs max_cycles, a stop predicate or a cancel token",
            ));
        }
        if self.max_cycles == Some(0) {
            return Err(IgnitionError::config("max_cycles must be at least 1"));
        }
        Ok(())
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxCycles,
    Predicate,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxCycles => write!(f, "cycle limit reached"),
            Self::Predicate => write!(f, "stop condition met"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Cycles broadcast by this run.
    pub cycles_run: usize,
    pub stop_reason: StopReason,
    /// Workspace state when the run ended.
    pub workspace: WorkspaceSnapshot,
}

impl IgnitionEngine {
    /// Run cycles until a bound in `bounds` is hit.
    ///
    /// Cancellation, between cycles or mid-cycle, ends the run normally with
    /// [`StopReason::Cancelled`]; the in-flight cycle is not broadcast. Any
    /// other cycle failure aborts the run with [`IgnitionError::CycleFailed`].
    pub async fn run(&mut self, initial: impl Into<Stimulus>, bounds: LoopBounds) -> Result<RunSummary> {
        bounds.validate()?;

        let mut stimulus = initial.into();
        let mut cycles_run = 0usize;

        let stop_reason = loop {
            if bounds.max_cycles.map_or(false, |max| cycles_run >= max) {
                break StopReason::MaxCycles;
            }
            if bounds.cancel.as_ref().map_or(false, CancelToken::is_cancelled) {
                break StopReason::Cancelled;
            }

            let index = self.cycles_completed();
            let entry = match self.cycle(stimulus, bounds.cancel.as_ref()).await {
                Ok(entry) => entry,
                Err(IgnitionError::Cancelled) => break StopReason::Cancelled,
                Err(source) => {
                    log::error!("autonomous run aborted at cycle {}: {}", index, source);
                    return Err(IgnitionError::CycleFailed {
                        cycle: index,
                        source: Box::new(source),
                    });
                }
            };
            cycles_run += 1;

            if let Some(predicate) = &bounds.stop_when {
                if predicate.should_stop(self.workspace()) {
                    log::info!("stop condition {:?} met after cycle {}", predicate, index);
                    break StopReason::Predicate;
                }
            }

            stimulus = Stimulus::text(entry.winner.content());
        };

        log::info!("autonomous run finished after {} cycles: {}", cycles_run, stop_reason);
        Ok(RunSummary {
            cycles_run,
            stop_reason,
            workspace: self.workspace().snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::Analyzer;
    use crate::monitor::MonitorReport;
    use crate::testing::{ScriptedAnalyzer, ScriptedMonitor};
    use std::sync::Arc;
    use std::time::Duration;

    fn echo_engine() -> IgnitionEngine {
        IgnitionEngine::new(
            vec![
                Arc::new(ScriptedAnalyzer::echoing("low", 2, "low")) as Arc<dyn Analyzer>,
                Arc::new(ScriptedAnalyzer::echoing("high", 6, "refined")),
            ],
            16,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_three_cycles_reinject_winner() {
        let mut engine = echo_engine();
        let summary = engine
            .run("The cat is on the mat.", LoopBounds::new().max_cycles(3))
            .await
            .unwrap();

        assert_eq!(summary.cycles_run, 3);
        assert_eq!(summary.stop_reason, StopReason::MaxCycles);

        let history = summary.workspace.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].stimulus, Stimulus::text("The cat is on the mat."));
        for k in 0..2 {
            assert_eq!(history[k].cycle, k as u64);
            assert_eq!(
                history[k + 1].stimulus,
                Stimulus::text(history[k].winner.content())
            );
        }
        assert_eq!(
            summary.workspace.current().unwrap().winner.content(),
            "refined: refined: refined: The cat is on the mat."
        );
    }

    #[tokio::test]
    async fn test_unbounded_run_rejected_before_any_call() {
        let analyzer = Arc::new(ScriptedAnalyzer::judging("a", 5, "x"));
        let mut engine = IgnitionEngine::new(vec![analyzer.clone()], 4).unwrap();

        let err = engine.run("x", LoopBounds::new()).await.unwrap_err();
        assert!(matches!(err, IgnitionError::Configuration(_)));
        let err = engine.run("x", LoopBounds::new().max_cycles(0)).await.unwrap_err();
        assert!(matches!(err, IgnitionError::Configuration(_)));
        assert_eq!(analyzer.calls(), 0);
    }

    #[tokio::test]
    async fn test_predicate_stops_after_broadcast() {
        let mut engine = echo_engine();
        let bounds = LoopBounds::new()
            .max_cycles(10)
            .stop_when(StopPredicate::new(|ws| ws.len() >= 2));
        let summary = engine.run("go", bounds).await.unwrap();
        assert_eq!(summary.cycles_run, 2);
        assert_eq!(summary.stop_reason, StopReason::Predicate);
    }

    #[tokio::test]
    async fn test_certainty_target_stops_first_cycle() {
        let mut engine = IgnitionEngine::builder()
            .analyzer(Arc::new(ScriptedAnalyzer::judging("a", 5, "x")))
            .monitor(Arc::new(ScriptedMonitor::reporting(MonitorReport {
                certainty: 95,
                feedback: "clear".into(),
                conflict_detected: false,
            })))
            .build()
            .unwrap();
        let bounds = LoopBounds::from_config(&EngineConfig {
            max_cycles: Some(5),
            target_certainty: Some(90),
            ..EngineConfig::default()
        });
        let summary = engine.run("x", bounds).await.unwrap();
        assert_eq!(summary.cycles_run, 1);
        assert_eq!(summary.stop_reason, StopReason::Predicate);
    }

    #[tokio::test]
    async fn test_cycle_failure_reports_index() {
        let mut engine = IgnitionEngine::new(
            vec![Arc::new(ScriptedAnalyzer::judging("a", 5, "x").failing_after(2)) as Arc<dyn Analyzer>],
            8,
        )
        .unwrap();
        let err = engine
            .run("x", LoopBounds::new().max_cycles(5))
            .await
            .unwrap_err();
        match err {
            IgnitionError::CycleFailed { cycle, source } => {
                assert_eq!(cycle, 2);
                assert!(matches!(*source, IgnitionError::NoViableJudgment { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(engine.workspace().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_only_run_stops_mid_cycle() {
        let analyzer = Arc::new(
            ScriptedAnalyzer::judging("a", 5, "x").with_delay(Duration::from_secs(10)),
        );
        let mut engine = IgnitionEngine::new(vec![analyzer.clone()], 8).unwrap();

        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            // Two full cycles, then cancel inside the third.
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });

        let summary = engine.run("x", LoopBounds::new().cancel_on(token)).await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert_eq!(summary.cycles_run, 2);
        assert_eq!(engine.workspace().len(), 2);
        assert_eq!(analyzer.calls(), 3);
    }
}
