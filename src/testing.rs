//! Scripted collaborators for deterministic failure injection in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::analyzers::Analyzer;
use crate::error::AnalyzerError;
use crate::judgment::Judgment;
use crate::monitor::{Monitor, MonitorReport};
use crate::stimulus::Stimulus;
use crate::transport::{InferenceRequest, InferenceTransport, TransportReply};
use crate::workspace::WorkspaceEntry;

#[derive(Debug, Clone)]
enum Script {
    Judge { content: String, priority: i64 },
    Echo { tag: String, priority: i64 },
    Fail,
}

/// Analyzer with a fixed behaviour.
#[derive(Debug)]
pub struct ScriptedAnalyzer {
    id: String,
    script: Script,
    delay: Option<Duration>,
    fail_from: Option<usize>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<Option<u64>>>,
}

impl ScriptedAnalyzer {
    fn with_script(id: &str, script: Script) -> Self {
        Self {
            id: id.to_string(),
            script,
            delay: None,
            fail_from: None,
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Always returns `content` at `priority`. The priority is not checked,
    /// so out-of-range values reach the engine as-is.
    pub fn judging(id: &str, priority: i64, content: &str) -> Self {
        Self::with_script(
            id,
            Script::Judge {
                content: content.to_string(),
                priority,
            },
        )
    }

    /// Returns `"{tag}: {stimulus}"` at `priority`.
    pub fn echoing(id: &str, priority: i64, tag: &str) -> Self {
        Self::with_script(
            id,
            Script::Echo {
                tag: tag.to_string(),
                priority,
            },
        )
    }

    /// Always fails with a transport error.
    pub fn failing(id: &str) -> Self {
        Self::with_script(id, Script::Fail)
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Behave normally for the first `n` calls, then fail.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_from = Some(n);
        self
    }

    /// Number of `analyze` calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Cycle index of the context seen by each call.
    pub fn contexts(&self) -> Vec<Option<u64>> {
        self.contexts.lock().clone()
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn analyze(
        &self,
        stimulus: &Stimulus,
        context: Option<&WorkspaceEntry>,
    ) -> Result<Judgment, AnalyzerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().push(context.map(|entry| entry.cycle));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_from.map_or(false, |n| call >= n) {
            return Err(AnalyzerError::transport(&self.id, "scripted outage"));
        }

        match &self.script {
            Script::Judge { content, priority } => {
                Ok(Judgment::new(&self.id, content.clone(), *priority))
            }
            Script::Echo { tag, priority } => Ok(Judgment::new(
                &self.id,
                format!("{}: {}", tag, stimulus.as_text()),
                *priority,
            )),
            Script::Fail => Err(AnalyzerError::transport(&self.id, "connection refused")),
        }
    }
}

/// Transport that answers every request the same way and records requests.
#[derive(Debug)]
pub struct ScriptedTransport {
    reply: Result<TransportReply, AnalyzerError>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedTransport {
    /// Reply with `object` (which must be a JSON object).
    pub fn replying(object: Value) -> Self {
        let raw = object.to_string();
        let object = object.as_object().cloned().unwrap_or_default();
        Self {
            reply: Ok(TransportReply { object, raw }),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: AnalyzerError) -> Self {
        Self {
            reply: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl InferenceTransport for ScriptedTransport {
    async fn complete_json(&self, request: &InferenceRequest) -> Result<TransportReply, AnalyzerError> {
        self.requests.lock().push(request.clone());
        self.reply.clone()
    }
}

/// Monitor with a fixed report or failure.
#[derive(Debug)]
pub struct ScriptedMonitor {
    report: Option<MonitorReport>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedMonitor {
    pub fn reporting(report: MonitorReport) -> Self {
        Self {
            report: Some(report),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            report: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of reviews started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Monitor for ScriptedMonitor {
    async fn review(
        &self,
        _stimulus: &Stimulus,
        _judgments: &[Judgment],
        _winner: &Judgment,
    ) -> Result<MonitorReport, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.report
            .clone()
            .ok_or_else(|| AnalyzerError::malformed("monitor", "scripted failure"))
    }
}

/// Capture `log` output in test runs; honours `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
