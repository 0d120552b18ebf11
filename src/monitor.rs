//! Metacognitive monitor.
//!
//! A monitor does not look at the stimulus itself; it reviews how the
//! analyzers reacted to it and reports consensus or conflict. Its report is
//! attached to the cycle's workspace entry and can drive loop termination
//! ([`StopPredicate::certainty_at_least`](crate::engine::StopPredicate::certainty_at_least)).
//!
//! Monitor failures never fail a cycle; the entry simply carries no report.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;
use crate::judgment::{coerce_priority, Judgment};
use crate::stimulus::Stimulus;
use crate::transport::{InferenceRequest, InferenceTransport};

const MONITOR_ID: &str = "monitor";

const MONITOR_SYSTEM_PROMPT: &str = "You are the system's metacognitive MONITOR. You do not look \
at the outside world; you evaluate the internal COHERENCE of the other modules' answers.\n\
DECISION RULES:\n\
1. CONSENSUS vs CONFLICT: do the modules agree?\n\
2. REFERENTIAL FAILURE (critical): if a module reports a REFERENTIAL AMBIGUITY (it looks for an \
object that vision did not report), this is a FOCUS ERROR. Your feedback MUST then be an explicit \
order: 'FOCUS ERROR: Vision, look specifically for [missing objects].'\n\
Respond ONLY with a valid JSON object with keys: \"certainty\" (integer 0-100), \"feedback\" \
(string), \"conflict_detected\" (boolean).";

/// Outcome of a coherence review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorReport {
    /// Confidence in the cycle's overall reading, 0-100.
    pub certainty: u8,
    /// Analysis or instruction for the next cycle.
    pub feedback: String,
    /// Whether the modules disagree.
    pub conflict_detected: bool,
}

/// Reviews a cycle's validated judgments after arbitration.
#[async_trait]
pub trait Monitor: Send + Sync + fmt::Debug {
    async fn review(
        &self,
        stimulus: &Stimulus,
        judgments: &[Judgment],
        winner: &Judgment,
    ) -> Result<MonitorReport, AnalyzerError>;
}

/// Monitor backed by an inference transport.
#[derive(Debug)]
pub struct LlmMonitor {
    transport: Arc<dyn InferenceTransport>,
    model: String,
    system_prompt: String,
}

impl LlmMonitor {
    pub fn new(transport: Arc<dyn InferenceTransport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            system_prompt: MONITOR_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replace the default monitor framing.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    fn build_prompt(stimulus: &Stimulus, judgments: &[Judgment], winner: &Judgment) -> String {
        let mut summary = String::from("MODULE RESULTS:\n");
        for judgment in judgments {
            summary.push_str(&format!(
                "- {}: priority {}/10. Analysis: {}\n",
                judgment.source(),
                judgment.priority(),
                judgment.content()
            ));
        }
        format!(
            "Stimulus: \"{}\"\n\n{}\nIgnition winner: {}.\n\n\
             Evaluate the coherence. Is there consensus or conflict?\n\
             Respond in strict JSON.",
            stimulus.as_text(),
            summary,
            winner.source()
        )
    }
}

#[async_trait]
impl Monitor for LlmMonitor {
    async fn review(
        &self,
        stimulus: &Stimulus,
        judgments: &[Judgment],
        winner: &Judgment,
    ) -> Result<MonitorReport, AnalyzerError> {
        let request = InferenceRequest::new(
            self.model.clone(),
            self.system_prompt.clone(),
            Self::build_prompt(stimulus, judgments, winner),
        );
        let reply = self
            .transport
            .complete_json(&request)
            .await
            .map_err(|e| e.attributed_to(MONITOR_ID))?;

        let certainty = reply
            .object
            .get("certainty")
            .and_then(coerce_priority)
            .ok_or_else(|| AnalyzerError::malformed(MONITOR_ID, "missing or non-integer 'certainty'"))?;
        let certainty = u8::try_from(certainty)
            .ok()
            .filter(|c| *c <= 100)
            .ok_or_else(|| {
                AnalyzerError::malformed(MONITOR_ID, format!("certainty {} outside [0, 100]", certainty))
            })?;

        let feedback = reply
            .object
            .get("feedback")
            .or_else(|| reply.object.get("analysis"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| AnalyzerError::malformed(MONITOR_ID, "missing 'feedback'"))?
            .to_string();

        let conflict_detected = reply
            .object
            .get("conflict_detected")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        Ok(MonitorReport {
            certainty,
            feedback,
            conflict_detected,
        })
    }
}
