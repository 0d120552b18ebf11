//! Error types for the ignition engine.
//!
//! Two layers:
//!
//! - [`AnalyzerError`] - per-analyzer failures. These never cross the cycle
//!   boundary; the engine absorbs them and arbitrates over whatever is left.
//! - [`IgnitionError`] - cycle-level and configuration failures, surfaced to
//!   the caller unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single analyzer call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalyzerError {
    /// Network, HTTP or timeout failure reaching the inference service.
    #[error("transport error in analyzer '{analyzer}': {message}")]
    Transport { analyzer: String, message: String },

    /// The remote reply could not be turned into a judgment.
    #[error("malformed response from analyzer '{analyzer}': {message}")]
    MalformedResponse { analyzer: String, message: String },
}

impl AnalyzerError {
    /// Build a transport error.
    pub fn transport(analyzer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            analyzer: analyzer.into(),
            message: message.into(),
        }
    }

    /// Build a malformed-response error.
    pub fn malformed(analyzer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            analyzer: analyzer.into(),
            message: message.into(),
        }
    }

    /// Identifier of the analyzer that failed.
    pub fn analyzer(&self) -> &str {
        match self {
            Self::Transport { analyzer, .. } | Self::MalformedResponse { analyzer, .. } => analyzer,
        }
    }

    /// Re-attribute the error to another analyzer id.
    ///
    /// Transports do not know which persona they serve; the persona stamps
    /// its own id onto whatever the transport returned.
    pub fn attributed_to(self, analyzer: impl Into<String>) -> Self {
        let analyzer = analyzer.into();
        match self {
            Self::Transport { message, .. } => Self::Transport { analyzer, message },
            Self::MalformedResponse { message, .. } => Self::MalformedResponse { analyzer, message },
        }
    }

    /// Whether this is a parse-level failure.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. })
    }
}

/// Why an analyzer contributed nothing to a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dropout {
    /// Analyzer identifier.
    pub analyzer: String,
    /// Human-readable reason (error message or validation failure).
    pub reason: String,
}

impl std::fmt::Display for Dropout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.analyzer, self.reason)
    }
}

/// Cycle-level and configuration errors.
#[derive(Debug, Error)]
pub enum IgnitionError {
    /// Every analyzer failed or produced an invalid judgment.
    #[error("no viable judgment: {}", format_dropouts(.dropouts))]
    NoViableJudgment { dropouts: Vec<Dropout> },

    /// The engine or a loop was configured in a way that cannot run.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The cycle was cancelled before its broadcast.
    #[error("cycle cancelled before broadcast")]
    Cancelled,

    /// A cycle failed while running the autonomous loop.
    #[error("cycle {cycle} failed: {source}")]
    CycleFailed {
        cycle: u64,
        #[source]
        source: Box<IgnitionError>,
    },
}

impl IgnitionError {
    /// Shorthand for [`IgnitionError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

fn format_dropouts(dropouts: &[Dropout]) -> String {
    if dropouts.is_empty() {
        return "no analyzers responded".to_string();
    }
    dropouts
        .iter()
        .map(Dropout::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias used across the engine.
pub type Result<T, E = IgnitionError> = std::result::Result<T, E>;
