//! # Ignition
//!
//! A global-workspace cognitive engine. A fixed, ordered set of specialised
//! analyzers ("unconscious" processors) judge the same stimulus concurrently;
//! the engine arbitrates their scored judgments, broadcasts the winner into a
//! shared workspace, and can loop by re-injecting the winner as the next
//! stimulus.
//!
//! Analyzers are data: each [`Persona`] is a system framing plus a target
//! model, executed by one generic call-and-parse path over an
//! OpenAI-compatible [`InferenceTransport`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use ignition::{
//!     IgnitionEngine, LoopBounds, OpenAICompatibleTransport, PersonaRegistry, TransportConfig,
//! };
//!
//! # async fn demo() -> Result<(), ignition::IgnitionError> {
//! let config = TransportConfig::from_env()?;
//! let transport = Arc::new(OpenAICompatibleTransport::from_config(&config)?);
//! let analyzers = PersonaRegistry::with_builtins().build_analyzers(transport, &config);
//!
//! let mut engine = IgnitionEngine::new(analyzers, 64)?;
//! let summary = engine
//!     .run("The cat is on the mat.", LoopBounds::new().max_cycles(3))
//!     .await?;
//! println!("{}", summary.workspace.summary());
//! # Ok(())
//! # }
//! ```

pub mod analyzers;
pub mod config;
pub mod engine;
pub mod error;
pub mod judgment;
pub mod monitor;
pub mod stimulus;
pub mod transport;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use analyzers::{builtin_personas, Analyzer, Persona, PersonaAnalyzer, PersonaRegistry};
pub use config::{EngineConfig, IgnitionConfig, TransportConfig};
pub use engine::{
    CancelToken, EngineBuilder, IgnitionEngine, LoopBounds, RunSummary, StopPredicate, StopReason,
};
pub use error::{AnalyzerError, Dropout, IgnitionError};
pub use judgment::Judgment;
pub use monitor::{LlmMonitor, Monitor, MonitorReport};
pub use stimulus::{MediaRef, Stimulus};
pub use transport::{InferenceRequest, InferenceTransport, OpenAICompatibleTransport, TransportReply};
pub use workspace::{GlobalWorkspace, WorkspaceEntry, WorkspaceReader, WorkspaceSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
