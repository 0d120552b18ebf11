//! Analyzer capability.
//!
//! The engine is written against the [`Analyzer`] trait only. Concrete
//! analyzers differ in configuration, not in code: one generic
//! [`PersonaAnalyzer`] interprets any number of [`Persona`] records.
//!
//! - [`persona`] - persona records, built-in personas, the call-and-parse path
//! - [`registry`] - ordered persona registry with YAML loading

pub mod persona;
pub mod registry;

use std::fmt;

use async_trait::async_trait;

use crate::error::AnalyzerError;
use crate::judgment::Judgment;
use crate::stimulus::Stimulus;
use crate::workspace::WorkspaceEntry;

pub use persona::{builtin_personas, Persona, PersonaAnalyzer};
pub use registry::PersonaRegistry;

/// A specialised processor that judges a stimulus.
///
/// Implementations may suspend on a remote call. They must not observe
/// other analyzers' in-flight results: the only shared input is the
/// workspace snapshot taken at cycle start.
#[async_trait]
pub trait Analyzer: Send + Sync + fmt::Debug {
    /// Stable identifier. Judgments must carry it as their `source`;
    /// arbitration drops judgments attributed to anyone else.
    fn id(&self) -> &str;

    /// Judge `stimulus` given the workspace's current entry, if any.
    async fn analyze(
        &self,
        stimulus: &Stimulus,
        context: Option<&WorkspaceEntry>,
    ) -> Result<Judgment, AnalyzerError>;
}
