//! Inference transport collaborator.
//!
//! A transport takes a prompt for a given model and returns a JSON object,
//! or fails at the transport or parse level. Retry and JSON-extraction
//! robustness live behind this boundary; analyzers only ever see the two
//! outcomes.
//!
//! - [`extract`] - JSON-object extraction from noisy model output
//! - [`openai`] - OpenAI-compatible chat-completions transport

pub mod extract;
pub mod openai;

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AnalyzerError;
use crate::stimulus::MediaRef;

pub use openai::OpenAICompatibleTransport;

/// One inference request.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    /// Target model identifier.
    pub model: String,
    /// System framing (persona).
    pub system_prompt: String,
    /// User message.
    pub prompt: String,
    /// Visual content to attach, for vision-capable models.
    pub image: Option<MediaRef>,
    /// Sampling temperature override.
    pub temperature: Option<f64>,
}

impl InferenceRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            image: None,
            temperature: None,
        }
    }

    pub fn with_image(mut self, image: MediaRef) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A successfully parsed reply.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportReply {
    /// The JSON object found in the model output.
    pub object: Map<String, Value>,
    /// The model's text before extraction.
    pub raw: String,
}

/// Capability to call a remote inference service.
#[async_trait]
pub trait InferenceTransport: Send + Sync + fmt::Debug {
    /// Send `request` and return the JSON object of the reply.
    ///
    /// Errors are attributed to the transport; callers re-attribute them
    /// to their own analyzer id.
    async fn complete_json(&self, request: &InferenceRequest)
        -> Result<TransportReply, AnalyzerError>;
}
