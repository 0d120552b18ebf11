//! Personas: analyzers as data.
//!
//! A [`Persona`] is a configuration record: identifier, system framing and
//! target model. [`PersonaAnalyzer`] is the one execution path that turns
//! any persona into an [`Analyzer`]: build the prompt, call the transport,
//! parse the reply into a [`Judgment`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Analyzer;
use crate::error::AnalyzerError;
use crate::judgment::{Judgment, JudgmentClock};
use crate::stimulus::Stimulus;
use crate::transport::{InferenceRequest, InferenceTransport};
use crate::workspace::WorkspaceEntry;

/// Configuration of one specialised analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Stable identifier; becomes the judgment source.
    pub id: String,
    /// Name used inside prompts.
    pub display_name: String,
    /// System framing encoding the persona's cognitive bias.
    pub system_prompt: String,
    /// Target model. Falls back to the transport's text or vision model.
    #[serde(default)]
    pub model: Option<String>,
    /// Whether the persona receives visual content.
    #[serde(default)]
    pub vision: bool,
    /// Sampling temperature override.
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl Persona {
    /// A text persona with no model override.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            system_prompt: system_prompt.into(),
            model: None,
            vision: false,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    /// Check the record can be registered.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("persona id cannot be empty".to_string());
        }
        if self.system_prompt.trim().is_empty() {
            return Err(format!("persona '{}' has an empty system prompt", self.id));
        }
        Ok(())
    }

    /// Build the user prompt for `stimulus` given the workspace context.
    pub fn build_prompt(&self, stimulus: &Stimulus, context: Option<&WorkspaceEntry>) -> String {
        let mut prompt = format!(
            "Analyse the following stimulus through your cognitive specialty ({}).\n\n",
            self.display_name
        );

        if let Some(entry) = context {
            prompt.push_str(&format!(
                "WORKSPACE CONTEXT (cycle {}, broadcast by {} at priority {}): \"{}\"\n\n",
                entry.cycle,
                entry.winner.source(),
                entry.winner.priority(),
                entry.winner.content()
            ));
            if let Some(report) = &entry.monitor {
                prompt.push_str(&format!(
                    "MONITOR FEEDBACK (certainty {}%): \"{}\"\nAddress this feedback in your analysis.\n\n",
                    report.certainty, report.feedback
                ));
            }
        }

        match (stimulus, self.vision) {
            (Stimulus::Media { caption, .. }, true) => {
                prompt.push_str("Stimulus: the attached image");
                if let Some(caption) = caption {
                    prompt.push_str(&format!(", captioned \"{}\"", caption));
                }
                prompt.push_str(".\n\n");
            }
            _ => prompt.push_str(&format!("Stimulus: \"{}\"\n\n", stimulus.as_text())),
        }

        prompt.push_str(&format!(
            "Respond ONLY with a valid JSON object containing exactly these keys:\n\
             \x20 - \"priority\": an integer from 0 (irrelevant) to 10 (critical)\n\
             \x20 - \"analysis\": your detailed analysis as {}\n\
             \x20 - \"module_name\": \"{}\"\n",
            self.display_name, self.display_name
        ));
        prompt
    }
}

/// The five built-in personas, in default registration order.
pub fn builtin_personas() -> Vec<Persona> {
    vec![
        Persona::new(
            "vision",
            "Vision",
            "You are the VISION module, an unconscious processor grounding cognition in \
             sensory reality. Report what is physically present: objects, characters and \
             digits, colours, surfaces, lighting and shadows, overall scene. Be factual; do \
             not interpret intent. Respond ONLY with a valid JSON object, no surrounding text.",
        )
        .with_vision(true),
        Persona::new(
            "geometry",
            "Geometry",
            "You are the GEOMETRY module, an unconscious processor specialised in spatial and \
             geometric coherence. You attend to positions, distances, shapes, topology and \
             number. You flag spatial contradictions such as an object in two places or \
             incompatible directions. Respond ONLY with a valid JSON object, no surrounding text.",
        ),
        Persona::new(
            "linguistics",
            "Linguistics",
            "You are the LINGUISTICS module, an unconscious processor specialised in syntax and \
             linguistic structure. You attend to grammar, morphology and ambiguity. You check \
             referential grounding: when the text names an object that the visual context does \
             not contain, report a REFERENTIAL AMBIGUITY naming the missing object. Respond ONLY \
             with a valid JSON object, no surrounding text.",
        ),
        Persona::new(
            "social",
            "Social",
            "You are the SOCIAL module, an unconscious processor specialised in social and \
             emotional reading. You attend to who addresses whom, power relations, underlying \
             emotions, mental states of agents, register and politeness. Respond ONLY with a \
             valid JSON object, no surrounding text.",
        ),
        Persona::new(
            "pragmatics",
            "Pragmatics",
            "You are the PRAGMATICS module, an unconscious processor specialised in intention \
             and context. You attend to what is really meant: implicature, irony, indirect \
             speech acts, and whether what is said makes sense in the situation. Respond ONLY \
             with a valid JSON object, no surrounding text.",
        ),
    ]
}

/// Generic call-and-parse analyzer driven by a [`Persona`].
pub struct PersonaAnalyzer {
    persona: Persona,
    model: String,
    transport: Arc<dyn InferenceTransport>,
    clock: JudgmentClock,
}

impl PersonaAnalyzer {
    /// Bind `persona` to `transport`, resolving its model.
    ///
    /// `default_model` is used when the persona names none.
    pub fn new(
        persona: Persona,
        transport: Arc<dyn InferenceTransport>,
        default_model: impl Into<String>,
    ) -> Self {
        let model = persona.model.clone().unwrap_or_else(|| default_model.into());
        Self {
            persona,
            model,
            transport,
            clock: JudgmentClock::new(),
        }
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// The resolved target model.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Debug for PersonaAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersonaAnalyzer")
            .field("id", &self.persona.id)
            .field("model", &self.model)
            .field("vision", &self.persona.vision)
            .finish()
    }
}

#[async_trait]
impl Analyzer for PersonaAnalyzer {
    fn id(&self) -> &str {
        &self.persona.id
    }

    async fn analyze(
        &self,
        stimulus: &Stimulus,
        context: Option<&WorkspaceEntry>,
    ) -> Result<Judgment, AnalyzerError> {
        let mut request = InferenceRequest::new(
            self.model.clone(),
            self.persona.system_prompt.clone(),
            self.persona.build_prompt(stimulus, context),
        )
        .with_temperature(self.persona.temperature);

        if self.persona.vision {
            if let Some(media) = stimulus.media_ref() {
                request = request.with_image(media.clone());
            }
        }

        let reply = self
            .transport
            .complete_json(&request)
            .await
            .map_err(|e| e.attributed_to(&self.persona.id))?;

        let judgment = Judgment::from_response(
            &self.persona.id,
            &reply.object,
            Some(reply.raw),
            self.clock.tick(),
        )?;

        log::info!(
            "{} -> priority {}",
            self.persona.display_name,
            judgment.priority()
        );
        Ok(judgment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stimulus::MediaRef;
    use crate::testing::ScriptedTransport;
    use crate::workspace::WorkspaceEntry;
    use serde_json::json;

    #[test]
    fn test_builtins_are_valid_and_unique() {
        let personas = builtin_personas();
        let ids: Vec<&str> = personas.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["vision", "geometry", "linguistics", "social", "pragmatics"]);
        assert!(personas.iter().all(|p| p.validate().is_ok()));
        assert!(personas[0].vision);
        assert!(personas[1..].iter().all(|p| !p.vision));
    }

    #[test]
    fn test_prompt_includes_context() {
        let persona = Persona::new("geometry", "Geometry", "spatial");
        let entry = WorkspaceEntry::for_test(2, Judgment::new("social", "They are friends.", 7));
        let prompt = persona.build_prompt(&Stimulus::text("The cat is on the mat."), Some(&entry));

        assert!(prompt.contains("(Geometry)"));
        assert!(prompt.contains("cycle 2, broadcast by social at priority 7"));
        assert!(prompt.contains("\"They are friends.\""));
        assert!(prompt.contains("Stimulus: \"The cat is on the mat.\""));
        assert!(prompt.contains("\"module_name\": \"Geometry\""));
    }

    #[test]
    fn test_text_persona_sees_caption_only() {
        let persona = Persona::new("social", "Social", "social");
        let stimulus = Stimulus::media(MediaRef::url("https://x/y.png"), Some("two people".into()));
        let prompt = persona.build_prompt(&stimulus, None);
        assert!(prompt.contains("Stimulus: \"two people\""));
        assert!(!prompt.contains("WORKSPACE CONTEXT"));
    }

    #[tokio::test]
    async fn test_analyze_parses_reply() {
        let transport = Arc::new(ScriptedTransport::replying(json!({
            "priority": 6,
            "analysis": "Cat above mat.",
            "module_name": "Geometry"
        })));
        let analyzer = PersonaAnalyzer::new(
            Persona::new("geometry", "Geometry", "spatial"),
            transport.clone(),
            "default-model",
        );

        let judgment = analyzer
            .analyze(&Stimulus::text("The cat is on the mat."), None)
            .await
            .unwrap();
        assert_eq!(judgment.source(), "geometry");
        assert_eq!(judgment.priority(), 6);
        assert_eq!(judgment.content(), "Cat above mat.");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "default-model");
        assert!(requests[0].image.is_none());
    }

    #[tokio::test]
    async fn test_vision_persona_attaches_media() {
        let transport = Arc::new(ScriptedTransport::replying(json!({
            "priority": 9,
            "analysis": "A red digit 1 on grey concrete."
        })));
        let persona = builtin_personas().remove(0).with_model("vision-model");
        let analyzer = PersonaAnalyzer::new(persona, transport.clone(), "unused");

        let media = MediaRef::url("https://x/one.jpg");
        analyzer
            .analyze(&Stimulus::media(media.clone(), None), None)
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].model, "vision-model");
        assert_eq!(requests[0].image.as_ref(), Some(&media));
    }

    #[tokio::test]
    async fn test_errors_are_attributed_to_persona() {
        let transport = Arc::new(ScriptedTransport::failing(AnalyzerError::transport(
            "openai-compatible",
            "connection refused",
        )));
        let analyzer = PersonaAnalyzer::new(
            Persona::new("social", "Social", "social"),
            transport,
            "m",
        );
        let err = analyzer.analyze(&Stimulus::text("hi"), None).await.unwrap_err();
        assert_eq!(err.analyzer(), "social");

        let transport = Arc::new(ScriptedTransport::replying(json!({"analysis": "no score"})));
        let analyzer = PersonaAnalyzer::new(
            Persona::new("social", "Social", "social"),
            transport,
            "m",
        );
        let err = analyzer.analyze(&Stimulus::text("hi"), None).await.unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(err.analyzer(), "social");
    }

    #[tokio::test]
    async fn test_timestamps_increase_per_analyzer() {
        let transport = Arc::new(ScriptedTransport::replying(json!({
            "priority": 1,
            "analysis": "x"
        })));
        let analyzer = PersonaAnalyzer::new(Persona::new("a", "A", "a"), transport, "m");
        let first = analyzer.analyze(&Stimulus::text("1"), None).await.unwrap();
        let second = analyzer.analyze(&Stimulus::text("2"), None).await.unwrap();
        assert!(second.timestamp() > first.timestamp());
    }
}
