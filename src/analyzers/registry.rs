//! Persona registry: the ordered set of analyzer configurations.
//!
//! Registration order is significant: it is the engine's tie-break order.
//! The registry loads personas from:
//!
//! 1. Built-in personas (compiled into the binary)
//! 2. YAML files, each holding a single `persona:` or a `personas:` list
//! 3. Programmatic registration
//!
//! Re-registering an existing id replaces the record in place, keeping its
//! original position.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::persona::{builtin_personas, Persona, PersonaAnalyzer};
use super::Analyzer;
use crate::config::TransportConfig;
use crate::error::IgnitionError;
use crate::transport::InferenceTransport;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PersonaFile {
    Single { persona: Persona },
    List { personas: Vec<Persona> },
}

/// Ordered collection of persona records.
#[derive(Debug, Clone, Default)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
}

impl PersonaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in personas.
    pub fn with_builtins() -> Self {
        Self {
            personas: builtin_personas(),
        }
    }

    /// Register a persona, replacing any record with the same id in place.
    pub fn register(&mut self, persona: Persona) -> Result<(), IgnitionError> {
        persona.validate().map_err(IgnitionError::Configuration)?;
        match self.personas.iter_mut().find(|p| p.id == persona.id) {
            Some(existing) => {
                log::debug!("replacing persona '{}'", persona.id);
                *existing = persona;
            }
            None => self.personas.push(persona),
        }
        Ok(())
    }

    /// Remove a persona by id.
    pub fn remove(&mut self, id: &str) -> Option<Persona> {
        let index = self.personas.iter().position(|p| p.id == id)?;
        Some(self.personas.remove(index))
    }

    /// Keep only the personas whose id satisfies `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&Persona) -> bool) {
        self.personas.retain(keep);
    }

    /// Register every persona in a YAML document. Returns how many were read.
    pub fn register_from_yaml(&mut self, yaml: &str) -> Result<usize, IgnitionError> {
        let file: PersonaFile = serde_yaml::from_str(yaml)
            .map_err(|e| IgnitionError::config(format!("invalid persona YAML: {}", e)))?;
        let personas = match file {
            PersonaFile::Single { persona } => vec![persona],
            PersonaFile::List { personas } => personas,
        };
        let count = personas.len();
        for persona in personas {
            self.register(persona)?;
        }
        Ok(count)
    }

    /// Register every persona in a YAML file.
    pub fn register_from_file(&mut self, path: &Path) -> Result<usize, IgnitionError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            IgnitionError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        self.register_from_yaml(&yaml)
    }

    /// Load every `.yaml`/`.yml` file in `dir`, in file-name order.
    ///
    /// Files that fail to parse are skipped with a warning; a missing
    /// directory loads nothing.
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize, IgnitionError> {
        if !dir.exists() {
            return Ok(0);
        }

        let entries = std::fs::read_dir(dir).map_err(|e| {
            IgnitionError::config(format!("cannot list {}: {}", dir.display(), e))
        })?;
        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map_or(false, |ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        paths.sort();

        let mut count = 0;
        for path in paths {
            match self.register_from_file(&path) {
                Ok(n) => count += n,
                Err(e) => log::warn!("Failed to load personas from {}: {}", path.display(), e),
            }
        }
        Ok(count)
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// Personas in registration order.
    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    /// Identifiers in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.personas.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Bind every persona to `transport`, in registration order.
    ///
    /// Personas without a model use the configured text model, or the
    /// vision model for vision personas.
    pub fn build_analyzers(
        &self,
        transport: Arc<dyn InferenceTransport>,
        config: &TransportConfig,
    ) -> Vec<Arc<dyn Analyzer>> {
        self.personas
            .iter()
            .map(|persona| {
                let default_model = if persona.vision {
                    config.vision_model.clone()
                } else {
                    config.text_model.clone()
                };
                Arc::new(PersonaAnalyzer::new(
                    persona.clone(),
                    Arc::clone(&transport),
                    default_model,
                )) as Arc<dyn Analyzer>
            })
            .collect()
    }
}
