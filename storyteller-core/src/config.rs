//! Storyteller configuration.
//!
//! Defaults cover everything; environment variables and CLI flags override
//! individual settings.

use crate::corpus::CorpusStore;
use crate::evaluator::RubricEvaluator;
use crate::generator::GenreWriter;
use crate::oracle::CallSettings;
use crate::router::{GenreRouter, PassthroughPolicy};
use crate::text::LengthPolicy;
use claude::RetryPolicy;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration for a storyteller session.
#[derive(Debug, Clone)]
pub struct StorytellerConfig {
    /// Model for every stage unless a stage names its own.
    pub model: Option<String>,
    pub router_model: Option<String>,
    pub writer_model: Option<String>,
    pub evaluator_model: Option<String>,

    /// Directory holding the per-genre example folders.
    pub corpus_root: PathBuf,

    pub length: LengthPolicy,
    pub passthrough: PassthroughPolicy,

    /// Total routing attempts, counting the primary prompt.
    pub routing_attempts: u32,
    /// Writer calls allowed per turn before a bad story fails it.
    pub generation_attempts: u32,
    /// Evaluator calls allowed per turn before an invalid record fails it.
    pub evaluation_attempts: u32,

    /// Transport retries after the first failed oracle call.
    pub max_retries: u32,
}

impl Default for StorytellerConfig {
    fn default() -> Self {
        Self {
            model: None,
            router_model: None,
            writer_model: None,
            evaluator_model: None,
            corpus_root: PathBuf::from("corpus"),
            length: LengthPolicy::default(),
            passthrough: PassthroughPolicy::default(),
            routing_attempts: 2,
            generation_attempts: 2,
            evaluation_attempts: 2,
            max_retries: 2,
        }
    }
}

impl StorytellerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `STORYTELLER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(model) = get("STORYTELLER_MODEL") {
            config.model = Some(model);
        }
        if let Some(model) = get("STORYTELLER_ROUTER_MODEL") {
            config.router_model = Some(model);
        }
        if let Some(model) = get("STORYTELLER_WRITER_MODEL") {
            config.writer_model = Some(model);
        }
        if let Some(model) = get("STORYTELLER_EVALUATOR_MODEL") {
            config.evaluator_model = Some(model);
        }
        if let Some(dir) = get("STORYTELLER_CORPUS_DIR") {
            config.corpus_root = PathBuf::from(dir);
        }
        if let Some(value) = get("STORYTELLER_PASSTHROUGH") {
            config.passthrough = value.parse().map_err(|reason| ConfigError::Invalid {
                key: "STORYTELLER_PASSTHROUGH",
                value: value.clone(),
                reason,
            })?;
        }
        if let Some(value) = get("STORYTELLER_MAX_RETRIES") {
            config.max_retries =
                value
                    .trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                        key: "STORYTELLER_MAX_RETRIES",
                        value: value.clone(),
                        reason: e.to_string(),
                    })?;
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_router_model(mut self, model: impl Into<String>) -> Self {
        self.router_model = Some(model.into());
        self
    }

    pub fn with_writer_model(mut self, model: impl Into<String>) -> Self {
        self.writer_model = Some(model.into());
        self
    }

    pub fn with_evaluator_model(mut self, model: impl Into<String>) -> Self {
        self.evaluator_model = Some(model.into());
        self
    }

    pub fn with_corpus_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.corpus_root = root.into();
        self
    }

    pub fn with_length_policy(mut self, length: LengthPolicy) -> Self {
        self.length = length;
        self
    }

    pub fn with_passthrough(mut self, passthrough: PassthroughPolicy) -> Self {
        self.passthrough = passthrough;
        self
    }

    pub fn with_routing_attempts(mut self, attempts: u32) -> Self {
        self.routing_attempts = attempts;
        self
    }

    pub fn with_generation_attempts(mut self, attempts: u32) -> Self {
        self.generation_attempts = attempts;
        self
    }

    pub fn with_evaluation_attempts(mut self, attempts: u32) -> Self {
        self.evaluation_attempts = attempts;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Transport retry policy for the oracle client.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.max_retries.saturating_add(1))
    }

    fn stage_settings(
        &self,
        stage_model: &Option<String>,
        max_tokens: usize,
        temperature: f32,
    ) -> CallSettings {
        let settings = CallSettings::new(max_tokens, temperature);
        match stage_model.as_ref().or(self.model.as_ref()) {
            Some(model) => settings.with_model(model),
            None => settings,
        }
    }

    pub fn router(&self) -> GenreRouter {
        GenreRouter::new()
            .with_settings(self.stage_settings(&self.router_model, 2048, 0.1))
            .with_passthrough(self.passthrough)
            .with_max_attempts(self.routing_attempts)
    }

    pub fn writer(&self) -> GenreWriter {
        GenreWriter::new(CorpusStore::new(&self.corpus_root))
            .with_settings(self.stage_settings(&self.writer_model, 1200, 0.7))
            .with_length_policy(self.length)
            .with_max_attempts(self.generation_attempts)
    }

    pub fn evaluator(&self) -> RubricEvaluator {
        RubricEvaluator::new()
            .with_settings(self.stage_settings(&self.evaluator_model, 2048, 0.1))
            .with_length_policy(self.length)
            .with_max_attempts(self.evaluation_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StorytellerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.corpus_root, PathBuf::from("corpus"));
        assert_eq!(config.passthrough, PassthroughPolicy::Strict);
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.length.accepted_range(), (360, 550));
    }

    #[test]
    fn test_env_overrides() {
        let config = StorytellerConfig::from_lookup(lookup(&[
            ("STORYTELLER_MODEL", "claude-3-5-haiku-20241022"),
            ("STORYTELLER_EVALUATOR_MODEL", "claude-sonnet-4-20250514"),
            ("STORYTELLER_CORPUS_DIR", "/srv/stories"),
            ("STORYTELLER_PASSTHROUGH", "tool-output"),
            ("STORYTELLER_MAX_RETRIES", "0"),
            ("STORYTELLER_ROUTER_MODEL", "  "),
        ]))
        .unwrap();

        assert_eq!(config.corpus_root, PathBuf::from("/srv/stories"));
        assert_eq!(config.passthrough, PassthroughPolicy::ToolOutput);
        assert_eq!(config.retry_policy().max_attempts, 1);
        assert!(config.router_model.is_none());

        let writer = config.stage_settings(&config.writer_model, 1200, 0.7);
        assert_eq!(writer.model.as_deref(), Some("claude-3-5-haiku-20241022"));
        let evaluator = config.stage_settings(&config.evaluator_model, 2048, 0.1);
        assert_eq!(evaluator.model.as_deref(), Some("claude-sonnet-4-20250514"));
    }

    #[test]
    fn test_invalid_values() {
        let err = StorytellerConfig::from_lookup(lookup(&[("STORYTELLER_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "STORYTELLER_MAX_RETRIES", ref value, .. } if value == "many"
        ));

        let err = StorytellerConfig::from_lookup(lookup(&[("STORYTELLER_PASSTHROUGH", "loose")]))
            .unwrap_err();
        assert!(err.to_string().contains("STORYTELLER_PASSTHROUGH"));
    }
}
