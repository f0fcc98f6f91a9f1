//! Storyteller - the primary public API.
//!
//! One turn runs the router (which runs a writer), then the evaluator, then
//! picks the fixed story when there is one. The conversation is only
//! replaced after every stage has succeeded, so a failed turn leaves the
//! session exactly as it was.

use crate::config::StorytellerConfig;
use crate::conversation::{ConversationState, Turn};
use crate::evaluator::{EvaluationError, EvaluationResult, RubricEvaluator};
use crate::generator::{GenerationError, GenreWriter};
use crate::genre::Genre;
use crate::oracle::Oracle;
use crate::router::{GenreRouter, RoutedBy, RoutingError};
use crate::text::word_count;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// The pipeline stage a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Routing,
    Generation,
    Evaluation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Routing => "routing",
            Stage::Generation => "generation",
            Stage::Evaluation => "evaluation",
        })
    }
}

/// Errors from a storyteller turn.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("request is empty")]
    EmptyRequest,

    #[error("routing failed: {0}")]
    Routing(RoutingError),

    #[error("story generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::EmptyRequest | PipelineError::Routing(_) => Stage::Routing,
            PipelineError::Generation(_) => Stage::Generation,
            PipelineError::Evaluation(_) => Stage::Evaluation,
        }
    }
}

impl From<RoutingError> for PipelineError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::Generation(err) => PipelineError::Generation(err),
            other => PipelineError::Routing(other),
        }
    }
}

/// The result of one completed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub genre: Genre,
    pub routed_by: RoutedBy,
    /// The writer's story.
    pub original_story: String,
    /// What the reader sees: the fixed story if there is one, else the original.
    pub final_story: String,
    pub evaluation: EvaluationResult,
    pub was_fixed: bool,
    pub word_count: usize,
    pub final_word_count: usize,
}

/// Frame a follow-up as a change to the previous story.
pub fn edit_directive(change: &str) -> String {
    format!("Modify the story: {}", change.trim())
}

/// A storytelling session.
pub struct Storyteller<O: Oracle> {
    oracle: O,
    router: GenreRouter,
    writer: GenreWriter,
    evaluator: RubricEvaluator,
    conversation: ConversationState,
    session_id: Uuid,
    turns: usize,
}

impl<O: Oracle> Storyteller<O> {
    pub fn new(oracle: O, config: &StorytellerConfig) -> Self {
        Self {
            oracle,
            router: config.router(),
            writer: config.writer(),
            evaluator: config.evaluator(),
            conversation: ConversationState::new(),
            session_id: Uuid::new_v4(),
            turns: 0,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Completed turns since the session started or was reset.
    pub fn turn_count(&self) -> usize {
        self.turns
    }

    /// Run one turn for a new request or a follow-up.
    pub async fn tell(&mut self, request: &str) -> Result<TurnOutcome, PipelineError> {
        let span = info_span!("turn", session = %self.session_id, turn = self.turns + 1);
        self.run_turn(request).instrument(span).await
    }

    /// Run a follow-up turn that modifies the previous story.
    pub async fn edit(&mut self, change: &str) -> Result<TurnOutcome, PipelineError> {
        self.tell(&edit_directive(change)).await
    }

    /// Forget the conversation and start a new session.
    pub fn reset(&mut self) {
        self.conversation = ConversationState::new();
        self.session_id = Uuid::new_v4();
        self.turns = 0;
        info!(session = %self.session_id, "session reset");
    }

    async fn run_turn(&mut self, request: &str) -> Result<TurnOutcome, PipelineError> {
        let request = request.trim();
        if request.is_empty() {
            return Err(PipelineError::EmptyRequest);
        }

        let routed = self
            .router
            .route(&self.oracle, &self.writer, &self.conversation, request)
            .await?;
        let evaluation = self
            .evaluator
            .evaluate(&self.oracle, &routed.story.text)
            .await?;

        let original_story = routed.story.text.clone();
        let final_story = evaluation
            .fixed_story()
            .unwrap_or(original_story.as_str())
            .to_string();
        let was_fixed = evaluation.fixed_story().is_some();

        self.conversation = self
            .conversation
            .appended(routed.turns().into_iter().chain([Turn::assistant(&final_story)]));
        self.turns += 1;

        let outcome = TurnOutcome {
            genre: routed.genre,
            routed_by: routed.routed_by,
            word_count: routed.story.word_count,
            final_word_count: word_count(&final_story),
            original_story,
            final_story,
            evaluation,
            was_fixed,
        };
        info!(
            genre = %outcome.genre,
            aggregate = outcome.evaluation.aggregate(),
            was_fixed,
            words = outcome.final_word_count,
            "turn complete"
        );
        Ok(outcome)
    }
}
