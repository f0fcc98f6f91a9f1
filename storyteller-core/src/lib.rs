//! Children's bedtime stories, routed to genre writers and checked against a rubric.
//!
//! This crate provides:
//! - A router that lets the model pick one of three genre writers
//! - Genre writers built from persona, arc, and example corpus prompts
//! - A rubric evaluator that scores each story and supplies a fix when needed
//! - A multi-turn session that carries the conversation between requests
//!
//! # Quick Start
//!
//! ```ignore
//! use storyteller_core::{Storyteller, StorytellerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StorytellerConfig::from_env()?;
//!     let client = claude::Claude::from_env()?.with_retry_policy(config.retry_policy());
//!     let mut teller = Storyteller::new(client, &config);
//!
//!     let outcome = teller.tell("a story about a brave princess and a dragon").await?;
//!     println!("{}", outcome.final_story);
//!
//!     let outcome = teller.edit("make the dragon friendlier").await?;
//!     println!("{}", outcome.final_story);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod conversation;
pub mod corpus;
pub mod evaluator;
pub mod generator;
pub mod genre;
pub mod oracle;
pub mod pipeline;
pub mod router;
pub mod testing;
pub mod text;

// Re-export for convenience
pub use story_macros::Tool;

// Primary public API
pub use config::{ConfigError, StorytellerConfig};
pub use conversation::{ConversationState, Turn};
pub use corpus::{CorpusError, CorpusStore};
pub use evaluator::{
    Dimension, EvaluationError, EvaluationResult, EvaluationState, RubricEvaluator, RubricScores,
    SchemaViolation, APPROVAL_THRESHOLD,
};
pub use generator::{GeneratedStory, GenerationError, GenreWriter};
pub use genre::Genre;
pub use oracle::{CallSettings, Oracle};
pub use pipeline::{edit_directive, PipelineError, Stage, Storyteller, TurnOutcome};
pub use router::{GenreRouter, PassthroughPolicy, RouteOutcome, RoutedBy, RoutingError};
pub use testing::ScriptedOracle;
pub use text::{word_count, LengthPolicy, StoryIssue};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    /// Name a character for the next story
    #[derive(Tool, Deserialize)]
    #[tool(name = "name_character")]
    struct NameCharacter {
        /// The character's name, like "Luna" or "Pip"
        name: String,
        /// Optional species for animal tales
        species: Option<String>,
        /// How brave the character is
        #[tool(minimum = 1, maximum = 5)]
        courage: u8,
    }

    #[test]
    fn test_tool_derive() {
        assert_eq!(NameCharacter::tool_name(), "name_character");
        assert_eq!(
            NameCharacter::tool_description(),
            "Name a character for the next story"
        );
    }

    #[test]
    fn test_tool_schema() {
        let schema = NameCharacter::input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["name"]["type"], "string");
        assert_eq!(schema["properties"]["species"]["type"], "string");
        assert_eq!(schema["properties"]["courage"]["type"], "integer");
        assert_eq!(schema["properties"]["courage"]["minimum"], 1.0);

        // name should be required, species should not be (it's Option)
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "name"));
        assert!(!required.iter().any(|v| v == "species"));
    }

    #[test]
    fn test_tool_as_tool() {
        let tool = NameCharacter::as_tool();
        assert_eq!(tool.name, "name_character");
        assert!(!tool.description.is_empty());
    }
}
