//! Genre routing.
//!
//! The oracle acts as the dispatcher: it is offered one tool per genre and
//! must call exactly one of them with a directive. Its choice is validated
//! against the closed [`Genre`] set. When the choice is missing, repeated or
//! unknown, the router falls back to a narrowed single-choice prompt.
//!
//! After the writer runs, the router checks that the oracle's final answer is
//! the writer's story and nothing else.

use crate::conversation::{ConversationState, Turn};
use crate::generator::{GeneratedStory, GenerationError, GenreWriter};
use crate::genre::{Genre, WriterInput};
use crate::oracle::{CallSettings, Oracle};
use crate::text::{normalize_whitespace, word_count};
use claude::{Message, Request, Response, Tool, ToolChoice};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

const GUARDRAILS: &str = include_str!("prompts/router.txt");
const NARROWED: &str = include_str!("prompts/narrowed_router.txt");

/// Prefix for a request that opens a conversation.
pub const NEW_STORY_PREFIX: &str = "Generate a bedtime story: ";

const CHOOSE_GENRE: &str = "choose_genre";

/// Errors from routing a request to a writer.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("oracle call failed: {0}")]
    Oracle(#[from] claude::Error),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("could not pick a single genre after {attempts} attempt(s): {reason}")]
    Ambiguous { attempts: u32, reason: String },

    #[error(
        "final answer did not pass the {genre} story through unchanged \
         (story has {expected_words} words, answer has {returned_words})"
    )]
    PassthroughViolation {
        genre: Genre,
        expected_words: usize,
        returned_words: usize,
    },
}

/// How the router's final answer relates to the writer's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassthroughPolicy {
    /// Ask for the final answer and fail the turn unless it matches the story.
    #[default]
    Strict,
    /// Use the writer's output directly without a final-answer call.
    ToolOutput,
}

impl fmt::Display for PassthroughPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PassthroughPolicy::Strict => "strict",
            PassthroughPolicy::ToolOutput => "tool-output",
        })
    }
}

impl FromStr for PassthroughPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "strict" => Ok(PassthroughPolicy::Strict),
            "tool-output" => Ok(PassthroughPolicy::ToolOutput),
            other => Err(format!(
                "unknown passthrough policy '{other}' (expected strict or tool-output)"
            )),
        }
    }
}

/// Which prompt produced the genre choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutedBy {
    Primary,
    Narrowed,
}

/// A routed and written story.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub genre: Genre,
    /// The user message as sent to the router.
    pub request: String,
    /// What the writer was asked to write.
    pub directive: String,
    pub tool_use_id: String,
    pub story: GeneratedStory,
    pub routed_by: RoutedBy,
}

impl RouteOutcome {
    /// Conversation records for this routing exchange, without the reply.
    pub fn turns(&self) -> Vec<Turn> {
        vec![
            Turn::user(&self.request),
            Turn::ToolInvocation {
                id: self.tool_use_id.clone(),
                tool: self.genre.tool_name().to_string(),
                directive: self.directive.clone(),
            },
            Turn::ToolOutput {
                id: self.tool_use_id.clone(),
                content: self.story.text.clone(),
            },
        ]
    }
}

#[derive(Debug)]
struct Selection {
    genre: Genre,
    directive: String,
    tool_use_id: String,
}

/// Picks a writer for each request and runs it.
#[derive(Debug, Clone)]
pub struct GenreRouter {
    settings: CallSettings,
    passthrough: PassthroughPolicy,
    max_attempts: u32,
}

impl Default for GenreRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl GenreRouter {
    pub fn new() -> Self {
        Self {
            settings: CallSettings::new(2048, 0.1),
            passthrough: PassthroughPolicy::default(),
            max_attempts: 2,
        }
    }

    pub fn with_settings(mut self, settings: CallSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_passthrough(mut self, passthrough: PassthroughPolicy) -> Self {
        self.passthrough = passthrough;
        self
    }

    /// Total routing attempts, counting the primary prompt.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Route `request` to one writer and return its story.
    ///
    /// `history` is read for context and never modified.
    pub async fn route<O: Oracle + ?Sized>(
        &self,
        oracle: &O,
        writer: &GenreWriter,
        history: &ConversationState,
        request: &str,
    ) -> Result<RouteOutcome, RoutingError> {
        let request = if history.is_empty() {
            format!("{NEW_STORY_PREFIX}{request}")
        } else {
            request.to_string()
        };
        let messages = history.appended([Turn::user(&request)]).to_messages();

        let (selection, routed_by) = self.select(oracle, &messages).await?;
        info!(
            genre = %selection.genre,
            routed_by = ?routed_by,
            directive = %selection.directive,
            "request routed"
        );

        let story = writer
            .write(oracle, selection.genre, &selection.directive)
            .await?;

        let outcome = RouteOutcome {
            genre: selection.genre,
            request,
            directive: selection.directive,
            tool_use_id: selection.tool_use_id,
            story,
            routed_by,
        };

        if self.passthrough == PassthroughPolicy::Strict {
            self.check_passthrough(oracle, history, &outcome).await?;
        }
        Ok(outcome)
    }

    async fn select<O: Oracle + ?Sized>(
        &self,
        oracle: &O,
        messages: &[Message],
    ) -> Result<(Selection, RoutedBy), RoutingError> {
        let request = self
            .settings
            .apply(Request::new(messages.to_vec()))
            .with_system(router_prompt())
            .with_tools(writer_tools())
            .with_tool_choice(ToolChoice::Auto);
        let response = oracle.complete(request).await?;

        let mut reason = match primary_selection(&response) {
            Ok(selection) => return Ok((selection, RoutedBy::Primary)),
            Err(reason) => reason,
        };

        for attempt in 2..=self.max_attempts {
            warn!(attempt, reason = %reason, "routing unclear, asking for a single genre");
            let request = self
                .settings
                .apply(Request::new(messages.to_vec()))
                .with_system(narrowed_prompt())
                .with_forced_tool(choose_genre_tool());
            let response = oracle.complete(request).await?;

            match narrowed_selection(&response) {
                Ok(selection) => return Ok((selection, RoutedBy::Narrowed)),
                Err(next) => reason = next,
            }
        }

        Err(RoutingError::Ambiguous {
            attempts: self.max_attempts,
            reason,
        })
    }

    /// Hand the story back as the tool result and compare the final answer.
    async fn check_passthrough<O: Oracle + ?Sized>(
        &self,
        oracle: &O,
        history: &ConversationState,
        outcome: &RouteOutcome,
    ) -> Result<(), RoutingError> {
        let messages = history.appended(outcome.turns()).to_messages();
        let request = self
            .settings
            .apply(Request::new(messages))
            .with_system(router_prompt())
            .with_tools(writer_tools())
            .with_tool_choice(ToolChoice::Auto);
        let answer = oracle.complete(request).await?.text();

        if normalize_whitespace(&answer) == normalize_whitespace(&outcome.story.text) {
            debug!(genre = %outcome.genre, "final answer matches story");
            return Ok(());
        }
        Err(RoutingError::PassthroughViolation {
            genre: outcome.genre,
            expected_words: outcome.story.word_count,
            returned_words: word_count(&answer),
        })
    }
}

/// The router's system instruction: the writer list plus guardrails.
pub fn router_prompt() -> String {
    let mut prompt = String::from(
        "You are a children's story assistant with three specialized writers:\n\n",
    );
    for genre in Genre::ALL {
        prompt.push_str(&format!(
            "- {}: use for {}\n",
            genre.tool_name(),
            genre.routing_hint()
        ));
    }
    prompt.push('\n');
    prompt.push_str(GUARDRAILS);
    prompt
}

fn narrowed_prompt() -> String {
    let choices = Genre::ALL
        .iter()
        .map(|g| format!("- {}: {}", g.key(), g.routing_hint()))
        .collect::<Vec<_>>()
        .join("\n");
    NARROWED.replace("{choices}", &choices)
}

/// One tool per genre, in routing order.
pub fn writer_tools() -> Vec<Tool> {
    Genre::ALL.iter().map(|g| g.tool()).collect()
}

/// The single-choice tool used when the primary route is unclear.
pub fn choose_genre_tool() -> Tool {
    let keys: Vec<&str> = Genre::ALL.iter().map(|g| g.key()).collect();
    Tool {
        name: CHOOSE_GENRE.to_string(),
        description: "Pick exactly one story genre and the directive for its writer.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "genre": {
                    "type": "string",
                    "enum": keys,
                    "description": "The one genre that best fits the request"
                },
                "directive": {
                    "type": "string",
                    "description": "What the writer should write, including any requested change to an earlier story"
                }
            },
            "required": ["genre", "directive"]
        }),
    }
}

fn primary_selection(response: &Response) -> Result<Selection, String> {
    let uses = response.tool_uses();
    let call = match uses.as_slice() {
        [] => return Err("no writer tool was called".to_string()),
        [call] => call,
        calls => {
            let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
            return Err(format!("{} tools were called: {}", calls.len(), names.join(", ")));
        }
    };

    let genre = Genre::from_tool_name(&call.name)
        .ok_or_else(|| format!("unknown writer tool '{}'", call.name))?;
    let input: WriterInput = serde_json::from_value(call.input.clone())
        .map_err(|e| format!("invalid input for {}: {e}", call.name))?;
    if input.user_request.trim().is_empty() {
        return Err(format!("{} was called with an empty directive", call.name));
    }

    Ok(Selection {
        genre,
        directive: input.user_request,
        tool_use_id: call.id.clone(),
    })
}

#[derive(Deserialize)]
struct GenreChoice {
    genre: String,
    directive: String,
}

fn narrowed_selection(response: &Response) -> Result<Selection, String> {
    let call = response
        .tool_uses()
        .into_iter()
        .find(|c| c.name == CHOOSE_GENRE)
        .ok_or_else(|| format!("{CHOOSE_GENRE} was not called"))?;
    let choice: GenreChoice = serde_json::from_value(call.input)
        .map_err(|e| format!("invalid {CHOOSE_GENRE} input: {e}"))?;

    let genre = Genre::from_key(&choice.genre)
        .ok_or_else(|| format!("'{}' is not one of the offered genres", choice.genre))?;
    if choice.directive.trim().is_empty() {
        return Err(format!("{CHOOSE_GENRE} returned an empty directive"));
    }

    Ok(Selection {
        genre,
        directive: choice.directive,
        tool_use_id: call.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CorpusStore;
    use crate::testing::{sample_story, text_response, tool_response, ScriptedOracle};
    use tempfile::TempDir;

    fn writer(root: &TempDir) -> GenreWriter {
        GenreWriter::new(CorpusStore::new(root.path()))
    }

    fn princess_call(directive: &str) -> serde_json::Value {
        json!({ "user_request": directive })
    }

    #[tokio::test]
    async fn test_primary_route_passes_story_through() {
        let root = TempDir::new().unwrap();
        let story = sample_story(450);
        let oracle = ScriptedOracle::new()
            .then_tool_use("tu_1", "generate_princess_story", princess_call("a brave princess and a dragon"))
            .then_text(&story)
            .then_text(format!("\n{story}\n"));

        let outcome = GenreRouter::new()
            .route(&oracle, &writer(&root), &ConversationState::new(), "a brave princess and a dragon")
            .await
            .unwrap();

        assert_eq!(outcome.genre, Genre::RoyalMagical);
        assert_eq!(outcome.routed_by, RoutedBy::Primary);
        assert_eq!(outcome.story.text, story);
        assert_eq!(outcome.request, "Generate a bedtime story: a brave princess and a dragon");

        let requests = oracle.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].tool_choice, Some(ToolChoice::Auto));
        assert_eq!(requests[0].tool_names().len(), 3);
        assert_eq!(requests[0].temperature, Some(0.1));
        // The final-answer call sees the tool result.
        assert_eq!(requests[2].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_wrapped_answer_is_a_violation() {
        let root = TempDir::new().unwrap();
        let story = sample_story(450);
        let oracle = ScriptedOracle::new()
            .then_tool_use("tu_1", "generate_animal_story", princess_call("a fox"))
            .then_text(&story)
            .then_text(format!("Here is the story: {story}"));

        let err = GenreRouter::new()
            .route(&oracle, &writer(&root), &ConversationState::new(), "a fox")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RoutingError::PassthroughViolation {
                genre: Genre::AnimalNature,
                expected_words: 450,
                returned_words: 454,
            }
        ));
    }

    #[tokio::test]
    async fn test_tool_output_policy_skips_final_call() {
        let root = TempDir::new().unwrap();
        let story = sample_story(420);
        let oracle = ScriptedOracle::new()
            .then_tool_use("tu_1", "generate_christmas_story", princess_call("Santa"))
            .then_text(&story);

        let outcome = GenreRouter::new()
            .with_passthrough(PassthroughPolicy::ToolOutput)
            .route(&oracle, &writer(&root), &ConversationState::new(), "Santa")
            .await
            .unwrap();

        assert_eq!(outcome.story.text, story);
        assert_eq!(oracle.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_two_tool_calls_fall_back_to_narrowed_choice() {
        let root = TempDir::new().unwrap();
        let story = sample_story(430);
        let oracle = ScriptedOracle::new()
            .then(tool_response(vec![
                ("tu_1", "generate_princess_story", princess_call("a dragon")),
                ("tu_2", "generate_animal_story", princess_call("a dragon")),
            ]))
            .then_tool_use("tu_3", "choose_genre", json!({ "genre": "royal_magical", "directive": "a dragon" }))
            .then_text(&story)
            .then_text(&story);

        let outcome = GenreRouter::new()
            .route(&oracle, &writer(&root), &ConversationState::new(), "a dragon")
            .await
            .unwrap();

        assert_eq!(outcome.genre, Genre::RoyalMagical);
        assert_eq!(outcome.routed_by, RoutedBy::Narrowed);
        assert_eq!(outcome.tool_use_id, "tu_3");

        let narrowed = &oracle.requests()[1];
        assert_eq!(
            narrowed.tool_choice,
            Some(ToolChoice::Tool { name: "choose_genre".to_string() })
        );
        let tools = narrowed.tools.as_ref().unwrap();
        assert_eq!(tools[0].input_schema["properties"]["genre"]["enum"][2], "animal_nature");
    }

    #[tokio::test]
    async fn test_unknown_genre_is_ambiguous() {
        let root = TempDir::new().unwrap();
        let oracle = ScriptedOracle::new()
            .then(text_response("I am not sure which writer to use."))
            .then_tool_use("tu_2", "choose_genre", json!({ "genre": "space_opera", "directive": "rockets" }));

        let err = GenreRouter::new()
            .route(&oracle, &writer(&root), &ConversationState::new(), "rockets")
            .await
            .unwrap_err();

        match err {
            RoutingError::Ambiguous { attempts, reason } => {
                assert_eq!(attempts, 2);
                assert!(reason.contains("space_opera"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // No writer call was made.
        assert_eq!(oracle.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_follow_up_is_not_prefixed_and_carries_history() {
        let root = TempDir::new().unwrap();
        let first = sample_story(440);
        let history = ConversationState::new().appended([
            Turn::user("Generate a bedtime story: a fox"),
            Turn::ToolInvocation {
                id: "tu_1".to_string(),
                tool: "generate_animal_story".to_string(),
                directive: "a fox".to_string(),
            },
            Turn::ToolOutput {
                id: "tu_1".to_string(),
                content: first.clone(),
            },
            Turn::assistant(&first),
        ]);

        let second = sample_story(460);
        let oracle = ScriptedOracle::new()
            .then_tool_use("tu_2", "generate_animal_story", princess_call("a fox who becomes braver"))
            .then_text(&second);

        let outcome = GenreRouter::new()
            .with_passthrough(PassthroughPolicy::ToolOutput)
            .route(&oracle, &writer(&root), &history, "Modify the story: make the fox braver")
            .await
            .unwrap();

        assert_eq!(outcome.request, "Modify the story: make the fox braver");
        let routed = &oracle.requests()[0];
        assert_eq!(routed.messages.len(), 5);
        assert_eq!(routed.messages[4].text(), "Modify the story: make the fox braver");
        assert_eq!(history.len(), 4);
    }

    #[test]
    fn test_passthrough_policy_parse() {
        assert_eq!("strict".parse::<PassthroughPolicy>(), Ok(PassthroughPolicy::Strict));
        assert_eq!("tool_output".parse::<PassthroughPolicy>(), Ok(PassthroughPolicy::ToolOutput));
        assert_eq!("Tool-Output".parse::<PassthroughPolicy>(), Ok(PassthroughPolicy::ToolOutput));
        assert!("loose".parse::<PassthroughPolicy>().is_err());
    }

    #[test]
    fn test_router_prompt_lists_every_writer() {
        let prompt = router_prompt();
        for genre in Genre::ALL {
            assert!(prompt.contains(genre.tool_name()));
        }
        assert!(prompt.contains("GUARDRAILS"));
        assert!(narrowed_prompt().contains("- holiday:"));
    }
}
