//! Conversation state threaded between turns.
//!
//! The state is an append-only log of turn records. Appending produces a new
//! state and leaves the old one untouched, so a failed turn can simply drop
//! the records it was building.

use claude::{ContentBlock, Message, Role, ToolResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One record in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    /// What the reader asked for.
    UserRequest { text: String },
    /// The router calling a writer tool.
    ToolInvocation {
        id: String,
        tool: String,
        directive: String,
    },
    /// What the writer tool returned.
    ToolOutput { id: String, content: String },
    /// The story surfaced to the reader at the end of the turn.
    AssistantReply { text: String },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::UserRequest { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Turn::AssistantReply { text: text.into() }
    }

    fn role(&self) -> Role {
        match self {
            Turn::UserRequest { .. } | Turn::ToolOutput { .. } => Role::User,
            Turn::ToolInvocation { .. } | Turn::AssistantReply { .. } => Role::Assistant,
        }
    }

    fn to_block(&self) -> ContentBlock {
        match self {
            Turn::UserRequest { text } | Turn::AssistantReply { text } => ContentBlock::text(text),
            Turn::ToolInvocation {
                id,
                tool,
                directive,
            } => ContentBlock::tool_use(
                id,
                tool,
                serde_json::json!({ "user_request": directive }),
            ),
            Turn::ToolOutput { id, content } => {
                ContentBlock::tool_result(id, ToolResult::success(content))
            }
        }
    }
}

/// Immutable, ordered conversation log.
#[derive(Debug, Clone)]
pub struct ConversationState {
    turns: Arc<[Turn]>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            turns: Arc::from(Vec::new()),
        }
    }
}

impl ConversationState {
    /// An empty conversation, as at session start.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// A new state with `turns` appended after the existing records.
    #[must_use]
    pub fn appended(&self, turns: impl IntoIterator<Item = Turn>) -> Self {
        let turns: Vec<Turn> = self.turns.iter().cloned().chain(turns).collect();
        Self {
            turns: turns.into(),
        }
    }

    /// Number of completed story turns (one per assistant reply).
    pub fn story_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| matches!(t, Turn::AssistantReply { .. }))
            .count()
    }

    /// The most recently surfaced story, if any.
    pub fn last_story(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| match t {
            Turn::AssistantReply { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Render the log as oracle messages.
    ///
    /// Consecutive records with the same role are merged into one message so
    /// the result always alternates between user and assistant.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = Vec::new();
        for turn in self.turns.iter() {
            let block = turn.to_block();
            match messages.last_mut() {
                Some(last) if last.role == turn.role() => last.content.push(block),
                _ => messages.push(Message::new(turn.role(), vec![block])),
            }
        }
        messages
    }
}

impl FromIterator<Turn> for ConversationState {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        Self {
            turns: iter.into_iter().collect::<Vec<_>>().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story_turn(request: &str, story: &str) -> Vec<Turn> {
        vec![
            Turn::user(request),
            Turn::ToolInvocation {
                id: "tu_1".to_string(),
                tool: "generate_animal_story".to_string(),
                directive: request.to_string(),
            },
            Turn::ToolOutput {
                id: "tu_1".to_string(),
                content: story.to_string(),
            },
            Turn::assistant(story),
        ]
    }

    #[test]
    fn test_append_does_not_mutate_original() {
        let empty = ConversationState::new();
        let first = empty.appended(story_turn("a fox", "The fox."));

        assert!(empty.is_empty());
        assert_eq!(first.len(), 4);
        assert_eq!(first.story_count(), 1);
        assert_eq!(first.last_story(), Some("The fox."));

        let second = first.appended(vec![Turn::user("make the fox braver")]);
        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 5);
    }

    #[test]
    fn test_messages_alternate_roles() {
        let state = ConversationState::new()
            .appended(story_turn("a fox", "The fox."))
            .appended(vec![Turn::user("Modify the story: make the fox braver")]);

        let messages = state.to_messages();
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User]
        );
        assert!(matches!(
            &messages[1].content[0],
            ContentBlock::ToolUse { name, .. } if name == "generate_animal_story"
        ));
        assert!(matches!(
            &messages[2].content[0],
            ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "tu_1"
        ));
    }

    #[test]
    fn test_same_role_records_merge() {
        let state: ConversationState = vec![Turn::user("one"), Turn::user("two")]
            .into_iter()
            .collect();
        let messages = state.to_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.len(), 2);
    }

    #[test]
    fn test_turn_serde_tags() {
        let json = serde_json::to_value(Turn::user("a fox")).unwrap();
        assert_eq!(json["type"], "user_request");
        assert_eq!(json["text"], "a fox");
    }
}
