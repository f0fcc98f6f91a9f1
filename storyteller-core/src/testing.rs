//! Testing utilities for the storyteller.
//!
//! This module provides tools for deterministic tests without API calls:
//! - `ScriptedOracle`, which answers requests from a queue and records them
//! - Response builders for text, tool calls, and evaluation submissions
//! - `sample_story` for stories of an exact word count

use crate::oracle::Oracle;
use async_trait::async_trait;
use claude::{ContentBlock, Request, Response, StopReason, Usage};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

/// An oracle that returns scripted responses in order.
///
/// Every request it receives is recorded so tests can assert on prompts,
/// tool offers, and conversation history. Running out of script is an
/// error, not a panic, so a test sees which stage over-called.
#[derive(Default)]
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<Result<Response, claude::Error>>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw response.
    pub fn then(self, response: Response) -> Self {
        self.push(Ok(response));
        self
    }

    /// Queue a plain text answer.
    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.then(text_response(text))
    }

    /// Queue a text answer that stopped at the token limit.
    pub fn then_truncated(self, text: impl Into<String>) -> Self {
        let mut response = text_response(text);
        response.stop_reason = StopReason::MaxTokens;
        self.then(response)
    }

    /// Queue a single tool call.
    pub fn then_tool_use(self, id: &str, name: &str, input: Value) -> Self {
        self.then(tool_response(vec![(id, name, input)]))
    }

    /// Queue a rubric submission built by [`evaluation_input`].
    pub fn then_evaluation(self, scores: [f64; 5], fixed_story: Option<&str>) -> Self {
        self.then_tool_use(
            "toolu_eval",
            "submit_evaluation",
            evaluation_input(scores, fixed_story),
        )
    }

    /// Queue a failure.
    pub fn then_error(self, error: claude::Error) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, response: Result<Response, claude::Error>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of scripted responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, request: Request) -> Result<Response, claude::Error> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                Err(claude::Error::Config(
                    "scripted oracle has no response left".to_string(),
                ))
            })
    }
}

/// A response holding only text.
pub fn text_response(text: impl Into<String>) -> Response {
    response(vec![ContentBlock::text(text)], StopReason::EndTurn)
}

/// A response holding one tool call per `(id, name, input)`.
pub fn tool_response(calls: Vec<(&str, &str, Value)>) -> Response {
    let blocks = calls
        .into_iter()
        .map(|(id, name, input)| ContentBlock::tool_use(id, name, input))
        .collect();
    response(blocks, StopReason::ToolUse)
}

fn response(content: Vec<ContentBlock>, stop_reason: StopReason) -> Response {
    Response {
        id: "msg_scripted".to_string(),
        model: "scripted".to_string(),
        content,
        stop_reason,
        usage: Usage::default(),
    }
}

/// A consistent `submit_evaluation` input for the given scores.
///
/// Scores are in rubric order: age appropriate, grounded, conciseness,
/// engagement, structure. The overall score and approval follow the rubric.
pub fn evaluation_input(scores: [f64; 5], fixed_story: Option<&str>) -> Value {
    let overall = scores.iter().sum::<f64>() / 5.0;
    let approved = scores.iter().all(|s| *s >= 7.0);
    let mut input = json!({
        "scores": {
            "age_appropriate": scores[0],
            "grounded": scores[1],
            "conciseness": scores[2],
            "engagement": scores[3],
            "structure": scores[4],
        },
        "overall_score": overall,
        "approved": approved,
        "feedback": if approved { "A lovely story." } else { "Needs work." },
    });
    if let Some(story) = fixed_story {
        input["fixed_story"] = json!(story);
    }
    input
}

const FILLER: [&str; 16] = [
    "the", "little", "fox", "ran", "through", "a", "quiet", "green", "forest", "and", "found",
    "her", "friend", "by", "the", "river",
];

/// A plain story of exactly `words` words, punctuated into sentences.
pub fn sample_story(words: usize) -> String {
    let mut out = String::new();
    for i in 0..words {
        if i > 0 {
            out.push(' ');
        }
        let word = FILLER[i % FILLER.len()];
        if i % 10 == 0 {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        } else {
            out.push_str(word);
        }
        if i % 10 == 9 || i + 1 == words {
            out.push('.');
        }
    }
    out
}
