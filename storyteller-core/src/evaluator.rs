//! Rubric evaluation and repair.
//!
//! The oracle scores a story on five dimensions by filling the
//! `submit_evaluation` record, which it is forced to call. The record is
//! never trusted as-is: scores are range checked, the aggregate is
//! recomputed, and approval is derived from the per-dimension rule. A
//! story that fails any dimension must come back with a complete fixed
//! story that lands inside the exact target length and has no labels.

use crate::oracle::{CallSettings, Oracle};
use crate::text::{lint_story, word_count, LengthPolicy, StoryIssue};
use claude::{ContentBlock, Message, Request, Response, Role, StopReason, ToolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use story_macros::Tool;
use thiserror::Error;
use tracing::{debug, info, warn};

const EVALUATOR_PROMPT: &str = include_str!("prompts/evaluator.txt");

/// Every dimension must score at least this for a story to be approved.
pub const APPROVAL_THRESHOLD: f64 = 7.0;

/// Largest accepted gap between the reported and computed overall score.
pub const AGGREGATE_TOLERANCE: f64 = 0.1;

/// The five rubric dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    AgeAppropriate,
    Grounded,
    Conciseness,
    Engagement,
    Structure,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::AgeAppropriate,
        Dimension::Grounded,
        Dimension::Conciseness,
        Dimension::Engagement,
        Dimension::Structure,
    ];

    /// Field name in the submission record.
    pub fn key(self) -> &'static str {
        match self {
            Dimension::AgeAppropriate => "age_appropriate",
            Dimension::Grounded => "grounded",
            Dimension::Conciseness => "conciseness",
            Dimension::Engagement => "engagement",
            Dimension::Structure => "structure",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimension::AgeAppropriate => "Age Appropriate",
            Dimension::Grounded => "Grounded",
            Dimension::Conciseness => "Conciseness",
            Dimension::Engagement => "Engagement",
            Dimension::Structure => "Structure",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Scores for each rubric dimension, 0 to 10.
#[derive(Debug, Clone, Copy, PartialEq, Tool, Serialize, Deserialize)]
#[tool(name = "rubric_scores")]
pub struct RubricScores {
    /// Suitable for ages 5-10: no mature themes, kind characters, positive resolution
    #[tool(minimum = 0, maximum = 10)]
    pub age_appropriate: f64,
    /// Coherent, logical flow with consistent characters and no plot holes
    #[tool(minimum = 0, maximum = 10)]
    pub grounded: f64,
    /// Within the word band with efficient, unrepetitive storytelling
    #[tool(minimum = 0, maximum = 10)]
    pub conciseness: f64,
    /// Captivating and emotionally resonant for children
    #[tool(minimum = 0, maximum = 10)]
    pub engagement: f64,
    /// Clear beginning, middle and end with good pacing and no step labels
    #[tool(minimum = 0, maximum = 10)]
    pub structure: f64,
}

impl RubricScores {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::AgeAppropriate => self.age_appropriate,
            Dimension::Grounded => self.grounded,
            Dimension::Conciseness => self.conciseness,
            Dimension::Engagement => self.engagement,
            Dimension::Structure => self.structure,
        }
    }

    /// `(dimension, score)` pairs in rubric order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        Dimension::ALL.into_iter().map(|d| (d, self.get(d)))
    }

    pub fn mean(&self) -> f64 {
        self.iter().map(|(_, s)| s).sum::<f64>() / Dimension::ALL.len() as f64
    }

    /// The approval rule: every dimension at or above the threshold.
    pub fn all_pass(&self) -> bool {
        self.iter().all(|(_, s)| s >= APPROVAL_THRESHOLD)
    }
}

/// Submit the rubric evaluation of a children's story. Include fixed_story only when any score is below 7.0.
#[derive(Debug, Clone, Tool, Deserialize)]
#[tool(name = "submit_evaluation")]
pub struct EvaluationSubmission {
    /// Score for each rubric dimension
    #[tool(nested)]
    pub scores: RubricScores,
    /// The average of the five scores
    #[tool(minimum = 0, maximum = 10)]
    pub overall_score: f64,
    /// True only when every score is 7.0 or higher
    pub approved: bool,
    /// Specific feedback on strengths and weaknesses
    pub feedback: String,
    /// The complete rewritten story, required when not approved
    pub fixed_story: Option<String>,
}

/// One way a submission broke the record contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaViolation {
    NotSubmitted,
    Malformed { detail: String },
    ScoreOutOfRange { dimension: Dimension, value: f64 },
    AggregateMismatch { reported: f64, computed: f64 },
    ApprovalMismatch { reported: bool, derived: bool },
    MissingFixedStory,
    UnexpectedFixedStory,
    FixedStory { issue: StoryIssue },
    Truncated,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaViolation::NotSubmitted => write!(f, "submit_evaluation was not called"),
            SchemaViolation::Malformed { detail } => write!(f, "malformed submission: {detail}"),
            SchemaViolation::ScoreOutOfRange { dimension, value } => {
                write!(f, "{dimension} score {value} is outside 0-10")
            }
            SchemaViolation::AggregateMismatch { reported, computed } => write!(
                f,
                "overall_score {reported} is not the mean of the scores ({computed:.2})"
            ),
            SchemaViolation::ApprovalMismatch { reported, derived } => write!(
                f,
                "approved is {reported} but the scores require {derived}"
            ),
            SchemaViolation::MissingFixedStory => {
                write!(f, "fixed_story is required when the story is not approved")
            }
            SchemaViolation::UnexpectedFixedStory => {
                write!(f, "fixed_story must be omitted when the story is approved")
            }
            SchemaViolation::FixedStory { issue } => write!(f, "fixed_story: {issue}"),
            SchemaViolation::Truncated => {
                write!(f, "submission was cut off at the token limit")
            }
        }
    }
}

fn join_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from the evaluator.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("oracle call failed: {0}")]
    Oracle(#[from] claude::Error),

    #[error("evaluation broke the record contract after {attempts} attempt(s): {}", join_violations(.violations))]
    Schema {
        attempts: u32,
        violations: Vec<SchemaViolation>,
    },
}

/// Where the approve/fix branch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationState {
    /// All dimensions passed.
    Scored,
    /// At least one dimension failed and a fixed story was supplied.
    ScoredAndFixed,
}

/// A validated evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    scores: RubricScores,
    aggregate: f64,
    approved: bool,
    feedback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fixed_story: Option<String>,
}

impl EvaluationResult {
    /// Validate a submission against the rubric.
    ///
    /// A fixed story must fall inside `length`'s `min_words..=max_words`
    /// with no tolerance; the slack a writer gets does not apply to repairs.
    pub fn validate(
        submission: EvaluationSubmission,
        length: &LengthPolicy,
    ) -> Result<Self, Vec<SchemaViolation>> {
        let scores = submission.scores;
        let mut violations: Vec<SchemaViolation> = scores
            .iter()
            .filter(|(_, v)| !v.is_finite() || !(0.0..=10.0).contains(v))
            .map(|(dimension, value)| SchemaViolation::ScoreOutOfRange { dimension, value })
            .collect();

        let computed = scores.mean();
        if !submission.overall_score.is_finite()
            || (submission.overall_score - computed).abs() > AGGREGATE_TOLERANCE
        {
            violations.push(SchemaViolation::AggregateMismatch {
                reported: submission.overall_score,
                computed,
            });
        }

        let derived = scores.all_pass();
        if submission.approved != derived {
            violations.push(SchemaViolation::ApprovalMismatch {
                reported: submission.approved,
                derived,
            });
        }

        let fixed_story = submission.fixed_story.filter(|s| !s.trim().is_empty());
        match (derived, &fixed_story) {
            (false, None) => violations.push(SchemaViolation::MissingFixedStory),
            (true, Some(_)) => violations.push(SchemaViolation::UnexpectedFixedStory),
            (false, Some(story)) => violations.extend(
                lint_story(story, &LengthPolicy::strict(length.min_words, length.max_words))
                    .into_iter()
                    .map(|issue| SchemaViolation::FixedStory { issue }),
            ),
            (true, None) => {}
        }

        if !violations.is_empty() {
            return Err(violations);
        }
        Ok(Self {
            scores,
            aggregate: computed,
            approved: derived,
            feedback: submission.feedback,
            fixed_story,
        })
    }

    pub fn scores(&self) -> &RubricScores {
        &self.scores
    }

    /// Mean of the five scores.
    pub fn aggregate(&self) -> f64 {
        self.aggregate
    }

    pub fn approved(&self) -> bool {
        self.approved
    }

    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    /// Present exactly when the story was not approved.
    pub fn fixed_story(&self) -> Option<&str> {
        self.fixed_story.as_deref()
    }

    pub fn state(&self) -> EvaluationState {
        if self.fixed_story.is_some() {
            EvaluationState::ScoredAndFixed
        } else {
            EvaluationState::Scored
        }
    }

    /// Dimensions that scored below the approval threshold.
    pub fn below_threshold(&self) -> Vec<(Dimension, f64)> {
        self.scores
            .iter()
            .filter(|(_, s)| *s < APPROVAL_THRESHOLD)
            .collect()
    }
}

/// Scores stories and supplies a fix when any dimension fails.
#[derive(Debug, Clone)]
pub struct RubricEvaluator {
    settings: CallSettings,
    length: LengthPolicy,
    max_attempts: u32,
}

impl Default for RubricEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RubricEvaluator {
    pub fn new() -> Self {
        Self {
            settings: CallSettings::new(2048, 0.1),
            length: LengthPolicy::default(),
            max_attempts: 2,
        }
    }

    pub fn with_settings(mut self, settings: CallSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_length_policy(mut self, length: LengthPolicy) -> Self {
        self.length = length;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Score `story`, re-asking with the violations when the record is invalid.
    pub async fn evaluate<O: Oracle + ?Sized>(
        &self,
        oracle: &O,
        story: &str,
    ) -> Result<EvaluationResult, EvaluationError> {
        let mut messages = vec![Message::user(format!(
            "Evaluate this story:\n\n{story}\n\nWord count: {}",
            word_count(story)
        ))];

        let mut attempt = 1;
        loop {
            let request = self
                .settings
                .apply(Request::new(messages.clone()))
                .with_system(self.system_prompt())
                .with_forced_tool(EvaluationSubmission::as_tool());
            let response = oracle.complete(request).await?;
            debug!(
                attempt,
                output_tokens = response.usage.output_tokens,
                "evaluation received"
            );

            let truncated = response.stop_reason == StopReason::MaxTokens;
            let mut violations = match parse_submission(&response) {
                Ok(submission) => match EvaluationResult::validate(submission, &self.length) {
                    Ok(_) if truncated => Vec::new(),
                    Ok(result) => {
                        info!(
                            aggregate = result.aggregate(),
                            approved = result.approved(),
                            state = ?result.state(),
                            "story evaluated"
                        );
                        return Ok(result);
                    }
                    Err(violations) => violations,
                },
                Err(violation) => vec![violation],
            };
            if truncated {
                violations.push(SchemaViolation::Truncated);
            }

            if attempt >= self.max_attempts {
                return Err(EvaluationError::Schema {
                    attempts: attempt,
                    violations,
                });
            }
            warn!(attempt, violations = %join_violations(&violations), "evaluation rejected, asking again");

            // Report the problems against the rejected call so the next
            // submission can correct them.
            if let Some(call) = response.tool_uses().into_iter().next() {
                messages.push(response.to_message());
                messages.push(Message::new(
                    Role::User,
                    vec![ContentBlock::tool_result(
                        call.id,
                        ToolResult::error(format!(
                            "Invalid submission: {}. Call submit_evaluation again with every field corrected.",
                            join_violations(&violations)
                        )),
                    )],
                ));
            }
            attempt += 1;
        }
    }

    pub fn system_prompt(&self) -> String {
        EVALUATOR_PROMPT
            .replace("{min_words}", &self.length.min_words.to_string())
            .replace("{max_words}", &self.length.max_words.to_string())
    }
}

fn parse_submission(response: &Response) -> Result<EvaluationSubmission, SchemaViolation> {
    let call = response
        .tool_uses()
        .into_iter()
        .find(|c| c.name == EvaluationSubmission::tool_name())
        .ok_or(SchemaViolation::NotSubmitted)?;
    serde_json::from_value(call.input).map_err(|e| SchemaViolation::Malformed {
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{evaluation_input, sample_story, tool_response, ScriptedOracle};
    use claude::ToolChoice;
    use serde_json::json;

    fn submission(scores: [f64; 5], fixed: Option<&str>) -> EvaluationSubmission {
        serde_json::from_value(evaluation_input(scores, fixed)).unwrap()
    }

    fn validate(s: EvaluationSubmission) -> Result<EvaluationResult, Vec<SchemaViolation>> {
        EvaluationResult::validate(s, &LengthPolicy::default())
    }

    #[test]
    fn test_approved_story() {
        let result = validate(submission([9.0, 8.0, 7.0, 9.0, 8.5], None)).unwrap();
        assert!(result.approved());
        assert_eq!(result.state(), EvaluationState::Scored);
        assert!((result.aggregate() - 8.3).abs() < 1e-9);
        assert!(result.below_threshold().is_empty());
        assert!(result.fixed_story().is_none());
    }

    #[test]
    fn test_one_low_dimension_blocks_approval() {
        // Mean is 8.0, above the threshold, but conciseness fails.
        let fixed = sample_story(450);
        let result = validate(submission([9.0, 9.0, 5.0, 9.0, 8.0], Some(&fixed))).unwrap();
        assert!(!result.approved());
        assert_eq!(result.state(), EvaluationState::ScoredAndFixed);
        assert_eq!(result.below_threshold(), vec![(Dimension::Conciseness, 5.0)]);
        assert_eq!(result.fixed_story(), Some(fixed.as_str()));
    }

    #[test]
    fn test_aggregate_approval_is_rejected() {
        let mut s = submission([9.0, 9.0, 5.0, 9.0, 8.0], Some(&sample_story(450)));
        s.approved = true;
        let violations = validate(s).unwrap_err();
        assert!(violations.contains(&SchemaViolation::ApprovalMismatch {
            reported: true,
            derived: false,
        }));
    }

    #[test]
    fn test_wrong_overall_score() {
        let mut s = submission([8.0; 5], None);
        s.overall_score = 7.2;
        assert!(matches!(
            validate(s).unwrap_err()[..],
            [SchemaViolation::AggregateMismatch { .. }]
        ));
    }

    #[test]
    fn test_score_out_of_range() {
        let mut s = submission([8.0; 5], None);
        s.scores.engagement = 11.0;
        s.overall_score = s.scores.mean();
        let violations = validate(s).unwrap_err();
        assert!(violations.contains(&SchemaViolation::ScoreOutOfRange {
            dimension: Dimension::Engagement,
            value: 11.0,
        }));
    }

    #[test]
    fn test_fixed_story_rules() {
        assert_eq!(
            validate(submission([6.0, 8.0, 8.0, 8.0, 8.0], None)).unwrap_err(),
            vec![SchemaViolation::MissingFixedStory]
        );
        assert_eq!(
            validate(submission([6.0, 8.0, 8.0, 8.0, 8.0], Some("   "))).unwrap_err(),
            vec![SchemaViolation::MissingFixedStory]
        );
        assert_eq!(
            validate(submission([8.0; 5], Some(&sample_story(450)))).unwrap_err(),
            vec![SchemaViolation::UnexpectedFixedStory]
        );
        // An empty fixed story on an approved record counts as absent.
        assert!(validate(submission([8.0; 5], Some(""))).is_ok());

        let short_fix = validate(submission([6.0, 8.0, 8.0, 8.0, 8.0], Some(&sample_story(80))));
        assert!(matches!(
            short_fix.unwrap_err()[..],
            [SchemaViolation::FixedStory { issue: StoryIssue::TooShort { words: 80, .. } }]
        ));
    }

    #[test]
    fn test_fixed_story_uses_the_exact_band() {
        // 380 and 520 words pass a writer's tolerance but not a repair.
        for (words, low) in [(380, true), (520, false)] {
            let fix = sample_story(words);
            let violations =
                validate(submission([6.0, 8.0, 8.0, 8.0, 8.0], Some(&fix))).unwrap_err();
            match &violations[..] {
                [SchemaViolation::FixedStory { issue: StoryIssue::TooShort { minimum, .. } }] => {
                    assert!(low);
                    assert_eq!(*minimum, 400);
                }
                [SchemaViolation::FixedStory { issue: StoryIssue::TooLong { maximum, .. } }] => {
                    assert!(!low);
                    assert_eq!(*maximum, 500);
                }
                other => panic!("unexpected violations: {other:?}"),
            }
        }
        assert!(validate(submission([6.0, 8.0, 8.0, 8.0, 8.0], Some(&sample_story(400)))).is_ok());
        assert!(validate(submission([6.0, 8.0, 8.0, 8.0, 8.0], Some(&sample_story(500)))).is_ok());
    }

    #[test]
    fn test_submission_schema() {
        let tool = EvaluationSubmission::as_tool();
        assert_eq!(tool.name, "submit_evaluation");
        let schema = &tool.input_schema;
        assert_eq!(schema["properties"]["scores"]["type"], "object");
        assert_eq!(
            schema["properties"]["scores"]["properties"]["conciseness"]["maximum"],
            10.0
        );
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(required, vec!["scores", "overall_score", "approved", "feedback"]);
    }

    #[tokio::test]
    async fn test_evaluate_forces_the_submission_tool() {
        let oracle = ScriptedOracle::new().then_evaluation([8.0, 8.0, 8.0, 8.0, 8.0], None);
        let story = sample_story(450);

        let result = RubricEvaluator::new().evaluate(&oracle, &story).await.unwrap();
        assert!(result.approved());

        let request = &oracle.requests()[0];
        assert_eq!(
            request.tool_choice,
            Some(ToolChoice::Tool { name: "submit_evaluation".to_string() })
        );
        assert_eq!(request.temperature, Some(0.1));
        assert!(request.messages[0].text().ends_with("Word count: 450"));
    }

    #[tokio::test]
    async fn test_missing_field_is_re_asked_then_fails() {
        let incomplete = json!({
            "scores": { "age_appropriate": 8, "grounded": 8, "conciseness": 8, "engagement": 8 },
            "overall_score": 8,
            "approved": true,
            "feedback": "ok"
        });
        let oracle = ScriptedOracle::new()
            .then_tool_use("tu_1", "submit_evaluation", incomplete.clone())
            .then_tool_use("tu_2", "submit_evaluation", incomplete);

        let err = RubricEvaluator::new()
            .evaluate(&oracle, &sample_story(450))
            .await
            .unwrap_err();

        match err {
            EvaluationError::Schema { attempts, violations } => {
                assert_eq!(attempts, 2);
                assert!(matches!(violations[..], [SchemaViolation::Malformed { .. }]));
            }
            other => panic!("unexpected error: {other}"),
        }

        // The second request carries the rejection as a tool error.
        let retry = &oracle.requests()[1];
        assert_eq!(retry.messages.len(), 3);
        assert!(matches!(
            &retry.messages[2].content[0],
            ContentBlock::ToolResult { is_error: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_truncated_submission_is_re_asked() {
        let fixed = sample_story(460);
        let mut cut_off = tool_response(vec![(
            "tu_1",
            "submit_evaluation",
            evaluation_input([6.0, 8.0, 8.0, 8.0, 8.0], Some(&fixed)),
        )]);
        cut_off.stop_reason = StopReason::MaxTokens;
        let oracle = ScriptedOracle::new()
            .then(cut_off)
            .then_evaluation([6.0, 8.0, 8.0, 8.0, 8.0], Some(&fixed));

        let result = RubricEvaluator::new()
            .evaluate(&oracle, &sample_story(450))
            .await
            .unwrap();
        assert_eq!(result.state(), EvaluationState::ScoredAndFixed);

        let retry = &oracle.requests()[1];
        assert!(matches!(
            &retry.messages[2].content[0],
            ContentBlock::ToolResult { is_error: true, content, .. } if content.contains("token limit")
        ));
    }

    #[tokio::test]
    async fn test_truncated_submission_fails_when_attempts_run_out() {
        let mut cut_off = tool_response(vec![(
            "tu_1",
            "submit_evaluation",
            evaluation_input([8.0; 5], None),
        )]);
        cut_off.stop_reason = StopReason::MaxTokens;
        let oracle = ScriptedOracle::new().then(cut_off);

        let err = RubricEvaluator::new()
            .with_max_attempts(1)
            .evaluate(&oracle, &sample_story(450))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Schema { ref violations, .. } if violations == &[SchemaViolation::Truncated]
        ));
    }

    #[tokio::test]
    async fn test_inconsistent_record_recovers_on_retry() {
        let mut inconsistent = evaluation_input([9.0, 9.0, 5.0, 9.0, 8.0], None);
        inconsistent["approved"] = json!(true);
        let fixed = sample_story(470);
        let oracle = ScriptedOracle::new()
            .then_tool_use("tu_1", "submit_evaluation", inconsistent)
            .then_evaluation([9.0, 9.0, 5.0, 9.0, 8.0], Some(&fixed));

        let result = RubricEvaluator::new()
            .evaluate(&oracle, &sample_story(450))
            .await
            .unwrap();
        assert_eq!(result.state(), EvaluationState::ScoredAndFixed);
        assert_eq!(result.fixed_story(), Some(fixed.as_str()));
    }
}
