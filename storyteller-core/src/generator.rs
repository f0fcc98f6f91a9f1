//! Genre writers.
//!
//! A writer turns a directive into a story using its genre's persona, arc,
//! and example corpus. Output is checked against the length band and the
//! no-labels rule, and rejected outright when the oracle hit its token
//! limit. Rejected output is regenerated a bounded number of times before
//! the turn fails.

use crate::corpus::{CorpusError, CorpusStore};
use crate::genre::Genre;
use crate::oracle::{CallSettings, Oracle};
use crate::text::{lint_story, word_count, LengthPolicy, StoryIssue};
use claude::{Message, Request, StopReason};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

const REQUIREMENTS: &str = include_str!("prompts/writer_requirements.txt");
const CRAFT: &str = include_str!("prompts/writer_craft.txt");

/// Errors from a genre writer.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("oracle call failed: {0}")]
    Oracle(#[from] claude::Error),

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error("{genre} writer returned an empty story")]
    EmptyStory { genre: Genre },

    #[error("{genre} writer broke the story contract after {attempts} attempt(s): {}", join_issues(.issues))]
    Contract {
        genre: Genre,
        attempts: u32,
        issues: Vec<StoryIssue>,
    },
}

fn join_issues(issues: &[StoryIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A story produced by one writer invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedStory {
    pub genre: Genre,
    /// The writer's raw output, unmodified.
    pub text: String,
    pub word_count: usize,
    /// Oracle calls it took to get a story that passed the checks.
    pub attempts: u32,
}

/// Writes stories for any genre from the shared corpus.
#[derive(Debug, Clone)]
pub struct GenreWriter {
    corpus: CorpusStore,
    settings: CallSettings,
    length: LengthPolicy,
    max_attempts: u32,
}

impl GenreWriter {
    pub fn new(corpus: CorpusStore) -> Self {
        Self {
            corpus,
            settings: CallSettings::new(1200, 0.7),
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

    /// Write one story for `genre` from `directive`.
    pub async fn write<O: Oracle + ?Sized>(
        &self,
        oracle: &O,
        genre: Genre,
        directive: &str,
    ) -> Result<GeneratedStory, GenerationError> {
        let examples = self.corpus.load(genre).await?;
        let system = self.system_prompt(genre, directive, &examples);
        debug!(genre = %genre, prompt_chars = system.len(), "writer prompt built");

        let mut attempt = 1;
        loop {
            let request = self
                .settings
                .apply(Request::new(vec![Message::user(directive)]).with_system(&system));
            let response = oracle.complete(request).await?;
            let text = response.text();

            let mut issues = lint_story(&text, &self.length);
            if response.stop_reason == StopReason::MaxTokens {
                issues.push(StoryIssue::Truncated);
            }
            if issues.is_empty() {
                let words = word_count(&text);
                info!(genre = %genre, words, attempt, "story written");
                return Ok(GeneratedStory {
                    genre,
                    text,
                    word_count: words,
                    attempts: attempt,
                });
            }

            if attempt >= self.max_attempts {
                if issues == [StoryIssue::Empty] {
                    return Err(GenerationError::EmptyStory { genre });
                }
                return Err(GenerationError::Contract {
                    genre,
                    attempts: attempt,
                    issues,
                });
            }
            warn!(genre = %genre, attempt, issues = %join_issues(&issues), "story rejected, rewriting");
            attempt += 1;
        }
    }

    /// The full writer instruction for one genre and directive.
    pub fn system_prompt(&self, genre: Genre, directive: &str, examples: &str) -> String {
        let target = (self.length.min_words + self.length.max_words) / 2;
        let mut prompt = format!(
            "You are an expert {} writer for children ages 5-10.\n\n",
            genre.story_noun()
        );

        prompt.push_str(
            &REQUIREMENTS
                .replace("{min_words}", &self.length.min_words.to_string())
                .replace("{max_words}", &self.length.max_words.to_string())
                .replace("{target_words}", &target.to_string()),
        );

        prompt.push_str(
            "\nTHINK STEP-BY-STEP while writing (INTERNAL STRUCTURE ONLY - do NOT include \
             \"Step 1:\", \"Step 2:\" labels in your output):\n\n",
        );
        for (i, stage) in genre.arc().iter().enumerate() {
            prompt.push_str(&format!(
                "Step {}: {} ({}-{} words)\n",
                i + 1,
                stage.title,
                stage.words.0,
                stage.words.1
            ));
            for beat in stage.beats {
                prompt.push_str(&format!("   - {beat}\n"));
            }
            prompt.push('\n');
        }

        prompt.push_str(&CRAFT.replace("{palette}", genre.sensory_palette()));

        prompt.push_str("\nKEY ELEMENTS:\n");
        prompt.push_str(&format!(
            "- {}-{} words (critical!)\n",
            self.length.min_words, self.length.max_words
        ));
        prompt.push_str("- Age-appropriate vocabulary (5-10 years)\n");
        for element in genre.key_elements() {
            prompt.push_str(&format!("- {element}\n"));
        }
        prompt.push_str("- Warm tone and a happy ending\n");

        if !examples.trim().is_empty() {
            prompt.push_str("\nEXAMPLE STORIES (for reference - DO NOT COPY):\n");
            prompt.push_str(examples);
            prompt.push('\n');
        }

        prompt.push_str(
            "\nCRITICAL: Your output must be a clean, flowing narrative WITHOUT \"Step 1:\", \
             \"Step 2:\" labels. The steps above are for structure only - write one continuous story.\n\n",
        );
        prompt.push_str(&format!(
            "Write a {} based on: {directive}",
            genre.story_noun()
        ));
        prompt
    }
}
