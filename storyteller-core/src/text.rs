//! Story text checks: word counts, the length band, and meta-label detection.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `Step 1:` anywhere, a line opening with `Step 1.` or `Step 1)`, or a line
/// opening with an arc-stage or `Part N` heading.
static META_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)\bstep\s*\d+\s*:|^\s*(?:\*\*)?\s*step\s*\d+\s*[.)-]|^\s*(?:\*\*)?\s*(?:part\s*\d+|setup|inciting\s+incident|struggle|climax|resolution)\s*(?:\*\*)?\s*:",
    )
    .expect("meta-label pattern is valid")
});

/// Count whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The structural labels found in a story, in order of appearance.
pub fn meta_labels(text: &str) -> Vec<String> {
    META_LABEL
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Target story length and how far outside it a story may fall.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LengthPolicy {
    pub min_words: usize,
    pub max_words: usize,
    /// Fractional slack applied to both ends, e.g. `0.10` for ±10%.
    pub tolerance: f64,
}

impl Default for LengthPolicy {
    fn default() -> Self {
        Self {
            min_words: 400,
            max_words: 500,
            tolerance: 0.10,
        }
    }
}

impl LengthPolicy {
    /// An exact band with no slack.
    pub fn strict(min_words: usize, max_words: usize) -> Self {
        Self {
            min_words,
            max_words,
            tolerance: 0.0,
        }
    }

    /// Inclusive accepted word range after tolerance.
    pub fn accepted_range(&self) -> (usize, usize) {
        let tolerance = self.tolerance.max(0.0);
        let low = (self.min_words as f64 * (1.0 - tolerance)).floor().max(0.0) as usize;
        let high = (self.max_words as f64 * (1.0 + tolerance)).ceil() as usize;
        (low, high)
    }

    pub fn accepts(&self, words: usize) -> bool {
        let (low, high) = self.accepted_range();
        (low..=high).contains(&words)
    }
}

/// Something wrong with a story's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoryIssue {
    Empty,
    TooShort { words: usize, minimum: usize },
    TooLong { words: usize, maximum: usize },
    MetaLabels { labels: Vec<String> },
    /// The oracle stopped at its token limit mid-story.
    Truncated,
}

impl std::fmt::Display for StoryIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoryIssue::Empty => write!(f, "story is empty"),
            StoryIssue::TooShort { words, minimum } => {
                write!(f, "story has {words} words, below the minimum of {minimum}")
            }
            StoryIssue::TooLong { words, maximum } => {
                write!(f, "story has {words} words, above the maximum of {maximum}")
            }
            StoryIssue::MetaLabels { labels } => {
                write!(f, "story contains structural labels: {}", labels.join(", "))
            }
            StoryIssue::Truncated => write!(f, "story was cut off at the token limit"),
        }
    }
}

/// Check a story against the length band and the no-labels rule.
pub fn lint_story(text: &str, policy: &LengthPolicy) -> Vec<StoryIssue> {
    let words = word_count(text);
    if words == 0 {
        return vec![StoryIssue::Empty];
    }

    let mut issues = Vec::new();
    let (low, high) = policy.accepted_range();
    if words < low {
        issues.push(StoryIssue::TooShort { words, minimum: low });
    } else if words > high {
        issues.push(StoryIssue::TooLong { words, maximum: high });
    }

    let labels = meta_labels(text);
    if !labels.is_empty() {
        issues.push(StoryIssue::MetaLabels { labels });
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_story;

    #[test]
    fn test_word_count() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("  Once upon\n\ta time  "), 4);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("\n  The fox\n\nran.  "), "The fox ran.");
    }

    #[test]
    fn test_default_band_with_tolerance() {
        let policy = LengthPolicy::default();
        assert_eq!(policy.accepted_range(), (360, 550));
        assert!(policy.accepts(400));
        assert!(policy.accepts(360));
        assert!(!policy.accepts(359));
        assert!(!policy.accepts(551));
    }

    #[test]
    fn test_strict_band() {
        let policy = LengthPolicy::strict(400, 500);
        assert!(policy.accepts(450));
        assert!(!policy.accepts(399));
        assert!(!policy.accepts(501));
    }

    #[test]
    fn test_meta_labels_detected() {
        let text = "Step 1: Luna lived in a tower.\nStep 2: A fairy came.";
        assert_eq!(meta_labels(text), vec!["Step 1:", "Step 2:"]);

        let headed = "Setup: The fox woke.\n**Climax:** The river rose.";
        assert_eq!(meta_labels(headed).len(), 2);

        let numbered = "Step 1. Luna lived in a tower.\n  Step 2) A fairy came.";
        assert_eq!(meta_labels(numbered), vec!["Step 1.", "Step 2)"]);
    }

    #[test]
    fn test_plain_prose_has_no_labels() {
        let text = "Each step she took was careful. The climax of the festival came at dusk, \
                    and the resolution of the quarrel made everyone smile.";
        assert!(meta_labels(text).is_empty());
        assert!(meta_labels("Pip hopped up to step 3. Then she rested.").is_empty());
        assert!(meta_labels("She counted the stairs: step 1) step 2) step 3).").is_empty());
    }

    #[test]
    fn test_lint_story() {
        let policy = LengthPolicy::default();
        assert_eq!(lint_story("   ", &policy), vec![StoryIssue::Empty]);
        assert!(lint_story(&sample_story(450), &policy).is_empty());
        assert!(matches!(
            lint_story(&sample_story(50), &policy)[..],
            [StoryIssue::TooShort { words: 50, minimum: 360 }]
        ));
        assert!(matches!(
            lint_story(&sample_story(700), &policy)[..],
            [StoryIssue::TooLong { words: 700, .. }]
        ));

        let labelled = format!("Step 1: {}", sample_story(440));
        assert!(matches!(
            lint_story(&labelled, &policy)[..],
            [StoryIssue::MetaLabels { .. }]
        ));
    }
}
