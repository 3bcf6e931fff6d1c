//! Structured scene analysis returned by the extraction model.
//!
//! These types are the contract between the analysis stage and the LLM: they
//! provide JSON schema generation for prompting and semantic validation so
//! malformed payloads are refused before anything is written to storage or
//! the vector index.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::{AsRefStr, EnumIter};
use thiserror::Error;

const MAX_TITLE_CHARS: usize = 100;
const MIN_SUMMARY_CHARS: usize = 10;

/// Fixed emotion vocabulary. Payloads carrying any other key fail
/// deserialization outright, which the pipeline treats as a schema violation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Anticipation,
    Trust,
    Disgust,
}

/// Canonical structured payload for a single analyzed scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SceneAnalysis {
    /// Concise scene title.
    pub title: String,
    /// Two to three sentence summary.
    pub summary: String,
    /// Character names appearing in the scene.
    pub characters: Vec<String>,
    /// Locations referenced by the scene.
    pub locations: Vec<String>,
    /// Emotion scores, each in `[0, 1]`.
    #[serde(default)]
    pub emotions: BTreeMap<Emotion, f64>,
}

impl SceneAnalysis {
    /// Generate a JSON schema describing this payload, for prompt assembly.
    pub fn schema() -> JsonValue {
        let schema = schemars::schema_for!(SceneAnalysis);
        serde_json::to_value(&schema).expect("schema is serializable")
    }

    /// Validate semantic constraints beyond plain JSON typing.
    pub fn validate(&self) -> Result<(), AnalysisValidationError> {
        let mut issues = Vec::new();

        if self.title.trim().is_empty() {
            issues.push("title must not be empty".to_string());
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            issues.push(format!("title must be at most {MAX_TITLE_CHARS} characters"));
        }
        if self.summary.trim().chars().count() < MIN_SUMMARY_CHARS {
            issues.push(format!(
                "summary must be at least {MIN_SUMMARY_CHARS} characters"
            ));
        }
        for (idx, name) in self.characters.iter().enumerate() {
            if name.trim().is_empty() {
                issues.push(format!("characters[{idx}] must not be empty"));
            }
        }
        for (emotion, score) in &self.emotions {
            if !(0.0..=1.0).contains(score) {
                issues.push(format!(
                    "emotions.{} must be within [0, 1], got {score}",
                    emotion.as_ref()
                ));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(AnalysisValidationError { issues })
        }
    }

    /// Text used for the embedding call: the summary when present, the raw
    /// scene text otherwise.
    pub fn text_to_embed<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.summary.trim().is_empty() {
            fallback
        } else {
            &self.summary
        }
    }
}

/// Validation failures aggregated into a single error.
#[derive(Debug, Error)]
#[error("scene analysis validation failed: {issues:?}")]
pub struct AnalysisValidationError {
    pub issues: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_valid_analysis() -> SceneAnalysis {
        let mut emotions = BTreeMap::new();
        emotions.insert(Emotion::Joy, 0.2);
        emotions.insert(Emotion::Fear, 0.8);
        SceneAnalysis {
            title: "Rooftop confrontation".to_string(),
            summary: "Mara corners Janek on the rooftop and demands the ledger back."
                .to_string(),
            characters: vec!["MARA".to_string(), "JANEK".to_string()],
            locations: vec!["ROOFTOP".to_string()],
            emotions,
        }
    }

    #[test]
    fn validates_happy_path() {
        assert!(make_valid_analysis().validate().is_ok());
    }

    #[test]
    fn detects_invalid_fields() {
        let mut analysis = make_valid_analysis();
        analysis.title.clear();
        analysis.summary = "short".to_string();
        analysis.emotions.insert(Emotion::Anger, 1.5);

        let error = analysis.validate().expect_err("validation must fail");
        assert!(
            error.issues.iter().any(|issue| issue.contains("title")),
            "{:?}",
            error.issues
        );
        assert!(
            error.issues.iter().any(|issue| issue.contains("summary")),
            "{:?}",
            error.issues
        );
        assert!(
            error
                .issues
                .iter()
                .any(|issue| issue.contains("emotions.anger")),
            "{:?}",
            error.issues
        );
    }

    #[test]
    fn rejects_unknown_emotion_keys() {
        let payload = serde_json::json!({
            "title": "A title",
            "summary": "A summary that is long enough.",
            "characters": [],
            "locations": [],
            "emotions": { "nostalgia": 0.5 }
        });
        let parsed = serde_json::from_value::<SceneAnalysis>(payload);
        assert!(parsed.is_err(), "emotion keys outside the fixed set must fail");
    }

    #[test]
    fn rejects_unknown_top_level_fields() {
        let payload = serde_json::json!({
            "title": "A title",
            "summary": "A summary that is long enough.",
            "characters": [],
            "locations": [],
            "emotions": {},
            "mood": "tense"
        });
        assert!(serde_json::from_value::<SceneAnalysis>(payload).is_err());
    }

    #[test]
    fn embeds_summary_with_raw_text_fallback() {
        let analysis = make_valid_analysis();
        assert_eq!(analysis.text_to_embed("raw"), analysis.summary);

        let mut blank = make_valid_analysis();
        blank.summary = "   ".to_string();
        assert_eq!(blank.text_to_embed("raw"), "raw");
    }

    #[test]
    fn schema_generation_succeeds() {
        let schema = SceneAnalysis::schema();
        assert!(schema.is_object());
        assert!(schema.to_string().contains("emotions"));
    }
}
