//! Prompt assembly for the scene-analysis call.
//!
//! The prompt embeds the JSON schema of the expected payload so the model is
//! told exactly which shape to produce; the pipeline still validates the
//! response independently.

use std::sync::OnceLock;

use crate::model::SceneAnalysis;

fn schema_text() -> &'static str {
    static SCHEMA: OnceLock<String> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        serde_json::to_string_pretty(&SceneAnalysis::schema())
            .expect("analysis schema is serializable")
    })
}

/// Build the structured-extraction prompt for one scene.
pub fn scene_analysis_prompt(header: &str, text: &str) -> String {
    debug_assert!(!text.is_empty());
    format!(
        "You are a screenplay analyst. Analyze the following scene and respond \
with ONLY a single JSON object conforming to this schema (no prose, no code \
fences). Emotion scores must be between 0.0 and 1.0.\n\n\
JSON SCHEMA:\n{schema}\n\n\
SCENE HEADING: {header}\n\n\
SCENE TEXT:\n{text}",
        schema = schema_text(),
        header = header,
        text = text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_schema_heading_and_text() {
        let prompt = scene_analysis_prompt("INT. LAB - DAY", "Beakers bubble.");
        assert!(prompt.contains("INT. LAB - DAY"));
        assert!(prompt.contains("Beakers bubble."));
        assert!(prompt.contains("\"emotions\""));
        assert!(prompt.contains("JSON SCHEMA:"));
    }
}
