//! Generator-scored importance for memories offered without one.

use std::sync::LazyLock;

use regex::Regex;

use crate::llm::box_generator::BoxGenerator;
use crate::llm::json::{parse_model_json, preview};

/// Used when the generator fails or answers without a number.
pub const FALLBACK_IMPORTANCE: f64 = 0.5;

/// Characters of memory text included in the prompt.
const PROMPT_TEXT_CHARS: usize = 500;

static SCORE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b(0\.\d+|1\.0|1|0)\b").ok());

fn importance_prompt(content: &str) -> String {
    let excerpt: String = content.chars().take(PROMPT_TEXT_CHARS).collect();
    format!(
        "Rate how important this is to remember about the user long term.\n\n\
         Memory: \"{excerpt}\"\n\n\
         Scale:\n\
         - 0.9+: personal details, key facts (name, job, health)\n\
         - 0.7-0.8: preferences, habits, projects\n\
         - 0.5-0.6: ordinary conversation, information requests\n\
         - 0.3 or less: greetings, small talk, one-off questions\n\n\
         Reply with the number only (e.g. 0.75):"
    )
}

/// Read a score in `[0, 1]` from a reply. A bare JSON number wins; otherwise
/// the first decimal in the text is taken.
pub fn parse_importance(reply: &str) -> Option<f64> {
    let value = match parse_model_json::<f64>(reply) {
        Ok(value) => value,
        Err(_) => SCORE
            .as_ref()?
            .captures(reply)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())?,
    };
    (0.0..=1.0).contains(&value).then_some(value)
}

/// Ask `generator` how important `content` is.
#[tracing::instrument(name = "score_importance", skip_all, fields(len = content.len()))]
pub async fn score_importance(generator: &BoxGenerator, content: &str) -> f64 {
    match generator.generate(&importance_prompt(content)).await {
        Ok(reply) => match parse_importance(&reply) {
            Some(score) => {
                tracing::debug!(score, "importance scored");
                score
            }
            None => {
                tracing::warn!(reply = %preview(&reply), "importance reply had no score");
                FALLBACK_IMPORTANCE
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "importance scoring failed");
            FALLBACK_IMPORTANCE
        }
    }
}
