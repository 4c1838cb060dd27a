use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::LlmError;
use crate::item::{DimensionScore, Item};
use crate::llm::{extract_json_block, LlmClient};

/// One axis of the evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimension {
    pub key: &'static str,
    pub description: &'static str,
    pub weight: f64,
}

/// Scoring contract: order and weights are fixed and sum to 1.0.
pub const DIMENSIONS: [Dimension; 5] = [
    Dimension {
        key: "education_relevance",
        description: "relevance to education",
        weight: 0.30,
    },
    Dimension {
        key: "impact",
        description: "popularity and impact",
        weight: 0.25,
    },
    Dimension {
        key: "novelty",
        description: "novelty and visual appeal",
        weight: 0.20,
    },
    Dimension {
        key: "depth",
        description: "extensibility and depth",
        weight: 0.15,
    },
    Dimension {
        key: "audience_fit",
        description: "match with the audience",
        weight: 0.10,
    },
];

pub const RELEVANCE_DIMENSION: &str = "education_relevance";

/// Items below this education relevance are out of scope.
pub const RELEVANCE_GATE: f64 = 6.0;

const MIN_DIMENSION_SCORE: f64 = 1.0;
const MAX_DIMENSION_SCORE: f64 = 10.0;
const EVALUATION_TEMPERATURE: f32 = 0.3;

/// Raw evaluator verdict before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Evaluation {
    #[serde(default)]
    pub dimensions: BTreeMap<String, DimensionScore>,
    #[serde(default)]
    pub summary: String,
}

/// External evaluation capability: title and summary in, per-dimension
/// scores and a summary out.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, title: &str, summary: &str) -> Result<Evaluation, LlmError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored(Item),
    /// Education relevance below the gate. Not an error.
    Rejected { item: Item, relevance: f64 },
    Failed { item: Item, reason: String },
}

pub struct Scorer {
    evaluator: Arc<dyn Evaluator>,
}

impl Scorer {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self { evaluator }
    }

    pub async fn score(&self, mut item: Item) -> ScoreOutcome {
        info!("Scoring: {}", truncate(&item.title, 60));

        let evaluation = match self.evaluator.evaluate(&item.title, &item.summary).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!("Evaluation failed for '{}': {}", item.title, e);
                return ScoreOutcome::Failed {
                    item,
                    reason: e.to_string(),
                };
            }
        };

        if let Err(reason) = validate_dimensions(&evaluation.dimensions) {
            warn!("Discarding evaluation for '{}': {}", item.title, reason);
            return ScoreOutcome::Failed { item, reason };
        }

        let relevance = evaluation.dimensions[RELEVANCE_DIMENSION].score;
        if relevance < RELEVANCE_GATE {
            info!(
                "Education relevance too low ({}), skipping '{}'",
                relevance, item.title
            );
            return ScoreOutcome::Rejected { item, relevance };
        }

        item.score = Some(composite_score(&evaluation.dimensions));
        if !evaluation.summary.trim().is_empty() {
            item.summary = evaluation.summary;
        }
        item.dimension_scores = Some(evaluation.dimensions);
        ScoreOutcome::Scored(item)
    }
}

/// Every dimension present with a score in 1..=10.
fn validate_dimensions(dimensions: &BTreeMap<String, DimensionScore>) -> Result<(), String> {
    for dimension in &DIMENSIONS {
        let score = dimensions
            .get(dimension.key)
            .ok_or_else(|| format!("missing dimension '{}'", dimension.key))?
            .score;
        if !(MIN_DIMENSION_SCORE..=MAX_DIMENSION_SCORE).contains(&score) {
            return Err(format!(
                "dimension '{}' scored {} outside 1-10",
                dimension.key, score
            ));
        }
    }
    Ok(())
}

/// Weighted sum of the validated dimension scores, rounded to 2 decimals.
pub fn composite_score(dimensions: &BTreeMap<String, DimensionScore>) -> f64 {
    let total: f64 = DIMENSIONS
        .iter()
        .map(|d| dimensions.get(d.key).map_or(0.0, |s| s.score) * d.weight)
        .sum();
    ((total * 100.0).round() / 100.0).clamp(0.0, MAX_DIMENSION_SCORE)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Evaluator backed by the chat-completions endpoint.
pub struct LlmEvaluator {
    client: Arc<LlmClient>,
    timeout: Duration,
}

impl LlmEvaluator {
    pub fn new(client: Arc<LlmClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(&self, title: &str, summary: &str) -> Result<Evaluation, LlmError> {
        let prompt = evaluation_prompt(title, summary);
        let text = self
            .client
            .complete(&prompt, EVALUATION_TEMPERATURE, self.timeout)
            .await?;
        let value = extract_json_block(&text).ok_or(LlmError::NoJsonBlock)?;
        serde_json::from_value(value).map_err(|e| LlmError::Malformed(e.to_string()))
    }
}

pub fn evaluation_prompt(title: &str, summary: &str) -> String {
    let mut prompt = String::from(
        "You assist a content creator in the education field. Score the news item below on each dimension.\n\
         Requirements:\n\
         - Give every dimension an integer score from 1 to 10 and a one-sentence rationale.\n\
         - Finish with a short English summary of the news.\n\
         Dimensions:\n",
    );
    for (idx, dimension) in DIMENSIONS.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} ({})\n",
            idx + 1,
            dimension.key,
            dimension.description
        ));
    }
    prompt.push_str(
        "Reply with JSON in exactly this shape:\n\
         {\n  \"dimensions\": {\n    \"education_relevance\": {\"score\": 8, \"rationale\": \"closely tied to education policy\"},\n    ...\n  },\n  \"summary\": \"...\"\n}\n",
    );
    prompt.push_str(&format!("News title: {}\nNews summary: {}\n", title, summary));
    prompt
}
