use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::LlmError;
use crate::item::Item;
use crate::llm::{extract_json_block, LlmClient};

const ORACLE_TEMPERATURE: f32 = 0.2;

/// Decides whether two items report the same real-world event.
///
/// Implementations never fail: anything short of a clear "yes" is `false`.
#[async_trait]
pub trait DuplicateOracle: Send + Sync {
    async fn same_event(&self, a: &Item, b: &Item) -> bool;
}

/// Oracle backed by one chat-completions call per comparison.
pub struct LlmDuplicateOracle {
    client: Arc<LlmClient>,
    timeout: Duration,
}

impl LlmDuplicateOracle {
    pub fn new(client: Arc<LlmClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn ask(&self, a: &Item, b: &Item) -> Result<bool, LlmError> {
        let prompt = duplicate_prompt(a, b);
        let text = self
            .client
            .complete(&prompt, ORACLE_TEMPERATURE, self.timeout)
            .await?;
        let value = extract_json_block(&text).ok_or(LlmError::NoJsonBlock)?;
        value
            .get("same_event")
            .and_then(Value::as_bool)
            .ok_or_else(|| LlmError::Malformed("missing boolean 'same_event'".to_string()))
    }
}

#[async_trait]
impl DuplicateOracle for LlmDuplicateOracle {
    async fn same_event(&self, a: &Item, b: &Item) -> bool {
        match self.ask(a, b).await {
            Ok(same) => same,
            Err(e) => {
                warn!(
                    "Duplicate check failed for '{}' vs '{}': {}",
                    a.title, b.title, e
                );
                false
            }
        }
    }
}

pub fn duplicate_prompt(a: &Item, b: &Item) -> String {
    format!(
        "Decide whether the two news items below describe the same event. \
         Ignore language, wording and style; only judge whether they report the same event.\n\
         Title 1: {}\n\
         Summary 1: {}\n\
         Title 2: {}\n\
         Summary 2: {}\n\
         Reply in this format:\n\
         {{\"same_event\": true/false}}\n",
        a.title, a.summary, b.title, b.summary
    )
}
