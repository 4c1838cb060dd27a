use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::rate_limit::RateLimiter;

/// Chat-completions client for an OpenAI-compatible endpoint.
///
/// Every request goes through the client's [`RateLimiter`], so the scorer and
/// the duplicate oracle built on one client share one rate floor.
pub struct LlmClient {
    http: Client,
    api_base: String,
    model: String,
    api_key: String,
    api_key_env: String,
    limiter: RateLimiter,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl LlmClient {
    /// Build a client, reading the API key from `config.api_key_env`.
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("EduNewsRadar/0.1 (RSS Evaluator)")
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            api_key_env: config.api_key_env.clone(),
            limiter: RateLimiter::new(config.min_interval()),
        })
    }

    /// Send a single user prompt and return the first choice's text.
    pub async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey(self.api_key_env.clone()));
        }

        self.limiter.acquire().await;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::EmptyCompletion)?;

        debug!("LLM completion: {} chars", content.len());
        Ok(content)
    }
}

/// First well-formed JSON object embedded in free text.
///
/// Models often wrap the payload in prose or code fences, so every `{` is
/// tried as a starting point and trailing text after the object is ignored.
pub fn extract_json_block(text: &str) -> Option<Value> {
    for (start, _) in text.match_indices('{') {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        if let Some(Ok(value @ Value::Object(_))) = values.next() {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_base: &str) -> LlmConfig {
        LlmConfig {
            api_base: api_base.to_string(),
            ..LlmConfig::default()
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] })
    }

    mod extract_json_block_tests {
        use super::*;

        #[test]
        fn test_bare_object() {
            let value = extract_json_block(r#"{"same_event": true}"#).unwrap();
            assert_eq!(value["same_event"], true);
        }

        #[test]
        fn test_object_surrounded_by_prose() {
            let text = "Sure! Here is the result:\n```json\n{\"same_event\": false}\n```\nHope it helps {really}.";
            let value = extract_json_block(text).unwrap();
            assert_eq!(value["same_event"], false);
        }

        #[test]
        fn test_nested_object() {
            let text = r#"Result: {"dimensions": {"depth": {"score": 7}}, "summary": "x"} done"#;
            let value = extract_json_block(text).unwrap();
            assert_eq!(value["dimensions"]["depth"]["score"], 7);
        }

        #[test]
        fn test_skips_malformed_prefix_block() {
            let text = r#"{not json} then {"ok": 1}"#;
            let value = extract_json_block(text).unwrap();
            assert_eq!(value["ok"], 1);
        }

        #[test]
        fn test_no_object() {
            assert!(extract_json_block("no braces here").is_none());
            assert!(extract_json_block("{ unterminated").is_none());
        }
    }

    mod complete_tests {
        use super::*;

        #[tokio::test]
        async fn test_complete_returns_first_choice() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/chat/completions"))
                .and(header("authorization", "Bearer test-key"))
                .and(body_partial_json(json!({ "model": "llama3-8b-8192" })))
                .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
                .expect(1)
                .mount(&server)
                .await;

            let client = LlmClient::with_api_key(&test_config(&server.uri()), "test-key").unwrap();
            let text = client
                .complete("ping", 0.2, Duration::from_secs(5))
                .await
                .unwrap();

            assert_eq!(text, "hello");
        }

        #[tokio::test]
        async fn test_missing_api_key_makes_no_request() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
                .expect(0)
                .mount(&server)
                .await;

            let client = LlmClient::with_api_key(&test_config(&server.uri()), "").unwrap();
            let result = client.complete("ping", 0.2, Duration::from_secs(5)).await;

            assert!(matches!(result, Err(LlmError::MissingApiKey(ref var)) if var == "GROQ_API_KEY"));
        }

        #[tokio::test]
        async fn test_http_error_status() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(429))
                .mount(&server)
                .await;

            let client = LlmClient::with_api_key(&test_config(&server.uri()), "k").unwrap();
            let result = client.complete("ping", 0.2, Duration::from_secs(5)).await;

            assert!(matches!(result, Err(LlmError::Request(_))));
        }

        #[tokio::test]
        async fn test_empty_choices() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
                .mount(&server)
                .await;

            let client = LlmClient::with_api_key(&test_config(&server.uri()), "k").unwrap();
            let result = client.complete("ping", 0.2, Duration::from_secs(5)).await;

            assert!(matches!(result, Err(LlmError::EmptyCompletion)));
        }

        #[tokio::test]
        async fn test_trailing_slash_in_api_base() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/chat/completions"))
                .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
                .expect(1)
                .mount(&server)
                .await;

            let base = format!("{}/", server.uri());
            let client = LlmClient::with_api_key(&test_config(&base), "k").unwrap();
            let text = client
                .complete("ping", 0.2, Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(text, "ok");
        }
    }
}
