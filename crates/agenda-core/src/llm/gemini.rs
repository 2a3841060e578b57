use super::{LanguageModel, LlmRequest};
use crate::config::LlmConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];
const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Gemini `generateContent` client with a one-shot fallback model.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    config: LlmConfig,
}

impl GeminiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no API key is configured.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Config("GEMINI_API_KEY is not set".into()))?;
        Self::with_api_key(config, api_key)
    }

    /// Build a client with an explicit key.
    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("agenda/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            config: config.clone(),
        })
    }

    async fn generate(&self, model: &str, prompt: &str, max_output_tokens: u32) -> Result<String> {
        let url = format!(
            "{}/models/{model}:generateContent",
            self.config.base_url.trim_end_matches('/')
        );
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                max_output_tokens,
            },
            safety_settings: SAFETY_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: SAFETY_THRESHOLD,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| timeout_or_network(model, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(300).collect();
            return Err(Error::Llm(format!("{model} returned {status}: {detail}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| timeout_or_network(model, e))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|part| part.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::Llm(format!(
                "{model} returned no content (possibly blocked by safety settings)"
            )));
        }
        Ok(text)
    }
}

fn timeout_or_network(model: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("{model} did not answer in time"))
    } else {
        Error::Network(err)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        let max_tokens = request
            .max_output_tokens
            .unwrap_or(self.config.max_output_tokens);
        let primary = &self.config.primary_model;

        match self.generate(primary, &request.prompt, max_tokens).await {
            Ok(text) => {
                debug!(model = %primary, purpose = %request.purpose, chars = text.len(), "completion received");
                Ok(text)
            },
            Err(primary_err) => {
                let fallback = &self.config.fallback_model;
                warn!(
                    model = %primary,
                    fallback = %fallback,
                    purpose = %request.purpose,
                    category = primary_err.category(),
                    error = %primary_err,
                    "primary model failed; retrying with fallback"
                );
                let fallback_tokens = max_tokens.min(self.config.fallback_max_output_tokens);
                self.generate(fallback, &request.prompt, fallback_tokens)
                    .await
                    .inspect_err(|e| {
                        warn!(model = %fallback, purpose = %request.purpose, error = %e, "fallback model failed");
                    })
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::llm::Purpose;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: server.uri(),
            timeout_secs: 5,
            ..LlmConfig::default()
        }
    }

    fn answer(text: &str) -> serde_json::Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
    }

    #[tokio::test]
    async fn test_primary_model_answers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": {"topK": 40, "maxOutputTokens": 2048},
                "safetySettings": [{"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer("hola")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::with_api_key(&config_for(&server), "test-key").unwrap();
        let text = client
            .complete(&LlmRequest::new(Purpose::Respond, "saluda"))
            .await
            .unwrap();
        assert_eq!(text, "hola");
    }

    #[tokio::test]
    async fn test_falls_back_with_capped_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:generateContent"))
            .and(body_partial_json(json!({"generationConfig": {"maxOutputTokens": 1024}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer("desde respaldo")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::with_api_key(&config_for(&server), "k").unwrap();
        let text = client
            .complete(&LlmRequest::new(Purpose::Analyze, "p"))
            .await
            .unwrap();
        assert_eq!(text, "desde respaldo");
    }

    #[tokio::test]
    async fn test_small_token_request_is_not_raised_for_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:generateContent"))
            .and(body_partial_json(json!({"generationConfig": {"maxOutputTokens": 100}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer("clave")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::with_api_key(&config_for(&server), "k").unwrap();
        let request = LlmRequest::new(Purpose::NormalizeKey, "p").with_max_output_tokens(100);
        assert_eq!(client.complete(&request).await.unwrap(), "clave");
    }

    #[tokio::test]
    async fn test_both_models_failing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let client = GeminiClient::with_api_key(&config_for(&server), "k").unwrap();
        let err = client
            .complete(&LlmRequest::new(Purpose::Evaluate, "p"))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "llm");
    }

    #[tokio::test]
    async fn test_blocked_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let client = GeminiClient::with_api_key(&config_for(&server), "k").unwrap();
        let err = client
            .complete(&LlmRequest::new(Purpose::Respond, "p"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no content"));
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(answer("tarde"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = LlmConfig {
            timeout_secs: 1,
            ..config_for(&server)
        };
        let client = GeminiClient::with_api_key(&config, "k").unwrap();
        let err = client
            .complete(&LlmRequest::new(Purpose::Respond, "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let err = GeminiClient::new(&LlmConfig::default()).err().unwrap();
        assert_eq!(err.category(), "config");
    }
}
