//! Language-model seam.
//!
//! The pipeline talks to the model only through [`LanguageModel`]: prompt text
//! in, completion text out. [`GeminiClient`] is the production implementation;
//! tests script their own.

mod gemini;

pub use gemini::GeminiClient;

use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;

/// Pipeline step a completion is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Canonicalize a semantic cache key.
    NormalizeKey,
    /// Turn the user question into a search strategy.
    Analyze,
    /// Turn a strategy into a parameterized SQL query.
    GenerateSearch,
    /// Judge the rows and optionally propose a new strategy.
    Evaluate,
    /// Phrase the final answer.
    Respond,
}

impl Purpose {
    /// Stable identifier used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NormalizeKey => "normalize_key",
            Self::Analyze => "analyze",
            Self::GenerateSearch => "generate_search",
            Self::Evaluate => "evaluate",
            Self::Respond => "respond",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmRequest {
    /// Pipeline step.
    pub purpose: Purpose,
    /// Full prompt text.
    pub prompt: String,
    /// Output token cap; the client default applies when `None`.
    pub max_output_tokens: Option<u32>,
}

impl LlmRequest {
    /// Request with the client's default token cap.
    pub fn new(purpose: Purpose, prompt: impl Into<String>) -> Self {
        Self {
            purpose,
            prompt: prompt.into(),
            max_output_tokens: None,
        }
    }

    /// Override the output token cap.
    #[must_use]
    pub const fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }
}

/// Text completion provider.
///
/// Implementations may fail or time out; callers decide how to degrade.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `request.prompt` and return the raw response text.
    async fn complete(&self, request: &LlmRequest) -> Result<String>;
}

/// Model used when no client is configured: every completion fails with
/// [`Error::Config`] carrying `reason`.
#[derive(Debug, Clone)]
pub struct UnconfiguredModel {
    reason: String,
}

impl UnconfiguredModel {
    /// Model whose completions fail with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl LanguageModel for UnconfiguredModel {
    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        Err(Error::Config(format!("{} (requested for {})", self.reason, request.purpose)))
    }
}

/// Locate the JSON document inside a model response.
///
/// Accepts a ```` ```json ```` fence, a bare ```` ``` ```` fence, or raw text,
/// and narrows to the outermost `{...}` when there is surrounding prose.
#[must_use]
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();

    let fenced = if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + "```json".len()..];
        Some(body.find("```").map_or(body, |end| &body[..end]))
    } else if let Some(start) = trimmed.find("```") {
        let body = &trimmed[start + 3..];
        Some(body.find("```").map_or(body, |end| &body[..end]))
    } else {
        None
    };

    let candidate = fenced.unwrap_or(trimmed).trim();
    match (candidate.find('{'), candidate.rfind('}')) {
        (Some(start), Some(end)) if start < end => &candidate[start..=end],
        _ => candidate,
    }
}

/// Deserialize the JSON document embedded in a model response.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T> {
    let json = extract_json(text);
    serde_json::from_str(json).map_err(|e| {
        let preview: String = json.chars().take(200).collect();
        Error::Parse(format!("{e} in model output: {preview}"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Shape {
        satisfactorio: bool,
    }

    #[test]
    fn test_parses_json_fence() {
        let text = "Aquí está:\n```json\n{\"satisfactorio\": true}\n```\nGracias";
        assert_eq!(
            parse_structured::<Shape>(text).unwrap(),
            Shape { satisfactorio: true }
        );
    }

    #[test]
    fn test_parses_bare_fence() {
        let text = "```\n{\"satisfactorio\": false}\n```";
        assert_eq!(
            parse_structured::<Shape>(text).unwrap(),
            Shape { satisfactorio: false }
        );
    }

    #[test]
    fn test_parses_raw_text_with_prose() {
        let text = "Resultado: {\"satisfactorio\": true} fin";
        assert_eq!(extract_json(text), "{\"satisfactorio\": true}");
    }

    #[test]
    fn test_malformed_output_is_parse_error() {
        let err = parse_structured::<Shape>("no hay json aquí").unwrap_err();
        assert_eq!(err.category(), "parse");
    }

    #[tokio::test]
    async fn test_unconfigured_model_fails_with_config_error() {
        let model = UnconfiguredModel::new("GEMINI_API_KEY is not set");
        let err = model
            .complete(&LlmRequest::new(Purpose::Analyze, "hola"))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "config");
        assert!(err.to_string().contains("GEMINI_API_KEY is not set"));
        assert!(err.to_string().contains("analyze"));
    }

    #[test]
    fn test_request_builder() {
        let request = LlmRequest::new(Purpose::NormalizeKey, "x").with_max_output_tokens(100);
        assert_eq!(request.max_output_tokens, Some(100));
        assert_eq!(request.purpose.to_string(), "normalize_key");
    }
}
