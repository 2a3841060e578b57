use crate::Result;
use crate::llm::{LanguageModel, LlmRequest, Purpose};
use crate::prompts;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const MAX_KEY_TOKENS: u32 = 100;

/// Maps free-form semantic keys to canonical ones through the model.
///
/// Results are memoized for the life of the process. The model's trimmed
/// answer is trusted as-is.
pub struct KeyNormalizer {
    llm: Arc<dyn LanguageModel>,
    memo: Mutex<HashMap<String, String>>,
}

impl KeyNormalizer {
    /// Normalizer backed by `llm`.
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Canonical form of `key`.
    ///
    /// Blank input yields an empty key without calling the model. Model
    /// failures are returned to the caller.
    pub async fn normalize(&self, key: &str) -> Result<String> {
        if key.trim().is_empty() {
            return Ok(String::new());
        }

        if let Some(canonical) = self.memo.lock().await.get(key) {
            return Ok(canonical.clone());
        }

        let request = LlmRequest::new(Purpose::NormalizeKey, prompts::normalize_key(key))
            .with_max_output_tokens(MAX_KEY_TOKENS);
        let canonical = self.llm.complete(&request).await?.trim().to_string();
        debug!(key, canonical = %canonical, "normalized semantic key");

        self.memo
            .lock()
            .await
            .insert(key.to_string(), canonical.clone());
        Ok(canonical)
    }

    /// Number of memoized keys.
    pub async fn len(&self) -> usize {
        self.memo.lock().await.len()
    }

    /// Forget every memoized key.
    pub async fn clear(&self) {
        self.memo.lock().await.clear();
    }
}
