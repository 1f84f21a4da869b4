use rand::{thread_rng, Rng};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use std::{thread, time::Duration};

use crate::error::ProviderError;

/// Anything that can turn a source line into a suggested translation.
pub trait SuggestionProvider: Send + Sync {
    fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider: String,

    #[serde(default)]
    pub api_key: String,

    pub model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    20
}

const MAX_RETRIES: usize = 3;
const BASE_DELAY_MS: u64 = 800;

fn backoff(attempt: usize) -> Duration {
    let jitter: u64 = thread_rng().gen_range(0..200);
    let ms = BASE_DELAY_MS * (2_u64.pow(attempt as u32)) + jitter;
    Duration::from_millis(ms)
}

fn endpoint_for(provider: &str) -> Result<&'static str, ProviderError> {
    match provider {
        "openai" => Ok("https://api.openai.com/v1/chat/completions"),
        "deepseek" => Ok("https://api.deepseek.com/v1/chat/completions"),
        other => Err(ProviderError::Unsupported(other.to_string())),
    }
}

/// OpenAI-compatible chat completion backend.
pub struct ChatProvider {
    client: Client,
    endpoint: &'static str,
    api_key: String,
    model: String,
}

impl ChatProvider {
    pub fn new(cfg: &ProviderConfig) -> Result<Self, ProviderError> {
        let endpoint = endpoint_for(&cfg.provider)?;

        // Every call is bounded; a hung provider becomes "no suggestion".
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        })
    }

    fn request(&self, body: &serde_json::Value) -> Result<String, ProviderError> {
        let resp = self
            .client
            .post(self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()?;

        let status = resp.status();
        // Read as text first so an error body is not lost when JSON parsing fails
        let text = resp.text()?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }

        let v: serde_json::Value = serde_json::from_str(&text)
            .map_err(|_| ProviderError::InvalidResponse("invalid JSON".into()))?;

        v.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|t| t.trim().to_string())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("missing choices[0].message.content".into())
            })
    }
}

impl SuggestionProvider for ChatProvider {
    fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": "You are a professional visual novel translator. Reply with the translation only, in a natural, casual register." },
                { "role": "user", "content": build_prompt(text, source_lang, target_lang) }
            ],
            "temperature": 0.3
        });

        let mut last_err = ProviderError::InvalidResponse("no attempt made".into());

        for attempt in 0..MAX_RETRIES {
            match self.request(&body) {
                Ok(t) => return Ok(t),
                Err(e) => {
                    let retry = should_retry(&e) && attempt + 1 < MAX_RETRIES;
                    last_err = e;
                    if !retry {
                        break;
                    }
                    thread::sleep(backoff(attempt));
                }
            }
        }

        Err(last_err)
    }
}

fn should_retry(err: &ProviderError) -> bool {
    match err {
        ProviderError::Http(_) => true,
        ProviderError::Status { status, .. } => StatusCode::from_u16(*status)
            .map(|s| {
                // 408/429/5xx are usually transient
                s == StatusCode::REQUEST_TIMEOUT
                    || s == StatusCode::TOO_MANY_REQUESTS
                    || s.is_server_error()
            })
            .unwrap_or(false),
        ProviderError::InvalidResponse(_) => true,
        ProviderError::Unsupported(_) => false,
    }
}

fn extract_error_message(body_text: &str) -> String {
    // { "error": { "message": "..." } } or { "message": "..." }
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body_text) {
        if let Some(msg) = v
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return msg.to_string();
        }
        if let Some(msg) = v.get("message").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
    }

    let trimmed = body_text.trim();
    match trimmed.char_indices().nth(400) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

fn build_prompt(text: &str, source_lang: &str, target_lang: &str) -> String {
    let mut p = String::new();

    p.push_str(&format!("Translate from {} to {}.\n", source_lang, target_lang));
    p.push_str("Text:\n");
    p.push_str(text.trim());

    p
}
