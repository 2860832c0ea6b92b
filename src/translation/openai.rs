use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::capability::{CapabilityError, KeyedTerm, KeyedTranslation, TranslationCapability};
use super::prompts;
use crate::config::CapabilityConfig;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: Client,
    cfg: CapabilityConfig,
}

impl ChatCompletionsClient {
    pub fn new(cfg: CapabilityConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .context("building reqwest client")?;
        Ok(Self { http, cfg })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    #[instrument(skip_all, fields(model = %self.cfg.model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String, CapabilityError> {
        let body = ChatRequest {
            model: &self.cfg.model,
            temperature: self.cfg.temperature,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
        };
        let resp = self
            .http
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CapabilityError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&text, 500),
            });
        }
        let parsed: ChatResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!(chars = content.len(), "completion received");
        if content.trim().is_empty() {
            return Err(CapabilityError::Empty);
        }
        Ok(content)
    }
}

#[async_trait::async_trait]
impl TranslationCapability for ChatCompletionsClient {
    async fn translate_one(&self, text: &str) -> Result<String, CapabilityError> {
        let content = self
            .complete(prompts::SINGLE_RECORD_SYSTEM, &prompts::single_record_user(text))
            .await?;
        parse_sentence(&content)
    }

    async fn translate_batch(
        &self,
        terms: &[KeyedTerm],
    ) -> Result<Vec<KeyedTranslation>, CapabilityError> {
        let items_json = serde_json::to_string(terms)
            .map_err(|e| CapabilityError::Malformed(format!("encoding request: {e}")))?;
        let content = self
            .complete(prompts::BATCH_SYSTEM, &prompts::batch_user(&items_json))
            .await?;
        parse_batch(&content, terms)
    }

    /// Fails on transport errors, rejected credentials and server errors.
    /// Gateways that serve completions without a model listing answer 404
    /// or 405 here and still count as reachable.
    async fn health_check(&self) -> Result<(), CapabilityError> {
        let resp = self
            .http
            .get(self.endpoint("models"))
            .bearer_auth(&self.cfg.api_key)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let code = status.as_u16();
        if matches!(code, 401 | 403) || status.is_server_error() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CapabilityError::Status {
                status: code,
                body: truncate_for_log(&text, 500),
            });
        }
        warn!(status = code, "model listing unavailable; treating endpoint as reachable");
        Ok(())
    }
}

fn truncate_for_log(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}…")
    }
}

/// Drop a surrounding markdown code fence (```json ... ```), if any.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// One sentence, surrounding quotes removed.
pub fn parse_sentence(content: &str) -> Result<String, CapabilityError> {
    let text = strip_code_fence(content)
        .trim()
        .trim_matches(|c| c == '"' || c == '“' || c == '”')
        .trim();
    if text.is_empty() {
        Err(CapabilityError::Empty)
    } else {
        Ok(text.to_string())
    }
}

fn key_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a batch answer.
///
/// Keyed objects (`{"id", "text"}`, `translation` accepted for `text`) are the
/// contract. A bare string array is tolerated only when it has exactly one
/// entry per requested term; it is then keyed by position within this request.
pub fn parse_batch(
    content: &str,
    request: &[KeyedTerm],
) -> Result<Vec<KeyedTranslation>, CapabilityError> {
    let body = strip_code_fence(content);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| CapabilityError::Malformed(format!("not JSON: {e}")))?;

    // json-mode models wrap arrays in an object; take the first array field
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .ok_or_else(|| CapabilityError::Malformed("object without an array field".into()))?,
        other => {
            return Err(CapabilityError::Malformed(format!(
                "expected JSON array, got {}",
                type_name(&other)
            )))
        }
    };

    if !items.is_empty() && items.iter().all(Value::is_string) {
        if items.len() != request.len() {
            return Err(CapabilityError::Malformed(format!(
                "positional answer has {} items for {} terms",
                items.len(),
                request.len()
            )));
        }
        return Ok(request
            .iter()
            .zip(items)
            .map(|(term, v)| KeyedTranslation {
                key: term.key.clone(),
                text: v.as_str().unwrap_or_default().to_string(),
            })
            .collect());
    }

    items
        .into_iter()
        .map(|item| {
            let obj = item.as_object().ok_or_else(|| {
                CapabilityError::Malformed(format!("array item is {}", type_name(&item)))
            })?;
            let key = obj
                .get("id")
                .and_then(key_of)
                .ok_or_else(|| CapabilityError::Malformed("item without id".into()))?;
            let text = obj
                .get("text")
                .or_else(|| obj.get("translation"))
                .and_then(Value::as_str)
                .ok_or_else(|| CapabilityError::Malformed(format!("item {key} without text")))?;
            Ok(KeyedTranslation { key, text: text.to_string() })
        })
        .collect()
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
