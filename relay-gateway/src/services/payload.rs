//! Chat payload normalization and reply extraction over loosely shaped JSON.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::RelayConfig;

/// Accepted names for the model id, highest priority first.
pub const MODEL_KEYS: &[&str] = &["modelID", "modelId", "model"];
/// Accepted names for the message text, highest priority first.
pub const MESSAGE_KEYS: &[&str] = &["message", "text", "content"];
/// Accepted names for a part's text.
pub const PART_TEXT_KEYS: &[&str] = &["text", "content"];
pub const PROVIDER_KEYS: &[&str] = &["providerID"];

#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("message text required")]
    MissingMessage,

    #[error("model not allowed")]
    ModelNotAllowed(String),

    #[error("no model available")]
    NoModel,

    #[error("message parts invalid")]
    NoParts,
}

/// One outbound message part.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// A chat request after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Supplied model, or the first allow-listed one.
    pub model: String,
    pub provider: Option<String>,
    pub message: String,
    pub parts: Vec<MessagePart>,
}

/// The first of `keys` whose value is a non-empty string.
pub fn first_string<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

/// Like [`first_string`], but ignores whitespace-only values.
fn first_text<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

fn parts_array(value: &Value) -> &[Value] {
    value
        .get("parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

impl ChatRequest {
    /// Normalize a caller payload against the current relay settings.
    ///
    /// Checks run in order: message text present, model allow-listed,
    /// parts non-empty.
    pub fn from_payload(payload: &Value, config: &RelayConfig) -> Result<Self, PayloadError> {
        if !payload.is_object() {
            return Err(PayloadError::NotAnObject);
        }

        let model = first_string(payload, MODEL_KEYS);
        let provider = first_string(payload, PROVIDER_KEYS).map(str::to_string);

        let message = first_string(payload, MESSAGE_KEYS)
            .or_else(|| {
                parts_array(payload)
                    .iter()
                    .find_map(|p| first_text(p, PART_TEXT_KEYS))
            })
            .ok_or(PayloadError::MissingMessage)?
            .to_string();

        if let Some(model) = model {
            if !config.is_model_allowed(model) {
                return Err(PayloadError::ModelNotAllowed(model.to_string()));
            }
        }

        let parts = assemble_parts(payload, &message);
        if parts.is_empty() {
            return Err(PayloadError::NoParts);
        }

        let model = model
            .or_else(|| config.fallback_model())
            .ok_or(PayloadError::NoModel)?
            .to_string();

        Ok(Self {
            model,
            provider,
            message,
            parts,
        })
    }
}

/// Explicit non-blank parts when present, else one text part from `fallback`.
pub fn assemble_parts(payload: &Value, fallback: &str) -> Vec<MessagePart> {
    let explicit: Vec<MessagePart> = parts_array(payload)
        .iter()
        .filter(|p| p.is_object())
        .filter_map(|p| {
            let text = PART_TEXT_KEYS
                .iter()
                .find_map(|k| p.get(*k).and_then(Value::as_str))?;
            if text.trim().is_empty() {
                return None;
            }
            let kind = first_string(p, &["type"]).unwrap_or("text");
            Some(MessagePart {
                kind: kind.to_string(),
                text: text.to_string(),
            })
        })
        .collect();

    if !explicit.is_empty() {
        return explicit;
    }
    if fallback.trim().is_empty() {
        return Vec::new();
    }
    vec![MessagePart::text(fallback)]
}

/// Best-effort reply text from an upstream response or conversation detail.
///
/// Tries `message`, then `text`, then the concatenated `parts[].text`, then
/// the newest entry of `messages` carrying `content` or a part text.
pub fn extract_reply(data: &Value) -> Option<String> {
    if let Some(text) = first_text(data, &["message", "text"]) {
        return Some(text.to_string());
    }

    let joined: String = parts_array(data)
        .iter()
        .filter_map(|p| first_text(p, &["text"]))
        .collect();
    if !joined.is_empty() {
        return Some(joined);
    }

    data.get("messages")
        .and_then(Value::as_array)?
        .iter()
        .rev()
        .find_map(|m| {
            first_text(m, &["content"]).or_else(|| {
                parts_array(m)
                    .iter()
                    .find_map(|p| first_text(p, &["text"]))
            })
        })
        .map(str::to_string)
}
