use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::error::ChatError;

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// Something that can deliver one message and return the reply text.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, message: &str) -> Result<String, ChatError>;
}

/// Client for the `POST {base}/chat` endpoint.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    chat_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Uses a preconfigured `reqwest` client (proxies, TLS roots, ...).
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            chat_url: chat_url(base_url),
        }
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }
}

#[async_trait]
impl ChatTransport for ChatClient {
    async fn send_message(&self, message: &str) -> Result<String, ChatError> {
        debug!(url = %self.chat_url, len = message.len(), "posting chat message");

        let response = self
            .client
            .post(&self.chat_url)
            .json(&ChatRequest { message })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "chat endpoint returned an error status");
            return Err(ChatError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        let body = response.text().await?;
        Ok(reply_from_body(&body))
    }
}

/// Builds the chat URL from a base URL, ignoring trailing slashes.
pub fn chat_url(base_url: &str) -> String {
    format!("{}/chat", base_url.trim().trim_end_matches('/'))
}

/// Reply text for a successful response body. Bodies that are not JSON are
/// shown verbatim.
pub fn reply_from_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(data) => extract_reply(&data),
        Err(err) => {
            debug!(error = %err, "chat response is not JSON, showing raw body");
            body.to_string()
        }
    }
}

/// Picks the `response` field out of a reply, or stringifies the whole value
/// when there is no usable one.
pub fn extract_reply(data: &Value) -> String {
    match data.get("response") {
        Some(response) if is_truthy(response) => match response {
            Value::String(text) => text.clone(),
            Value::Number(n) => js_number(n).to_string(),
            Value::Bool(b) => b.to_string(),
            other => stringify(other),
        },
        _ => stringify(data),
    }
}

/// Compact JSON text with keys in arrival order and integral floats written
/// without a fractional part (`1.0` becomes `1`).
fn stringify(value: &Value) -> String {
    normalize_numbers(value).to_string()
}

fn normalize_numbers(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(js_number(n)),
        Value::Array(items) => Value::Array(items.iter().map(normalize_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), normalize_numbers(item)))
                .collect(),
        ),
        other => other.clone(),
    }
}

// 2^53: beyond this an f64 no longer maps to a unique integer
const MAX_SAFE_FLOAT: f64 = 9_007_199_254_740_992.0;

fn js_number(n: &Number) -> Number {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < MAX_SAFE_FLOAT => {
            Number::from(f as i64)
        }
        _ => n.clone(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_field_is_used() {
        assert_eq!(extract_reply(&json!({"response": "hi"})), "hi");
    }

    #[test]
    fn test_missing_response_field_stringifies_payload() {
        assert_eq!(extract_reply(&json!({"foo": 1})), r#"{"foo":1}"#);
    }

    #[test]
    fn test_falsy_response_field_stringifies_payload() {
        assert_eq!(extract_reply(&json!({"response": ""})), r#"{"response":""}"#);
        assert_eq!(extract_reply(&json!({"response": null})), r#"{"response":null}"#);
        assert_eq!(extract_reply(&json!({"response": 0})), r#"{"response":0}"#);
    }

    #[test]
    fn test_non_string_response_field() {
        assert_eq!(extract_reply(&json!({"response": 42})), "42");
        assert_eq!(extract_reply(&json!({"response": true})), "true");
        assert_eq!(extract_reply(&json!({"response": ["a"]})), r#"["a"]"#);
    }

    #[test]
    fn test_non_object_payloads_are_stringified() {
        assert_eq!(extract_reply(&json!("plain")), r#""plain""#);
        assert_eq!(extract_reply(&json!([1, 2])), "[1,2]");
        assert_eq!(extract_reply(&json!(null)), "null");
    }

    #[test]
    fn test_raw_body_fallback() {
        assert_eq!(reply_from_body("not json at all"), "not json at all");
        assert_eq!(reply_from_body(r#"{"response":"ok"}"#), "ok");
    }

    #[test]
    fn test_stringified_payload_keeps_key_order() {
        let body = r#"{"status":"ok","detail":"x","code":3}"#;
        assert_eq!(reply_from_body(body), body);
        assert_eq!(
            reply_from_body(r#"{"response":"","z":{"b":1,"a":2}}"#),
            r#"{"response":"","z":{"b":1,"a":2}}"#
        );
    }

    #[test]
    fn test_integral_floats_lose_fraction() {
        assert_eq!(
            reply_from_body(r#"{"score":1.0,"ratio":0.5,"items":[2.0,-3.0]}"#),
            r#"{"score":1,"ratio":0.5,"items":[2,-3]}"#
        );
        assert_eq!(reply_from_body(r#"{"response":2.0}"#), "2");
        assert_eq!(reply_from_body(r#"{"response":2.5}"#), "2.5");
    }

    #[test]
    fn test_chat_url_strips_trailing_slash() {
        assert_eq!(chat_url("https://example.com/"), "https://example.com/chat");
        assert_eq!(chat_url("https://example.com"), "https://example.com/chat");
        assert_eq!(chat_url("http://localhost:8000/api//"), "http://localhost:8000/api/chat");
    }
}
