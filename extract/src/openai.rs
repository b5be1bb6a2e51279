//! HTTP backend for OpenAI-compatible chat-completions endpoints.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::backend::{BackendError, ChatBackend};
use crate::chat::{ChatResponse, Message, ToolDescriptor};

const ERROR_BODY_PREVIEW: usize = 2000;

/// Endpoint, credentials and sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Full chat-completions URL.
    pub endpoint: String,
    /// Model identifier sent in every request.
    pub model: String,
    /// Bearer token; sent as `Authorization: Bearer ...` when present.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
    /// Nucleus sampling.
    pub top_p: Option<f64>,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            headers: BTreeMap::new(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            timeout_secs: 120,
        }
    }
}

impl ModelSettings {
    /// Checks the settings before any request is attempted.
    ///
    /// # Errors
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.trim().is_empty() {
            return Err("model endpoint must not be empty".to_string());
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(format!("model endpoint is not an http(s) URL: {}", self.endpoint));
        }
        if self.model.trim().is_empty() {
            return Err("model name must not be empty".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Builds the JSON request body. Tool fields are omitted when `tools` is empty.
    #[must_use]
    pub fn request_body(&self, messages: &[Message], tools: &[ToolDescriptor]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = self.max_tokens {
            body["max_tokens"] = json!(m);
        }
        if let Some(p) = self.top_p {
            body["top_p"] = json!(p);
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

/// [`ChatBackend`] that POSTs to an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    settings: ModelSettings,
}

impl OpenAiBackend {
    /// Builds the HTTP client with the configured headers and timeout.
    ///
    /// # Errors
    /// Returns `BackendError::Config` for invalid settings or header values.
    pub fn new(settings: ModelSettings) -> Result<Self, BackendError> {
        settings.validate().map_err(BackendError::Config)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &settings.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| BackendError::Config(format!("header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| BackendError::Config(format!("header value for '{name}': {e}")))?;
            headers.insert(name, value);
        }
        if let Some(key) = &settings.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| BackendError::Config(format!("api key: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        Ok(Self { client, settings })
    }

    /// The settings this backend was built from.
    #[must_use]
    pub const fn settings(&self) -> &ModelSettings {
        &self.settings
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ChatResponse, BackendError> {
        let body = self.settings.request_body(messages, tools);
        tracing::debug!(
            event = "chat_request",
            model = %self.settings.model,
            messages = messages.len(),
            tools = tools.len(),
        );

        let response = self
            .client
            .post(&self.settings.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: preview(&text),
            });
        }

        parse_response(&text)
    }
}

/// Decodes a 2xx body, surfacing `{"error": ...}` payloads as errors.
pub(crate) fn parse_response(text: &str) -> Result<ChatResponse, BackendError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| BackendError::Decode(format!("{e}: {}", preview(text))))?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), ToString::to_string);
        return Err(BackendError::Api(message));
    }

    let response: ChatResponse =
        serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))?;
    if response.choices.is_empty() {
        return Err(BackendError::Decode("response has no choices".to_string()));
    }
    Ok(response)
}

fn preview(text: &str) -> String {
    if text.len() <= ERROR_BODY_PREVIEW {
        return text.to_string();
    }
    let mut end = ERROR_BODY_PREVIEW;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::chat::{FinishReason, FunctionDescriptor};

    #[test]
    fn test_request_body_without_tools() {
        let settings = ModelSettings {
            model: "m".to_string(),
            max_tokens: Some(4096),
            ..ModelSettings::default()
        };
        let body = settings.request_body(&[Message::user("hi")], &[]);

        assert_eq!(body["model"], "m");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("top_p").is_none());
        assert!(body.get("temperature").is_none());
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_request_body_with_tools() {
        let tool = ToolDescriptor {
            kind: "function".to_string(),
            function: FunctionDescriptor {
                name: "think".to_string(),
                description: "d".to_string(),
                parameters: json!({"type": "object"}),
            },
        };
        let body = ModelSettings::default().request_body(&[Message::user("hi")], &[tool]);
        assert_eq!(body["tools"][0]["function"]["name"], "think");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn test_parse_response_error_payload() {
        let err = parse_response(r#"{"error": {"message": "quota exceeded"}}"#).unwrap_err();
        assert!(matches!(err, BackendError::Api(m) if m == "quota exceeded"));
    }

    #[test]
    fn test_parse_response_malformed() {
        assert!(matches!(
            parse_response("<html>bad gateway</html>"),
            Err(BackendError::Decode(_))
        ));
        assert!(matches!(
            parse_response(r#"{"choices": []}"#),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_response_ok() {
        let r = parse_response(
            r#"{"choices":[{"message":{"role":"assistant","content":"x"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(r.choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let settings = ModelSettings {
            endpoint: "ftp://x".to_string(),
            ..ModelSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(ModelSettings::default().validate().is_ok());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(ERROR_BODY_PREVIEW);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert!(p.len() <= ERROR_BODY_PREVIEW + 3);
    }
}
