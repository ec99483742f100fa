//! LLM API interaction over an OpenAI-compatible chat completions endpoint.
//!
//! # Architecture
//!
//! The module uses a trait-based design so the movie extractor does not care
//! which backend answers:
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`ChatClient`]: `reqwest` implementation posting to `{api_base}/chat/completions`
//!
//! Calls are not retried; a failed call surfaces as an error to the caller.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::utils::truncate_for_log;

/// Trait for async LLM interaction.
///
/// Implementors send a prompt to a language model and return the textual
/// payload of its reply.
pub trait AskAsync {
    /// Send `text` as a single user message and return the reply content.
    async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>>;
}

/// Error returned when the API answers with a non-success status.
#[derive(Debug)]
pub struct ApiError {
    pub status: u16,
    /// Raw response body, kept for diagnosis.
    pub body: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API returned HTTP {}: {}", self.status, self.body)
    }
}

impl Error for ApiError {}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat completions client for OpenAI and compatible servers.
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl ChatClient {
    pub fn new(http: Client, api_base: &str, api_key: &str, model: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

impl AskAsync for ChatClient {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
        let t0 = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: text,
            }],
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let dt = t0.elapsed();

        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                elapsed_ms = dt.as_millis() as u64,
                body = %truncate_for_log(&body, 300),
                "API call failed"
            );
            return Err(Box::new(ApiError {
                status: status.as_u16(),
                body,
            }));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| format!("API response has no message content: {body}"))?;

        info!(
            elapsed_ms = dt.as_millis() as u64,
            bytes = content.len(),
            "API call succeeded"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client =
            ChatClient::new(Client::new(), "https://api.openai.com/v1/", "k", "gpt-3.5-turbo");
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
    }

    #[test]
    fn test_response_deserialization() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "[]" } }]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("[]"));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client = ChatClient::new(Client::new(), "http://localhost", "sk-secret", "m");
        assert!(!format!("{client:?}").contains("sk-secret"));
    }

    #[test]
    fn test_api_error_display_includes_payload() {
        let err = ApiError {
            status: 429,
            body: r#"{"error":"rate limited"}"#.to_string(),
        };
        assert_eq!(err.to_string(), r#"API returned HTTP 429: {"error":"rate limited"}"#);
    }
}
