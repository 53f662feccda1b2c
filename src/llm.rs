use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::ChatError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Harm categories blocked at medium probability and above on every request.
const SAFETY_CATEGORIES: &[&str] = &["HARM_CATEGORY_HARASSMENT", "HARM_CATEGORY_HATE_SPEECH"];
const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";

/// A text-in, text-out generative model.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, credential: &str) -> Result<String, ChatError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url =
            dotenv::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = dotenv::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(base_url, model)
    }

    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn request_body(prompt: &str) -> serde_json::Value {
        let safety: Vec<serde_json::Value> = SAFETY_CATEGORIES
            .iter()
            .map(|category| {
                serde_json::json!({
                    "category": category,
                    "threshold": SAFETY_THRESHOLD,
                })
            })
            .collect();

        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}],
            }],
            "safetySettings": safety,
            "generationConfig": {
                "temperature": 0.7,
                "maxOutputTokens": 2048,
            },
        })
    }
}

/// Turn an error response body into something a user can read.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.error.message;
    }
    let trimmed = body.trim();
    if trimmed.starts_with('<') {
        if let Ok(text) = html2text::from_read(trimmed.as_bytes(), 120) {
            let text = text.trim();
            if !text.is_empty() {
                return format!("Gemini API error ({}): {}", status, text);
            }
        }
    } else if !trimmed.is_empty() {
        return format!("Gemini API error ({}): {}", status, trimmed);
    }
    format!("Gemini API error ({})", status)
}

/// Concatenate the first candidate's text parts.
fn extract_text(response: GenerateResponse) -> Result<String, ChatError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ChatError::Upstream(format!(
            "The request was blocked by Gemini safety filters ({})",
            reason
        )));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::Upstream("No response from Gemini".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "UNKNOWN".to_string());
        return Err(ChatError::Upstream(format!(
            "Gemini returned an empty response (finish reason: {})",
            reason
        )));
    }
    Ok(text)
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, prompt: &str, credential: &str) -> Result<String, ChatError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(ChatError::MissingCredential);
        }

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", credential)
            .json(&Self::request_body(prompt))
            .send()
            .await
            .map_err(|e| ChatError::Upstream(format!("Gemini request failed: {}", e)))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ChatError::Upstream(format!("Failed to read Gemini response: {}", e)))?;

        if !status.is_success() {
            return Err(ChatError::Upstream(error_message(status, &text)));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| ChatError::Upstream(format!("Failed to parse Gemini JSON: {}", e)))?;
        let output = extract_text(parsed)?;

        debug!(
            model = %self.model,
            prompt_len = prompt.len(),
            output_len = output.len(),
            "Gemini generation complete"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reply(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }]
        })
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
                "safetySettings": [
                    {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                    {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_MEDIUM_AND_ABOVE"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("<answer>hi</answer>")))
            .mount(&server)
            .await;

        let client = GeminiClient::new(server.uri(), DEFAULT_MODEL).unwrap();
        let text = client.generate("hello", "test-key").await.unwrap();
        assert_eq!(text, "<answer>hi</answer>");
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_request() {
        let server = MockServer::start().await;
        let client = GeminiClient::new(server.uri(), DEFAULT_MODEL).unwrap();
        let err = client.generate("hello", "  ").await.unwrap_err();
        assert!(matches!(err, ChatError::MissingCredential));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_message_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new(server.uri(), DEFAULT_MODEL).unwrap();
        let err = client.generate("hello", "key").await.unwrap_err();
        assert_eq!(err.to_string(), "Resource has been exhausted");
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = GeminiClient::new(server.uri(), DEFAULT_MODEL).unwrap();
        let err = client.generate("hello", "key").await.unwrap_err();
        assert!(matches!(err, ChatError::Upstream(msg) if msg.starts_with("Failed to parse Gemini JSON")));
    }

    #[test]
    fn test_multiple_parts_concatenated() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "<answer>"}, {"text": "42</answer>"}]}}]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "<answer>42</answer>");
    }

    #[test]
    fn test_blocked_prompt() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let err = extract_text(response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_empty_candidate() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"finishReason": "MAX_TOKENS"}]
        }))
        .unwrap();
        let err = extract_text(response).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn test_error_message_variants() {
        let status = reqwest::StatusCode::BAD_GATEWAY;
        assert_eq!(
            error_message(status, ""),
            "Gemini API error (502 Bad Gateway)"
        );
        assert_eq!(
            error_message(status, "upstream down"),
            "Gemini API error (502 Bad Gateway): upstream down"
        );
        let html = error_message(status, "<html><body><p>Server Error</p></body></html>");
        assert!(html.contains("Server Error"));
        assert!(!html.contains("<p>"));
    }
}
