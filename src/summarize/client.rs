use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Client, Method, Request};
use hyper_tls::HttpsConnector;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ApiError;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str =
    "You are an expert at summarizing video transcripts. Extract key points and main ideas concisely.";

/// The text summarization service, consumed as a black box: submit text,
/// get back summary text; may fail with auth, rate-limit, or
/// malformed-request errors.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, content: &str) -> Result<String, ApiError>;
}

/// hyper-based chat-completion client. The response is requested as a JSON
/// object with a single `summary` field.
pub struct OpenAiSummarizer {
    client: Client<HttpsConnector<HttpConnector>>,
    api_key: String,
    model: String,
    base: String,
    timeout: Duration,
}

impl OpenAiSummarizer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self::with_base(DEFAULT_API_BASE, api_key, model, timeout)
    }

    pub fn with_base(
        base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let https = HttpsConnector::new();
        Self {
            client: Client::builder().build::<_, Body>(https),
            api_key: api_key.into(),
            model: model.into(),
            base: base.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, content: &str) -> Result<String, ApiError> {
        debug!("submitting {} chars for summarization", content.len());
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {
                    "role": "user",
                    "content": format!(
                        "Summarize the following transcript in a clear, concise manner. \
                         Focus on the main points and key takeaways:\n\n{}",
                        content
                    ),
                },
            ],
            "response_format": {"type": "json_object"},
        });

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/chat/completions", self.base))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .map_err(|e| ApiError::transport(e.to_string()))?;

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| ApiError::transport(e.to_string()))?;
            let status = response.status().as_u16();
            let body = hyper::body::to_bytes(response.into_body())
                .await
                .map_err(|e| ApiError::transport(e.to_string()))?;
            if !(200..300).contains(&status) {
                let err = parse_summarizer_error(status, &body);
                warn!("summarization call failed: {}", err);
                return Err(err);
            }
            parse_completion(&body)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ApiError::timeout(self.timeout))?
    }
}

/// Extract the summary string out of a chat-completion response whose
/// message content is itself a JSON object with a `summary` field.
fn parse_completion(body: &[u8]) -> Result<String, ApiError> {
    #[derive(Deserialize)]
    struct Completion {
        choices: Vec<Choice>,
    }
    #[derive(Deserialize)]
    struct Choice {
        message: Message,
    }
    #[derive(Deserialize)]
    struct Message {
        content: Option<String>,
    }
    #[derive(Deserialize)]
    struct SummaryPayload {
        summary: String,
    }

    let completion: Completion = serde_json::from_slice(body)
        .map_err(|e| ApiError::transport(format!("malformed completion response: {}", e)))?;
    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ApiError::transport("completion response carried no content"))?;
    let payload: SummaryPayload = serde_json::from_str(&content).map_err(|e| {
        ApiError::transport(format!("summary content was not the expected JSON object: {}", e))
    })?;
    Ok(payload.summary)
}

/// `{"error": {"message": ..., "type": ..., "code": ...}}`, falling back to
/// the raw body text.
fn parse_summarizer_error(status: u16, body: &[u8]) -> ApiError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorPayload,
    }
    #[derive(Deserialize)]
    struct ErrorPayload {
        message: Option<String>,
        #[serde(rename = "type")]
        error_type: Option<String>,
        code: Option<String>,
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => {
            let reason = parsed.error.code.or(parsed.error.error_type);
            let message = parsed
                .error
                .message
                .unwrap_or_else(|| format!("summarizer returned HTTP {}", status));
            ApiError::new(status, reason, message)
        }
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let message = if text.trim().is_empty() {
                format!("summarizer returned HTTP {}", status)
            } else {
                text.into_owned()
            };
            ApiError::new(status, None, message)
        }
    }
}
