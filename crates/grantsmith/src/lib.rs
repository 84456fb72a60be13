//! Grant proposal drafting engine for LLM-backed funding documents.
//!
//! `grantsmith` turns free-text output from a chat-completions provider into
//! strictly validated, arithmetically consistent proposal documents. The
//! generation provider is treated as an unreliable collaborator: its output
//! may be fenced, truncated mid-token, or numerically sloppy, and every
//! downstream consumer expects a well-formed [`Document`](model::Document)
//! whose budget sums exactly match the caller's target.
//!
//! The interesting work happens after generation:
//!
//! - [`extract`] — recovers a parseable JSON value from raw model text via an
//!   ordered chain of repair heuristics, and canonicalizes field-name
//!   variants through an explicit synonym table.
//! - [`budget`] — rebalances the nested budget hierarchy (items, breakdowns,
//!   partner allocations, work-package activities) to an exact target total.
//!   Always converges, never errors.
//! - [`outline`] — flattens a nested section template into a stable ordered
//!   outline and reconciles it against whatever sections were generated.
//! - [`rank`] — scores partners and knowledge fragments against a free-text
//!   context, both for consortium selection and for retrieval grounding.
//! - [`draft`] — the pipeline tying it together: prompt → provider →
//!   extract → normalize → enforce → persist.
//!
//! Everything else (the [`GenerationClient`] below, [`store`], the CLI, the
//! web crate) is plumbing around those four modules.
//!
//! # Getting started
//!
//! ```ignore
//! use grantsmith::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let api_key = std::env::var("OPENROUTER_KEY").unwrap();
//!     let client = GenerationClient::new(api_key)?;
//!     let store = DocumentStore::new(".grantsmith/proposals")
//!         .map_err(|e| e.to_string())?;
//!
//!     let drafter = Drafter::new(&client, &store, DrafterConfig::default());
//!     let request = GenerateRequest {
//!         idea: "AI-assisted irrigation scheduling for smallholder farms".into(),
//!         constraints: Constraints {
//!             target_budget: 250_000,
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!     let doc = drafter
//!         .generate(&request, &[], &[], None, None)
//!         .await
//!         .map_err(|e| e.to_string())?;
//!     println!("{}", doc.id);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`extract`] | Output extraction, repair-strategy chain, schema normalizer |
//! | [`budget`] | Budget consistency enforcement against an exact target |
//! | [`outline`] | Section template flattening and content reconciliation |
//! | [`rank`] | Relevance scoring of partners and knowledge fragments |
//! | [`draft`] | Generation/edit pipeline and the error taxonomy |
//! | [`store`] | Document store, object storage, template loading |
//! | [`api`] | Retry with backoff, transient/rate-limit error classification |
//! | [`model`] | The proposal data model (camelCase wire format) |

pub mod api;
pub mod budget;
pub mod draft;
pub mod extract;
pub mod model;
pub mod outline;
pub mod prelude;
pub mod rank;
pub mod store;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::api::retry::{RetryConfig, is_transient_error};

// ── Constants ──────────────────────────────────────────────────────

/// Default chat-completions endpoint (OpenRouter-compatible).
pub const DEFAULT_PROVIDER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for drafting calls.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-pro";

/// Maximum tokens for a full proposal draft. Long enough for a complete
/// document; truncation past this budget is what the repair engine exists for.
pub const DRAFT_MAX_TOKENS: u32 = 16384;

/// Maximum tokens for a scoped section edit.
pub const EDIT_MAX_TOKENS: u32 = 8192;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. The drafting prompts embed the schema of
/// [`Document`](model::Document) so the model knows the exact target shape.
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Only the fields this engine actually sends —
/// unused optional fields are omitted from serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// JSON output format type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ResponseFormatType {
    #[serde(rename = "json_object")]
    JsonObject,
}

/// JSON output mode. Drafting calls always request `json_object` — it cuts
/// down on fencing and prose, though it does not prevent truncation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: ResponseFormatType,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            fmt_type: ResponseFormatType::JsonObject,
        }
    }
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message in the conversation. Content is either plain text or a list of
/// multimodal parts (text plus an attached file).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A multimodal content part (OpenAI-style tagged union).
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    File { file: FilePart },
}

/// An attached file, carried inline as a base64 data URL.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FilePart {
    pub filename: String,
    pub file_data: String,
}

/// A binary attachment to a generation call (e.g. a funding call document).
#[derive(Clone, Debug)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Encode as a `data:` URL for inline transport.
    pub fn to_data_url(&self) -> String {
        use base64::{Engine as _, engine::general_purpose::STANDARD};
        format!(
            "data:{};base64,{}",
            self.mime_type,
            STANDARD.encode(&self.bytes)
        )
    }
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// A user message with an attached binary file.
    pub fn user_with_attachment(content: impl Into<String>, attachment: &Attachment) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: content.into(),
                },
                ContentPart::File {
                    file: FilePart {
                        filename: attachment.filename.clone(),
                        file_data: attachment.to_data_url(),
                    },
                },
            ]),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`GenerationClient::chat`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

impl ChatCompletion {
    /// Whether the provider cut the output at its token budget. Truncated
    /// output is exactly what the extraction repair chain is built for.
    pub fn truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenRouter-compatible chat completions API.
#[derive(Clone)]
pub struct GenerationClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    referer: String,
    title: String,
}

impl GenerationClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/grantsmith", "grantsmith")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("grantsmith/0.3")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_PROVIDER_URL.to_string(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Point the client at a different chat-completions endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        debug!(
            "generation request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "generation response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("generation API HTTP {status}: {text}"));
        }

        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("generation API error: {}", err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        let completion = match choice {
            Some(c) => ChatCompletion {
                content: c.message.content,
                usage: parsed.usage,
                finish_reason: c.finish_reason,
            },
            None => ChatCompletion {
                content: None,
                usage: parsed.usage,
                finish_reason: None,
            },
        };

        if completion.truncated() {
            warn!(
                "generation output truncated at the token budget ({} chars) — repair will run",
                completion.content.as_ref().map_or(0, |c| c.len())
            );
        }

        Ok(completion)
    }

    /// Send a chat completion request, retrying transient failures with
    /// exponential backoff. Permanent errors (auth, bad request) and
    /// exhausted retries return the last error unchanged so callers can
    /// still classify it (e.g. rate-limit detection).
    pub async fn chat_with_retry(
        &self,
        body: &ChatRequest,
        retry: &RetryConfig,
    ) -> Result<ChatCompletion, String> {
        let mut attempt = 0;
        loop {
            match self.chat(body).await {
                Ok(completion) => return Ok(completion),
                Err(e) if attempt < retry.max_retries && is_transient_error(&e) => {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(
                        "transient provider error (attempt {}/{}), retrying in {:.1}s: {e}",
                        attempt + 1,
                        retry.max_retries,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert!(matches!(sys.content, MessageContent::Text(ref t) if t == "hello"));

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);
    }

    #[test]
    fn chat_request_skips_unset_fields() {
        let req = ChatRequest {
            model: "test-model".into(),
            messages: vec![Message::user("hi")],
            max_tokens: 100,
            temperature: 0.5,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("top_p").is_none());
        assert!(json.get("stop").is_none());
        assert!(json.get("response_format").is_none());
        assert_eq!(json["max_tokens"], 100);
    }

    #[test]
    fn attachment_becomes_file_part() {
        let att = Attachment {
            filename: "call.pdf".into(),
            mime_type: "application/pdf".into(),
            bytes: vec![1, 2, 3],
        };
        let msg = Message::user_with_attachment("read this", &att);
        let json = serde_json::to_value(&msg).unwrap();
        let parts = json["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "file");
        let data_url = parts[1]["file"]["file_data"].as_str().unwrap();
        assert!(data_url.starts_with("data:application/pdf;base64,"));
    }

    #[test]
    fn plain_text_content_serializes_as_string() {
        let msg = Message::user("just text");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], "just text");
    }

    #[test]
    fn truncation_detected_from_finish_reason() {
        let completion = ChatCompletion {
            content: Some("{\"title\":".into()),
            usage: None,
            finish_reason: Some("length".into()),
        };
        assert!(completion.truncated());

        let done = ChatCompletion {
            content: Some("{}".into()),
            usage: None,
            finish_reason: Some("stop".into()),
        };
        assert!(!done.truncated());
    }

    #[test]
    fn response_format_serializes_as_json_object() {
        let fmt = ResponseFormat::json_object();
        let json = serde_json::to_value(&fmt).unwrap();
        assert_eq!(json["type"], "json_object");
    }
}
