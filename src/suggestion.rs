use crate::config::Config;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on the number of candidates the oracle may return.
pub const MAX_SUGGESTIONS: usize = 3;

/// Fatal problems while fetching suggestions. None of them are retried.
#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error(
        "No Gemini API key found. Set it with `redo --set-api-key <key>` or export GEMINI_API_KEY=<key>"
    )]
    MissingApiKey,
    #[error("request to suggestion service failed: {0}")]
    Transport(String),
    #[error("suggestion service returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("suggestion service response has no reply text: {0}")]
    MissingReplyText(String),
    #[error("suggestion reply is not a JSON array of strings ({reason}): {reply}")]
    MalformedReply { reply: String, reason: String },
    #[error("suggestion reply must hold 1 to 3 commands, got {count}")]
    BadCardinality { count: usize },
}

/// One to three candidate commands for a single failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionList(Vec<String>);

// Never empty, so there is no `is_empty`.
#[allow(clippy::len_without_is_empty)]
impl SuggestionList {
    /// Builds a list, rejecting empty or oversized candidate sets.
    pub fn new(commands: Vec<String>) -> Result<Self, SuggestionError> {
        if commands.is_empty() || commands.len() > MAX_SUGGESTIONS {
            return Err(SuggestionError::BadCardinality {
                count: commands.len(),
            });
        }
        Ok(Self(commands))
    }

    /// Looks up a candidate by its 1-based display index.
    pub fn get(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.0.get(i))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Parses the oracle's text reply. No repair is attempted.
pub fn parse_reply(reply: &str) -> Result<SuggestionList, SuggestionError> {
    let commands: Vec<String> =
        serde_json::from_str(reply).map_err(|e| SuggestionError::MalformedReply {
            reply: reply.to_string(),
            reason: e.to_string(),
        })?;
    SuggestionList::new(commands)
}

/// Builds the single instruction sent to the oracle.
pub fn build_prompt(context: &[String], error_text: &str, failing_command: &str) -> String {
    format!(
        "My recent shell commands were: '{}'. \
I ran the command '{}' and it failed with the error '{}'. \
Suggest corrected commands that do what I intended. \
Give the full command each time rather than only the corrected fragment, \
for example YES: [\"rm foo.txt\"] NO: [\"rm\"]. \
Respond with a JSON array of between 1 and {} command strings, \
for example [\"echo hello\", \"echo Hello\"], and nothing else. \
Do not wrap the array in backticks or code fences and do not add any explanation.",
        context.join(","),
        failing_command,
        error_text,
        MAX_SUGGESTIONS
    )
}

/// Trait for anything that can propose replacements for a failed command.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn suggest(
        &self,
        context: &[String],
        error_text: &str,
        failing_command: &str,
    ) -> Result<SuggestionList, SuggestionError>;
}

/// Suggestion source backed by the Gemini `generateContent` endpoint.
pub struct GeminiSuggester<H: HttpClient> {
    http: H,
    api_base: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiSuggester<ReqwestHttpClient> {
    /// Creates a suggester from configuration using the reqwest client.
    ///
    /// A missing key is only reported when a suggestion is requested, so a
    /// command that succeeds never needs one.
    pub fn from_config(config: &Config) -> Self {
        Self::with_client(
            ReqwestHttpClient::new(),
            &config.api_base,
            &config.model,
            config.get_api_key(),
        )
    }
}

impl<H: HttpClient> GeminiSuggester<H> {
    pub fn with_client(http: H, api_base: &str, model: &str, api_key: Option<&str>) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(str::to_string),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    /// Pulls `candidates[0].content.parts[0].text` out of a response body.
    fn extract_reply_text(body: &str) -> Result<String, SuggestionError> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|_| SuggestionError::MissingReplyText(body.to_string()))?;

        value
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|candidate| candidate.pointer("/content/parts/0/text"))
            .and_then(|text| text.as_str())
            .map(str::to_string)
            .ok_or_else(|| SuggestionError::MissingReplyText(body.to_string()))
    }
}

#[async_trait]
impl<H: HttpClient> SuggestionSource for GeminiSuggester<H> {
    async fn suggest(
        &self,
        context: &[String],
        error_text: &str,
        failing_command: &str,
    ) -> Result<SuggestionList, SuggestionError> {
        let api_key = self.api_key.as_deref().ok_or(SuggestionError::MissingApiKey)?;
        let prompt = build_prompt(context, error_text, failing_command);
        let request_body = json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }]
        });

        info!("Requesting suggestions for: {}", failing_command);
        let response = self
            .http
            .post_json(
                &self.endpoint(),
                &[
                    ("x-goog-api-key", api_key),
                    ("content-type", "application/json"),
                ],
                &request_body,
            )
            .await
            .map_err(|e| SuggestionError::Transport(format!("{:#}", e)))?;

        if !response.is_success() {
            warn!("Suggestion service returned HTTP {}", response.status);
            return Err(SuggestionError::HttpStatus {
                status: response.status,
                body: response.body,
            });
        }

        let reply = Self::extract_reply_text(&response.body)?;
        debug!("Oracle reply: {}", reply);

        let suggestions = parse_reply(&reply)?;
        info!("Received {} suggestions", suggestions.len());
        Ok(suggestions)
    }
}

/// Offline suggestion source used in mock mode.
///
/// The canned reply goes through the same parser as a real oracle reply, so
/// malformed replies can be exercised end to end.
pub struct MockSuggester {
    reply: String,
}

impl MockSuggester {
    pub const DEFAULT_REPLY: &'static str = "[\"true\"]";

    pub fn new(reply: Option<String>) -> Self {
        Self {
            reply: reply.unwrap_or_else(|| Self::DEFAULT_REPLY.to_string()),
        }
    }
}

#[async_trait]
impl SuggestionSource for MockSuggester {
    async fn suggest(
        &self,
        _context: &[String],
        _error_text: &str,
        failing_command: &str,
    ) -> Result<SuggestionList, SuggestionError> {
        info!("Using mock suggestions for: {} (REDO_USE_MOCK=1)", failing_command);
        parse_reply(&self.reply)
    }
}
