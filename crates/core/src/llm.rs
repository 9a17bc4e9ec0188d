//! LLM collaborator interface and the chat request schema.
//!
//! Provider HTTP clients live outside this crate; they plug in through
//! [`LlmCompleter`]. Whatever a completer returns is untrusted input and is
//! re-validated by the intent extractor.

use crate::error::{Error, LlmError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::mpsc;
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::Duration;

/// A fenced `json` block inside a free-text response.
static JSON_FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

/// Which model provider a request asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Offline,
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        }
    }

    /// Parse a provider name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "offline" => Some(Self::Offline),
            "gemini" => Some(Self::Gemini),
            "openai" | "chatgpt" => Some(Self::OpenAi),
            _ => None,
        }
    }
}

/// A chat message as it arrives at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub llm_provider: LlmProvider,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ChatRequest {
    /// Create an offline request.
    pub fn offline(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            llm_provider: LlmProvider::Offline,
            api_key: None,
        }
    }

    /// Reject requests that cannot be served before any work is done.
    pub fn validate(&self) -> Result<()> {
        let has_key = self
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if self.llm_provider != LlmProvider::Offline && !has_key {
            return Err(Error::InvalidRequest(format!(
                "API key required for {}",
                self.llm_provider.as_str()
            )));
        }
        Ok(())
    }
}

/// Raw output of an LLM call.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmOutput {
    Text(String),
    Json(Value),
}

impl LlmOutput {
    /// Size of the response, used for the response size limit.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.chars().count(),
            Self::Json(value) => value.to_string().chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pull a JSON object out of the response, if there is one.
    ///
    /// Text responses may hold a bare object or a fenced `json` block.
    pub fn json_object(&self) -> Option<serde_json::Map<String, Value>> {
        let value = match self {
            Self::Json(value) => value.clone(),
            Self::Text(text) => {
                let candidate = JSON_FENCE_REGEX
                    .captures(text)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str())
                    .unwrap_or_else(|| text.trim());
                serde_json::from_str(candidate).ok()?
            }
        };
        match value {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

/// A pluggable completion capability.
pub trait LlmCompleter: Send + Sync {
    /// Provider this completer talks to.
    fn provider(&self) -> LlmProvider;

    /// Complete a prompt.
    fn complete(&self, prompt: &str) -> std::result::Result<LlmOutput, LlmError>;
}

/// Run a completion with a bounded wait.
///
/// The call runs on its own thread; on timeout the caller stops waiting
/// and the thread's result is discarded.
pub fn complete_with_timeout(
    completer: Arc<dyn LlmCompleter>,
    prompt: String,
    timeout: Duration,
    max_response_chars: usize,
) -> std::result::Result<LlmOutput, LlmError> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("llm-{}", completer.provider().as_str()))
        .spawn(move || {
            let _ = tx.send(completer.complete(&prompt));
        })
        .map_err(|e| LlmError::Unavailable(format!("could not start LLM call: {}", e)))?;

    let output = match rx.recv_timeout(timeout) {
        Ok(result) => result?,
        Err(mpsc::RecvTimeoutError::Timeout) => return Err(LlmError::Timeout(timeout.as_secs())),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            return Err(LlmError::Provider("LLM call ended without a response".into()))
        }
    };

    let len = output.len();
    if len > max_response_chars {
        return Err(LlmError::ResponseTooLarge {
            len,
            max: max_response_chars,
        });
    }
    Ok(output)
}

/// Prompt asking the collaborator to turn a chat message into intent JSON.
pub fn intent_prompt(message: &str) -> String {
    format!(
        r#"Parse the following chat message into a JSON object with the fields:
topic, audience, context, key_message, template, visual_requests.
- template is one of "minimal", "corporate", "bold".
- visual_requests is a list of objects like {{"type": "diagram", "kind": "sequence", "subject": "login process"}};
  diagram kinds are "sequence" and "flowchart", chart kinds are "bar", "line" and "pie".
- Leave out any field the message does not specify.
Reply with the JSON object only.

Message: {message}
"#
    )
}

/// Completer that replays a fixed response. Useful for recorded provider
/// output and for tests.
#[derive(Debug, Clone)]
pub struct StaticCompleter {
    provider: LlmProvider,
    response: std::result::Result<LlmOutput, String>,
    delay: Duration,
}

impl StaticCompleter {
    /// Always answer with `output`.
    pub fn new(provider: LlmProvider, output: LlmOutput) -> Self {
        Self {
            provider,
            response: Ok(output),
            delay: Duration::ZERO,
        }
    }

    /// Always fail with a provider error.
    pub fn failing(provider: LlmProvider, message: impl Into<String>) -> Self {
        Self {
            provider,
            response: Err(message.into()),
            delay: Duration::ZERO,
        }
    }

    /// Wait before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl LlmCompleter for StaticCompleter {
    fn provider(&self) -> LlmProvider {
        self.provider
    }

    fn complete(&self, _prompt: &str) -> std::result::Result<LlmOutput, LlmError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.response.clone().map_err(LlmError::Provider)
    }
}
