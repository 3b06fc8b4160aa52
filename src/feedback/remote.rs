//! Blocking clients for hosted text-generation services.

use super::{FeedbackMetrics, Prompt, TextGenerator};
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

pub(super) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const OPENAI_TEMPERATURE: f32 = 0.7;

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_MODEL: &str = "gemini-1.5-flash";

fn http_client(timeout: Duration, service: &'static str) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Request(e, service))
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
    refusal: Option<String>,
}

/// The first generated text, or why there is none.
fn chat_text(response: ChatResponse, service: &'static str) -> Result<String> {
    let mut refused = None;
    for choice in response.choices {
        if let Some(content) = choice.message.content {
            return Ok(content);
        }
        if let Some(refusal) = choice.message.refusal {
            refused = Some(refusal);
        } else if choice.finish_reason.as_deref() == Some("content_filter") {
            refused = Some("content filtered".to_owned());
        }
    }
    match refused {
        Some(reason) => Err(Error::TextGeneration(service, reason)),
        None => Err(Error::EmptyTextGeneration(service)),
    }
}

/// OpenAI chat completions.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout, "openai")?,
            api_key,
        })
    }
}

impl TextGenerator for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    #[instrument(name = "OpenAiClient::complete", skip(self, prompt), level = "debug")]
    fn complete(&self, prompt: &Prompt) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &prompt.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &prompt.user,
        });
        let request = ChatRequest {
            model: OPENAI_MODEL,
            messages,
            temperature: OPENAI_TEMPERATURE,
        };

        let response: ChatResponse = self
            .client
            .post(OPENAI_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| Error::Request(e, self.name()))?;
        debug!(message = "received completion", choices = response.choices.len());
        chat_text(response, self.name())
    }
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiReply>,
}

#[derive(Deserialize)]
struct GeminiReply {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Deserialize)]
struct GeminiReplyPart {
    text: Option<String>,
}

/// All candidate text joined, or why there is none.
fn gemini_text(response: GeminiResponse, service: &'static str) -> Result<String> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(Error::TextGeneration(
            service,
            format!("prompt blocked: {}", reason),
        ));
    }
    let text = response
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("");
    if text.is_empty() {
        Err(Error::EmptyTextGeneration(service))
    } else {
        Ok(text)
    }
}

/// Google Gemini `generateContent`.
pub struct GeminiClient {
    client: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout, "gemini")?,
            api_key,
        })
    }
}

impl TextGenerator for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn prompt(&self, metrics: &FeedbackMetrics) -> Prompt {
        Prompt::review(metrics)
    }

    #[instrument(name = "GeminiClient::complete", skip(self, prompt), level = "debug")]
    fn complete(&self, prompt: &Prompt) -> Result<String> {
        let text = match &prompt.system {
            Some(system) => format!("{}\n\n{}", system, prompt.user),
            None => prompt.user.clone(),
        };
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: &text }],
            }],
        };

        let url = format!("{}/{}:generateContent", GEMINI_URL, GEMINI_MODEL);
        let response: GeminiResponse = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| Error::Request(e, self.name()))?;

        gemini_text(response, self.name())
    }
}
