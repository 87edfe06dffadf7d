//! Types and calls for OpenAI-compatible `chat/completions` endpoints.

use std::collections::VecDeque;

use derive_builder::Builder;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse(serde_json::Value);

/// Servers report request-level failures as a JSON error body, at times
/// with a 200 status. Deserialize the success shape first and fall back to
/// capturing the error payload.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
pub enum FallibleResponse<R> {
    Success(R),
    Error(ErrorResponse),
}

impl<R> From<FallibleResponse<R>> for Result<R, anyhow::Error> {
    fn from(response: FallibleResponse<R>) -> Self {
        match response {
            FallibleResponse::Success(r) => Ok(r),
            FallibleResponse::Error(err) => Err(err.into()),
        }
    }
}

impl From<ErrorResponse> for anyhow::Error {
    fn from(err: ErrorResponse) -> Self {
        anyhow::anyhow!(
            "API error:\n{}",
            serde_json::to_string_pretty(&err.0).expect("failed to serialize error response")
        )
    }
}

/// One round trip: POST the request, parse the completed response.
#[tracing::instrument(skip_all)]
pub async fn completion(
    base_url: &str,
    api_key: &str,
    request: &Request,
) -> Result<Response, anyhow::Error> {
    let response: FallibleResponse<Response> = raw_completion(
        &format!("{base_url}/chat/completions"),
        Some(api_key),
        &serde_json::to_value(request)?,
    )
    .await?
    .json()
    .await?;

    response.into()
}

pub(crate) async fn raw_completion(
    url: &str,
    api_key: Option<&str>,
    req: &serde_json::Value,
) -> Result<reqwest::Response, anyhow::Error> {
    log::debug!("POST {url}");
    let mut req_builder = reqwest::Client::new().post(url);
    if let Some(api_key) = api_key {
        req_builder = req_builder.bearer_auth(api_key);
    }

    let response: reqwest::Response = req_builder.json(req).send().await?;

    Ok(response)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListModelsResponse {
    data: Vec<Model>,
}

#[allow(unused)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    id: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    owned_by: String,
}

pub async fn list_models(base_url: &str, api_key: &str) -> anyhow::Result<Vec<String>> {
    let response: ListModelsResponse = reqwest::Client::new()
        .get(format!("{base_url}/models"))
        .bearer_auth(api_key)
        .send()
        .await?
        .json()
        .await?;

    Ok(response.data.into_iter().map(|model| model.id).collect())
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct Request {
    #[builder(default)]
    messages: Chat,

    model: String,

    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i32>,

    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,

    #[builder(default = "false")]
    stream: bool,

    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<String>,
}

impl Request {
    #[must_use]
    pub fn streamed(mut self) -> Self {
        self.stream = true;
        self
    }

    #[must_use]
    pub fn is_streamed(&self) -> bool {
        self.stream
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: Message,
    #[serde(default)]
    pub index: Option<i32>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub completion_tokens: i32,
    pub prompt_tokens: i32,
    pub total_tokens: i32,
}

impl Response {
    /// Content of the first candidate, when the server returned any.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|choice| choice.message.content())
    }
}

/// An optional system message plus the user/assistant turns, kept apart so
/// the system message cannot drift into the middle of the conversation. On
/// the wire this is the flat OpenAI `messages` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "VecDeque<Message>", try_from = "VecDeque<Message>")]
pub struct Chat {
    system: Option<String>,
    messages: VecDeque<Message>,
}

impl Default for Chat {
    fn default() -> Self {
        let mut messages = VecDeque::new();
        messages.push_back(Message::user("Hello!".to_string()));
        Self {
            system: None,
            messages,
        }
    }
}

impl From<Chat> for VecDeque<Message> {
    fn from(chat: Chat) -> Self {
        let mut messages = chat.messages;
        if let Some(system) = chat.system {
            messages.push_front(Message::system(system));
        }
        messages
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum ConversionError {
    #[error("system message must come first and appear only once")]
    MisplacedSystem,

    #[error("no user or assistant messages found")]
    Empty,
}

impl TryFrom<VecDeque<Message>> for Chat {
    type Error = ConversionError;

    fn try_from(messages: VecDeque<Message>) -> Result<Self, Self::Error> {
        messages.into_iter().collect()
    }
}

impl Chat {
    #[must_use]
    pub fn new(system: Option<String>, messages: VecDeque<Message>) -> Self {
        Self { system, messages }
    }

    #[must_use]
    pub fn start_new(system: Option<String>, user: String) -> Self {
        let mut messages = VecDeque::new();
        messages.push_back(Message::user(user));
        Self::new(system, messages)
    }
}

impl FromIterator<Message> for Result<Chat, ConversionError> {
    fn from_iter<T: IntoIterator<Item = Message>>(iter: T) -> Self {
        let mut iter = iter.into_iter().peekable();
        let system = match iter.peek() {
            Some(msg) if msg.is_system() => iter.next().map(|msg| msg.content),
            _ => None,
        };

        let messages: VecDeque<Message> = iter
            .map(|msg| {
                if msg.is_system() {
                    Err(ConversionError::MisplacedSystem)
                } else {
                    Ok(msg)
                }
            })
            .try_collect()?;

        if messages.is_empty() {
            return Err(ConversionError::Empty);
        }

        Ok(Chat { system, messages })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "system")]
    System,

    #[serde(rename = "assistant")]
    Assistant,

    #[serde(rename = "user")]
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn user(message: String) -> Self {
        Self {
            role: Role::User,
            content: message,
        }
    }

    #[must_use]
    pub fn system(message: String) -> Self {
        Self {
            role: Role::System,
            content: message,
        }
    }

    #[must_use]
    pub fn assistant(message: String) -> Self {
        Self {
            role: Role::Assistant,
            content: message,
        }
    }
}
