//! Conversation messages.
//!
//! These are the values that flow through the chat graph and get
//! checkpointed. They are richer than [`ModelMessage`]: assistant messages
//! keep their tool calls and usage so the turn router can inspect them.

use chatgraph_model::{
    AssistantMessage, ModelMessage, OpaqueMessage, TokenUsage, ToolCallRequest,
    ToolCallResult,
};
use serde::{Deserialize, Serialize};

/// A message in the conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// System instructions.
    System {
        /// The instructions.
        content: String,
    },
    /// A message typed by the user.
    Human {
        /// The user's text.
        content: String,
    },
    /// A message produced by the model.
    Ai(AiMessage),
    /// The output of a tool call.
    Tool(ToolMessage),
}

/// A message produced by the model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AiMessage {
    /// Provider-assigned id of the response, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The generated text.
    pub content: String,
    /// Tool calls the model wants to make.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Token usage reported for this response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// The provider's native form of this message, replayed in later
    /// requests when present.
    #[serde(skip)]
    pub opaque: Option<OpaqueMessage>,
}

/// The output of a tool call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMessage {
    /// Id of the tool call this message answers.
    pub tool_call_id: String,
    /// Name of the tool that ran.
    pub name: String,
    /// The tool output, or an error description.
    pub content: String,
    /// Whether `content` describes a failure.
    #[serde(default)]
    pub is_error: bool,
}

/// The type of a [`Message`], used to filter messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// [`Message::System`].
    System,
    /// [`Message::Human`].
    Human,
    /// [`Message::Ai`].
    Ai,
    /// [`Message::Tool`].
    Tool,
}

impl Message {
    /// Creates a system message.
    #[inline]
    pub fn system<S: Into<String>>(content: S) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[inline]
    pub fn human<S: Into<String>>(content: S) -> Self {
        Message::Human {
            content: content.into(),
        }
    }

    /// Creates a text-only model message.
    #[inline]
    pub fn ai<S: Into<String>>(content: S) -> Self {
        Message::Ai(AiMessage {
            content: content.into(),
            ..Default::default()
        })
    }

    /// Returns the type of this message.
    #[inline]
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::System { .. } => MessageKind::System,
            Message::Human { .. } => MessageKind::Human,
            Message::Ai(_) => MessageKind::Ai,
            Message::Tool(_) => MessageKind::Tool,
        }
    }

    /// Returns the text content of this message.
    #[inline]
    pub fn content(&self) -> &str {
        match self {
            Message::System { content } | Message::Human { content } => content,
            Message::Ai(msg) => &msg.content,
            Message::Tool(msg) => &msg.content,
        }
    }

    /// Returns the id used to replace this message in the state, if any.
    #[inline]
    pub fn id(&self) -> Option<&str> {
        match self {
            Message::Ai(msg) => msg.id.as_deref(),
            _ => None,
        }
    }

    /// Returns the tool calls requested by this message. Only model
    /// messages can request tool calls.
    #[inline]
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Message::Ai(msg) => &msg.tool_calls,
            _ => &[],
        }
    }

    /// Converts this message into the provider-neutral prompt form.
    pub fn to_model_message(&self) -> ModelMessage {
        match self {
            Message::System { content } => ModelMessage::System(content.clone()),
            Message::Human { content } => ModelMessage::User(content.clone()),
            Message::Ai(msg) => match &msg.opaque {
                Some(opaque) => ModelMessage::Opaque(opaque.clone()),
                None => ModelMessage::Assistant(AssistantMessage {
                    content: msg.content.clone(),
                    tool_calls: msg.tool_calls.clone(),
                }),
            },
            Message::Tool(msg) => ModelMessage::Tool(ToolCallResult {
                id: msg.tool_call_id.clone(),
                content: msg.content.clone(),
            }),
        }
    }
}
