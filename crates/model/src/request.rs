use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{OpaqueMessage, ToolCallRequest};

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The prompt, already trimmed and prefixed with the system message.
    pub messages: Vec<ModelMessage>,
    /// Tools the model is allowed to call.
    pub tools: Vec<ModelTool>,
}

/// A complete message in the prompt.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant turn that was not produced by this provider, e.g. one
    /// restored from a stored chat.
    Assistant(AssistantMessage),
    /// A tool call result.
    Tool(ToolCallResult),
    /// An assistant turn in the provider's own format.
    Opaque(OpaqueMessage),
}

/// An assistant message with the tool calls it requested.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// The text content.
    pub content: String,
    /// Tool calls requested in this message.
    pub tool_calls: Vec<ToolCallRequest>,
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallResult {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The result of the tool call.
    pub content: String,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}
