use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(crate) const LIST_TOOLS_QUERY: &str =
    "query { tools { name description parameters } }";

pub(crate) const CALL_TOOL_MUTATION: &str = "mutation callTool($name: String!, \
     $arguments: JSON) { callTool(name: $name, arguments: $arguments) }";

#[derive(Debug, Serialize)]
pub(crate) struct Request<'a, V> {
    pub query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<V>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CallToolVariables<'a> {
    pub name: &'a str,
    pub arguments: &'a Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Response<D> {
    pub data: Option<D>,
    pub errors: Option<Vec<RemoteError>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RemoteError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolsData {
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CallToolData {
    pub call_tool: Value,
}

/// A tool as described by the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name of the tool.
    pub name: String,
    /// What the tool does, shown to the model.
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's arguments.
    #[serde(default = "empty_schema")]
    pub parameters: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}
