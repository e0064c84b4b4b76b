use chatgraph_core::tool::{self, Tool, ToolResult};
use serde_json::Value;

use crate::CatalogClient;
use crate::proto::ToolDefinition;

/// A catalog tool that can be registered with the chat workflow.
///
/// Arguments are forwarded to the catalog untouched. A string result is
/// returned as is, any other JSON value is returned serialized.
#[derive(Clone, Debug)]
pub struct CatalogTool {
    client: CatalogClient,
    definition: ToolDefinition,
}

impl CatalogTool {
    /// Wraps a tool definition obtained from `client`.
    #[inline]
    pub fn new(client: CatalogClient, definition: ToolDefinition) -> Self {
        Self { client, definition }
    }

    /// Returns the definition of the tool.
    #[inline]
    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }
}

impl Tool for CatalogTool {
    type Input = Value;

    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn parameter_schema(&self) -> &Value {
        &self.definition.parameters
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let name = self.definition.name.clone();
        async move {
            match client.call_tool(&name, &input).await {
                Ok(Value::String(output)) => Ok(output),
                Ok(output) => Ok(output.to_string()),
                Err(err) => {
                    Err(tool::Error::execution_error().with_reason(err.to_string()))
                }
            }
        }
    }
}
