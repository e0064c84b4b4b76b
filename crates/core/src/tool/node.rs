use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chatgraph_model::{ModelTool, ToolCallRequest};
use futures_util::future::join_all;
use tracing::Instrument;

use super::{AnyTool, Error, Tool, ToolObject, ToolResult};
use crate::graph::{MessagesState, Node, NodeContext, NodeError, NodeEvent};
use crate::message::{Message, ToolMessage};

/// A graph node that runs the tool calls of the last model message.
///
/// All calls of one message run concurrently. Each call produces exactly
/// one [`ToolMessage`], in the order the model requested them. A failing
/// or unknown tool does not fail the node: the error is reported back to
/// the model as the tool's output so it can correct itself.
#[derive(Clone, Default)]
pub struct ToolNode {
    tools: HashMap<String, Arc<dyn ToolObject>>,
}

impl Debug for ToolNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolNode")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolNode {
    /// Creates a node without tools.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool. A tool with the same name is replaced.
    pub fn add_tool<T: Tool>(&mut self, tool: T) -> &mut Self {
        let name = tool.name().to_owned();
        if self
            .tools
            .insert(name.clone(), Arc::new(AnyTool(tool)))
            .is_some()
        {
            warn!("tool `{name}` is defined twice, keeping the last one");
        }
        self
    }

    /// Returns the names of the tools, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the definitions to send to the model, sorted by name.
    pub fn definitions(&self) -> Vec<ModelTool> {
        let mut definitions: Vec<_> =
            self.tools.values().map(|tool| tool.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    fn start(
        &self,
        req: &ToolCallRequest,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        match self.tools.get(&req.name) {
            Some(tool) => {
                trace!("calling tool ({}) with args: {:?}", req.id, req.arguments);
                tool.execute(req.arguments.clone())
            }
            None => {
                warn!("tool not found: {}", req.name);
                let reason = format!(
                    "{} is not a valid tool, try one of [{}].",
                    req.name,
                    self.tool_names().join(", ")
                );
                Box::pin(std::future::ready(Err(
                    Error::execution_error().with_reason(reason),
                )))
            }
        }
    }
}

#[async_trait]
impl Node<MessagesState> for ToolNode {
    async fn run(
        &self,
        state: &MessagesState,
        ctx: &NodeContext,
    ) -> Result<Vec<Message>, NodeError> {
        let calls = match state.messages.last() {
            Some(Message::Ai(msg)) if !msg.tool_calls.is_empty() => {
                &msg.tool_calls
            }
            _ => {
                return Err(NodeError::new(
                    "the last message has no tool calls to run",
                ));
            }
        };
        debug!("running {} tool calls", calls.len());

        let pending = calls.iter().map(|req| {
            let fut = self.start(req);
            let id = req.id.clone();
            let name = req.name.clone();
            let span = debug_span!("tool call", name = %name, id = %id);
            async move {
                ctx.emit(NodeEvent::ToolCallStarted {
                    id: id.clone(),
                    name: name.clone(),
                });
                let (content, is_error) = match fut.await {
                    Ok(output) => (output, false),
                    Err(err) => {
                        warn!("tool call failed: {err}");
                        (tool_error_content(&err), true)
                    }
                };
                ctx.emit(NodeEvent::ToolCallFinished {
                    id: id.clone(),
                    name: name.clone(),
                    is_error,
                });
                Message::Tool(ToolMessage {
                    tool_call_id: id,
                    name,
                    content,
                    is_error,
                })
            }
            .instrument(span)
        });
        Ok(join_all(pending).await)
    }
}

fn tool_error_content(err: &Error) -> String {
    format!("Error: {}\n Please fix your mistakes.", err.reason())
}
