//! The chat workflow: an agent node and a tool node in a loop.


use std::sync::Arc;

use chatgraph_model::ModelProvider;

use crate::agent::AgentNode;
use crate::checkpoint::{Checkpointer, MemorySaver};
use crate::graph::{
    CompiledGraph, GraphError, MessagesState, RunConfig, RunStream, START,
    StateGraph,
};
use crate::message::Message;
use crate::model_client::RetryPolicy;
use crate::router::{AGENT_NODE, TOOLS_NODE, should_continue};
use crate::tool::{Tool, ToolNode};
use crate::trim::Trimmer;

/// [`ChatWorkflow`] builder.
#[derive(Debug)]
pub struct ChatWorkflowBuilder {
    agent: AgentNode,
    tools: ToolNode,
    recursion_limit: usize,
}

impl ChatWorkflowBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            agent: AgentNode::new(provider),
            tools: ToolNode::new(),
            recursion_limit: RunConfig::default().recursion_limit,
        }
    }

    /// Sets the system prompt sent before the history.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent = self.agent.with_system_prompt(prompt);
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.add_tool(tool);
        self
    }

    /// Sets how the history is trimmed before each model call.
    #[inline]
    pub fn with_trimmer(mut self, trimmer: Trimmer) -> Self {
        self.agent = self.agent.with_trimmer(trimmer);
        self
    }

    /// Sets how rate limited model calls are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.agent = self.agent.with_retry_policy(retry_policy);
        self
    }

    /// Sets how many node invocations one question may take.
    #[inline]
    pub fn with_recursion_limit(mut self, recursion_limit: usize) -> Self {
        self.recursion_limit = recursion_limit;
        self
    }

    /// Builds the workflow.
    pub fn build(self) -> ChatWorkflow {
        let agent = self.agent.with_tools(self.tools.definitions());
        ChatWorkflow {
            agent,
            tools: self.tools,
            recursion_limit: self.recursion_limit,
        }
    }
}

/// Answers questions by letting the model call tools until it is done.
///
/// ```text
/// START -> agent -> (tool calls?) -> tools -> agent -> ... -> END
/// ```
#[derive(Clone, Debug)]
pub struct ChatWorkflow {
    agent: AgentNode,
    tools: ToolNode,
    recursion_limit: usize,
}

impl ChatWorkflow {
    /// Returns the names of the registered tools.
    #[inline]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.tool_names()
    }

    /// Describes the workflow as a graph.
    pub fn create_graph(&self) -> StateGraph<MessagesState> {
        let mut graph = StateGraph::new();
        graph
            .add_node(AGENT_NODE, self.agent.clone())
            .add_node(TOOLS_NODE, self.tools.clone())
            .add_edge(START, AGENT_NODE)
            .add_conditional_edges(AGENT_NODE, |state: &MessagesState| {
                should_continue(&state.messages).next()
            })
            .add_edge(TOOLS_NODE, AGENT_NODE);
        graph
    }

    /// Compiles the workflow graph with the given checkpointer.
    #[inline]
    pub fn compile(
        &self,
        checkpointer: Option<Arc<dyn Checkpointer<MessagesState>>>,
    ) -> Result<CompiledGraph<MessagesState>, GraphError> {
        self.create_graph().compile(checkpointer)
    }

    /// Starts answering the last of `messages` and returns the run's
    /// events.
    ///
    /// `messages` is the whole conversation. Each call uses a fresh
    /// in-memory checkpointer, so nothing carries over between calls except
    /// what the caller passes in. `chat_id` becomes both the thread id and
    /// the run id.
    pub fn submit_question(
        &self,
        messages: Vec<Message>,
        chat_id: &str,
    ) -> Result<RunStream<MessagesState>, GraphError> {
        let checkpointer: Arc<dyn Checkpointer<MessagesState>> =
            Arc::new(MemorySaver::new());
        let graph = self.compile(Some(checkpointer))?;
        debug!("submitting question with {} messages", messages.len());
        graph.stream(
            messages,
            RunConfig::with_thread_id(chat_id)
                .with_run_id(chat_id)
                .with_recursion_limit(self.recursion_limit),
        )
    }
}
