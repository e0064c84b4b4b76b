//! A small state graph runtime.
//!
//! A graph is a set of named [`Node`]s connected by edges. Each node reads
//! the current state and returns an update, which is folded into the state
//! with [`GraphState::apply`]. After a node finishes, its outgoing edge (a
//! fixed target or a router function) decides which node runs next, until
//! the run reaches [`END`].
//!
//! Graphs are described with [`StateGraph`] and turned into a runnable
//! [`CompiledGraph`] with [`StateGraph::compile`].

mod builder;
mod error;
mod run;
mod stream;

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::Message;

pub use builder::StateGraph;
pub use error::{GraphError, NodeError};
pub use run::{CompiledGraph, DEFAULT_RECURSION_LIMIT, RunConfig};
pub use stream::{RunStream, StreamEvent};

/// The virtual node every run starts from.
pub const START: &str = "__start__";

/// The virtual node that ends a run.
pub const END: &str = "__end__";

/// The state carried through a graph run.
pub trait GraphState: Clone + Default + Send + Sync + 'static {
    /// What a node returns.
    type Update: Send + 'static;

    /// Folds a node's update into the state.
    fn apply(&mut self, update: Self::Update);
}

/// A state holding a list of conversation messages.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesState {
    /// The conversation so far.
    pub messages: Vec<Message>,
}

impl GraphState for MessagesState {
    type Update = Vec<Message>;

    /// Appends the messages. A message with the same id as an existing one
    /// replaces it in place.
    fn apply(&mut self, update: Self::Update) {
        for msg in update {
            let existing = msg.id().and_then(|id| {
                self.messages.iter().position(|m| m.id() == Some(id))
            });
            match existing {
                Some(idx) => self.messages[idx] = msg,
                None => self.messages.push(msg),
            }
        }
    }
}

/// Where a run goes after a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Next {
    /// Run the named node.
    Node(String),
    /// Stop the run.
    End,
}

impl Next {
    /// Returns a transition to the named node.
    #[inline]
    pub fn node<S: Into<String>>(name: S) -> Self {
        Next::Node(name.into())
    }

    pub(crate) fn from_target(target: &str) -> Self {
        if target == END {
            Next::End
        } else {
            Next::node(target)
        }
    }
}

/// Something a node reports while it is running.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NodeEvent {
    /// A piece of model output.
    MessageDelta(String),
    /// A tool call has started.
    ToolCallStarted {
        /// Id of the tool call.
        id: String,
        /// Name of the tool.
        name: String,
    },
    /// A tool call has finished.
    ToolCallFinished {
        /// Id of the tool call.
        id: String,
        /// Name of the tool.
        name: String,
        /// Whether the tool reported an error.
        is_error: bool,
    },
}

type Emitter = Arc<dyn Fn(NodeEvent) + Send + Sync>;

/// Information about the node invocation in progress.
#[derive(Clone)]
pub struct NodeContext {
    node: String,
    step: usize,
    emitter: Emitter,
}

impl Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext")
            .field("node", &self.node)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl NodeContext {
    /// Creates a context whose events go to `emitter`.
    pub fn new(
        node: impl Into<String>,
        step: usize,
        emitter: impl Fn(NodeEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            node: node.into(),
            step,
            emitter: Arc::new(emitter),
        }
    }

    /// Returns the name of the running node.
    #[inline]
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Returns the step number of this invocation.
    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Reports an event to whoever is streaming the run.
    #[inline]
    pub fn emit(&self, event: NodeEvent) {
        (self.emitter)(event)
    }
}

/// A step of a graph.
#[async_trait]
pub trait Node<S: GraphState>: Send + Sync + 'static {
    /// Runs the step and returns the update to apply to the state.
    async fn run(
        &self,
        state: &S,
        ctx: &NodeContext,
    ) -> Result<S::Update, NodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::AiMessage;

    fn ai_with_id(id: &str, content: &str) -> Message {
        Message::Ai(AiMessage {
            id: Some(id.to_owned()),
            content: content.to_owned(),
            ..Default::default()
        })
    }

    #[test]
    fn test_messages_reducer() {
        let mut state = MessagesState::default();
        state.apply(vec![Message::human("Hi"), ai_with_id("m1", "Hel")]);
        state.apply(vec![Message::human("Hi")]);
        assert_eq!(state.messages.len(), 3);

        // Same id replaces in place, messages without id always append.
        state.apply(vec![ai_with_id("m1", "Hello"), ai_with_id("m2", "Bye")]);
        let contents: Vec<_> =
            state.messages.iter().map(Message::content).collect();
        assert_eq!(contents, ["Hi", "Hello", "Hi", "Bye"]);
    }

    #[test]
    fn test_node_event_serde() {
        let value =
            serde_json::to_value(NodeEvent::MessageDelta("Hi".to_owned()))
                .unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "type": "message_delta", "data": "Hi" })
        );
    }
}
