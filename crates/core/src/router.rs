//! The turn router of the chat graph.

use crate::graph::Next;
use crate::message::Message;

/// Name of the node that calls the model.
pub const AGENT_NODE: &str = "agent";

/// Name of the node that runs tool calls.
pub const TOOLS_NODE: &str = "tools";

/// Where the conversation goes after a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    /// Run the pending tool calls.
    Tools,
    /// Let the model read the tool results.
    Agent,
    /// The turn is over.
    End,
}

impl Route {
    /// Returns the graph transition for this route.
    #[inline]
    pub fn next(self) -> Next {
        match self {
            Route::Tools => Next::node(TOOLS_NODE),
            Route::Agent => Next::node(AGENT_NODE),
            Route::End => Next::End,
        }
    }
}

/// Decides what happens after the last message of `messages`.
///
/// A model message with tool calls routes to the tools, a non-empty tool
/// result routes back to the model, and anything else (including an empty
/// history) ends the turn.
pub fn should_continue(messages: &[Message]) -> Route {
    match messages.last() {
        Some(msg) if !msg.tool_calls().is_empty() => Route::Tools,
        Some(Message::Tool(result)) if !result.content.is_empty() => {
            Route::Agent
        }
        _ => Route::End,
    }
}
