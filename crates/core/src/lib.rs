//! Core of the chat workflow: conversation messages, history trimming, a
//! small state graph runtime with checkpoints, and the agent and tool nodes
//! that make up the chat loop.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod checkpoint;
pub mod graph;
pub mod message;
mod model_client;
pub mod router;
pub mod tool;
pub mod trim;
mod workflow;

pub use agent::AgentNode;
pub use checkpoint::{Checkpoint, Checkpointer, MemorySaver};
pub use graph::{
    CompiledGraph, GraphError, MessagesState, NodeEvent, RunConfig, RunStream,
    StateGraph, StreamEvent,
};
pub use message::{AiMessage, Message, MessageKind, ToolMessage};
pub use model_client::RetryPolicy;
pub use router::{Route, should_continue};
pub use tool::{Tool, ToolNode, ToolResult};
pub use trim::{TrimStrategy, Trimmer};
pub use workflow::{ChatWorkflow, ChatWorkflowBuilder};
