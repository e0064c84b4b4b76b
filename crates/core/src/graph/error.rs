use std::error::Error as StdError;
use std::fmt::{self, Display};

use chatgraph_model::{ErrorKind, ModelProviderError};

use crate::checkpoint::CheckpointError;

/// An error returned by a [`Node`](super::Node).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeError {
    message: String,
    model_error: Option<ErrorKind>,
}

impl NodeError {
    /// Creates an error with the given message.
    #[inline]
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            model_error: None,
        }
    }

    /// Creates an error from a failed model call.
    pub fn from_model(err: &dyn ModelProviderError) -> Self {
        Self {
            message: format!("model call failed: {err}"),
            model_error: Some(err.kind()),
        }
    }

    /// Returns the kind of the model error that caused this error, if the
    /// node failed while calling a model.
    #[inline]
    pub fn model_error(&self) -> Option<ErrorKind> {
        self.model_error
    }
}

impl Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for NodeError {}

/// An error that occurs while building or running a graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphError {
    /// Two nodes share a name.
    DuplicateNode(String),
    /// A node uses [`START`](super::START) or [`END`](super::END) as its
    /// name.
    ReservedName(String),
    /// Nothing leaves [`START`](super::START).
    MissingEntry,
    /// An edge refers to a node that does not exist.
    UnknownNode(String),
    /// A node has no outgoing edge.
    DeadEnd(String),
    /// A node has more than one outgoing edge.
    DuplicateEdge(String),
    /// A checkpointer is configured but the run has no thread id.
    MissingThreadId,
    /// The run took more steps than allowed.
    RecursionLimit(usize),
    /// A node failed.
    Node {
        /// Name of the failed node.
        node: String,
        /// The error the node returned.
        error: NodeError,
    },
    /// Reading or writing a checkpoint failed.
    Checkpoint(CheckpointError),
    /// The run stopped before reaching the end, e.g. it was cancelled.
    Interrupted,
}

impl Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DuplicateNode(name) => {
                write!(f, "node `{name}` is already defined")
            }
            GraphError::ReservedName(name) => {
                write!(f, "`{name}` is a reserved node name")
            }
            GraphError::MissingEntry => {
                write!(f, "graph has no entry point")
            }
            GraphError::UnknownNode(name) => {
                write!(f, "node `{name}` does not exist")
            }
            GraphError::DeadEnd(name) => {
                write!(f, "node `{name}` has no outgoing edge")
            }
            GraphError::DuplicateEdge(name) => {
                write!(f, "node `{name}` has more than one outgoing edge")
            }
            GraphError::MissingThreadId => {
                write!(f, "a thread id is required when using a checkpointer")
            }
            GraphError::RecursionLimit(limit) => {
                write!(f, "recursion limit of {limit} steps reached")
            }
            GraphError::Node { node, error } => {
                write!(f, "node `{node}` failed: {error}")
            }
            GraphError::Checkpoint(err) => Display::fmt(err, f),
            GraphError::Interrupted => {
                write!(f, "run stopped before reaching the end")
            }
        }
    }
}

impl StdError for GraphError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            GraphError::Node { error, .. } => Some(error),
            GraphError::Checkpoint(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CheckpointError> for GraphError {
    #[inline]
    fn from(err: CheckpointError) -> Self {
        GraphError::Checkpoint(err)
    }
}
