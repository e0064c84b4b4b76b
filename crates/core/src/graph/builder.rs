use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use super::run::CompiledGraph;
use super::{END, GraphError, GraphState, Next, Node, START};
use crate::checkpoint::Checkpointer;

pub(crate) type Router<S> = Arc<dyn Fn(&S) -> Next + Send + Sync>;

pub(crate) enum Edge<S> {
    Direct(Next),
    Conditional(Router<S>),
}

impl<S> Edge<S> {
    #[inline]
    pub(crate) fn next(&self, state: &S) -> Next {
        match self {
            Edge::Direct(next) => next.clone(),
            Edge::Conditional(router) => router(state),
        }
    }
}

impl<S> Clone for Edge<S> {
    fn clone(&self) -> Self {
        match self {
            Edge::Direct(next) => Edge::Direct(next.clone()),
            Edge::Conditional(router) => Edge::Conditional(Arc::clone(router)),
        }
    }
}

/// Describes a graph before it is compiled.
///
/// Mistakes like duplicate names are recorded as the graph is built and
/// reported by [`StateGraph::compile`], so calls can be chained freely.
///
/// # Examples
///
/// ```ignore
/// let mut graph = StateGraph::new();
/// graph
///     .add_node("agent", agent)
///     .add_node("tools", tools)
///     .add_edge(START, "agent")
///     .add_conditional_edges("agent", router)
///     .add_edge("tools", "agent");
/// let graph = graph.compile(None)?;
/// ```
pub struct StateGraph<S: GraphState> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
    issues: Vec<GraphError>,
}

impl<S: GraphState> Default for StateGraph<S> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            issues: vec![],
        }
    }
}

impl<S: GraphState> Debug for StateGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<_> = self.nodes.keys().collect();
        nodes.sort();
        f.debug_struct("StateGraph")
            .field("nodes", &nodes)
            .field("issues", &self.issues)
            .finish_non_exhaustive()
    }
}

impl<S: GraphState> StateGraph<S> {
    /// Creates an empty graph.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node.
    pub fn add_node<N: Node<S>>(&mut self, name: &str, node: N) -> &mut Self {
        if name == START || name == END {
            self.issues.push(GraphError::ReservedName(name.to_owned()));
        } else if self.nodes.contains_key(name) {
            self.issues.push(GraphError::DuplicateNode(name.to_owned()));
        } else {
            self.nodes.insert(name.to_owned(), Arc::new(node));
        }
        self
    }

    /// Adds a fixed edge. `from` may be [`START`] and `to` may be [`END`].
    #[inline]
    pub fn add_edge(&mut self, from: &str, to: &str) -> &mut Self {
        self.insert_edge(from, Edge::Direct(Next::from_target(to)))
    }

    /// Adds an edge whose target is picked by `router` from the state.
    #[inline]
    pub fn add_conditional_edges(
        &mut self,
        from: &str,
        router: impl Fn(&S) -> Next + Send + Sync + 'static,
    ) -> &mut Self {
        self.insert_edge(from, Edge::Conditional(Arc::new(router)))
    }

    fn insert_edge(&mut self, from: &str, edge: Edge<S>) -> &mut Self {
        if from == END {
            self.issues.push(GraphError::UnknownNode(from.to_owned()));
        } else if self.edges.contains_key(from) {
            self.issues.push(GraphError::DuplicateEdge(from.to_owned()));
        } else {
            self.edges.insert(from.to_owned(), edge);
        }
        self
    }

    /// Validates the graph and makes it runnable.
    ///
    /// When `checkpointer` is set, every run must carry a thread id and its
    /// state is saved after each step.
    pub fn compile(
        &self,
        checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    ) -> Result<CompiledGraph<S>, GraphError> {
        if let Some(issue) = self.issues.first() {
            return Err(issue.clone());
        }
        if !self.edges.contains_key(START) {
            return Err(GraphError::MissingEntry);
        }

        let mut edges: Vec<_> = self.edges.iter().collect();
        edges.sort_by(|a, b| a.0.cmp(b.0));
        for (from, edge) in edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(GraphError::UnknownNode(from.clone()));
            }
            if let Edge::Direct(Next::Node(to)) = edge {
                if !self.nodes.contains_key(to) {
                    return Err(GraphError::UnknownNode(to.clone()));
                }
            }
        }

        let mut nodes: Vec<_> = self.nodes.keys().collect();
        nodes.sort();
        if let Some(dead_end) =
            nodes.into_iter().find(|name| !self.edges.contains_key(*name))
        {
            return Err(GraphError::DeadEnd(dead_end.clone()));
        }

        debug!("compiled graph with {} nodes", self.nodes.len());
        Ok(CompiledGraph::new(
            self.nodes.clone(),
            self.edges.clone(),
            checkpointer,
        ))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::graph::{MessagesState, NodeContext, NodeError};
    use crate::message::Message;

    struct Noop;

    #[async_trait]
    impl Node<MessagesState> for Noop {
        async fn run(
            &self,
            _state: &MessagesState,
            _ctx: &NodeContext,
        ) -> Result<Vec<Message>, NodeError> {
            Ok(vec![])
        }
    }

    fn compile_err(graph: &StateGraph<MessagesState>) -> GraphError {
        graph.compile(None).err().unwrap()
    }

    #[test]
    fn test_validation() {
        let mut graph = StateGraph::<MessagesState>::new();
        graph.add_node("a", Noop).add_edge("a", END);
        assert_eq!(compile_err(&graph), GraphError::MissingEntry);

        graph.add_edge(START, "b");
        assert_eq!(compile_err(&graph), GraphError::UnknownNode("b".into()));

        let mut graph = StateGraph::<MessagesState>::new();
        graph.add_node("a", Noop).add_node("b", Noop).add_edge(START, "a");
        graph.add_edge("a", "b");
        assert_eq!(compile_err(&graph), GraphError::DeadEnd("b".into()));

        graph.add_edge("b", END).add_edge("a", END);
        assert_eq!(compile_err(&graph), GraphError::DuplicateEdge("a".into()));
    }

    #[test]
    fn test_reserved_and_duplicate_names() {
        let mut graph = StateGraph::<MessagesState>::new();
        graph.add_node(START, Noop);
        assert_eq!(
            compile_err(&graph),
            GraphError::ReservedName(START.into())
        );

        let mut graph = StateGraph::<MessagesState>::new();
        graph.add_node("a", Noop).add_node("a", Noop);
        assert_eq!(compile_err(&graph), GraphError::DuplicateNode("a".into()));

        let mut graph = StateGraph::<MessagesState>::new();
        graph.add_node("a", Noop).add_edge(END, "a");
        assert_eq!(compile_err(&graph), GraphError::UnknownNode(END.into()));
    }

    #[test]
    fn test_compile_ok() {
        let mut graph = StateGraph::<MessagesState>::new();
        graph
            .add_node("a", Noop)
            .add_node("b", Noop)
            .add_edge(START, "a")
            .add_conditional_edges("a", |_| Next::node("b"))
            .add_edge("b", END);
        assert!(graph.compile(None).is_ok());
    }
}
