use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::select;
use tracing::Instrument;

use super::builder::Edge;
use super::stream::{EventSender, RunStream, StreamEvent};
use super::{GraphError, GraphState, Next, Node, NodeContext, START};
use crate::checkpoint::{Checkpoint, CheckpointSource, Checkpointer};

/// How many node invocations a run may take by default.
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Options for a single graph run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// The conversation thread to load and save checkpoints under.
    pub thread_id: Option<String>,
    /// Id of the run. Defaults to the thread id.
    pub run_id: Option<String>,
    /// Maximum number of node invocations before the run fails.
    pub recursion_limit: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            thread_id: None,
            run_id: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl RunConfig {
    /// Creates a config for the given thread.
    #[inline]
    pub fn with_thread_id<S: Into<String>>(thread_id: S) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Default::default()
        }
    }

    /// Sets the run id.
    #[inline]
    pub fn with_run_id<S: Into<String>>(mut self, run_id: S) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Sets the recursion limit.
    #[inline]
    pub fn with_recursion_limit(mut self, recursion_limit: usize) -> Self {
        self.recursion_limit = recursion_limit;
        self
    }
}

struct Topology<S: GraphState> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
}

impl<S: GraphState> Topology<S> {
    fn next_after(&self, from: &str, state: &S) -> Result<Next, GraphError> {
        let edge = self
            .edges
            .get(from)
            .ok_or_else(|| GraphError::DeadEnd(from.to_owned()))?;
        Ok(edge.next(state))
    }
}

/// A validated graph that can be run.
///
/// Cloning is cheap, clones share the nodes and the checkpointer.
pub struct CompiledGraph<S: GraphState> {
    topology: Arc<Topology<S>>,
    checkpointer: Option<Arc<dyn Checkpointer<S>>>,
}

impl<S: GraphState> Clone for CompiledGraph<S> {
    fn clone(&self) -> Self {
        Self {
            topology: Arc::clone(&self.topology),
            checkpointer: self.checkpointer.clone(),
        }
    }
}

impl<S: GraphState> Debug for CompiledGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<_> = self.topology.nodes.keys().collect();
        nodes.sort();
        f.debug_struct("CompiledGraph")
            .field("nodes", &nodes)
            .field("checkpointer", &self.checkpointer.is_some())
            .finish()
    }
}

impl<S: GraphState> CompiledGraph<S> {
    pub(crate) fn new(
        nodes: HashMap<String, Arc<dyn Node<S>>>,
        edges: HashMap<String, Edge<S>>,
        checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    ) -> Self {
        Self {
            topology: Arc::new(Topology { nodes, edges }),
            checkpointer,
        }
    }

    /// Starts a run on a new task and returns its events.
    ///
    /// `input` is applied to the thread's latest checkpointed state (or the
    /// default state) before the entry node runs.
    pub fn stream(
        &self,
        input: S::Update,
        config: RunConfig,
    ) -> Result<RunStream<S>, GraphError> {
        if self.checkpointer.is_some() && config.thread_id.is_none() {
            return Err(GraphError::MissingThreadId);
        }

        let run_id = config
            .run_id
            .or_else(|| config.thread_id.clone())
            .unwrap_or_else(next_run_id);
        let span = debug_span!("graph run", run_id = %run_id);
        let (stream, event_tx, mut kill_rx) = RunStream::new();
        let run = Run {
            topology: Arc::clone(&self.topology),
            checkpointer: self.checkpointer.clone(),
            run_id,
            thread_id: config.thread_id,
            recursion_limit: config.recursion_limit,
            event_tx: event_tx.clone(),
        };

        tokio::spawn(
            async move {
                select! {
                    biased;

                    _ = kill_rx.changed() => {
                        debug!("run cancelled");
                    }
                    result = run.execute(input) => {
                        let item = match result {
                            Ok(state) => {
                                debug!("run finished");
                                Ok(StreamEvent::Finished { state })
                            }
                            Err(err) => {
                                error!("run failed: {err}");
                                Err(err)
                            }
                        };
                        event_tx.send(item).ok();
                    }
                }
            }
            .instrument(span),
        );
        Ok(stream)
    }

    /// Runs the graph to the end and returns the final state.
    pub async fn invoke(
        &self,
        input: S::Update,
        config: RunConfig,
    ) -> Result<S, GraphError> {
        self.stream(input, config)?
            .into_final_state()
            .await?
            .ok_or(GraphError::Interrupted)
    }

    /// Returns the latest checkpoint of a thread.
    pub async fn get_state(
        &self,
        thread_id: &str,
    ) -> Result<Option<Checkpoint<S>>, GraphError> {
        match &self.checkpointer {
            Some(checkpointer) => Ok(checkpointer.get(thread_id).await?),
            None => Ok(None),
        }
    }

    /// Returns all checkpoints of a thread, newest first.
    pub async fn get_state_history(
        &self,
        thread_id: &str,
    ) -> Result<Vec<Checkpoint<S>>, GraphError> {
        match &self.checkpointer {
            Some(checkpointer) => Ok(checkpointer.list(thread_id).await?),
            None => Ok(vec![]),
        }
    }
}

fn next_run_id() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    format!("run-{}", NEXT.fetch_add(1, Ordering::Relaxed))
}

struct Run<S: GraphState> {
    topology: Arc<Topology<S>>,
    checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    run_id: String,
    thread_id: Option<String>,
    recursion_limit: usize,
    event_tx: EventSender<S>,
}

impl<S: GraphState> Run<S> {
    async fn execute(&self, input: S::Update) -> Result<S, GraphError> {
        let (mut state, mut step, mut parent_id) =
            match self.latest_checkpoint().await? {
                Some(checkpoint) => {
                    debug!("resuming from checkpoint {}", checkpoint.id);
                    (checkpoint.state, checkpoint.step + 1, Some(checkpoint.id))
                }
                None => (S::default(), 0, None),
            };
        self.send(StreamEvent::RunStarted {
            run_id: self.run_id.clone(),
            thread_id: self.thread_id.clone(),
        });

        state.apply(input);
        let mut next = self.topology.next_after(START, &state)?;
        parent_id = self
            .save(CheckpointSource::Input, step, &state, &next, parent_id)
            .await?;

        let mut invocations = 0;
        while let Next::Node(name) = next {
            if invocations >= self.recursion_limit {
                return Err(GraphError::RecursionLimit(self.recursion_limit));
            }
            invocations += 1;
            step += 1;

            let node = self
                .topology
                .nodes
                .get(&name)
                .ok_or_else(|| GraphError::UnknownNode(name.clone()))?;
            self.send(StreamEvent::NodeStarted {
                node: name.clone(),
                step,
            });

            let ctx = self.node_context(&name, step);
            let update = node
                .run(&state, &ctx)
                .instrument(debug_span!("node", name = %name, step))
                .await
                .map_err(|error| GraphError::Node {
                    node: name.clone(),
                    error,
                })?;
            state.apply(update);

            next = self.topology.next_after(&name, &state)?;
            parent_id = self
                .save(CheckpointSource::Loop, step, &state, &next, parent_id)
                .await?;
            self.send(StreamEvent::NodeFinished { node: name, step });
        }

        Ok(state)
    }

    #[inline]
    fn send(&self, event: StreamEvent<S>) {
        self.event_tx.send(Ok(event)).ok();
    }

    fn node_context(&self, name: &str, step: usize) -> NodeContext {
        let event_tx = self.event_tx.clone();
        let node = name.to_owned();
        NodeContext::new(name, step, move |event| {
            event_tx
                .send(Ok(StreamEvent::Node {
                    node: node.clone(),
                    step,
                    event,
                }))
                .ok();
        })
    }

    async fn latest_checkpoint(
        &self,
    ) -> Result<Option<Checkpoint<S>>, GraphError> {
        match (&self.checkpointer, &self.thread_id) {
            (Some(checkpointer), Some(thread_id)) => {
                Ok(checkpointer.get(thread_id).await?)
            }
            _ => Ok(None),
        }
    }

    /// Writes a checkpoint and returns its id, which becomes the parent of
    /// the next one.
    async fn save(
        &self,
        source: CheckpointSource,
        step: usize,
        state: &S,
        next: &Next,
        parent_id: Option<String>,
    ) -> Result<Option<String>, GraphError> {
        let (Some(checkpointer), Some(thread_id)) =
            (&self.checkpointer, &self.thread_id)
        else {
            return Ok(parent_id);
        };
        let id = format!("{}:{step}", self.run_id);
        checkpointer
            .put(Checkpoint {
                id: id.clone(),
                parent_id,
                thread_id: thread_id.clone(),
                run_id: self.run_id.clone(),
                step,
                source,
                state: state.clone(),
                next: match next {
                    Next::Node(name) => Some(name.clone()),
                    Next::End => None,
                },
            })
            .await?;
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::checkpoint::MemorySaver;
    use crate::graph::{END, MessagesState, NodeError, NodeEvent, StateGraph};
    use crate::message::Message;

    /// Replies with the step number and streams it as a delta.
    struct Echo;

    #[async_trait]
    impl Node<MessagesState> for Echo {
        async fn run(
            &self,
            _state: &MessagesState,
            ctx: &NodeContext,
        ) -> Result<Vec<Message>, NodeError> {
            let reply = format!("step {}", ctx.step());
            ctx.emit(NodeEvent::MessageDelta(reply.clone()));
            Ok(vec![Message::ai(reply)])
        }
    }

    struct Fail;

    #[async_trait]
    impl Node<MessagesState> for Fail {
        async fn run(
            &self,
            _state: &MessagesState,
            _ctx: &NodeContext,
        ) -> Result<Vec<Message>, NodeError> {
            Err(NodeError::new("boom"))
        }
    }

    struct Slow;

    #[async_trait]
    impl Node<MessagesState> for Slow {
        async fn run(
            &self,
            _state: &MessagesState,
            _ctx: &NodeContext,
        ) -> Result<Vec<Message>, NodeError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }
    }

    fn single_node<N: Node<MessagesState>>(
        node: N,
        checkpointer: Option<Arc<dyn Checkpointer<MessagesState>>>,
    ) -> CompiledGraph<MessagesState> {
        let mut graph = StateGraph::new();
        graph
            .add_node("echo", node)
            .add_edge(START, "echo")
            .add_edge("echo", END);
        graph.compile(checkpointer).unwrap()
    }

    #[tokio::test]
    async fn test_stream_events() {
        let graph = single_node(Echo, None);
        let mut stream = graph
            .stream(vec![Message::human("Hi")], RunConfig::default())
            .unwrap();

        let mut events = vec![];
        while let Some(event) = stream.next_event().await {
            events.push(event.unwrap());
        }
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], StreamEvent::RunStarted { .. }));
        assert_eq!(
            events[1],
            StreamEvent::NodeStarted {
                node: "echo".to_owned(),
                step: 1
            }
        );
        assert_eq!(
            events[2],
            StreamEvent::Node {
                node: "echo".to_owned(),
                step: 1,
                event: NodeEvent::MessageDelta("step 1".to_owned()),
            }
        );
        assert!(matches!(events[3], StreamEvent::NodeFinished { step: 1, .. }));
        let StreamEvent::Finished { state } = &events[4] else {
            panic!("expected the final state");
        };
        assert_eq!(state.messages, [Message::human("Hi"), Message::ai("step 1")]);
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint() {
        let saver = Arc::new(MemorySaver::<MessagesState>::new());
        let graph = single_node(Echo, Some(saver.clone()));

        let state = graph
            .invoke(vec![Message::human("one")], RunConfig::with_thread_id("t1"))
            .await
            .unwrap();
        assert_eq!(state.messages.len(), 2);

        let state = graph
            .invoke(vec![Message::human("two")], RunConfig::with_thread_id("t1"))
            .await
            .unwrap();
        let contents: Vec<_> =
            state.messages.iter().map(Message::content).collect();
        assert_eq!(contents, ["one", "step 1", "two", "step 3"]);

        let history = graph.get_state_history("t1").await.unwrap();
        let steps: Vec<_> = history.iter().map(|c| (c.step, c.source)).collect();
        assert_eq!(
            steps,
            [
                (3, CheckpointSource::Loop),
                (2, CheckpointSource::Input),
                (1, CheckpointSource::Loop),
                (0, CheckpointSource::Input),
            ]
        );
        assert_eq!(history[1].next.as_deref(), Some("echo"));
        assert_eq!(history[1].parent_id.as_deref(), Some("t1:1"));

        let latest = graph.get_state("t1").await.unwrap().unwrap();
        assert_eq!(latest.state, state);
        assert!(latest.next.is_none());

        // Other threads start fresh.
        let state = graph
            .invoke(vec![Message::human("hi")], RunConfig::with_thread_id("t2"))
            .await
            .unwrap();
        assert_eq!(state.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_thread_id() {
        let saver = Arc::new(MemorySaver::<MessagesState>::new());
        let graph = single_node(Echo, Some(saver));
        let err = graph
            .stream(vec![], RunConfig::default())
            .err()
            .unwrap();
        assert_eq!(err, GraphError::MissingThreadId);
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let mut graph = StateGraph::new();
        graph
            .add_node("echo", Echo)
            .add_edge(START, "echo")
            .add_conditional_edges("echo", |_: &MessagesState| Next::node("echo"));
        let graph = graph.compile(None).unwrap();

        let err = graph
            .invoke(vec![], RunConfig::default().with_recursion_limit(5))
            .await
            .unwrap_err();
        assert_eq!(err, GraphError::RecursionLimit(5));
    }

    #[tokio::test]
    async fn test_unknown_routed_node() {
        let mut graph = StateGraph::new();
        graph
            .add_node("echo", Echo)
            .add_edge(START, "echo")
            .add_conditional_edges("echo", |_: &MessagesState| Next::node("nope"));
        let err = graph
            .compile(None)
            .unwrap()
            .invoke(vec![], RunConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownNode("nope".to_owned()));
    }

    #[tokio::test]
    async fn test_node_error() {
        let graph = single_node(Fail, None);
        let err = graph
            .invoke(vec![], RunConfig::default())
            .await
            .unwrap_err();
        let GraphError::Node { node, error } = err else {
            panic!("expected a node error");
        };
        assert_eq!(node, "echo");
        assert_eq!(error.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_cancel() {
        let graph = single_node(Slow, None);
        let mut stream = graph.stream(vec![], RunConfig::default()).unwrap();

        loop {
            let event = stream.next_event().await.unwrap().unwrap();
            if matches!(event, StreamEvent::NodeStarted { .. }) {
                break;
            }
        }
        stream.cancel();
        assert!(stream.next_event().await.is_none());
    }
}
