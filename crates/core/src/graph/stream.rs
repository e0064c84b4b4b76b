use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use super::{GraphError, NodeEvent};

/// An event emitted while a graph runs.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent<S> {
    /// The run has started.
    RunStarted {
        /// Id of the run.
        run_id: String,
        /// The conversation thread, if any.
        thread_id: Option<String>,
    },
    /// A node is about to run.
    NodeStarted {
        /// Name of the node.
        node: String,
        /// Step number of this invocation.
        step: usize,
    },
    /// A running node reported something.
    Node {
        /// Name of the node.
        node: String,
        /// Step number of this invocation.
        step: usize,
        /// What the node reported.
        event: NodeEvent,
    },
    /// A node has finished and its update was applied.
    NodeFinished {
        /// Name of the node.
        node: String,
        /// Step number of this invocation.
        step: usize,
    },
    /// The run has reached the end.
    Finished {
        /// The final state.
        state: S,
    },
}

pub(crate) type EventSender<S> =
    mpsc::UnboundedSender<Result<StreamEvent<S>, GraphError>>;

/// The events of a running graph.
///
/// A run ends with either [`StreamEvent::Finished`] or an error, after
/// which the stream yields `None`. Dropping the stream stops the run.
pub struct RunStream<S> {
    event_rx: mpsc::UnboundedReceiver<Result<StreamEvent<S>, GraphError>>,
    kill_tx: watch::Sender<bool>,
}

impl<S: Send + 'static> RunStream<S> {
    pub(crate) fn new() -> (Self, EventSender<S>, watch::Receiver<bool>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = watch::channel(false);
        (Self { event_rx, kill_tx }, event_tx, kill_rx)
    }

    /// Waits for the next event.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe.
    #[inline]
    pub async fn next_event(
        &mut self,
    ) -> Option<Result<StreamEvent<S>, GraphError>> {
        self.event_rx.recv().await
    }

    /// Asks the run to stop. Events already emitted can still be read.
    #[inline]
    pub fn cancel(&self) {
        self.kill_tx.send(true).ok();
    }

    /// Drains the stream and returns the final state.
    pub async fn into_final_state(mut self) -> Result<Option<S>, GraphError> {
        while let Some(event) = self.next_event().await {
            if let StreamEvent::Finished { state } = event? {
                return Ok(Some(state));
            }
        }
        Ok(None)
    }
}

impl<S> Stream for RunStream<S> {
    type Item = Result<StreamEvent<S>, GraphError>;

    #[inline]
    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.get_mut().event_rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::graph::MessagesState;
    use crate::message::Message;

    #[test]
    fn test_stream_event_serde() {
        let event: StreamEvent<MessagesState> = StreamEvent::Node {
            node: "agent".to_owned(),
            step: 1,
            event: NodeEvent::MessageDelta("Hi".to_owned()),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "node",
                "node": "agent",
                "step": 1,
                "event": { "type": "message_delta", "data": "Hi" }
            })
        );

        let event = StreamEvent::Finished {
            state: MessagesState {
                messages: vec![Message::human("Hello")],
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "finished");
        assert_eq!(value["state"]["messages"][0]["content"], "Hello");

        let event: StreamEvent<MessagesState> = StreamEvent::RunStarted {
            run_id: "r1".to_owned(),
            thread_id: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "run_started", "run_id": "r1", "thread_id": null })
        );
    }
}
