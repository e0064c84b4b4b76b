//! Saving and restoring graph state per conversation thread.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::graph::GraphState;

/// Why a checkpoint was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    /// The caller's input has just been applied.
    Input,
    /// A node has just finished.
    Loop,
}

/// A snapshot of the graph state of one thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<S> {
    /// Unique id of this checkpoint within the thread.
    pub id: String,
    /// Id of the checkpoint this one follows, if any.
    pub parent_id: Option<String>,
    /// The conversation thread.
    pub thread_id: String,
    /// The run that wrote this checkpoint.
    pub run_id: String,
    /// Step counter, increasing within a thread.
    pub step: usize,
    /// Why this checkpoint was written.
    pub source: CheckpointSource,
    /// The state after the step.
    pub state: S,
    /// The node that runs next, `None` once the run has ended.
    pub next: Option<String>,
}

/// An error returned by a [`Checkpointer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointError {
    message: String,
}

impl CheckpointError {
    /// Creates an error with the given message.
    #[inline]
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "checkpoint error: {}", self.message)
    }
}

impl StdError for CheckpointError {}

/// Storage for [`Checkpoint`]s.
#[async_trait]
pub trait Checkpointer<S: GraphState>: Send + Sync {
    /// Returns the latest checkpoint of a thread.
    async fn get(
        &self,
        thread_id: &str,
    ) -> Result<Option<Checkpoint<S>>, CheckpointError>;

    /// Stores a checkpoint.
    async fn put(&self, checkpoint: Checkpoint<S>)
    -> Result<(), CheckpointError>;

    /// Returns all checkpoints of a thread, newest first.
    async fn list(
        &self,
        thread_id: &str,
    ) -> Result<Vec<Checkpoint<S>>, CheckpointError>;
}

/// A [`Checkpointer`] that keeps everything in memory.
///
/// Checkpoints live as long as the saver and are never persisted.
pub struct MemorySaver<S> {
    threads: Mutex<HashMap<String, Vec<Checkpoint<S>>>>,
}

impl<S> Default for MemorySaver<S> {
    #[inline]
    fn default() -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
        }
    }
}

impl<S> Debug for MemorySaver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let threads = self.threads.lock().map(|threads| threads.len()).ok();
        f.debug_struct("MemorySaver")
            .field("threads", &threads)
            .finish()
    }
}

impl<S> MemorySaver<S> {
    /// Creates an empty saver.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_threads<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Vec<Checkpoint<S>>>) -> R,
    ) -> Result<R, CheckpointError> {
        let mut threads = self
            .threads
            .lock()
            .map_err(|_| CheckpointError::new("memory saver is poisoned"))?;
        Ok(f(&mut threads))
    }
}

#[async_trait]
impl<S: GraphState> Checkpointer<S> for MemorySaver<S> {
    async fn get(
        &self,
        thread_id: &str,
    ) -> Result<Option<Checkpoint<S>>, CheckpointError> {
        self.with_threads(|threads| {
            threads
                .get(thread_id)
                .and_then(|checkpoints| checkpoints.last().cloned())
        })
    }

    async fn put(
        &self,
        checkpoint: Checkpoint<S>,
    ) -> Result<(), CheckpointError> {
        trace!(
            "saving checkpoint {} of thread {}",
            checkpoint.id, checkpoint.thread_id
        );
        self.with_threads(|threads| {
            threads
                .entry(checkpoint.thread_id.clone())
                .or_default()
                .push(checkpoint);
        })
    }

    async fn list(
        &self,
        thread_id: &str,
    ) -> Result<Vec<Checkpoint<S>>, CheckpointError> {
        self.with_threads(|threads| {
            threads
                .get(thread_id)
                .map(|checkpoints| checkpoints.iter().rev().cloned().collect())
                .unwrap_or_default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MessagesState;
    use crate::message::Message;

    fn checkpoint(thread_id: &str, step: usize) -> Checkpoint<MessagesState> {
        Checkpoint {
            id: format!("{thread_id}:{step}"),
            parent_id: step.checked_sub(1).map(|s| format!("{thread_id}:{s}")),
            thread_id: thread_id.to_owned(),
            run_id: thread_id.to_owned(),
            step,
            source: CheckpointSource::Loop,
            state: MessagesState {
                messages: vec![Message::human(format!("step {step}"))],
            },
            next: None,
        }
    }

    #[tokio::test]
    async fn test_memory_saver() {
        let saver = MemorySaver::new();
        assert!(saver.get("a").await.unwrap().is_none());
        assert!(saver.list("a").await.unwrap().is_empty());

        for step in 0..3 {
            saver.put(checkpoint("a", step)).await.unwrap();
        }
        saver.put(checkpoint("b", 0)).await.unwrap();

        let latest = saver.get("a").await.unwrap().unwrap();
        assert_eq!(latest.step, 2);
        assert_eq!(latest.parent_id.as_deref(), Some("a:1"));

        let steps: Vec<_> = saver
            .list("a")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.step)
            .collect();
        assert_eq!(steps, [2, 1, 0]);
        assert_eq!(saver.list("b").await.unwrap().len(), 1);
    }
}
