use std::error::Error as StdError;
use std::fmt::{self, Display};

use chatgraph_core::{
    ChatWorkflow, GraphError, Message, MessagesState, StreamEvent,
};

/// An error returned by [`Session::send_message`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// The message has no text.
    EmptyMessage,
    /// The workflow failed to answer.
    Run(GraphError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::EmptyMessage => write!(f, "message is empty"),
            SessionError::Run(err) => write!(f, "failed to answer: {err}"),
        }
    }
}

impl StdError for SessionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SessionError::Run(err) => Some(err),
            SessionError::EmptyMessage => None,
        }
    }
}

impl From<GraphError> for SessionError {
    #[inline]
    fn from(err: GraphError) -> Self {
        SessionError::Run(err)
    }
}

/// A chat session, like a window that displays messages and has an input
/// box.
///
/// The session owns the conversation history. Every message is submitted
/// to the workflow together with the whole history, and the history is
/// replaced with the workflow's final state once the answer is complete.
/// A failed answer leaves the history untouched.
#[derive(Debug)]
pub struct Session {
    workflow: ChatWorkflow,
    chat_id: String,
    history: Vec<Message>,
}

impl Session {
    /// Creates an empty session.
    #[inline]
    pub fn new<S: Into<String>>(workflow: ChatWorkflow, chat_id: S) -> Self {
        Self {
            workflow,
            chat_id: chat_id.into(),
            history: vec![],
        }
    }

    /// Returns the id of the conversation.
    #[inline]
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Returns the conversation so far.
    #[inline]
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Returns the workflow answering the messages.
    #[inline]
    pub fn workflow(&self) -> &ChatWorkflow {
        &self.workflow
    }

    /// Sends a message and waits for the answer, passing every event of
    /// the run to `on_event` as it happens.
    ///
    /// Returns the text of the final reply.
    pub async fn send_message(
        &mut self,
        text: &str,
        mut on_event: impl FnMut(&StreamEvent<MessagesState>),
    ) -> Result<String, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let mut messages = self.history.clone();
        messages.push(Message::human(text));
        let mut stream = self.workflow.submit_question(messages, &self.chat_id)?;

        let mut final_state = None;
        while let Some(event) = stream.next_event().await {
            let event = event?;
            on_event(&event);
            if let StreamEvent::Finished { state } = event {
                final_state = Some(state);
            }
        }
        let state = final_state.ok_or(GraphError::Interrupted)?;

        let reply = state
            .messages
            .last()
            .map(|msg| msg.content().to_owned())
            .unwrap_or_default();
        debug!(
            "answer complete, history has {} messages",
            state.messages.len()
        );
        self.history = state.messages;
        Ok(reply)
    }

    /// Forgets the conversation.
    #[inline]
    pub fn clear(&mut self) {
        self.history.clear();
    }
}
