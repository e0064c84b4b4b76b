//! The graph node that calls the model.

use async_trait::async_trait;
use chatgraph_model::{ModelMessage, ModelProvider, ModelRequest, ModelTool};

use crate::graph::{MessagesState, Node, NodeContext, NodeError, NodeEvent};
use crate::message::{AiMessage, Message};
use crate::model_client::{ModelClient, RetryPolicy};
use crate::trim::Trimmer;

/// A graph node that sends the conversation to the model and appends its
/// reply.
///
/// The prompt is the system prompt followed by the trimmed history. Text
/// is reported as [`NodeEvent::MessageDelta`]s while it streams in.
#[derive(Clone, Debug)]
pub struct AgentNode {
    client: ModelClient,
    system_prompt: String,
    tools: Vec<ModelTool>,
    trimmer: Trimmer,
}

impl AgentNode {
    /// Creates a node that calls `provider`.
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        Self {
            client: ModelClient::new(provider),
            system_prompt: String::new(),
            tools: vec![],
            trimmer: Trimmer::default(),
        }
    }

    /// Sets the system prompt. An empty prompt is not sent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the tools the model may call.
    #[inline]
    pub fn with_tools(mut self, tools: Vec<ModelTool>) -> Self {
        self.tools = tools;
        self
    }

    /// Sets how rate limited requests are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.client = self.client.with_retry_policy(retry_policy);
        self
    }

    /// Sets how the history is trimmed before each call.
    #[inline]
    pub fn with_trimmer(mut self, trimmer: Trimmer) -> Self {
        self.trimmer = trimmer;
        self
    }

    fn build_request(&self, messages: &[Message]) -> ModelRequest {
        let trimmed = self.trimmer.trim(messages);
        trace!("trimmed history from {} to {}", messages.len(), trimmed.len());

        let mut prompt = Vec::with_capacity(trimmed.len() + 1);
        if !self.system_prompt.is_empty() {
            prompt.push(ModelMessage::System(self.system_prompt.clone()));
        }
        prompt.extend(trimmed.iter().map(Message::to_model_message));
        ModelRequest {
            messages: prompt,
            tools: self.tools.clone(),
        }
    }
}

#[async_trait]
impl Node<MessagesState> for AgentNode {
    async fn run(
        &self,
        state: &MessagesState,
        ctx: &NodeContext,
    ) -> Result<Vec<Message>, NodeError> {
        let req = self.build_request(&state.messages);
        let emitter = ctx.clone();
        let resp = self
            .client
            .send_request(req, move |delta| {
                emitter.emit(NodeEvent::MessageDelta(delta))
            })
            .await
            .map_err(|err| NodeError::from_model(&*err))?;

        let id = resp.opaque_msg.as_ref().map(|msg| msg.id().to_owned());
        Ok(vec![Message::Ai(AiMessage {
            id,
            content: resp.transcript,
            tool_calls: resp.tool_calls,
            usage: resp.usage,
            opaque: resp.opaque_msg,
        })])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chatgraph_model::{ErrorKind, ToolCallRequest};
    use chatgraph_test_model::{
        PresetEvent, PresetResponse, TestModelProvider,
    };
    use serde_json::json;

    use super::*;

    fn weather_tool() -> ModelTool {
        ModelTool {
            name: "weather".to_owned(),
            description: "Looks up the forecast".to_owned(),
            parameters: json!({ "type": "object" }),
        }
    }

    #[tokio::test]
    async fn test_agent_node() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Checking ".to_owned()),
            PresetEvent::MessageDelta("now.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "call_1".to_owned(),
                name: "weather".to_owned(),
                arguments: json!({ "city": "Oslo" }),
            }),
        ]));
        let node = AgentNode::new(provider.clone())
            .with_retry_policy(RetryPolicy::none())
            .with_system_prompt("You are helpful.")
            .with_tools(vec![weather_tool()]);

        let mut state = MessagesState::default();
        for i in 0..8 {
            state.messages.push(Message::human(format!("q{i}")));
            state.messages.push(Message::ai(format!("a{i}")));
        }
        state.messages.push(Message::human("Weather in Oslo?"));

        let deltas = Arc::new(Mutex::new(vec![]));
        let ctx = NodeContext::new("agent", 1, {
            let deltas = Arc::clone(&deltas);
            move |event| deltas.lock().unwrap().push(event)
        });
        let update = node.run(&state, &ctx).await.unwrap();

        assert_eq!(update.len(), 1);
        let Message::Ai(reply) = &update[0] else {
            panic!("expected an ai message");
        };
        assert_eq!(reply.id.as_deref(), Some("msg:0"));
        assert_eq!(reply.content, "Checking now.");
        assert_eq!(reply.tool_calls.len(), 1);
        assert!(reply.opaque.is_some());
        assert_eq!(
            *deltas.lock().unwrap(),
            [
                NodeEvent::MessageDelta("Checking ".to_owned()),
                NodeEvent::MessageDelta("now.".to_owned()),
            ]
        );

        // System prompt first, then the last 10 messages starting on a
        // user message.
        let requests = provider.requests();
        let prompt = &requests[0].messages;
        assert_eq!(prompt.len(), 10);
        assert_eq!(prompt[0], ModelMessage::System("You are helpful.".into()));
        assert_eq!(prompt[1], ModelMessage::User("q4".into()));
        assert_eq!(
            prompt.last(),
            Some(&ModelMessage::User("Weather in Oslo?".into()))
        );
        assert_eq!(requests[0].tools, [weather_tool()]);
    }

    #[tokio::test]
    async fn test_model_failure() {
        let node = AgentNode::new(TestModelProvider::default())
            .with_retry_policy(RetryPolicy::none());
        let ctx = NodeContext::new("agent", 1, |_| {});
        let err = node
            .run(&MessagesState::default(), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.model_error(), Some(ErrorKind::Other));
    }
}
