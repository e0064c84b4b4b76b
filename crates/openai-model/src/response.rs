use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use chatgraph_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    OpaqueMessage, TokenUsage, ToolCallRequest,
};
use pin_project_lite::pin_project;
use serde_json::Value;

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, Message, ToolCall};

struct PartialState {
    sse: Sse,
    // Set once `[DONE]` was received or the body ended. Tool calls, usage and
    // the finish reason are only emitted after that, since their fields may
    // be spread over many chunks.
    stream_done: bool,
    id: Option<String>,
    content: String,
    reasoning_content: Option<String>,
    tool_calls: Vec<ToolCall>,
    // Indices into `tool_calls` that have not been emitted yet.
    pending_tool_call_idx: VecDeque<usize>,
    pending_usage: Option<TokenUsage>,
    pending_finish_reason: Option<ModelFinishReason>,
}

impl PartialState {
    #[inline]
    fn finish(self) -> Option<(String, Message)> {
        Some((
            self.id?,
            Message::Assistant {
                content: Some(self.content),
                tool_calls: if self.tool_calls.is_empty() {
                    None
                } else {
                    // Indices only make sense within a stream.
                    Some(
                        self.tool_calls
                            .into_iter()
                            .map(|t| ToolCall { index: None, ..t })
                            .collect(),
                    )
                },
                reasoning_content: self.reasoning_content,
            },
        ))
    }

    fn merge_tool_call(&mut self, tool_call: ToolCall) {
        let Some(partial_tool_call) = self
            .tool_calls
            .iter_mut()
            .find(|t| t.index == tool_call.index)
        else {
            self.pending_tool_call_idx.push_back(self.tool_calls.len());
            self.tool_calls.push(tool_call);
            return;
        };
        if let Some(id) = tool_call.id {
            partial_tool_call.id.get_or_insert_default().push_str(&id);
        }
        if let Some(ty) = tool_call.r#type {
            partial_tool_call.r#type.get_or_insert_default().push_str(&ty);
        }
        let Some(function) = tool_call.function else {
            return;
        };
        match partial_tool_call.function {
            Some(ref mut partial_func) => {
                if let Some(name) = function.name {
                    partial_func.name.get_or_insert_default().push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    partial_func
                        .arguments
                        .get_or_insert_default()
                        .push_str(&arguments);
                }
            }
            None => partial_tool_call.function = Some(function),
        }
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streamed chat completion.
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
        full_msg: Option<(String, Message)>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            stream_done: false,
            id: None,
            content: Default::default(),
            reasoning_content: Default::default(),
            tool_calls: Default::default(),
            pending_tool_call_idx: Default::default(),
            pending_usage: None,
            pending_finish_reason: None,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
            full_msg: None,
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, partial_state)) => {
                    *this.next_event_fut = None;
                    *this.full_msg = partial_state.finish();
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }

    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        self.full_msg
            .as_ref()
            .map(|(id, msg)| OpaqueMessage::new(id, msg.clone()))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    let mut message_delta = None;

    while !partial_state.stream_done {
        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                partial_state.stream_done = true;
                break;
            }
            Err(err) => {
                return Err(Error::new(err.to_string(), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            partial_state.stream_done = true;
            break;
        }

        let mut chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        if partial_state.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id
        {
            return Err(Error::new("chunk id mismatch", ErrorKind::Other));
        };
        if let Some(usage) = chunk.usage() {
            partial_state.pending_usage = Some(usage);
        }

        let Some(choice) = chunk.choices.pop() else {
            continue;
        };

        if let Some(finish_reason) = choice.finish_reason {
            partial_state.pending_finish_reason =
                Some(if finish_reason == "tool_calls" {
                    ModelFinishReason::ToolCalls
                } else {
                    ModelFinishReason::Stop
                });
        }
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            partial_state.content.push_str(&content);
            message_delta = Some(content);
        }
        if let Some(reasoning_content) = &choice.delta.reasoning_content {
            partial_state
                .reasoning_content
                .get_or_insert_default()
                .push_str(reasoning_content);
        }
        for tool_call in choice.delta.tool_calls.into_iter().flatten() {
            partial_state.merge_tool_call(tool_call);
        }

        if message_delta.is_some() {
            break;
        }
    }

    // The order of events are important. Always emit message delta first, then
    // emit pending tool calls, usage, and finally the finish reason.

    if let Some(message_delta) = message_delta {
        return Ok((
            Some(ModelResponseEvent::MessageDelta(message_delta)),
            partial_state,
        ));
    }

    if let Some(idx) = partial_state.pending_tool_call_idx.pop_front() {
        let tool_call = &partial_state.tool_calls[idx];
        let id = tool_call.id.clone().unwrap_or_default();
        let name = tool_call
            .function
            .as_ref()
            .and_then(|f| f.name.clone())
            .unwrap_or_default();
        let raw_arguments = tool_call
            .function
            .as_ref()
            .and_then(|f| f.arguments.as_deref())
            .unwrap_or_default();
        let arguments = if raw_arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            // Malformed arguments are passed through as a string, the tool
            // will reject them and the model gets a chance to retry.
            serde_json::from_str(raw_arguments).unwrap_or_else(|err| {
                warn!("tool call `{name}` has invalid arguments: {err}");
                Value::String(raw_arguments.to_owned())
            })
        };
        return Ok((
            Some(ModelResponseEvent::ToolCall(ToolCallRequest {
                id,
                name,
                arguments,
            })),
            partial_state,
        ));
    }

    if let Some(usage) = partial_state.pending_usage.take() {
        return Ok((Some(ModelResponseEvent::Usage(usage)), partial_state));
    }

    if let Some(finish_reason) = partial_state.pending_finish_reason.take() {
        return Ok((
            Some(ModelResponseEvent::Completed(finish_reason)),
            partial_state,
        ));
    }

    Ok((None, partial_state))
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use serde_json::json;

    use super::*;
    use crate::io::Body;

    async fn collect_events(
        fixture: &'static [u8],
    ) -> (Vec<ModelResponseEvent>, Option<OpaqueMessage>) {
        let body = Body::fixture(&[fixture]);
        let mut resp = pin!(OpenAIResponse::from_sse(Sse::new(body)));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await.unwrap()
        {
            events.push(event);
        }
        (events, resp.make_opaque_message())
    }

    #[tokio::test]
    async fn test_tool_call_events() {
        let (events, opaque) =
            collect_events(include_bytes!("../fixtures/tool_calls.txt")).await;

        let text: String = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::MessageDelta(delta) => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Let me look that up.");

        let tool_calls: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::ToolCall(req) => Some(req.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tool_calls.len(), 2);
        assert_eq!(tool_calls[0].id, "call_a");
        assert_eq!(tool_calls[0].name, "weather");
        assert_eq!(tool_calls[0].arguments, json!({ "city": "Oslo" }));
        assert_eq!(tool_calls[1].arguments, json!({ "city": "Bergen" }));

        let tail = &events[events.len() - 2..];
        assert_eq!(
            tail,
            [
                ModelResponseEvent::Usage(TokenUsage {
                    input_tokens: 40,
                    output_tokens: 18,
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );

        let opaque = opaque.unwrap();
        assert_eq!(opaque.id(), "chatcmpl-7");
        let Some(Message::Assistant { tool_calls, .. }) = opaque.to_raw::<Message>()
        else {
            panic!("opaque message should be an assistant message");
        };
        assert_eq!(tool_calls.as_ref().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_text_events() {
        let (events, opaque) =
            collect_events(include_bytes!("../fixtures/text.txt")).await;
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("Hello".to_owned()),
                ModelResponseEvent::MessageDelta(" there!".to_owned()),
                ModelResponseEvent::Usage(TokenUsage {
                    input_tokens: 8,
                    output_tokens: 3,
                }),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );
        let opaque = opaque.unwrap();
        let Some(Message::Assistant { content, .. }) = opaque.to_raw::<Message>() else {
            panic!("opaque message should be an assistant message");
        };
        assert_eq!(content.as_deref(), Some("Hello there!"));
    }
}
