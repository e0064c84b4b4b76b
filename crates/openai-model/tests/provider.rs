use std::future::poll_fn;
use std::pin::pin;

use chatgraph_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    TokenUsage,
};
use chatgraph_openai_model::{Error, OpenAIConfigBuilder, OpenAIProvider};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> OpenAIProvider {
    OpenAIProvider::new(
        OpenAIConfigBuilder::with_api_key("gsk_test")
            .with_model("llama-3.3-70b-versatile")
            .with_base_url(server.uri())
            .build(),
    )
}

fn request() -> ModelRequest {
    ModelRequest {
        messages: vec![ModelMessage::User("Hi".to_owned())],
        tools: vec![],
    }
}

async fn respond_with(template: ResponseTemplate) -> Error {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(template)
        .mount(&server)
        .await;

    match provider(&server).send_request(&request()).await {
        Ok(_) => panic!("expected the request to fail"),
        Err(err) => err,
    }
}

#[tokio::test]
async fn test_rate_limited() {
    let err = respond_with(ResponseTemplate::new(429)).await;
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
}

#[tokio::test]
async fn test_server_error() {
    let err = respond_with(ResponseTemplate::new(500)).await;
    assert_eq!(err.kind(), ErrorKind::Other);
}

#[tokio::test]
async fn test_not_an_event_stream() {
    let err = respond_with(
        ResponseTemplate::new(200).set_body_json(json!({ "id": "x" })),
    )
    .await;
    assert_eq!(err.kind(), ErrorKind::Other);
    assert!(err.message().contains("content type"));
}

#[tokio::test]
async fn test_streamed_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer gsk_test"))
        .and(body_partial_json(json!({
            "model": "llama-3.3-70b-versatile",
            "stream": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            include_bytes!("../fixtures/text.txt").as_slice(),
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let resp = provider(&server).send_request(&request()).await;
    let Ok(resp) = resp else {
        panic!("expected a streamed response");
    };
    let mut resp = pin!(resp);
    let mut events = vec![];
    while let Some(event) =
        poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await.unwrap()
    {
        events.push(event);
    }

    assert_eq!(
        events,
        [
            ModelResponseEvent::MessageDelta("Hello".to_owned()),
            ModelResponseEvent::MessageDelta(" there!".to_owned()),
            ModelResponseEvent::Usage(TokenUsage {
                input_tokens: 8,
                output_tokens: 3,
            }),
            ModelResponseEvent::Completed(ModelFinishReason::Stop),
        ]
    );
    assert_eq!(resp.make_opaque_message().unwrap().id(), "chatcmpl-9");
}
