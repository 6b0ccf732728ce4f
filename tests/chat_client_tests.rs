// Tests for the OpenAI-compatible client against a local chat-completions endpoint

use anyhow::Result;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use rebuttal_agent::chat::{ChatClient, ChatError, ChatMessage, ChatRequest, OpenAiCompatClient};
use std::sync::{Arc, Mutex};

/// Authorization header and body of every request the endpoint received
type Seen = Arc<Mutex<Vec<(Option<String>, ChatRequest)>>>;

const REPLY: &str = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"不\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"一定\"}}]}\n\n\
data: [DONE]\n\n";

/// The model name selects the response
async fn completions(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let model = request.model.clone();
    seen.lock().unwrap().push((auth, request));

    match model.as_str() {
        "busy" => (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response(),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "upstream down").into_response(),
        _ => ([(header::CONTENT_TYPE, "text/event-stream")], REPLY).into_response(),
    }
}

async fn serve_completions() -> Result<(String, Seen)> {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok((format!("http://{}/v1/", addr), seen))
}

fn request(model: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system("反驳一切"), ChatMessage::user("今天天气不错")],
        stream: true,
    }
}

#[test]
fn test_endpoint_joins_base_url() {
    let client = OpenAiCompatClient::new("https://example.com/compatible-mode/v1/", "k");
    assert_eq!(
        client.endpoint(),
        "https://example.com/compatible-mode/v1/chat/completions"
    );
}

#[tokio::test]
async fn test_streams_reply_with_bearer_auth() -> Result<()> {
    let (base_url, seen) = serve_completions().await?;
    let client = OpenAiCompatClient::new(base_url, "sk-test");

    let stream = client.stream_chat(request("qwen-plus")).await.unwrap();
    let chunks: Vec<_> = stream.collect().await;

    assert_eq!(chunks, vec![Ok("不".to_string()), Ok("一定".to_string())]);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.as_deref(), Some("Bearer sk-test"));
    assert_eq!(seen[0].1, request("qwen-plus"));
    Ok(())
}

#[tokio::test]
async fn test_too_many_requests_is_rate_limited() -> Result<()> {
    let (base_url, seen) = serve_completions().await?;
    let client = OpenAiCompatClient::new(base_url, "sk-test");

    let err = client.stream_chat(request("busy")).await.err();

    assert_eq!(err, Some(ChatError::RateLimited));
    assert_eq!(seen.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_error_status_keeps_body() -> Result<()> {
    let (base_url, _seen) = serve_completions().await?;
    let client = OpenAiCompatClient::new(base_url, "sk-test");

    let err = client.stream_chat(request("broken")).await.err();

    assert_eq!(
        err,
        Some(ChatError::Status {
            status: 500,
            body: "upstream down".to_string(),
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_unreachable_endpoint_is_connection_error() -> Result<()> {
    // Bind then release a port so nothing is listening on it
    let addr = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?;
    let client = OpenAiCompatClient::new(format!("http://{}", addr), "sk-test");

    let err = client.stream_chat(request("qwen-plus")).await.err();

    assert!(matches!(err, Some(ChatError::Connection(_))));
    Ok(())
}
