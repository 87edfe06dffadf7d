//! Integration contract against a mock OpenAI-compatible endpoint.

use std::convert::Infallible;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chat_client::compat::{self, Chat, Request, RequestBuilder};
use chat_client::stream;
use futures_util::StreamExt;
use serde_json::json;
use tokio::net::TcpListener;

/// Serve the router on an ephemeral port, returning the versioned base URL.
async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v1")
}

fn hello_request() -> Request {
    RequestBuilder::default()
        .messages(Chat::start_new(
            None,
            "Say hello in one sentence.".to_string(),
        ))
        .model("test-model".to_string())
        .max_tokens(64)
        .build()
        .unwrap()
}

fn sse_router(deltas: &'static [&'static str]) -> Router {
    Router::new().route(
        "/v1/chat/completions",
        post(move || async move {
            let events = deltas
                .iter()
                .map(|text| {
                    Event::default().data(
                        json!({
                            "choices": [{
                                "index": 0,
                                "delta": {"content": text},
                                "finish_reason": null
                            }]
                        })
                        .to_string(),
                    )
                })
                .chain(std::iter::once(Event::default().data("[DONE]")))
                .map(Ok::<_, Infallible>)
                .collect::<Vec<_>>();

            Sse::new(tokio_stream::iter(events))
        }),
    )
}

#[tokio::test]
async fn completion_prints_first_candidate() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            Json(json!({
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hello!"},
                    "finish_reason": "stop"
                }]
            }))
        }),
    );
    let base_url = serve(router).await;

    let response = compat::completion(&base_url, "not-needed", &hello_request())
        .await
        .unwrap();
    assert_eq!(response.content(), Some("Hello!"));
}

#[tokio::test]
async fn completion_is_idempotent_against_deterministic_server() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            Json(json!({
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hello!"},
                    "finish_reason": "stop"
                }]
            }))
        }),
    );
    let base_url = serve(router).await;

    let first = compat::completion(&base_url, "not-needed", &hello_request())
        .await
        .unwrap();
    let second = compat::completion(&base_url, "not-needed", &hello_request())
        .await
        .unwrap();
    assert_eq!(first.content(), second.content());
}

#[tokio::test]
async fn completion_surfaces_http_error() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let base_url = serve(router).await;

    let result = compat::completion(&base_url, "not-needed", &hello_request()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn completion_surfaces_api_error_body() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            Json(json!({
                "error": {"message": "model not found", "type": "invalid_request_error"}
            }))
        }),
    );
    let base_url = serve(router).await;

    let result = compat::completion(&base_url, "not-needed", &hello_request()).await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("model not found"));
}

#[tokio::test]
async fn streaming_deltas_arrive_in_order() {
    let base_url = serve(sse_router(&["Roses ", "are ", "red."])).await;

    let mut chunks = stream::completion(&base_url, "not-needed", &hello_request())
        .await
        .unwrap();

    let mut deltas = Vec::new();
    let mut text = String::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.unwrap();
        if let Some(delta) = chunk.content() {
            deltas.push(delta.to_string());
            text.push_str(delta);
        }
    }

    assert_eq!(deltas, vec!["Roses ", "are ", "red."]);
    assert_eq!(text, "Roses are red.");
}

#[tokio::test]
async fn empty_stream_terminates_cleanly() {
    let base_url = serve(sse_router(&[])).await;

    let collected = tokio::time::timeout(Duration::from_secs(5), async {
        let chunks = stream::completion(&base_url, "not-needed", &hello_request())
            .await
            .unwrap();
        chunks.collect::<Vec<_>>().await
    })
    .await
    .expect("stream must not hang");

    assert!(collected.is_empty());
}

#[tokio::test]
async fn streaming_fails_fast_on_http_error() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let base_url = serve(router).await;

    let result = stream::completion(&base_url, "not-needed", &hello_request()).await;
    let err = result.err().expect("error before any chunk");
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn list_models_returns_ids() {
    let router = Router::new().route(
        "/v1/models",
        get(|| async {
            Json(json!({
                "object": "list",
                "data": [
                    {"id": "TinyLlama/TinyLlama-1.1B-Chat-v1.0", "created": 0, "owned_by": "local"}
                ]
            }))
        }),
    );
    let base_url = serve(router).await;

    let models = compat::list_models(&base_url, "not-needed").await.unwrap();
    assert_eq!(models, vec!["TinyLlama/TinyLlama-1.1B-Chat-v1.0"]);
}
