//! HTTP-level tests for the OpenAI-compatible backend against a mock server.

use cohort_core::{EmbeddingBackend, Error};
use cohort_inference::openai::{OpenAIBackend, OpenAIConfig, MAX_INPUT_CHARS};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_for(server: &MockServer, dimension: usize) -> OpenAIBackend {
    let config = OpenAIConfig::default()
        .with_base_url(format!("{}/v1", server.uri()))
        .with_api_key("test-key")
        .with_model("text-embedding-3-small")
        .with_dimension(dimension)
        .with_timeout_seconds(5);
    OpenAIBackend::new(config).expect("client should build")
}

fn embedding_body(vector: &[f32]) -> Value {
    json!({
        "object": "list",
        "data": [{"object": "embedding", "embedding": vector, "index": 0}],
        "model": "text-embedding-3-small",
        "usage": {"prompt_tokens": 3, "total_tokens": 3}
    })
}

async fn sent_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1, "exactly one provider call expected");
    serde_json::from_slice(&requests[0].body).expect("json body")
}

#[tokio::test]
async fn test_embed_sends_model_and_float_encoding() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[0.1, 0.2, 0.3])))
        .mount(&server)
        .await;

    let backend = backend_for(&server, 3);
    let vector = backend.embed_text("Name: Ann").await.unwrap();
    assert_eq!(vector, vec![0.1, 0.2, 0.3]);

    let body = sent_body(&server).await;
    assert_eq!(body["model"], "text-embedding-3-small");
    assert_eq!(body["encoding_format"], "float");
    assert_eq!(body["input"], json!(["Name: Ann"]));
}

#[tokio::test]
async fn test_long_input_is_cut_to_first_8000_chars() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[1.0])))
        .mount(&server)
        .await;

    let text: String = (0..10_000)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect();
    let backend = backend_for(&server, 1);
    backend.embed_text(&text).await.unwrap();

    let body = sent_body(&server).await;
    let sent = body["input"][0].as_str().unwrap();
    assert_eq!(sent.chars().count(), MAX_INPUT_CHARS);
    assert_eq!(sent, &text[..8000]);
}

#[tokio::test]
async fn test_empty_data_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let err = backend_for(&server, 3).embed_text("x").await.unwrap_err();
    assert!(matches!(err, Error::Provider(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_non_success_status_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached", "type": "requests"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = backend_for(&server, 3).embed_text("x").await.unwrap_err();
    match err {
        Error::Provider(msg) => assert!(msg.contains("Rate limit reached")),
        other => panic!("expected provider error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dimension_mismatch_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[0.1, 0.2])))
        .mount(&server)
        .await;

    let err = backend_for(&server, 1536)
        .embed_text("x")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Provider(_)));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_provider_error() {
    let config = OpenAIConfig::default()
        .with_base_url("http://127.0.0.1:9/v1")
        .with_timeout_seconds(2);
    let backend = OpenAIBackend::new(config).unwrap();
    let err = backend.embed_text("x").await.unwrap_err();
    assert!(matches!(err, Error::Provider(_)));
}
