//! Ollama client and embedding model against an in-process mock of the Ollama API.

use std::sync::{Arc, Mutex};

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};

use endoscopy_bot::embedding::{load_embedding_model, EmbeddingModel};
use endoscopy_bot::ollama::{GenerateOptions, OllamaClient};
use endoscopy_bot::prompt::SYSTEM_PROMPT;

#[derive(Clone, Default)]
struct MockOllama {
    legacy_only: bool,
    generate_requests: Arc<Mutex<Vec<Value>>>,
}

async fn embed(State(mock): State<MockOllama>, Json(body): Json<Value>) -> Response {
    if mock.legacy_only {
        return (StatusCode::NOT_FOUND, "404 page not found").into_response();
    }
    let dims = if body["model"] == "bge-base-en-v1.5" { 4 } else { 2 };
    Json(json!({ "embeddings": [vec![0.25f32; dims]] })).into_response()
}

async fn embeddings(Json(_body): Json<Value>) -> Response {
    Json(json!({ "embedding": [0.1, 0.2, 0.3] })).into_response()
}

async fn generate(State(mock): State<MockOllama>, Json(body): Json<Value>) -> Response {
    mock.generate_requests.lock().unwrap().push(body.clone());
    if body["model"] == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "model 'missing' not found" })),
        )
            .into_response();
    }
    Json(json!({ "response": "  Avoid solid food for 6-8 hours.  ", "done": true }))
        .into_response()
}

async fn spawn_mock(mock: MockOllama) -> String {
    let app = Router::new()
        .route("/api/embed", post(embed))
        .route("/api/embeddings", post(embeddings))
        .route("/api/generate", post(generate))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn embedding_model_learns_dimension_from_probe() {
    let base_url = spawn_mock(MockOllama::default()).await;
    let model = load_embedding_model(OllamaClient::new(base_url), "bge-base-en-v1.5")
        .await
        .unwrap();

    assert_eq!(model.name(), "bge-base-en-v1.5");
    assert_eq!(model.dimension(), 4);
    assert_eq!(model.embed("bowel prep").await.unwrap().len(), 4);
}

#[tokio::test]
async fn embedding_falls_back_to_legacy_endpoint() {
    let base_url = spawn_mock(MockOllama {
        legacy_only: true,
        ..MockOllama::default()
    })
    .await;

    let model = EmbeddingModel::load(OllamaClient::new(base_url), "bge-base-en-v1.5")
        .await
        .unwrap();
    assert_eq!(model.dimension(), 3);
}

#[tokio::test]
async fn empty_text_is_not_sent_for_embedding() {
    let base_url = spawn_mock(MockOllama::default()).await;
    let client = OllamaClient::new(base_url);
    let err = client.embed("bge-base-en-v1.5", "  \n ").await.unwrap_err();
    assert!(err.to_string().contains("empty text"));
}

#[tokio::test]
async fn generate_sends_system_prompt_and_trims_answer() {
    let mock = MockOllama::default();
    let requests = mock.generate_requests.clone();
    let client = OllamaClient::new(spawn_mock(mock).await);

    let answer = client
        .generate_text(
            "endoscopy-zephyr",
            Some(SYSTEM_PROMPT),
            "Question:\nCan I eat before endoscopy?",
            GenerateOptions {
                num_predict: 128,
                temperature: 0.2,
            },
        )
        .await
        .unwrap();
    assert_eq!(answer, "Avoid solid food for 6-8 hours.");

    let sent = requests.lock().unwrap()[0].clone();
    assert_eq!(sent["model"], "endoscopy-zephyr");
    assert_eq!(sent["system"], SYSTEM_PROMPT);
    assert_eq!(sent["stream"], false);
    assert_eq!(sent["options"]["num_predict"], 128);
}

#[tokio::test]
async fn generate_without_system_omits_field() {
    let mock = MockOllama::default();
    let requests = mock.generate_requests.clone();
    let client = OllamaClient::new(spawn_mock(mock).await);

    client
        .generate_text(
            "endoscopy-zephyr",
            None,
            "hello",
            GenerateOptions {
                num_predict: 16,
                temperature: 0.0,
            },
        )
        .await
        .unwrap();

    let sent = requests.lock().unwrap()[0].clone();
    assert!(sent.get("system").is_none());
}

#[tokio::test]
async fn generate_error_carries_ollama_message() {
    let client = OllamaClient::new(spawn_mock(MockOllama::default()).await);

    let err = client
        .generate_text(
            "missing",
            None,
            "hello",
            GenerateOptions {
                num_predict: 16,
                temperature: 0.0,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "ollama /api/generate returned 404 Not Found: model 'missing' not found"
    );
}
