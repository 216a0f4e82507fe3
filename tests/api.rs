//! API endpoint integration tests
//!
//! Serves the real router on an ephemeral port and drives it with reqwest.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use aria_gateway::api::{self, ApiState};
use aria_gateway::config::{Settings, SettingsStore};
use aria_gateway::logging::{LogBuffer, LogRecord};
use aria_gateway::metrics::Metrics;
use aria_gateway::workers::{GenEvent, Generator, ModelContainer, ModelLoader};

mod common;
use common::{MockSynthesizer, MockTranscriber, ScriptedGenerator};

struct ScriptedLoader {
    script: Vec<GenEvent>,
}

#[async_trait]
impl ModelLoader for ScriptedLoader {
    async fn load(&self, _model: &str) -> aria_gateway::Result<Arc<dyn Generator>> {
        Ok(Arc::new(ScriptedGenerator { script: self.script.clone() }))
    }
}

struct TestApi {
    base: String,
    state: Arc<ApiState>,
}

async fn spawn_api(script: Option<Vec<GenEvent>>) -> TestApi {
    let models = script.map(|script| {
        Arc::new(ModelContainer::new(
            Arc::new(ScriptedLoader { script }),
            vec!["aria-3b".to_string()],
        ))
    });

    let state = Arc::new(ApiState {
        settings: SettingsStore::new(Settings::default()),
        metrics: Arc::new(Metrics::new().unwrap()),
        synthesizer: Arc::new(MockSynthesizer::default()),
        transcriber: Arc::new(MockTranscriber::default()),
        models,
        logs: LogBuffer::new(64),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = api::router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApi { base: format!("http://{addr}"), state }
}

#[tokio::test]
async fn health_returns_ok_text() {
    let api = spawn_api(None).await;
    let response = reqwest::get(format!("{}/health", api.base)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn metrics_exposition_renders() {
    let api = spawn_api(None).await;
    api.state.metrics.connections_accepted.inc();

    let response = reqwest::get(format!("{}/metrics", api.base)).await.unwrap();
    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();
    assert!(text.contains("aria_connections_accepted_total 1"));
}

#[tokio::test]
async fn settings_roundtrip_and_validation() {
    let api = spawn_api(None).await;
    let client = reqwest::Client::new();

    // Valid update applies atomically.
    let response = client
        .post(format!("{}/api/wyoming/settings", api.base))
        .json(&serde_json::json!({"voice": "en_US-amy", "language": "de-DE", "sentence_pause": 0.5}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let settings: serde_json::Value = client
        .get(format!("{}/api/wyoming/settings", api.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(settings["voice"], "en_US-amy");
    assert_eq!(settings["language"], "de-DE");
    assert_eq!(settings["sentence_pause"], 0.5);

    // Unknown voice is rejected and nothing changes.
    let response = client
        .post(format!("{}/api/wyoming/settings", api.base))
        .json(&serde_json::json!({"voice": "nope", "sentence_pause": 2.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "error");

    let snapshot = api.state.settings.snapshot().await;
    assert_eq!(snapshot.voice.as_deref(), Some("en_US-amy"));
    assert!((snapshot.sentence_pause - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn voice_and_language_listings() {
    let api = spawn_api(None).await;

    let voices: serde_json::Value = reqwest::get(format!("{}/api/wyoming/tts/voices", api.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(voices[0]["id"], "en_US-amy");

    let languages: Vec<String> = reqwest::get(format!("{}/api/wyoming/stt/languages", api.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(languages.contains(&"en-US".to_string()));
}

#[tokio::test]
async fn logs_query_filters_and_since() {
    let api = spawn_api(None).await;
    api.state.logs.push(LogRecord {
        timestamp: Utc::now() - chrono::Duration::hours(2),
        level: "INFO".to_string(),
        category: "aria_gateway::wyoming".to_string(),
        message: "old".to_string(),
    });
    api.state.logs.push(LogRecord {
        timestamp: Utc::now(),
        level: "WARN".to_string(),
        category: "aria_gateway::api".to_string(),
        message: "fresh".to_string(),
    });

    let body: serde_json::Value =
        reqwest::get(format!("{}/api/logs?since=30m&level=warn", api.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["logs"][0]["message"], "fresh");

    // Unix-seconds and ISO forms parse too.
    let unix = reqwest::get(format!("{}/api/logs?since=0", api.base)).await.unwrap();
    assert_eq!(unix.status(), 200);
    let iso = reqwest::get(format!(
        "{}/api/logs?since=2026-01-01T00:00:00.000Z",
        api.base
    ))
    .await
    .unwrap();
    assert_eq!(iso.status(), 200);

    // Garbage is a 400.
    let bad = reqwest::get(format!("{}/api/logs?since=lastweek", api.base)).await.unwrap();
    assert_eq!(bad.status(), 400);
}

#[tokio::test]
async fn models_listing() {
    let api = spawn_api(Some(vec![GenEvent::Chunk("hi".to_string())])).await;
    let body: serde_json::Value = reqwest::get(format!("{}/v1/models", api.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"][0]["id"], "aria-3b");
}

#[tokio::test]
async fn llm_settings_roundtrip() {
    let api = spawn_api(None).await;
    let client = reqwest::Client::new();

    let updated: serde_json::Value = client
        .post(format!("{}/api/llm/settings", api.base))
        .json(&serde_json::json!({"temperature": 0.2, "max_tokens": 256}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["max_tokens"], 256);

    let current: serde_json::Value = client
        .get(format!("{}/api/llm/settings", api.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current["max_tokens"], 256);
    assert_eq!(current["top_p"], 0.9);
}

#[tokio::test]
async fn chat_completion_non_streaming() {
    let api = spawn_api(Some(vec![
        GenEvent::Info("aria-3b".to_string()),
        GenEvent::Chunk("Hello ".to_string()),
        GenEvent::Chunk("there.".to_string()),
    ]))
    .await;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .post(format!("{}/v1/chat/completions", api.base))
        .json(&serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
            "stream": false,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello there.");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn chat_completion_sse_tool_call() {
    let api = spawn_api(Some(vec![GenEvent::ToolCall {
        name: "get_weather".to_string(),
        arguments: r#"{"city":"Oslo"}"#.to_string(),
    }]))
    .await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/v1/chat/completions", api.base))
        .json(&serde_json::json!({
            "messages": [{"role": "user", "content": "weather in oslo?"}],
            "stream": true,
        }))
        .send()
        .await
        .unwrap();
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let text = response.text().await.unwrap();
    let payloads: Vec<&str> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .collect();

    // Terminal sentinel is last.
    assert_eq!(*payloads.last().unwrap(), "[DONE]");

    // Exactly one chunk carries the tool call, with `function` as a JSON
    // string encoding name and arguments.
    let tool_chunks: Vec<serde_json::Value> = payloads
        .iter()
        .filter(|p| **p != "[DONE]")
        .map(|p| serde_json::from_str(p).unwrap())
        .filter(|v: &serde_json::Value| !v["choices"][0]["delta"]["tool_calls"].is_null())
        .collect();
    assert_eq!(tool_chunks.len(), 1);

    let function = &tool_chunks[0]["choices"][0]["delta"]["tool_calls"][0]["function"];
    assert!(function.is_string());
    let inner: serde_json::Value = serde_json::from_str(function.as_str().unwrap()).unwrap();
    assert_eq!(inner["name"], "get_weather");
    assert_eq!(inner["arguments"], r#"{"city":"Oslo"}"#);

    // A finish chunk with finish_reason "stop" precedes the sentinel.
    let finish: Vec<serde_json::Value> = payloads
        .iter()
        .filter(|p| **p != "[DONE]")
        .map(|p| serde_json::from_str(p).unwrap())
        .filter(|v: &serde_json::Value| v["choices"][0]["finish_reason"] == "stop")
        .collect();
    assert_eq!(finish.len(), 1);
}

#[tokio::test]
async fn chat_completion_without_backend_is_unavailable() {
    let api = spawn_api(None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/v1/chat/completions", api.base))
        .json(&serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}
