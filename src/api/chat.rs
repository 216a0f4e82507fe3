//! OpenAI-compatible chat completion surface
//!
//! `POST /v1/chat/completions` drives the LLM worker and answers either a
//! single `chat.completion` envelope or an SSE stream of
//! `chat.completion.chunk` frames ending with `data: [DONE]`. Tool calls are
//! serialized with `function` as a JSON *string* — the downstream voice
//! client parses it itself.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::ApiState;
use crate::config::LlmSettings;
use crate::workers::{ChatMessage, GenEvent, GenerateRequest, Generator};

/// Chat completion request body (OpenAI-compatible subset)
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub tools: Option<Vec<serde_json::Value>>,
}

/// A tool call on the wire; `function` is a JSON-serialized string
#[derive(Debug, Serialize)]
struct WireToolCall {
    index: u32,
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: String,
}

#[derive(Debug, Serialize, Default)]
struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Serialize)]
struct ChunkChoice {
    index: u32,
    delta: Delta,
    finish_reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ChunkEnvelope {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Serialize)]
struct CompletionMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Serialize)]
struct CompletionChoice {
    index: u32,
    message: CompletionMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
struct CompletionEnvelope {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<CompletionChoice>,
}

fn wire_tool_call(index: u32, name: &str, arguments: &str) -> WireToolCall {
    let function = serde_json::json!({ "name": name, "arguments": arguments });
    WireToolCall {
        index,
        id: format!("call_{}", Uuid::new_v4().simple()),
        call_type: "function",
        // Serialized to a string deliberately; see module docs.
        function: function.to_string(),
    }
}

fn chunk_envelope(id: &str, created: i64, model: &str, delta: Delta, finish: Option<&'static str>) -> ChunkEnvelope {
    ChunkEnvelope {
        id: id.to_string(),
        object: "chat.completion.chunk",
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice { index: 0, delta, finish_reason: finish }],
    }
}

/// Resolve the generator and effective request parameters
async fn prepare(
    state: &ApiState,
    request: &ChatCompletionRequest,
) -> Result<(Arc<dyn Generator>, String, GenerateRequest), (StatusCode, String)> {
    let Some(models) = &state.models else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "no completion backend configured".to_string(),
        ));
    };

    let settings = state.settings.snapshot().await;
    let model = request
        .model
        .clone()
        .or_else(|| settings.llm.model.clone())
        .or_else(|| models.models().first().cloned())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "no model specified".to_string()))?;

    let generator = models
        .get(&model)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("model load failed: {e}")))?;

    let generate = GenerateRequest {
        messages: request.messages.clone(),
        temperature: request.temperature.unwrap_or(settings.llm.temperature),
        max_tokens: request.max_tokens.unwrap_or(settings.llm.max_tokens),
        top_p: request.top_p.unwrap_or(settings.llm.top_p),
        repetition_penalty: request
            .repetition_penalty
            .unwrap_or(settings.llm.repetition_penalty),
        additional_context: std::collections::HashMap::new(),
        tools: request.tools.clone().unwrap_or_default(),
    };
    Ok((generator, model, generate))
}

/// Chat completion handler
async fn chat_completions(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    if request.messages.is_empty() {
        return (StatusCode::BAD_REQUEST, "messages must not be empty").into_response();
    }
    state.metrics.chat_requests.inc();

    let (generator, model, generate) = match prepare(&state, &request).await {
        Ok(prepared) => prepared,
        Err((status, message)) => return (status, message).into_response(),
    };

    let (tx, rx) = mpsc::channel::<GenEvent>(32);
    let task = tokio::spawn(async move { generator.generate(generate, tx).await });

    if request.stream {
        Sse::new(completion_stream(model, rx))
            .keep_alive(KeepAlive::default())
            .into_response()
    } else {
        collect_completion(model, rx, task).await
    }
}

/// SSE stream of `chat.completion.chunk` frames
///
/// Dropping this stream drops the receiver, which cancels the generator
/// cooperatively on its next send.
fn completion_stream(
    model: String,
    mut rx: mpsc::Receiver<GenEvent>,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    let id = format!("chatcmpl-{}", Uuid::new_v4().simple());
    let created = Utc::now().timestamp();

    async_stream::stream! {
        let role = chunk_envelope(&id, created, &model, Delta { role: Some("assistant"), ..Delta::default() }, None);
        if let Ok(event) = SseEvent::default().json_data(&role) {
            yield Ok(event);
        }

        let mut tool_index = 0u32;
        while let Some(gen_event) = rx.recv().await {
            let delta = match gen_event {
                GenEvent::Chunk(content) => Delta { content: Some(content), ..Delta::default() },
                GenEvent::ToolCall { name, arguments } => {
                    let call = wire_tool_call(tool_index, &name, &arguments);
                    tool_index += 1;
                    Delta { tool_calls: Some(vec![call]), ..Delta::default() }
                }
                GenEvent::Info(model) => {
                    tracing::debug!(%model, "generation started");
                    continue;
                }
            };
            let envelope = chunk_envelope(&id, created, &model, delta, None);
            if let Ok(event) = SseEvent::default().json_data(&envelope) {
                yield Ok(event);
            }
        }

        let finish = chunk_envelope(&id, created, &model, Delta::default(), Some("stop"));
        if let Ok(event) = SseEvent::default().json_data(&finish) {
            yield Ok(event);
        }
        yield Ok(SseEvent::default().data("[DONE]"));
    }
}

/// Collect the whole generation into one `chat.completion` envelope
async fn collect_completion(
    model: String,
    mut rx: mpsc::Receiver<GenEvent>,
    task: tokio::task::JoinHandle<crate::Result<()>>,
) -> Response {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    while let Some(gen_event) = rx.recv().await {
        match gen_event {
            GenEvent::Chunk(text) => content.push_str(&text),
            GenEvent::ToolCall { name, arguments } => {
                let index = u32::try_from(tool_calls.len()).unwrap_or(u32::MAX);
                tool_calls.push(wire_tool_call(index, &name, &arguments));
            }
            GenEvent::Info(_) => {}
        }
    }

    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return (StatusCode::BAD_GATEWAY, format!("generation failed: {e}")).into_response();
        }
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("generation task failed: {e}"))
                .into_response();
        }
    }

    let envelope = CompletionEnvelope {
        id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
        object: "chat.completion",
        created: Utc::now().timestamp(),
        model,
        choices: vec![CompletionChoice {
            index: 0,
            message: CompletionMessage {
                role: "assistant",
                content,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason: "stop",
        }],
    };
    Json(envelope).into_response()
}

/// Model listing entry
#[derive(Debug, Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
}

#[derive(Debug, Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<ModelEntry>,
}

/// List available models
async fn list_models(State(state): State<Arc<ApiState>>) -> Json<ModelList> {
    let data = state
        .models
        .as_ref()
        .map(|m| {
            m.models()
                .iter()
                .map(|id| ModelEntry { id: id.clone(), object: "model" })
                .collect()
        })
        .unwrap_or_default();
    Json(ModelList { object: "list", data })
}

/// Partial LLM settings update
#[derive(Debug, Deserialize)]
pub struct LlmSettingsUpdate {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub repetition_penalty: Option<f32>,
}

/// Get the LLM sampling settings
async fn get_llm_settings(State(state): State<Arc<ApiState>>) -> Json<LlmSettings> {
    Json(state.settings.snapshot().await.llm.clone())
}

/// Update the LLM sampling settings
async fn post_llm_settings(
    State(state): State<Arc<ApiState>>,
    Json(update): Json<LlmSettingsUpdate>,
) -> Json<LlmSettings> {
    let mut settings = (*state.settings.snapshot().await).clone();
    if let Some(model) = update.model {
        settings.llm.model = Some(model);
    }
    if let Some(temperature) = update.temperature {
        settings.llm.temperature = temperature;
    }
    if let Some(max_tokens) = update.max_tokens {
        settings.llm.max_tokens = max_tokens;
    }
    if let Some(top_p) = update.top_p {
        settings.llm.top_p = top_p;
    }
    if let Some(penalty) = update.repetition_penalty {
        settings.llm.repetition_penalty = penalty;
    }
    let llm = settings.llm.clone();
    state.settings.apply(settings).await;
    tracing::info!("llm settings updated");
    Json(llm)
}

/// Build chat router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/api/llm/settings", get(get_llm_settings).post(post_llm_settings))
        .with_state(state)
}
