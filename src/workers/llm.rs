//! LLM generation backend and model container
//!
//! [`HttpGenerator`] streams from an OpenAI-compatible completion host and
//! folds its delta events into the [`GenEvent`] contract. [`ModelContainer`]
//! caches loaded generators and coalesces loads so at most one load per
//! model name is ever in flight.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex, OnceCell};

use super::{GenEvent, GenerateRequest, Generator};
use crate::{Error, Result};

/// Generator backed by an OpenAI-compatible HTTP completion host
pub struct HttpGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<DeltaToolCall>>,
}

#[derive(Deserialize)]
struct DeltaToolCall {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    function: Option<DeltaFunction>,
}

#[derive(Deserialize, Default)]
struct DeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// In-progress tool call assembled from streamed fragments
#[derive(Default, Clone)]
struct PendingToolCall {
    name: String,
    arguments: String,
}

impl HttpGenerator {
    /// Create a generator facade for `model` at the host `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, request: GenerateRequest, sink: mpsc::Sender<GenEvent>) -> Result<()> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "top_p": request.top_p,
            "repetition_penalty": request.repetition_penalty,
            "stream": true,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::Value::Array(request.tools.clone());
        }
        for (key, value) in &request.additional_context {
            body[key] = serde_json::Value::String(value.clone());
        }

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!("completion host error {status}: {text}")));
        }

        if sink.send(GenEvent::Info(self.model.clone())).await.is_err() {
            return Ok(());
        }

        let mut pending_tool_calls: Vec<PendingToolCall> = Vec::new();
        let mut stream = response.bytes_stream();
        let mut line_buf: Vec<u8> = Vec::new();

        'outer: while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(|e| Error::Generation(format!("stream read failed: {e}")))?;
            line_buf.extend_from_slice(&bytes);

            while let Some(newline) = line_buf.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = line_buf.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim();
                let Some(payload) = line.strip_prefix("data:") else {
                    continue;
                };
                let payload = payload.trim();
                if payload == "[DONE]" {
                    break 'outer;
                }

                let chunk: StreamChunk = match serde_json::from_str(payload) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed completion chunk");
                        continue;
                    }
                };

                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty()
                            && sink.send(GenEvent::Chunk(content)).await.is_err()
                        {
                            // Consumer cancelled; stop cooperatively.
                            return Ok(());
                        }
                    }
                    for tc in choice.delta.tool_calls.unwrap_or_default() {
                        let idx = tc.index as usize;
                        if idx >= pending_tool_calls.len() {
                            pending_tool_calls.resize_with(idx + 1, PendingToolCall::default);
                        }
                        if let Some(function) = tc.function {
                            if let Some(name) = function.name {
                                pending_tool_calls[idx].name = name;
                            }
                            if let Some(arguments) = function.arguments {
                                pending_tool_calls[idx].arguments.push_str(&arguments);
                            }
                        }
                    }
                    if choice.finish_reason.is_some() {
                        break 'outer;
                    }
                }
            }
        }

        for tc in pending_tool_calls {
            if tc.name.is_empty() {
                continue;
            }
            if sink
                .send(GenEvent::ToolCall { name: tc.name, arguments: tc.arguments })
                .await
                .is_err()
            {
                return Ok(());
            }
        }

        Ok(())
    }
}

/// Loads a generator for a model name
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, model: &str) -> Result<Arc<dyn Generator>>;
}

/// Process-wide model cache with coalesced loads
///
/// At most one load per model name runs at a time; concurrent requesters for
/// the same name wait on the in-flight load instead of starting another.
pub struct ModelContainer {
    loader: Arc<dyn ModelLoader>,
    available: Vec<String>,
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<dyn Generator>>>>>,
}

impl ModelContainer {
    /// Create a container over `loader` advertising `available` model names
    #[must_use]
    pub fn new(loader: Arc<dyn ModelLoader>, available: Vec<String>) -> Self {
        Self {
            loader,
            available,
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Model names this container can serve
    #[must_use]
    pub fn models(&self) -> &[String] {
        &self.available
    }

    /// Get the generator for `model`, loading it if needed
    ///
    /// # Errors
    ///
    /// Returns the loader's error; a failed load leaves the slot empty so a
    /// later request retries.
    pub async fn get(&self, model: &str) -> Result<Arc<dyn Generator>> {
        let cell = {
            let mut cells = self.cells.lock().await;
            Arc::clone(cells.entry(model.to_string()).or_default())
        };

        let generator = cell
            .get_or_try_init(|| async {
                tracing::info!(model, "loading model");
                self.loader.load(model).await
            })
            .await?;
        Ok(Arc::clone(generator))
    }
}
