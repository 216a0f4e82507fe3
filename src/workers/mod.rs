//! Worker adapters
//!
//! Thin facades over the speech and language backends, presenting uniform
//! async streaming contracts to the session machines:
//! - [`Synthesizer`]: text in, lazy PCM buffer sequence out
//! - [`Transcriber`]: PCM in, partial transcripts out, final transcript returned
//! - [`Generator`]: chat messages in, token/tool-call stream out
//!
//! Backends stream through bounded channels; a receiver that goes away makes
//! the next send fail, which is the cooperative cancellation signal.

mod llm;
mod stt;
mod tts;

pub use llm::{HttpGenerator, ModelContainer, ModelLoader};
pub use stt::HttpTranscriber;
pub use tts::HttpSynthesizer;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::audio::AudioFormat;
use crate::Result;

/// One synthesized PCM buffer
///
/// An empty `pcm` marks end-of-synthesis; its `format` repeats the stream
/// format and carries no audio.
#[derive(Debug, Clone)]
pub struct SynthesisChunk {
    pub pcm: Vec<u8>,
    pub format: AudioFormat,
}

impl SynthesisChunk {
    /// End-of-synthesis sentinel
    #[must_use]
    pub fn end(format: AudioFormat) -> Self {
        Self { pcm: Vec::new(), format }
    }

    /// Whether this chunk is the end sentinel
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.pcm.is_empty()
    }
}

/// A voice the synthesizer can speak with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: String,
}

/// Speech synthesis backend contract
///
/// May be invoked concurrently across sessions; within one session the
/// machine serializes calls.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` (plain or SSML), streaming PCM buffers into `sink`
    /// and finishing with the empty end sentinel.
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        sink: mpsc::Sender<SynthesisChunk>,
    ) -> Result<()>;

    /// Voices this backend can enumerate
    async fn voices(&self) -> Vec<VoiceInfo>;

    /// Backend default voice id, when the backend has one
    async fn default_voice(&self) -> Option<String>;
}

/// Speech recognition backend contract
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a PCM buffer, emitting partial hypotheses into `partials`
    /// and returning only once the final transcript is resolved.
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
        language: Option<&str>,
        partials: mpsc::Sender<String>,
    ) -> Result<String>;

    /// Languages this backend can transcribe
    async fn languages(&self) -> Vec<String>;
}

/// A chat message handed to the generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Tool specification forwarded verbatim to the generator
pub type ToolSpec = serde_json::Value;

/// Parameters for one generation request
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    /// Extra backend-specific key/value context
    pub additional_context: HashMap<String, String>,
    pub tools: Vec<ToolSpec>,
}

/// One streamed generation event
#[derive(Debug, Clone, PartialEq)]
pub enum GenEvent {
    /// A text token chunk
    Chunk(String),
    /// A structured tool invocation; arguments is a JSON string
    ToolCall { name: String, arguments: String },
    /// Backend metadata (model name, load notes)
    Info(String),
}

/// LLM generation backend contract
///
/// Cancellation is cooperative: the generator stops when `sink` sends fail.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerateRequest, sink: mpsc::Sender<GenEvent>) -> Result<()>;
}
