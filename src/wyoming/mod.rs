//! Wyoming protocol engine
//!
//! Framing, the event schema, the TCP listener, and the per-connection
//! streaming session machines for synthesis and transcription.

pub mod connection;
pub mod event;
pub mod frame;
pub mod server;
pub mod stt;
pub mod tts;

use std::sync::Arc;

use crate::config::{SettingsStore, PROGRAM_NAME};
use crate::metrics::Metrics;
use crate::workers::{Synthesizer, Transcriber};

pub use event::Event;
pub use frame::{decode, encode, DecodeOutcome, Frame};
pub use server::WyomingServer;

/// Shared dependencies handed to every connection handler
///
/// Settings are read as immutable snapshots; only the HTTP settings handler
/// writes.
#[derive(Clone)]
pub struct WyomingContext {
    pub synthesizer: Arc<dyn Synthesizer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub settings: SettingsStore,
    pub metrics: Arc<Metrics>,
}

impl WyomingContext {
    /// Build the `info` response advertising both programs
    pub async fn build_info(&self) -> event::Info {
        let attribution = event::Attribution {
            name: PROGRAM_NAME.to_string(),
            url: "https://github.com/aria-voice/aria-gateway".to_string(),
        };

        let voices = self
            .synthesizer
            .voices()
            .await
            .into_iter()
            .map(|v| event::TtsVoice {
                name: v.id,
                description: Some(v.name),
                attribution: attribution.clone(),
                installed: true,
                languages: vec![v.language],
            })
            .collect();

        event::Info {
            asr: vec![event::AsrProgram {
                name: format!("{PROGRAM_NAME}-stt"),
                description: Some("On-device speech recognition".to_string()),
                attribution: attribution.clone(),
                installed: true,
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
                languages: self.transcriber.languages().await,
                supports_transcript_streaming: true,
            }],
            tts: vec![event::TtsProgram {
                name: format!("{PROGRAM_NAME}-tts"),
                description: Some("On-device speech synthesis".to_string()),
                attribution,
                installed: true,
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
                voices,
                supports_synthesize_streaming: true,
            }],
        }
    }

    /// Resolve a voice id: explicit name, explicit language, persisted
    /// default, backend default
    pub async fn resolve_voice(&self, selector: Option<&event::VoiceSelector>) -> Option<String> {
        if let Some(selector) = selector {
            if let Some(name) = &selector.name {
                return Some(name.clone());
            }
            if let Some(language) = &selector.language {
                if let Some(voice) = self
                    .synthesizer
                    .voices()
                    .await
                    .into_iter()
                    .find(|v| v.language.eq_ignore_ascii_case(language))
                {
                    return Some(voice.id);
                }
            }
        }
        if let Some(default) = self.settings.snapshot().await.voice.clone() {
            return Some(default);
        }
        self.synthesizer.default_voice().await
    }
}
