//! Configuration management for the aria gateway

pub mod file;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;

/// Default Wyoming TCP port
pub const DEFAULT_WYOMING_PORT: u16 = 10200;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 10100;

/// Program name used for mDNS instance naming and `info` attribution
pub const PROGRAM_NAME: &str = "aria";

/// Startup configuration, fixed for the process lifetime
#[derive(Debug, Clone)]
pub struct Config {
    /// Wyoming TCP port
    pub wyoming_port: u16,

    /// HTTP API port
    pub http_port: u16,

    /// Advertise the Wyoming port over mDNS
    pub mdns_enabled: bool,

    /// Speech synthesis host base URL
    pub tts_url: String,

    /// Transcription host base URL
    pub stt_url: String,

    /// Completion host base URL; None disables the LLM surface
    pub llm_url: Option<String>,

    /// Model names the completion host can serve
    pub llm_models: Vec<String>,

    /// Initial runtime settings
    pub settings: Settings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wyoming_port: DEFAULT_WYOMING_PORT,
            http_port: DEFAULT_HTTP_PORT,
            mdns_enabled: true,
            tts_url: "http://127.0.0.1:5002".to_string(),
            stt_url: "http://127.0.0.1:5003".to_string(),
            llm_url: None,
            llm_models: Vec::new(),
            settings: Settings::default(),
        }
    }
}

impl Config {
    /// Load configuration: defaults overlaid by the optional TOML file
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(overlay) = file::load(path)? {
            overlay.apply(&mut config);
        }
        Ok(config)
    }
}

/// LLM sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.7,
            max_tokens: 1024,
            top_p: 0.9,
            repetition_penalty: 1.1,
        }
    }
}

/// Runtime-mutable gateway settings
///
/// Mutated only by the HTTP settings handlers; everything else reads an
/// immutable snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Default TTS voice id; None falls through to the backend default
    pub voice: Option<String>,

    /// Default STT language
    pub language: Option<String>,

    /// Silence inserted between synthesized sentences, in seconds
    pub sentence_pause: f64,

    /// Base of the per-sentence synthesis deadline, in seconds
    pub synthesis_timeout: f64,

    /// LLM sampling parameters
    pub llm: LlmSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice: None,
            language: None,
            sentence_pause: 0.25,
            synthesis_timeout: 5.0,
            llm: LlmSettings::default(),
        }
    }
}

impl Settings {
    /// Per-sentence synthesis deadline for a unit of `chars` characters
    #[must_use]
    pub fn synthesis_deadline(&self, chars: usize) -> std::time::Duration {
        #[allow(clippy::cast_precision_loss)]
        let secs = self.synthesis_timeout + 0.05 * chars as f64;
        std::time::Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Shared settings store with snapshot semantics
///
/// Readers clone the inner `Arc` and observe one consistent snapshot per
/// request; a writer swaps in a whole new snapshot atomically.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<RwLock<Arc<Settings>>>,
}

impl SettingsStore {
    /// Create a store seeded with `settings`
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    /// Current settings snapshot
    pub async fn snapshot(&self) -> Arc<Settings> {
        Arc::clone(&*self.inner.read().await)
    }

    /// Replace the settings atomically
    pub async fn apply(&self, settings: Settings) {
        let mut guard = self.inner.write().await;
        *guard = Arc::new(settings);
    }
}
