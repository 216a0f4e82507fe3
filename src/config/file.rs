//! TOML configuration file loading
//!
//! Supports `~/.config/aria/gateway.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of
//! defaults.

use std::path::PathBuf;

use serde::Deserialize;

use super::Config;
use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Server ports and discovery
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Backend host URLs
    #[serde(default)]
    pub backends: BackendsFileConfig,

    /// Speech defaults
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// LLM defaults
    #[serde(default)]
    pub llm: LlmFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Wyoming TCP port
    pub wyoming_port: Option<u16>,

    /// HTTP API port
    pub http_port: Option<u16>,

    /// Advertise over mDNS
    pub mdns: Option<bool>,
}

/// Backend host URLs
#[derive(Debug, Default, Deserialize)]
pub struct BackendsFileConfig {
    pub tts_url: Option<String>,
    pub stt_url: Option<String>,
    pub llm_url: Option<String>,
}

/// Speech defaults
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// Default TTS voice id
    pub voice: Option<String>,

    /// Default STT language
    pub language: Option<String>,

    /// Inter-sentence pause in seconds
    pub sentence_pause: Option<f64>,

    /// Synthesis timeout base in seconds
    pub synthesis_timeout: Option<f64>,
}

/// LLM defaults
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    pub model: Option<String>,
    pub models: Option<Vec<String>>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub repetition_penalty: Option<f32>,
}

impl ConfigFile {
    /// Overlay this file's fields onto `config`
    pub fn apply(self, config: &mut Config) {
        if let Some(port) = self.server.wyoming_port {
            config.wyoming_port = port;
        }
        if let Some(port) = self.server.http_port {
            config.http_port = port;
        }
        if let Some(mdns) = self.server.mdns {
            config.mdns_enabled = mdns;
        }
        if let Some(url) = self.backends.tts_url {
            config.tts_url = url;
        }
        if let Some(url) = self.backends.stt_url {
            config.stt_url = url;
        }
        if let Some(url) = self.backends.llm_url {
            config.llm_url = Some(url);
        }
        if let Some(voice) = self.speech.voice {
            config.settings.voice = Some(voice);
        }
        if let Some(language) = self.speech.language {
            config.settings.language = Some(language);
        }
        if let Some(pause) = self.speech.sentence_pause {
            config.settings.sentence_pause = pause;
        }
        if let Some(timeout) = self.speech.synthesis_timeout {
            config.settings.synthesis_timeout = timeout;
        }
        if let Some(model) = self.llm.model {
            config.settings.llm.model = Some(model);
        }
        if let Some(models) = self.llm.models {
            config.llm_models = models;
        }
        if let Some(temperature) = self.llm.temperature {
            config.settings.llm.temperature = temperature;
        }
        if let Some(max_tokens) = self.llm.max_tokens {
            config.settings.llm.max_tokens = max_tokens;
        }
        if let Some(top_p) = self.llm.top_p {
            config.settings.llm.top_p = top_p;
        }
        if let Some(penalty) = self.llm.repetition_penalty {
            config.settings.llm.repetition_penalty = penalty;
        }
    }
}

/// Default config file location
fn default_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".config").join("aria").join("gateway.toml"))
}

/// Load the config file at `path`, or the default location
///
/// A missing file is not an error; a present-but-broken file is.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub fn load(path: Option<&PathBuf>) -> Result<Option<ConfigFile>> {
    let path = match path {
        Some(p) => p.clone(),
        None => match default_path() {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    if !path.exists() {
        return Ok(None);
    }

    let text = std::fs::read_to_string(&path)?;
    let file: ConfigFile = toml::from_str(&text)?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(Some(file))
}
