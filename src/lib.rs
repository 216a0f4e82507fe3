//! Aria Gateway - on-device voice AI gateway
//!
//! This library exposes platform speech services and an optional local LLM
//! to clients on the LAN:
//! - Wyoming framed TCP protocol (streaming TTS, streaming STT, discovery)
//! - OpenAI-compatible HTTP API (chat completions over SSE, settings)
//! - mDNS advertisement of the Wyoming port
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Clients                          │
//! │   Wyoming TCP (10200)  │  HTTP/SSE (10100)  │ mDNS  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Aria Gateway                        │
//! │   Frame codec │ TTS/STT sessions │ Chat surface      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Worker backends                         │
//! │   Synthesizer  │  Transcriber  │  LLM generator      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod config;
pub mod daemon;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod text;
pub mod workers;
pub mod wyoming;

pub use audio::AudioFormat;
pub use config::{Config, Settings, SettingsStore};
pub use daemon::Daemon;
pub use discovery::MdnsAdvertiser;
pub use error::{Error, Result};
pub use logging::LogBuffer;
pub use metrics::Metrics;
pub use wyoming::{Event, Frame, WyomingContext, WyomingServer};
