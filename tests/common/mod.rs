//! Shared test utilities
//!
//! Mock worker backends and an in-process Wyoming server over an ephemeral
//! port, plus a small framed TCP client.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use aria_gateway::audio::AudioFormat;
use aria_gateway::config::{Settings, SettingsStore};
use aria_gateway::metrics::Metrics;
use aria_gateway::workers::{
    GenEvent, GenerateRequest, Generator, SynthesisChunk, Synthesizer, Transcriber, VoiceInfo,
};
use aria_gateway::wyoming::{self, Event, WyomingContext, WyomingServer};

/// PCM format produced by the mock synthesizer
pub const MOCK_FORMAT: AudioFormat = AudioFormat { rate: 22050, width: 2, channels: 1 };

/// Deterministic PCM for a given input text
pub fn mock_pcm(text: &str) -> Vec<u8> {
    text.bytes().cycle().take(text.len() * 16).collect()
}

/// Synthesizer that produces [`mock_pcm`] and records every input
pub struct MockSynthesizer {
    pub inputs: Arc<Mutex<Vec<String>>>,
    pub voices: Vec<VoiceInfo>,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self {
            inputs: Arc::new(Mutex::new(Vec::new())),
            voices: vec![
                VoiceInfo {
                    id: "en_US-amy".to_string(),
                    name: "Amy".to_string(),
                    language: "en-US".to_string(),
                },
                VoiceInfo {
                    id: "de_DE-karl".to_string(),
                    name: "Karl".to_string(),
                    language: "de-DE".to_string(),
                },
            ],
        }
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _voice: Option<&str>,
        sink: mpsc::Sender<SynthesisChunk>,
    ) -> aria_gateway::Result<()> {
        self.inputs.lock().unwrap().push(text.to_string());
        let pcm = mock_pcm(text);
        // Two buffers then the end sentinel, like a real streaming backend.
        let half = pcm.len() / 2;
        for part in [&pcm[..half], &pcm[half..]] {
            if !part.is_empty() {
                let _ = sink
                    .send(SynthesisChunk { pcm: part.to_vec(), format: MOCK_FORMAT })
                    .await;
            }
        }
        let _ = sink.send(SynthesisChunk::end(MOCK_FORMAT)).await;
        Ok(())
    }

    async fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }

    async fn default_voice(&self) -> Option<String> {
        self.voices.first().map(|v| v.id.clone())
    }
}

/// Synthesizer whose every call fails
pub struct FailingSynthesizer;

#[async_trait]
impl Synthesizer for FailingSynthesizer {
    async fn synthesize(
        &self,
        _text: &str,
        _voice: Option<&str>,
        _sink: mpsc::Sender<SynthesisChunk>,
    ) -> aria_gateway::Result<()> {
        Err(aria_gateway::Error::Synthesis("mock backend down".to_string()))
    }

    async fn voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }

    async fn default_voice(&self) -> Option<String> {
        None
    }
}

/// Transcriber that emits growing partials and records its input
pub struct MockTranscriber {
    pub partials: Vec<String>,
    pub final_text: String,
    pub received: Arc<Mutex<Vec<(usize, AudioFormat, Option<String>)>>>,
}

impl Default for MockTranscriber {
    fn default() -> Self {
        Self {
            partials: vec!["hello".to_string(), "hello world".to_string()],
            final_text: "hello world!".to_string(),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
        language: Option<&str>,
        partials: mpsc::Sender<String>,
    ) -> aria_gateway::Result<String> {
        self.received
            .lock()
            .unwrap()
            .push((audio.len(), format, language.map(String::from)));
        for partial in &self.partials {
            let _ = partials.send(partial.clone()).await;
        }
        Ok(self.final_text.clone())
    }

    async fn languages(&self) -> Vec<String> {
        vec!["en-US".to_string(), "de-DE".to_string()]
    }
}

/// Generator that replays a fixed event script
pub struct ScriptedGenerator {
    pub script: Vec<GenEvent>,
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        _request: GenerateRequest,
        sink: mpsc::Sender<GenEvent>,
    ) -> aria_gateway::Result<()> {
        for event in &self.script {
            if sink.send(event.clone()).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// A running in-process Wyoming server
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: watch::Sender<bool>,
}

impl TestServer {
    /// Spawn a server over the given workers on an ephemeral port
    pub async fn spawn(
        synthesizer: Arc<dyn Synthesizer>,
        transcriber: Arc<dyn Transcriber>,
        settings: Settings,
    ) -> Self {
        let ctx = WyomingContext {
            synthesizer,
            transcriber,
            settings: SettingsStore::new(settings),
            metrics: Arc::new(Metrics::new().unwrap()),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let server = WyomingServer::new(addr.port(), ctx);
        tokio::spawn(async move {
            let _ = server.serve(listener, shutdown_rx).await;
        });

        Self { addr, shutdown }
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Framed TCP client for driving the server in tests
pub struct WireClient {
    stream: TcpStream,
    buf: BytesMut,
}

impl WireClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            buf: BytesMut::new(),
        }
    }

    pub async fn send(&mut self, event: &Event) {
        let frame = event.to_frame().unwrap();
        self.stream.write_all(&wyoming::encode(&frame)).await.unwrap();
    }

    /// Send raw wire bytes (for malformed-input tests)
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Receive the next event, or None on clean EOF
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match wyoming::decode(&self.buf).unwrap() {
                wyoming::DecodeOutcome::Frame(frame, consumed) => {
                    self.buf.advance(consumed);
                    return Some(Event::from_frame(&frame).unwrap());
                }
                wyoming::DecodeOutcome::NeedMore => {}
            }
            let n = self.stream.read_buf(&mut self.buf).await.unwrap();
            if n == 0 {
                return None;
            }
        }
    }

    /// Collect events until the connection closes
    pub async fn recv_until_close(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }
}
