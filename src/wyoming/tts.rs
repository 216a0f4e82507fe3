//! Streaming text-to-speech session machine
//!
//! A connection hosts at most one TTS session. `synthesize-start` opens a
//! streaming session, `synthesize-chunk` appends text and kicks a drain task
//! that extracts complete sentences (or complete SSML documents) and feeds
//! them to the synthesizer, and `synthesize-stop` flushes the residue and
//! closes the audio stream. The non-streaming `synthesize` event runs a full
//! synthesis inline.
//!
//! Audio framing invariants: exactly one `audio-start` before the first
//! chunk, `audio-stop` exactly once at session end, `synthesize-stopped`
//! last.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use super::event::{Event, Synthesize, SynthesizeStart};
use super::WyomingContext;
use crate::audio::{self, AudioFormat};
use crate::text::{looks_like_ssml, sanitize_plain, split_first, split_speak};
use crate::workers::SynthesisChunk;
use crate::{Error, Result};

/// Active streaming-session context
struct StreamingCtx {
    /// Unconsumed text, fed by `synthesize-chunk`
    text: String,
    /// Resolved voice id for the whole session
    voice: Option<String>,
    /// Whether `audio-start` has been emitted
    audio_started: bool,
    /// Format captured from the first non-empty PCM buffer
    format: Option<AudioFormat>,
    /// Buffer currently interpreted as SSML
    ssml_mode: bool,
    /// In-flight drain task
    drain: Option<JoinHandle<()>>,
}

/// Session state: `None` is Idle
type State = Option<StreamingCtx>;

/// One unit of synthesis work pulled from the buffer
enum Unit {
    /// A complete plain-text sentence
    Sentence(String),
    /// Chunks of a complete SSML document, one per first-level child
    Ssml(Vec<String>),
    /// SSML-shaped text that failed to parse; synthesized escaped-and-wrapped
    Recovered(String),
}

/// TTS session machine for one connection
pub struct TtsMachine {
    ctx: WyomingContext,
    out: mpsc::Sender<Event>,
    state: Arc<Mutex<State>>,
    /// First worker error recorded during the streaming session
    failure: Arc<std::sync::Mutex<Option<String>>>,
}

impl TtsMachine {
    pub fn new(ctx: WyomingContext, out: mpsc::Sender<Event>) -> Self {
        Self {
            ctx,
            out,
            state: Arc::new(Mutex::new(None)),
            failure: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Non-streaming `synthesize`: buffer the full audio, then frame it
    ///
    /// Ignored while a streaming session is active.
    ///
    /// # Errors
    ///
    /// A worker error closes the connection.
    pub async fn handle_synthesize(&self, body: Synthesize) -> Result<()> {
        {
            let state = self.state.lock().await;
            if state.is_some() {
                tracing::debug!("ignoring one-shot synthesize during streaming session");
                return Ok(());
            }
        }

        let voice = self.ctx.resolve_voice(body.voice.as_ref()).await;
        let settings = self.ctx.settings.snapshot().await;
        self.ctx.metrics.synthesize_requests.inc();

        let input = if looks_like_ssml(&body.text) {
            body.text.clone()
        } else {
            sanitize_plain(&body.text).into_owned()
        };

        let (tx, mut rx) = mpsc::channel::<SynthesisChunk>(8);
        let synthesizer = Arc::clone(&self.ctx.synthesizer);
        let task_input = input.clone();
        let task = tokio::spawn(async move {
            synthesizer.synthesize(&task_input, voice.as_deref(), tx).await
        });

        let deadline = Instant::now() + settings.synthesis_deadline(body.text.len());
        let mut pcm = Vec::new();
        let mut format = None;
        loop {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some(chunk)) if chunk.is_end() => break,
                Ok(Some(chunk)) => {
                    format.get_or_insert(chunk.format);
                    pcm.extend_from_slice(&chunk.pcm);
                }
                Ok(None) => break,
                Err(_) => {
                    self.ctx.metrics.synthesis_timeouts.inc();
                    tracing::warn!(chars = body.text.len(), "synthesis deadline expired");
                    task.abort();
                    break;
                }
            }
        }

        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(e) if e.is_cancelled() => {}
            Err(e) => return Err(Error::Synthesis(format!("synthesis task failed: {e}"))),
        }

        let Some(format) = format else {
            tracing::debug!("synthesis produced no audio");
            return Ok(());
        };

        self.send(Event::AudioStart(format)).await?;
        for chunk in audio::split_chunks(&pcm) {
            self.send(Event::AudioChunk { format, pcm: chunk.to_vec() }).await?;
        }
        self.send(Event::AudioStop).await?;
        Ok(())
    }

    /// `synthesize-start`: open a streaming session
    pub async fn handle_start(&self, body: SynthesizeStart) {
        let voice = self.ctx.resolve_voice(body.voice.as_ref()).await;
        let mut state = self.state.lock().await;
        if state.is_some() {
            tracing::info!("synthesize-start while already streaming, ignored");
            return;
        }
        *state = Some(StreamingCtx {
            text: String::new(),
            voice,
            audio_started: false,
            format: None,
            ssml_mode: false,
            drain: None,
        });
        tracing::debug!("streaming synthesis started");
    }

    /// `synthesize-chunk`: append text and ensure a drain task is running
    pub async fn handle_chunk(&self, text: &str) {
        let mut state = self.state.lock().await;
        let Some(streaming) = state.as_mut() else {
            tracing::info!("synthesize-chunk without synthesize-start, ignored");
            return;
        };

        streaming.text.push_str(text);
        if !streaming.ssml_mode && looks_like_ssml(&streaming.text) {
            streaming.ssml_mode = true;
        }

        let running = streaming.drain.as_ref().is_some_and(|h| !h.is_finished());
        if !running {
            let machine = self.drain_handle();
            streaming.drain = Some(tokio::spawn(async move {
                machine.drain().await;
            }));
        }
    }

    /// `synthesize-stop`: drain, flush the residue, close the audio stream
    ///
    /// # Errors
    ///
    /// Returns the first worker error recorded during the session, after the
    /// session has completed cleanly on the wire.
    pub async fn handle_stop(&self) -> Result<()> {
        let drain = {
            let mut state = self.state.lock().await;
            match state.as_mut() {
                Some(streaming) => streaming.drain.take(),
                None => {
                    tracing::info!("synthesize-stop without synthesize-start, ignored");
                    return Ok(());
                }
            }
        };
        if let Some(handle) = drain {
            let _ = handle.await;
        }

        // Consume any complete units that arrived after the drain finished.
        self.drain_handle().drain().await;

        // Whatever is left has no complete boundary: a partial sentence, or
        // an unterminated SSML fragment. Either way it is plain text now,
        // and the markup safeguard escapes and wraps it when needed.
        let residue = {
            let mut state = self.state.lock().await;
            match state.as_mut() {
                Some(streaming) => std::mem::take(&mut streaming.text),
                None => String::new(),
            }
        };
        let residue = residue.trim().to_string();
        if !residue.is_empty() {
            let input = sanitize_plain(&residue).into_owned();
            self.synth_unit(&input, residue.len()).await;
        }

        let audio_started = {
            let mut state = self.state.lock().await;
            state.take().is_some_and(|s| s.audio_started)
        };
        if audio_started {
            self.send(Event::AudioStop).await?;
        }
        self.send(Event::SynthesizeStopped).await?;
        tracing::debug!("streaming synthesis stopped");

        if let Some(message) = self.failure.lock().ok().and_then(|mut f| f.take()) {
            return Err(Error::Synthesis(message));
        }
        Ok(())
    }

    /// Cancel any in-flight drain and release the session
    ///
    /// Called when the connection goes away mid-session.
    pub async fn abort(&self) {
        if let Some(streaming) = self.state.lock().await.take() {
            if let Some(handle) = streaming.drain {
                handle.abort();
            }
        }
    }

    /// Clone the shared pieces the drain task needs
    fn drain_handle(&self) -> DrainTask {
        DrainTask {
            ctx: self.ctx.clone(),
            out: self.out.clone(),
            state: Arc::clone(&self.state),
            failure: Arc::clone(&self.failure),
        }
    }

    async fn synth_unit(&self, input: &str, deadline_chars: usize) {
        self.drain_handle().synth_unit(input, deadline_chars).await;
    }

    async fn send(&self, event: Event) -> Result<()> {
        self.out
            .send(event)
            .await
            .map_err(|_| Error::Session("connection writer closed".to_string()))
    }
}

/// The drain side of the machine, owned by a spawned task
struct DrainTask {
    ctx: WyomingContext,
    out: mpsc::Sender<Event>,
    state: Arc<Mutex<State>>,
    failure: Arc<std::sync::Mutex<Option<String>>>,
}

impl DrainTask {
    /// Extract and synthesize units until no complete boundary remains
    async fn drain(&self) {
        loop {
            let unit = {
                let mut state = self.state.lock().await;
                let Some(streaming) = state.as_mut() else {
                    return;
                };
                extract_unit(streaming)
            };

            match unit {
                None => return,
                Some(Unit::Sentence(sentence)) => {
                    let input = sanitize_plain(&sentence).into_owned();
                    self.synth_unit(&input, sentence.len()).await;
                    self.emit_pause().await;
                }
                Some(Unit::Ssml(chunks)) => {
                    for chunk in chunks {
                        self.synth_unit(&chunk, chunk.len()).await;
                    }
                }
                Some(Unit::Recovered(text)) => {
                    let input = format!("<speak>{}</speak>", crate::text::escape_xml(&text));
                    self.synth_unit(&input, text.len()).await;
                }
            }
        }
    }

    /// Synthesize one unit, forwarding PCM buffers as `audio-chunk` frames
    ///
    /// The first non-empty buffer fixes the session [`AudioFormat`] and
    /// triggers the one `audio-start`. Worker errors are recorded, not
    /// raised; a deadline expiry emits what was captured and moves on.
    async fn synth_unit(&self, input: &str, deadline_chars: usize) {
        let voice = {
            let state = self.state.lock().await;
            state.as_ref().and_then(|s| s.voice.clone())
        };
        let settings = self.ctx.settings.snapshot().await;
        self.ctx.metrics.synthesize_requests.inc();

        let (tx, mut rx) = mpsc::channel::<SynthesisChunk>(8);
        let synthesizer = Arc::clone(&self.ctx.synthesizer);
        let task_input = input.to_string();
        let task = tokio::spawn(async move {
            synthesizer.synthesize(&task_input, voice.as_deref(), tx).await
        });

        let deadline = Instant::now() + settings.synthesis_deadline(deadline_chars);
        loop {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some(chunk)) if chunk.is_end() => break,
                Ok(Some(chunk)) => {
                    if self.emit_audio(chunk).await.is_err() {
                        task.abort();
                        return;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    self.ctx.metrics.synthesis_timeouts.inc();
                    tracing::warn!(chars = deadline_chars, "sentence synthesis deadline expired");
                    task.abort();
                    return;
                }
            }
        }

        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.record_failure(&e.to_string()),
            Err(e) if e.is_cancelled() => {}
            Err(e) => self.record_failure(&format!("synthesis task failed: {e}")),
        }
    }

    /// Forward one PCM buffer, emitting `audio-start` on the first
    async fn emit_audio(&self, chunk: SynthesisChunk) -> Result<()> {
        let start = {
            let mut state = self.state.lock().await;
            match state.as_mut() {
                Some(streaming) if !streaming.audio_started => {
                    streaming.audio_started = true;
                    streaming.format = Some(chunk.format);
                    true
                }
                Some(_) => false,
                None => return Err(Error::Session("session gone".to_string())),
            }
        };
        if start {
            self.send(Event::AudioStart(chunk.format)).await?;
        }
        self.send(Event::AudioChunk { format: chunk.format, pcm: chunk.pcm }).await
    }

    /// Emit an inter-sentence silence chunk when configured and possible
    async fn emit_pause(&self) {
        let settings = self.ctx.settings.snapshot().await;
        if settings.sentence_pause <= 0.0 {
            return;
        }
        let format = {
            let state = self.state.lock().await;
            state.as_ref().and_then(|s| s.format)
        };
        let Some(format) = format else {
            return;
        };
        let pcm = audio::silence(format, settings.sentence_pause);
        if !pcm.is_empty() {
            let _ = self.send(Event::AudioChunk { format, pcm }).await;
        }
    }

    fn record_failure(&self, message: &str) {
        tracing::warn!(error = %message, "synthesis worker failed");
        if let Ok(mut failure) = self.failure.lock() {
            failure.get_or_insert_with(|| message.to_string());
        }
    }

    async fn send(&self, event: Event) -> Result<()> {
        self.out
            .send(event)
            .await
            .map_err(|_| Error::Session("connection writer closed".to_string()))
    }
}

/// Pull the next complete unit off the buffer, leaving the residue intact
fn extract_unit(streaming: &mut StreamingCtx) -> Option<Unit> {
    if streaming.text.is_empty() {
        return None;
    }
    if !streaming.ssml_mode && looks_like_ssml(&streaming.text) {
        streaming.ssml_mode = true;
    }

    if streaming.ssml_mode {
        let close = find_close_speak(&streaming.text)?;
        let doc_end = close + "</speak>".len();

        match split_speak(&streaming.text) {
            Ok(split) => {
                streaming.text = split.residue;
                update_mode_after_document(streaming);
                Some(Unit::Ssml(split.chunks))
            }
            Err(e) => {
                // Shaped like SSML but does not parse; recover by
                // escape-and-wrap of the document portion.
                tracing::info!(error = %e, "SSML-shaped input failed to parse, recovering");
                let doc: String = streaming.text.drain(..doc_end).collect();
                update_mode_after_document(streaming);
                Some(Unit::Recovered(doc))
            }
        }
    } else {
        let (sentence, rest) = split_first(&streaming.text)?;
        let sentence = sentence.to_string();
        streaming.text = rest.to_string();
        Some(Unit::Sentence(sentence))
    }
}

/// Byte index of the first `</speak>`, ASCII-case-insensitive
fn find_close_speak(text: &str) -> Option<usize> {
    let needle = b"</speak>";
    text.as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// After consuming a complete document, stay in SSML mode only while the
/// residue still looks SSML-shaped
fn update_mode_after_document(streaming: &mut StreamingCtx) {
    let residue = streaming.text.trim_start().to_lowercase();
    streaming.ssml_mode = residue.starts_with("<?xml") || residue.starts_with("<speak");
}
