//! Streaming speech-to-text session machine
//!
//! `transcribe` opens a collecting session, `audio-start` fixes the PCM
//! format, `audio-chunk` accumulates bytes, and `audio-stop` runs the
//! transcriber: `transcript-start`, zero or more `transcript-chunk` partials,
//! the final `transcript`, then `transcript-stop`. Audio events outside a
//! session are silently discarded.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::event::{Event, Transcribe, Transcript, TranscriptChunk, TranscriptStart};
use super::WyomingContext;
use crate::audio::AudioFormat;
use crate::{Error, Result};

/// Format assumed when the client never sends `audio-start`
const DEFAULT_FORMAT: AudioFormat = AudioFormat { rate: 16000, width: 2, channels: 1 };

/// Active collecting-session context
struct CollectingCtx {
    buffer: Vec<u8>,
    language: Option<String>,
    format: Option<AudioFormat>,
}

/// STT session machine for one connection
///
/// Owned exclusively by the connection reader; transcription runs inline on
/// `audio-stop`, which also guarantees the transcript event ordering.
pub struct SttMachine {
    ctx: WyomingContext,
    out: mpsc::Sender<Event>,
    state: Option<CollectingCtx>,
}

impl SttMachine {
    pub fn new(ctx: WyomingContext, out: mpsc::Sender<Event>) -> Self {
        Self { ctx, out, state: None }
    }

    /// `transcribe`: open a collecting session
    pub async fn handle_transcribe(&mut self, body: Transcribe) {
        if self.state.is_some() {
            tracing::info!("transcribe while already collecting, ignored");
            return;
        }
        let language = match body.language {
            Some(language) => Some(language),
            None => self.ctx.settings.snapshot().await.language.clone(),
        };
        self.state = Some(CollectingCtx {
            buffer: Vec::new(),
            language,
            format: None,
        });
        tracing::debug!("transcription session started");
    }

    /// `audio-start`: capture the stream format
    pub fn handle_audio_start(&mut self, format: AudioFormat) {
        let Some(collecting) = self.state.as_mut() else {
            tracing::info!("audio-start outside transcription session, ignored");
            return;
        };
        collecting.format = Some(format);
    }

    /// `audio-chunk`: accumulate payload bytes
    pub fn handle_audio_chunk(&mut self, pcm: &[u8]) {
        let Some(collecting) = self.state.as_mut() else {
            tracing::info!("audio-chunk outside transcription session, ignored");
            return;
        };
        collecting.buffer.extend_from_slice(pcm);
    }

    /// `audio-stop`: run the transcription and emit the transcript stream
    ///
    /// # Errors
    ///
    /// An invalid captured format or a transcriber failure closes the
    /// connection.
    pub async fn handle_audio_stop(&mut self) -> Result<()> {
        let Some(collecting) = self.state.take() else {
            tracing::info!("audio-stop outside transcription session, ignored");
            return Ok(());
        };

        let format = collecting.format.unwrap_or(DEFAULT_FORMAT);
        format.validate()?;

        self.ctx.metrics.transcribe_requests.inc();
        tracing::debug!(
            audio_bytes = collecting.buffer.len(),
            language = ?collecting.language,
            "transcribing"
        );

        self.send(Event::TranscriptStart(TranscriptStart {
            language: collecting.language.clone(),
        }))
        .await?;

        let (tx, mut rx) = mpsc::channel::<String>(8);
        let transcriber = Arc::clone(&self.ctx.transcriber);
        let language = collecting.language.clone();
        let task = tokio::spawn(async move {
            transcriber
                .transcribe(&collecting.buffer, format, language.as_deref(), tx)
                .await
        });

        while let Some(partial) = rx.recv().await {
            self.send(Event::TranscriptChunk(TranscriptChunk { text: partial })).await?;
        }

        let text = task
            .await
            .map_err(|e| Error::Transcription(format!("transcription task failed: {e}")))??;

        self.send(Event::Transcript(Transcript {
            text,
            language: collecting.language,
        }))
        .await?;
        self.send(Event::TranscriptStop).await?;
        Ok(())
    }

    async fn send(&self, event: Event) -> Result<()> {
        self.out
            .send(event)
            .await
            .map_err(|_| Error::Session("connection writer closed".to_string()))
    }
}
