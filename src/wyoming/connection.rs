//! Per-connection protocol handler
//!
//! One reader task owns the receive buffer and both session machines; one
//! writer task serializes every outbound frame so audio streams never
//! interleave mid-frame. Protocol and schema errors are fatal to the
//! connection; session-state violations are logged and ignored inside the
//! machines.

use std::net::SocketAddr;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use super::event::Event;
use super::frame::{self, DecodeOutcome};
use super::stt::SttMachine;
use super::tts::TtsMachine;
use super::WyomingContext;
use crate::Result;

/// Outbound event queue depth per connection
const WRITE_QUEUE: usize = 64;

/// Handle one client connection until it closes, fails, or shutdown
pub async fn handle(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: WyomingContext,
    shutdown: watch::Receiver<bool>,
) {
    ctx.metrics.connections_active.inc();
    tracing::info!(%peer, "connection opened");

    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<Event>(WRITE_QUEUE);

    let writer_metrics = ctx.metrics.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match event.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unencodable event");
                    continue;
                }
            };
            if write_half.write_all(&frame::encode(&frame)).await.is_err() {
                break;
            }
            writer_metrics.frames_encoded.inc();
        }
        let _ = write_half.shutdown().await;
    });

    let metrics = ctx.metrics.clone();
    let mut handler = Handler {
        tts: TtsMachine::new(ctx.clone(), tx.clone()),
        stt: SttMachine::new(ctx.clone(), tx.clone()),
        ctx,
        out: tx,
    };

    if let Err(e) = handler.read_loop(read_half, shutdown).await {
        metrics.connection_errors.inc();
        tracing::info!(%peer, error = %e, "connection failed");
    }

    // Cancel any outstanding synthesis work, then drop the event sender so
    // the writer drains queued frames and exits.
    handler.tts.abort().await;
    drop(handler);
    let _ = writer.await;

    metrics.connections_active.dec();
    tracing::info!(%peer, "connection closed");
}

struct Handler {
    ctx: WyomingContext,
    out: mpsc::Sender<Event>,
    tts: TtsMachine,
    stt: SttMachine,
}

impl Handler {
    /// Read frames until EOF, a fatal error, or shutdown
    async fn read_loop(
        &mut self,
        mut read_half: OwnedReadHalf,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut buf = BytesMut::with_capacity(4096);
        loop {
            // Drain every complete frame before reading more.
            loop {
                match frame::decode(&buf)? {
                    DecodeOutcome::Frame(frame, consumed) => {
                        buf.advance(consumed);
                        self.ctx.metrics.frames_decoded.inc();
                        let event = Event::from_frame(&frame)?;
                        self.dispatch(event).await?;
                    }
                    DecodeOutcome::NeedMore => break,
                }
            }

            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                read = read_half.read_buf(&mut buf) => {
                    if read? == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn dispatch(&mut self, event: Event) -> Result<()> {
        tracing::trace!(event = event.tag(), "dispatching");
        match event {
            Event::Describe => {
                let info = self.ctx.build_info().await;
                if self.out.send(Event::Info(info)).await.is_err() {
                    tracing::debug!("writer closed while sending info");
                }
                Ok(())
            }
            Event::Synthesize(body) => self.tts.handle_synthesize(body).await,
            Event::SynthesizeStart(body) => {
                self.tts.handle_start(body).await;
                Ok(())
            }
            Event::SynthesizeChunk(body) => {
                self.tts.handle_chunk(&body.text).await;
                Ok(())
            }
            Event::SynthesizeStop => self.tts.handle_stop().await,
            Event::Transcribe(body) => {
                self.stt.handle_transcribe(body).await;
                Ok(())
            }
            Event::AudioStart(format) => {
                self.stt.handle_audio_start(format);
                Ok(())
            }
            Event::AudioChunk { pcm, .. } => {
                self.stt.handle_audio_chunk(&pcm);
                Ok(())
            }
            Event::AudioStop => self.stt.handle_audio_stop().await,
            // Server-to-client events arriving from a client are state
            // violations: logged and discarded.
            Event::Info(_)
            | Event::SynthesizeStopped
            | Event::TranscriptStart(_)
            | Event::TranscriptChunk(_)
            | Event::Transcript(_)
            | Event::TranscriptStop => {
                tracing::info!(event = event.tag(), "unexpected server event from client, ignored");
                Ok(())
            }
        }
    }
}
