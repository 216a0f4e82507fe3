//! HTTP speech-synthesis backend
//!
//! Talks to a local speech host (e.g. a piper-compatible server) that
//! accepts JSON and answers with a WAV body. The WAV container is unpacked
//! here so the sessions only ever see raw PCM plus an [`AudioFormat`].

use std::io::Cursor;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{SynthesisChunk, Synthesizer, VoiceInfo};
use crate::audio::AudioFormat;
use crate::{Error, Result};

/// Target size of PCM buffers forwarded to the session
const BUFFER_BYTES: usize = 4096;

/// Synthesizer backed by an HTTP speech host
pub struct HttpSynthesizer {
    client: reqwest::Client,
    base_url: String,
}

#[derive(serde::Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
}

impl HttpSynthesizer {
    /// Create a synthesizer facade for the host at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_wav(&self, text: &str, voice: Option<&str>) -> Result<Vec<u8>> {
        let request = SynthesizeRequest { text, voice };
        let response = self
            .client
            .post(format!("{}/synthesize", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("speech host error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Unpack a WAV container into its PCM bytes and format
fn unpack_wav(wav: &[u8]) -> Result<(Vec<u8>, AudioFormat)> {
    let mut reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| Error::Synthesis(format!("bad WAV from speech host: {e}")))?;
    let spec = reader.spec();

    let width = spec.bits_per_sample / 8;
    let format = AudioFormat {
        rate: spec.sample_rate,
        width,
        channels: spec.channels,
    };
    format.validate()?;

    let mut pcm = Vec::with_capacity(reader.len() as usize * width as usize);
    match spec.sample_format {
        hound::SampleFormat::Int if width == 2 => {
            for sample in reader.samples::<i16>() {
                let s = sample.map_err(|e| Error::Synthesis(format!("bad WAV data: {e}")))?;
                pcm.extend_from_slice(&s.to_le_bytes());
            }
        }
        hound::SampleFormat::Int => {
            for sample in reader.samples::<i32>() {
                let s = sample.map_err(|e| Error::Synthesis(format!("bad WAV data: {e}")))?;
                pcm.extend_from_slice(&s.to_le_bytes());
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                let s = sample.map_err(|e| Error::Synthesis(format!("bad WAV data: {e}")))?;
                pcm.extend_from_slice(&s.to_le_bytes());
            }
        }
    }

    Ok((pcm, format))
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        sink: mpsc::Sender<SynthesisChunk>,
    ) -> Result<()> {
        tracing::debug!(chars = text.len(), ?voice, "requesting synthesis");
        let wav = self.fetch_wav(text, voice).await?;
        let (pcm, format) = unpack_wav(&wav)?;

        for buffer in pcm.chunks(BUFFER_BYTES) {
            if sink
                .send(SynthesisChunk { pcm: buffer.to_vec(), format })
                .await
                .is_err()
            {
                // Consumer went away; stop quietly.
                return Ok(());
            }
        }
        let _ = sink.send(SynthesisChunk::end(format)).await;
        Ok(())
    }

    async fn voices(&self) -> Vec<VoiceInfo> {
        let url = format!("{}/voices", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.json().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "speech host returned malformed voice list");
                Vec::new()
            }),
            Err(e) => {
                tracing::warn!(error = %e, "failed to list voices");
                Vec::new()
            }
        }
    }

    async fn default_voice(&self) -> Option<String> {
        self.voices().await.first().map(|v| v.id.clone())
    }
}
