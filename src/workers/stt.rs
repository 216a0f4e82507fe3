//! HTTP speech-recognition backend
//!
//! Uploads accumulated PCM as a WAV multipart part to a whisper-compatible
//! transcription host. The host answers a single final transcript; a partial
//! hypothesis is emitted through the callback channel when the host includes
//! one.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::Transcriber;
use crate::audio::AudioFormat;
use crate::{Error, Result};

/// Transcriber backed by an HTTP transcription host
pub struct HttpTranscriber {
    client: reqwest::Client,
    base_url: String,
}

#[derive(serde::Deserialize)]
struct TranscribeResponse {
    text: String,
    #[serde(default)]
    partials: Vec<String>,
}

#[derive(serde::Deserialize)]
struct LanguagesResponse {
    languages: Vec<String>,
}

impl HttpTranscriber {
    /// Create a transcriber facade for the host at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Wrap raw PCM in a WAV container for upload
fn pcm_to_wav(pcm: &[u8], format: AudioFormat) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.rate,
        bits_per_sample: format.width * 8,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Transcription(format!("WAV framing failed: {e}")))?;
        match format.width {
            2 => {
                for sample in pcm.chunks_exact(2) {
                    let s = i16::from_le_bytes([sample[0], sample[1]]);
                    writer
                        .write_sample(s)
                        .map_err(|e| Error::Transcription(format!("WAV write failed: {e}")))?;
                }
            }
            4 => {
                for sample in pcm.chunks_exact(4) {
                    let s = i32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]);
                    writer
                        .write_sample(s)
                        .map_err(|e| Error::Transcription(format!("WAV write failed: {e}")))?;
                }
            }
            other => {
                return Err(Error::AudioFormat(format!("unsupported sample width {other}")));
            }
        }
        writer
            .finalize()
            .map_err(|e| Error::Transcription(format!("WAV finalize failed: {e}")))?;
    }
    Ok(cursor.into_inner())
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
        language: Option<&str>,
        partials: mpsc::Sender<String>,
    ) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), ?language, "starting transcription");
        let wav = pcm_to_wav(audio, format)?;

        let mut form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(wav)
                .file_name("audio.wav")
                .mime_str("audio/wav")
                .map_err(|e| Error::Transcription(e.to_string()))?,
        );
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transcription(format!(
                "transcription host error {status}: {body}"
            )));
        }

        let result: TranscribeResponse = response.json().await?;
        for partial in result.partials {
            if partials.send(partial).await.is_err() {
                break;
            }
        }

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }

    async fn languages(&self) -> Vec<String> {
        let url = format!("{}/languages", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response
                .json::<LanguagesResponse>()
                .await
                .map(|r| r.languages)
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "transcription host returned malformed language list");
                    Vec::new()
                }),
            Err(e) => {
                tracing::warn!(error = %e, "failed to list languages");
                Vec::new()
            }
        }
    }
}
