//! Wyoming event schema
//!
//! A typed view over [`Frame`]: every protocol tag maps to one variant with a
//! fixed data shape. `audio-chunk` is the only event carrying a binary
//! payload; its data JSON inlines the [`AudioFormat`] fields.

use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;
use crate::wyoming::frame::Frame;
use crate::{Error, Result};

/// Attribution record for a program or voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub name: String,
    pub url: String,
}

/// An installable TTS voice advertised in `info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsVoice {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub attribution: Attribution,
    pub installed: bool,
    pub languages: Vec<String>,
}

/// A TTS program entry in `info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsProgram {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub attribution: Attribution,
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub voices: Vec<TtsVoice>,
    pub supports_synthesize_streaming: bool,
}

/// An ASR program entry in `info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrProgram {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub attribution: Attribution,
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub languages: Vec<String>,
    pub supports_transcript_streaming: bool,
}

/// `info` response body: available ASR and TTS programs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Info {
    pub asr: Vec<AsrProgram>,
    pub tts: Vec<TtsProgram>,
}

/// Voice selection hints attached to synthesize requests
///
/// Resolution order: explicit name, explicit language, persisted default,
/// backend default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoiceSelector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// One-shot synthesis request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synthesize {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceSelector>,
}

/// Streaming synthesis start body
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SynthesizeStart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceSelector>,
}

/// Streaming synthesis text chunk body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizeChunk {
    pub text: String,
}

/// Transcription session start body
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transcribe {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Final transcript body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Transcript stream start body
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TranscriptStart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Partial transcript body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub text: String,
}

/// Closed set of protocol events
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Describe,
    Info(Info),
    Synthesize(Synthesize),
    SynthesizeStart(SynthesizeStart),
    SynthesizeChunk(SynthesizeChunk),
    SynthesizeStop,
    SynthesizeStopped,
    Transcribe(Transcribe),
    AudioStart(AudioFormat),
    AudioChunk { format: AudioFormat, pcm: Vec<u8> },
    AudioStop,
    TranscriptStart(TranscriptStart),
    TranscriptChunk(TranscriptChunk),
    Transcript(Transcript),
    TranscriptStop,
}

impl Event {
    /// Wire tag for this event
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Describe => "describe",
            Self::Info(_) => "info",
            Self::Synthesize(_) => "synthesize",
            Self::SynthesizeStart(_) => "synthesize-start",
            Self::SynthesizeChunk(_) => "synthesize-chunk",
            Self::SynthesizeStop => "synthesize-stop",
            Self::SynthesizeStopped => "synthesize-stopped",
            Self::Transcribe(_) => "transcribe",
            Self::AudioStart(_) => "audio-start",
            Self::AudioChunk { .. } => "audio-chunk",
            Self::AudioStop => "audio-stop",
            Self::TranscriptStart(_) => "transcript-start",
            Self::TranscriptChunk(_) => "transcript-chunk",
            Self::Transcript(_) => "transcript",
            Self::TranscriptStop => "transcript-stop",
        }
    }

    /// Encode into a wire frame
    ///
    /// # Errors
    ///
    /// Returns an error when the data body cannot be serialized.
    pub fn to_frame(&self) -> Result<Frame> {
        let frame = match self {
            Self::Describe | Self::SynthesizeStop | Self::SynthesizeStopped | Self::AudioStop
            | Self::TranscriptStop => Frame::new(self.tag()),
            Self::Info(info) => Frame::with_data(self.tag(), info)?,
            Self::Synthesize(body) => Frame::with_data(self.tag(), body)?,
            Self::SynthesizeStart(body) => Frame::with_data(self.tag(), body)?,
            Self::SynthesizeChunk(body) => Frame::with_data(self.tag(), body)?,
            Self::Transcribe(body) => Frame::with_data(self.tag(), body)?,
            Self::AudioStart(format) => Frame::with_data(self.tag(), format)?,
            Self::AudioChunk { format, pcm } => {
                let mut frame = Frame::with_data(self.tag(), format)?;
                frame.payload.clone_from(pcm);
                frame
            }
            Self::TranscriptStart(body) => Frame::with_data(self.tag(), body)?,
            Self::TranscriptChunk(body) => Frame::with_data(self.tag(), body)?,
            Self::Transcript(body) => Frame::with_data(self.tag(), body)?,
        };
        Ok(frame)
    }

    /// Decode a wire frame into a typed event
    ///
    /// # Errors
    ///
    /// Returns [`Error::Event`] for unknown tags or malformed data bodies.
    /// Both are fatal to the connection.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let event = match frame.frame_type.as_str() {
            "describe" => Self::Describe,
            "info" => Self::Info(frame.parse_data()?),
            "synthesize" => Self::Synthesize(frame.parse_data()?),
            "synthesize-start" => Self::SynthesizeStart(if frame.data.is_empty() {
                SynthesizeStart::default()
            } else {
                frame.parse_data()?
            }),
            "synthesize-chunk" => Self::SynthesizeChunk(frame.parse_data()?),
            "synthesize-stop" => Self::SynthesizeStop,
            "synthesize-stopped" => Self::SynthesizeStopped,
            "transcribe" => Self::Transcribe(if frame.data.is_empty() {
                Transcribe::default()
            } else {
                frame.parse_data()?
            }),
            "audio-start" => Self::AudioStart(frame.parse_data()?),
            "audio-chunk" => Self::AudioChunk {
                format: frame.parse_data()?,
                pcm: frame.payload.clone(),
            },
            "audio-stop" => Self::AudioStop,
            "transcript-start" => Self::TranscriptStart(if frame.data.is_empty() {
                TranscriptStart::default()
            } else {
                frame.parse_data()?
            }),
            "transcript-chunk" => Self::TranscriptChunk(frame.parse_data()?),
            "transcript" => Self::Transcript(frame.parse_data()?),
            "transcript-stop" => Self::TranscriptStop,
            other => return Err(Error::Event(format!("unknown event type: {other}"))),
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wyoming::frame::{decode, encode, DecodeOutcome};

    #[test]
    fn audio_chunk_carries_payload() {
        let event = Event::AudioChunk {
            format: AudioFormat { rate: 22050, width: 2, channels: 1 },
            pcm: vec![1, 2, 3, 4, 5, 6],
        };
        let frame = event.to_frame().unwrap();
        assert_eq!(frame.payload, vec![1, 2, 3, 4, 5, 6]);

        let wire = encode(&frame);
        let DecodeOutcome::Frame(decoded, _) = decode(&wire).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(Event::from_frame(&decoded).unwrap(), event);
    }

    #[test]
    fn data_keys_are_snake_case() {
        let event = Event::AudioStart(AudioFormat { rate: 16000, width: 2, channels: 1 });
        let frame = event.to_frame().unwrap();
        let text = String::from_utf8(frame.data).unwrap();
        assert!(text.contains("\"rate\":16000"));
        assert!(text.contains("\"width\":2"));
        assert!(text.contains("\"channels\":1"));
    }

    #[test]
    fn bare_events_round_trip() {
        for event in [
            Event::Describe,
            Event::SynthesizeStop,
            Event::SynthesizeStopped,
            Event::AudioStop,
            Event::TranscriptStop,
        ] {
            let frame = event.to_frame().unwrap();
            assert!(frame.data.is_empty());
            assert_eq!(Event::from_frame(&frame).unwrap(), event);
        }
    }

    #[test]
    fn synthesize_with_voice_selector() {
        let frame = Frame {
            frame_type: "synthesize".to_string(),
            data: br#"{"text":"Hi.","voice":{"name":"en_US-amy"}}"#.to_vec(),
            payload: Vec::new(),
        };
        let Event::Synthesize(body) = Event::from_frame(&frame).unwrap() else {
            panic!("expected synthesize");
        };
        assert_eq!(body.text, "Hi.");
        assert_eq!(body.voice.unwrap().name.as_deref(), Some("en_US-amy"));
    }

    #[test]
    fn optional_bodies_default_when_empty() {
        let frame = Frame::new("transcribe");
        let Event::Transcribe(body) = Event::from_frame(&frame).unwrap() else {
            panic!("expected transcribe");
        };
        assert!(body.language.is_none());
    }

    #[test]
    fn unknown_tag_rejected() {
        let frame = Frame::new("wake-word");
        assert!(Event::from_frame(&frame).is_err());
    }

    #[test]
    fn info_streaming_flags_on_wire() {
        let info = Info {
            asr: vec![AsrProgram {
                name: "aria-stt".to_string(),
                description: None,
                attribution: Attribution {
                    name: "aria".to_string(),
                    url: "https://example.org".to_string(),
                },
                installed: true,
                version: None,
                languages: vec!["en-US".to_string()],
                supports_transcript_streaming: true,
            }],
            tts: Vec::new(),
        };
        let frame = Event::Info(info).to_frame().unwrap();
        let text = String::from_utf8(frame.data).unwrap();
        assert!(text.contains("supports_transcript_streaming"));
    }
}
