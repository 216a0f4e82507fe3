//! PCM audio primitives shared by the Wyoming sessions
//!
//! Audio on the wire is raw interleaved little-endian PCM described by an
//! [`AudioFormat`]. Resampling is out of scope; the gateway forwards what the
//! backends produce.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum payload size of a single `audio-chunk` frame
pub const MAX_CHUNK_BYTES: usize = 2048;

/// PCM stream format: sample rate, bytes per sample, channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub rate: u32,
    /// Bytes per sample (2 or 4)
    pub width: u16,
    /// Channel count
    pub channels: u16,
}

impl AudioFormat {
    /// Validate the format constraints used by the STT path
    ///
    /// # Errors
    ///
    /// Returns an error when rate is zero, width is not 2 or 4, or there are
    /// no channels.
    pub fn validate(&self) -> Result<()> {
        if self.rate == 0 {
            return Err(Error::AudioFormat(format!("rate must be > 0, got {}", self.rate)));
        }
        if self.width != 2 && self.width != 4 {
            return Err(Error::AudioFormat(format!(
                "width must be 2 or 4 bytes, got {}",
                self.width
            )));
        }
        if self.channels == 0 {
            return Err(Error::AudioFormat("channels must be >= 1".to_string()));
        }
        Ok(())
    }

    /// Bytes per second of audio in this format
    #[must_use]
    pub fn bytes_per_second(&self) -> usize {
        self.rate as usize * self.width as usize * self.channels as usize
    }
}

/// Generate `seconds` of silence in the given format
///
/// The buffer length is aligned down to a whole frame so a partial sample is
/// never emitted.
#[must_use]
pub fn silence(format: AudioFormat, seconds: f64) -> Vec<u8> {
    if seconds <= 0.0 {
        return Vec::new();
    }
    let frame = format.width as usize * format.channels as usize;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut len = (format.bytes_per_second() as f64 * seconds) as usize;
    len -= len % frame.max(1);
    vec![0u8; len]
}

/// Split a PCM buffer into chunks of at most [`MAX_CHUNK_BYTES`]
#[must_use]
pub fn split_chunks(pcm: &[u8]) -> Vec<&[u8]> {
    pcm.chunks(MAX_CHUNK_BYTES).collect()
}
