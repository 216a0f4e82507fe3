//! Wyoming wire framing
//!
//! One frame on the wire is a JSON header line followed by two optional tail
//! segments whose byte lengths the header advertises:
//!
//! ```text
//! {"type":"audio-chunk","data_length":N,"payload_length":M}\n<data_json><payload>
//! ```
//!
//! Omitted lengths mean zero. The decoder is incremental: callers append
//! received bytes to a buffer and decode repeatedly until `NeedMore`.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A decoded protocol frame: header type plus optional data/payload segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Event tag from the header `type` field
    pub frame_type: String,
    /// Structured JSON data bytes, empty when absent
    pub data: Vec<u8>,
    /// Opaque binary payload bytes, empty when absent
    pub payload: Vec<u8>,
}

impl Frame {
    /// Frame with a type tag only
    #[must_use]
    pub fn new(frame_type: impl Into<String>) -> Self {
        Self {
            frame_type: frame_type.into(),
            data: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Frame with a serialized JSON data segment
    pub fn with_data<T: Serialize>(frame_type: impl Into<String>, data: &T) -> Result<Self> {
        Ok(Self {
            frame_type: frame_type.into(),
            data: serde_json::to_vec(data)?,
            payload: Vec::new(),
        })
    }

    /// Parse the data segment as JSON
    ///
    /// # Errors
    ///
    /// Returns an error when the segment is empty or not valid JSON for `T`.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_slice(&self.data)
            .map_err(|e| Error::Event(format!("bad {} data: {e}", self.frame_type)))
    }
}

/// Header line of a wire frame
///
/// Length fields are omitted on the wire when zero, matching what existing
/// Wyoming peers emit.
#[derive(Debug, Serialize, Deserialize)]
struct Header {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_length: Option<u64>,
}

/// Result of one incremental decode attempt
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A complete frame plus the number of buffer bytes it consumed
    Frame(Frame, usize),
    /// The buffer does not yet hold a complete frame; nothing was consumed
    NeedMore,
}

/// Protocol version advertised in encoded headers
pub const PROTOCOL_VERSION: &str = "1.7.2";

/// Upper bound on a single frame's combined size
///
/// Guards the receive buffer against a hostile or corrupt header. Large
/// enough for any legal audio chunk plus headroom for long synthesize text.
const MAX_FRAME_BYTES: u64 = 16 * 1024 * 1024;

/// Try to decode one frame from the front of `buf`
///
/// Returns [`DecodeOutcome::NeedMore`] without consuming anything when the
/// buffer holds less than a complete frame. On success the caller must
/// advance the buffer by the returned count atomically.
///
/// # Errors
///
/// Returns [`Error::Protocol`] when the header line is not valid JSON, lacks
/// a `type`, or advertises lengths beyond [`MAX_FRAME_BYTES`]. These are
/// fatal to the connection.
pub fn decode(buf: &[u8]) -> Result<DecodeOutcome> {
    let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
        return Ok(DecodeOutcome::NeedMore);
    };

    let header: Header = serde_json::from_slice(&buf[..newline])
        .map_err(|e| Error::Protocol(format!("malformed frame header: {e}")))?;

    if header.frame_type.is_empty() {
        return Err(Error::Protocol("frame header missing type".to_string()));
    }

    let data_len = header.data_length.unwrap_or(0);
    let payload_len = header.payload_length.unwrap_or(0);
    if data_len.checked_add(payload_len).is_none_or(|total| total > MAX_FRAME_BYTES) {
        return Err(Error::Protocol(format!(
            "frame too large: data {data_len} + payload {payload_len} bytes"
        )));
    }
    let data_len = data_len as usize;
    let payload_len = payload_len as usize;

    let total = newline + 1 + data_len + payload_len;
    if buf.len() < total {
        return Ok(DecodeOutcome::NeedMore);
    }

    let data_start = newline + 1;
    let payload_start = data_start + data_len;
    let frame = Frame {
        frame_type: header.frame_type,
        data: buf[data_start..payload_start].to_vec(),
        payload: buf[payload_start..total].to_vec(),
    };
    Ok(DecodeOutcome::Frame(frame, total))
}

/// Encode a frame to wire bytes
///
/// The header serializes in declaration order with zero-length fields
/// omitted, terminated by a single newline. No trailing newline follows the
/// payload.
#[must_use]
pub fn encode(frame: &Frame) -> Vec<u8> {
    let header = Header {
        frame_type: frame.frame_type.clone(),
        version: Some(PROTOCOL_VERSION.to_string()),
        data_length: (!frame.data.is_empty()).then(|| frame.data.len() as u64),
        payload_length: (!frame.payload.is_empty()).then(|| frame.payload.len() as u64),
    };

    // Header is built from plain strings and integers; serialization cannot fail.
    let mut out = serde_json::to_vec(&header).unwrap_or_default();
    out.push(b'\n');
    out.extend_from_slice(&frame.data);
    out.extend_from_slice(&frame.payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> Frame {
        Frame {
            frame_type: "audio-chunk".to_string(),
            data: br#"{"rate":16000,"width":2,"channels":1}"#.to_vec(),
            payload: vec![0x01, 0x02, 0x03, 0x04],
        }
    }

    #[test]
    fn round_trip() {
        let frame = sample_frame();
        let wire = encode(&frame);
        match decode(&wire).unwrap() {
            DecodeOutcome::Frame(decoded, consumed) => {
                assert_eq!(decoded, frame);
                assert_eq!(consumed, wire.len());
            }
            DecodeOutcome::NeedMore => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn byte_at_a_time_needs_more_until_last() {
        let wire = encode(&sample_frame());
        for end in 0..wire.len() {
            assert_eq!(
                decode(&wire[..end]).unwrap(),
                DecodeOutcome::NeedMore,
                "prefix of {end} bytes should be incomplete"
            );
        }
        assert!(matches!(decode(&wire).unwrap(), DecodeOutcome::Frame(_, _)));
    }

    #[test]
    fn decode_leaves_trailing_bytes() {
        let first = encode(&sample_frame());
        let mut wire = first.clone();
        wire.extend_from_slice(&encode(&Frame::new("audio-stop")));

        let DecodeOutcome::Frame(_, consumed) = decode(&wire).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(consumed, first.len());

        let DecodeOutcome::Frame(second, _) = decode(&wire[consumed..]).unwrap() else {
            panic!("expected second frame");
        };
        assert_eq!(second.frame_type, "audio-stop");
    }

    #[test]
    fn omitted_lengths_mean_zero() {
        let wire = b"{\"type\":\"describe\"}\n";
        let DecodeOutcome::Frame(frame, consumed) = decode(wire).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.frame_type, "describe");
        assert!(frame.data.is_empty());
        assert!(frame.payload.is_empty());
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn encoded_header_omits_zero_lengths() {
        let wire = encode(&Frame::new("audio-stop"));
        let header = &wire[..wire.len() - 1];
        let text = std::str::from_utf8(header).unwrap();
        assert!(!text.contains("data_length"));
        assert!(!text.contains("payload_length"));
        assert_eq!(wire.last(), Some(&b'\n'));
    }

    #[test]
    fn malformed_header_is_fatal() {
        assert!(decode(b"not json\n").is_err());
        assert!(decode(b"{\"no_type\":1}\n").is_err());
    }

    #[test]
    fn oversized_header_lengths_rejected() {
        let wire = b"{\"type\":\"audio-chunk\",\"payload_length\":99999999999}\n";
        assert!(decode(wire).is_err());
    }
}
