//! Text preparation for speech synthesis
//!
//! Sentence boundary extraction for incremental plain-text synthesis and
//! first-level SSML document splitting.

pub mod sentence;
pub mod ssml;

pub use sentence::split_first;
pub use ssml::{escape_xml, looks_like_ssml, sanitize_plain, split_speak, SpeakSplit};
