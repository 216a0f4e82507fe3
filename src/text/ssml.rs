//! SSML document splitting
//!
//! A `<speak>` document is split into one chunk per first-level child
//! element, each rewrapped as `<speak [attrs]>child</speak>` with the child
//! subtree and the speak attributes preserved verbatim. Text between
//! first-level children is dropped. The splitter is a single-pass scanner,
//! not a DOM round-trip, so unknown namespaces and attribute values survive
//! byte-for-byte.

use std::borrow::Cow;

use crate::{Error, Result};

/// Result of splitting a complete `<speak>` document off a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakSplit {
    /// One `<speak …>child</speak>` chunk per first-level child, in document order
    pub chunks: Vec<String>,
    /// Buffer contents after the closing `</speak>`
    pub residue: String,
}

/// Syntactic SSML shape test
///
/// Lower-cased input must start with `<?xml` or `<speak` and contain
/// `</speak>`. Deliberately prefix-and-closing-tag only; inputs that pass
/// this test but fail to parse fall back to escape-and-wrap.
#[must_use]
pub fn looks_like_ssml(text: &str) -> bool {
    let lower = text.trim_start().to_lowercase();
    (lower.starts_with("<?xml") || lower.starts_with("<speak")) && lower.contains("</speak>")
}

/// Escape XML-significant characters: `& < > " '`
#[must_use]
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Guard plain text against backend XML auto-detection
///
/// Backends auto-interpret XML-looking input, so plain text containing `<…>`
/// is escaped and wrapped in `<speak>` before synthesis. Text without markup
/// passes through untouched.
#[must_use]
pub fn sanitize_plain(text: &str) -> Cow<'_, str> {
    if text.contains('<') {
        Cow::Owned(format!("<speak>{}</speak>", escape_xml(text)))
    } else {
        Cow::Borrowed(text)
    }
}

/// Split a buffer holding a complete `<speak>…</speak>` document
///
/// # Errors
///
/// Returns [`Error::Session`] when the buffer is not a well-formed speak
/// document (no opening tag, unbalanced elements, missing close). Callers
/// treat that as "not actually SSML" and recover by escape-and-wrap.
pub fn split_speak(doc: &str) -> Result<SpeakSplit> {
    let mut pos = 0;

    // Skip whitespace, the XML prolog, and leading comments.
    loop {
        pos += count_leading_ws(&doc[pos..]);
        if doc[pos..].starts_with("<?") {
            pos = skip_past(doc, pos, "?>")?;
        } else if doc[pos..].starts_with("<!--") {
            pos = skip_past(doc, pos, "-->")?;
        } else {
            break;
        }
    }

    if !starts_with_tag(&doc[pos..], "speak") {
        return Err(Error::Session("expected <speak> document".to_string()));
    }

    let open = parse_tag(doc, pos)?;
    let attrs = &doc[pos + "<speak".len()..open.tag_close];
    if open.self_closing {
        return Ok(SpeakSplit {
            chunks: Vec::new(),
            residue: doc[open.end..].to_string(),
        });
    }

    let mut chunks = Vec::new();
    let mut cursor = open.end;
    loop {
        let Some(rel) = doc[cursor..].find('<') else {
            return Err(Error::Session("unterminated <speak> document".to_string()));
        };
        // Text between first-level children is dropped.
        let lt = cursor + rel;

        if doc[lt..].starts_with("</") {
            let close = parse_tag(doc, lt)?;
            if !close.name.eq_ignore_ascii_case("speak") {
                return Err(Error::Session(format!(
                    "unexpected closing </{}> at speak level",
                    close.name
                )));
            }
            return Ok(SpeakSplit {
                chunks,
                residue: doc[close.end..].to_string(),
            });
        }

        if doc[lt..].starts_with("<!--") {
            cursor = skip_past(doc, lt, "-->")?;
            continue;
        }
        if doc[lt..].starts_with("<?") {
            cursor = skip_past(doc, lt, "?>")?;
            continue;
        }

        let end = scan_element(doc, lt)?;
        chunks.push(format!("<speak{attrs}>{}</speak>", &doc[lt..end]));
        cursor = end;
    }
}

/// One parsed tag: name, whether self-closing, index past the closing `>`
struct Tag<'a> {
    name: &'a str,
    self_closing: bool,
    /// Index one past `>`
    end: usize,
    /// Index of `/>` or `>` (attribute text ends here)
    tag_close: usize,
}

/// Parse a tag starting at `start` (which must point at `<`)
///
/// Respects quoted attribute values, so `>` inside quotes does not terminate
/// the tag.
fn parse_tag(doc: &str, start: usize) -> Result<Tag<'_>> {
    let bytes = doc.as_bytes();
    debug_assert_eq!(bytes[start], b'<');

    let name_start = if doc[start..].starts_with("</") { start + 2 } else { start + 1 };
    let mut name_end = name_start;
    while name_end < bytes.len() {
        let b = bytes[name_end];
        if b.is_ascii_whitespace() || b == b'>' || b == b'/' {
            break;
        }
        name_end += 1;
    }
    if name_end == name_start {
        return Err(Error::Session("empty tag name".to_string()));
    }

    let mut i = name_end;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => {
                    let self_closing = i > start && bytes[i - 1] == b'/';
                    let tag_close = if self_closing { i - 1 } else { i };
                    return Ok(Tag {
                        name: &doc[name_start..name_end],
                        self_closing,
                        end: i + 1,
                        tag_close,
                    });
                }
                _ => {}
            },
        }
        i += 1;
    }
    Err(Error::Session("unterminated tag".to_string()))
}

/// Scan a balanced element starting at `start`; returns the index past its close
fn scan_element(doc: &str, start: usize) -> Result<usize> {
    let open = parse_tag(doc, start)?;
    if open.self_closing {
        return Ok(open.end);
    }

    let mut depth = 1usize;
    let mut cursor = open.end;
    while depth > 0 {
        let Some(rel) = doc[cursor..].find('<') else {
            return Err(Error::Session(format!("unterminated <{}> element", open.name)));
        };
        let lt = cursor + rel;

        if doc[lt..].starts_with("<!--") {
            cursor = skip_past(doc, lt, "-->")?;
            continue;
        }
        if doc[lt..].starts_with("<?") {
            cursor = skip_past(doc, lt, "?>")?;
            continue;
        }

        let tag = parse_tag(doc, lt)?;
        if doc[lt..].starts_with("</") {
            depth -= 1;
        } else if !tag.self_closing {
            depth += 1;
        }
        cursor = tag.end;
    }
    Ok(cursor)
}

/// Index past `needle` searching from `from`, or a parse error
fn skip_past(doc: &str, from: usize, needle: &str) -> Result<usize> {
    doc[from..]
        .find(needle)
        .map(|rel| from + rel + needle.len())
        .ok_or_else(|| Error::Session(format!("unterminated construct, expected {needle}")))
}

fn count_leading_ws(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

/// Case-insensitive check for `<name` followed by a tag delimiter
fn starts_with_tag(s: &str, name: &str) -> bool {
    let Some(rest) = s.strip_prefix('<') else {
        return false;
    };
    if rest.len() < name.len() || !rest[..name.len()].eq_ignore_ascii_case(name) {
        return false;
    }
    matches!(
        rest.as_bytes().get(name.len()).copied(),
        None | Some(b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'/')
    )
}
