//! Sentence boundary extraction
//!
//! Finds the first complete sentence in a growing text buffer. A boundary is
//! only reported when text continues past the terminator, so a trailing
//! period in a partial buffer never splits early; the caller flushes the
//! residue when its stream ends.

/// Abbreviations that do not terminate a sentence (lowercase, no final dot)
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "rev", "hon", "sr", "jr", "st", "vs",
    "etc", "inc", "ltd", "co", "corp", "dept", "est", "approx", "no", "vol",
    "fig", "p", "pp", "e.g", "i.e", "cf",
];

/// Terminators that end a sentence without requiring trailing whitespace
const FULLWIDTH_TERMINATORS: &[char] = &['。', '！', '？', '।', '؟'];

/// Characters that may trail a terminator and stay inside the sentence
const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', ']', '»'];

/// Split the first complete sentence off the front of `text`
///
/// Returns `(sentence, remainder)` with the sentence trimmed of leading
/// whitespace, or `None` when no complete boundary is present yet.
#[must_use]
pub fn split_first(text: &str) -> Option<(&str, &str)> {
    let boundary = next_boundary(text)?;
    let (head, tail) = text.split_at(boundary);
    let head = head.trim_start();
    if head.is_empty() {
        return None;
    }
    Some((head, tail))
}

/// Index one past the first complete sentence terminator, or `None`
fn next_boundary(text: &str) -> Option<usize> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    for (pos, &(idx, ch)) in chars.iter().enumerate() {
        if FULLWIDTH_TERMINATORS.contains(&ch) {
            // Fullwidth punctuation closes a sentence on its own.
            let mut end = idx + ch.len_utf8();
            let mut next = pos + 1;
            while let Some(&(i, c)) = chars.get(next) {
                if CLOSERS.contains(&c) {
                    end = i + c.len_utf8();
                    next += 1;
                } else {
                    break;
                }
            }
            return Some(end);
        }

        if ch != '.' && ch != '!' && ch != '?' && ch != '…' {
            continue;
        }

        // Collapse runs of terminators ("...", "?!") to their last char.
        let mut last = pos;
        while let Some(&(_, c)) = chars.get(last + 1) {
            if matches!(c, '.' | '!' | '?' | '…') {
                last += 1;
            } else {
                break;
            }
        }

        if ch == '.' && last == pos && !period_ends_sentence(&chars, pos) {
            continue;
        }

        // Absorb closing quotes and brackets into the sentence.
        let mut end_pos = last;
        let mut next = last + 1;
        while let Some(&(_, c)) = chars.get(next) {
            if CLOSERS.contains(&c) {
                end_pos = next;
                next += 1;
            } else {
                break;
            }
        }

        // Complete only when whitespace follows; a terminator at the end of
        // the buffer may still grow ("3." -> "3.5").
        match chars.get(next) {
            Some(&(_, c)) if c.is_whitespace() => {
                let (i, c) = chars[end_pos];
                return Some(i + c.len_utf8());
            }
            _ => continue,
        }
    }

    None
}

/// Whether a lone period at `pos` is a real sentence terminator
fn period_ends_sentence(chars: &[(usize, char)], pos: usize) -> bool {
    // Decimal or thousands separator: digit on both sides.
    let prev = pos.checked_sub(1).map(|p| chars[p].1);
    let next = chars.get(pos + 1).map(|&(_, c)| c);
    if prev.is_some_and(|c| c.is_ascii_digit()) && next.is_some_and(|c| c.is_ascii_digit()) {
        return false;
    }

    // Word immediately before the period.
    let mut start = pos;
    while start > 0 {
        let c = chars[start - 1].1;
        if c.is_alphanumeric() || c == '.' {
            start -= 1;
        } else {
            break;
        }
    }
    let word: String = chars[start..pos].iter().map(|&(_, c)| c).collect();
    let word = word.to_lowercase();

    // Single-letter initials ("J. Smith") and known abbreviations.
    if word.len() == 1 && word.chars().all(char::is_alphabetic) {
        return false;
    }
    if ABBREVIATIONS.contains(&word.as_str()) {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_split() {
        let (head, tail) = split_first("Hello world. How are").unwrap();
        assert_eq!(head, "Hello world.");
        assert_eq!(tail, " How are");
    }

    #[test]
    fn incomplete_returns_none() {
        assert!(split_first("Hello world").is_none());
        assert!(split_first("").is_none());
    }

    #[test]
    fn trailing_terminator_waits_for_more_text() {
        // Could still grow into "Hello world.com" or "3.5".
        assert!(split_first("Hello world.").is_none());
        assert!(split_first("Pi is 3.").is_none());
    }

    #[test]
    fn decimal_not_a_boundary() {
        let (head, tail) = split_first("Pi is 3.14 roughly. Yes").unwrap();
        assert_eq!(head, "Pi is 3.14 roughly.");
        assert_eq!(tail, " Yes");
    }

    #[test]
    fn abbreviation_not_a_boundary() {
        assert!(split_first("Dr. Smith arrived").is_none());
        let (head, _) = split_first("Ask Dr. Smith today. Then leave").unwrap();
        assert_eq!(head, "Ask Dr. Smith today.");
    }

    #[test]
    fn initial_not_a_boundary() {
        let (head, _) = split_first("J. Smith wrote it. Read on").unwrap();
        assert_eq!(head, "J. Smith wrote it.");
    }

    #[test]
    fn exclamation_and_question() {
        let (head, tail) = split_first("Stop! Now").unwrap();
        assert_eq!(head, "Stop!");
        assert_eq!(tail, " Now");

        let (head, _) = split_first("Really?! I see").unwrap();
        assert_eq!(head, "Really?!");
    }

    #[test]
    fn ellipsis_collapses() {
        let (head, tail) = split_first("Well... maybe. Sure").unwrap();
        // "..." followed by lowercase is still a terminator followed by
        // whitespace; the tokenizer does not do capitalization lookahead.
        assert_eq!(head, "Well...");
        assert_eq!(tail, " maybe. Sure");
    }

    #[test]
    fn closing_quote_stays_with_sentence() {
        let (head, tail) = split_first("He said \"go.\" Then left").unwrap();
        assert_eq!(head, "He said \"go.\"");
        assert_eq!(tail, " Then left");
    }

    #[test]
    fn fullwidth_terminator_needs_no_space() {
        let (head, tail) = split_first("こんにちは。元気").unwrap();
        assert_eq!(head, "こんにちは。");
        assert_eq!(tail, "元気");
    }

    #[test]
    fn repeated_extraction_drains_in_order() {
        let mut buf = "One. Two. Three. ".to_string();
        let mut sentences = Vec::new();
        while let Some((head, tail)) = split_first(&buf) {
            sentences.push(head.to_string());
            buf = tail.to_string();
        }
        assert_eq!(sentences, vec!["One.", "Two.", "Three."]);
        assert_eq!(buf.trim(), "");
    }

    #[test]
    fn leading_whitespace_trimmed() {
        let (head, _) = split_first("   Hi there. Bye").unwrap();
        assert_eq!(head, "Hi there.");
    }
}
