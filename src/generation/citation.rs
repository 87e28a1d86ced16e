//! Resolution of `[n]` citation markers in generated answers

use regex::Regex;
use std::sync::OnceLock;

use crate::types::{ContextEntry, Segment};

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(\d+)\]").unwrap())
}

/// Split answer text into literal text and resolved citation segments
///
/// A `[n]` token resolves against the entry whose `citation_number` is `n`;
/// tokens that are out of range (or whose digits overflow) pass through as
/// literal text. Pure and infallible: concatenating the text of all segments
/// (with citations rendered back as `[n]`) reproduces the input exactly.
pub fn resolve_citations(text: &str, entries: &[ContextEntry]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for capture in citation_pattern().captures_iter(text) {
        let marker = match capture.get(0) {
            Some(marker) => marker,
            None => continue,
        };
        let number: Option<usize> = capture[1].parse().ok();

        let entry = number.and_then(|n| {
            entries
                .iter()
                .find(|entry| entry.citation_number == n)
                .cloned()
        });

        let entry = match entry {
            Some(entry) => entry,
            // Unresolvable marker stays literal
            None => continue,
        };

        if marker.start() > cursor {
            segments.push(Segment::Text {
                value: text[cursor..marker.start()].to_string(),
            });
        }
        segments.push(Segment::Citation {
            number: entry.citation_number,
            entry,
        });
        cursor = marker.end();
    }

    if cursor < text.len() {
        segments.push(Segment::Text {
            value: text[cursor..].to_string(),
        });
    }

    segments
}
