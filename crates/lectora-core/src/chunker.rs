//! Splits document text into utterance-sized chunks.
//!
//! Speech engines stall or silently truncate long utterances, so a document
//! is spoken as a series of chunks of at most `max_length` characters. Each
//! chunk remembers where it started in the original text so boundary offsets
//! reported inside a chunk can be mapped back to the document.
//!
//! All offsets are counted in `char`s (Unicode scalar values), never bytes.

use tracing::debug;

pub const DEFAULT_MAX_CHUNK_CHARS: usize = 500;

/// A break point must lie past this fraction of the window to be used.
pub const DEFAULT_BREAK_TOLERANCE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Trimmed chunk text.
    pub text: String,
    /// Char offset in the original text where the cut region began.
    pub global_start_index: usize,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Whitespace or one of the punctuation marks a chunk may end on.
pub fn is_break_char(ch: char) -> bool {
    ch.is_whitespace()
        || matches!(
            ch,
            '.' | ',' | '!' | '?' | ';' | ':' | '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>' | '"'
                | '\''
        )
}

pub fn chunk_text(text: &str, max_length: usize) -> Vec<Chunk> {
    chunk_text_with_tolerance(text, max_length, DEFAULT_BREAK_TOLERANCE)
}

/// Scan left to right, cutting each window at its last break character when
/// that break lies past `tolerance * max_length`, otherwise at the hard
/// `max_length` boundary.
pub fn chunk_text_with_tolerance(text: &str, max_length: usize, tolerance: f32) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let max_length = max_length.max(1);
    let min_break = max_length as f32 * tolerance.clamp(0.0, 1.0);

    let mut chunks = Vec::new();
    let mut cursor = 0usize;
    while cursor < chars.len() {
        let window_end = (cursor + max_length).min(chars.len());
        let window = &chars[cursor..window_end];

        let cut = match window.iter().rposition(|ch| is_break_char(*ch)) {
            Some(break_idx) if break_idx as f32 > min_break => cursor + break_idx + 1,
            _ => window_end,
        };

        let piece: String = chars[cursor..cut].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                text: trimmed.to_string(),
                global_start_index: cursor,
            });
        }

        cursor = cut;
        while cursor < chars.len() && chars[cursor].is_whitespace() {
            cursor += 1;
        }
    }

    debug!(
        chunk_count = chunks.len(),
        char_count = chars.len(),
        max_length,
        "Chunked document text"
    );
    chunks
}
