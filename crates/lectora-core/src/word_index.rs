//! Maps character offsets in the full document to word positions.

use crate::chunker::is_break_char;

/// Index of the word being entered at `char_index`.
///
/// Counts whitespace-delimited tokens in the prefix `full_text[..char_index]`
/// and returns the last one. This is an approximation of the engine's own
/// word segmentation, which is voice-specific.
pub fn word_index_from_char_index(char_index: usize, full_text: &str) -> usize {
    if char_index == 0 {
        return 0;
    }
    let prefix = &full_text[..byte_offset(full_text, char_index)];
    prefix.split_whitespace().count().saturating_sub(1)
}

/// Char offset of the first break character at or after `start`.
pub fn word_end_index(full_text: &str, start: usize) -> usize {
    let mut end = start;
    for ch in full_text.chars().skip(start) {
        if is_break_char(ch) {
            break;
        }
        end += 1;
    }
    end
}

fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}
