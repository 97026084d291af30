//! Fixed-window text chunker with overlap.
//!
//! Splits a document body into bounded fragments for downstream retrieval.
//! Windows are measured in characters (not bytes), so multi-byte UTF-8 text
//! is never split inside a code point.
//!
//! # Algorithm
//!
//! 1. Trim the whole text. Empty input yields no fragments.
//! 2. Emit `text[i..i + max_chars]` starting at `i = 0`.
//! 3. Advance `i` by `max_chars - overlap_chars` until a window reaches the
//!    end of the text. That window is emitted once and the loop stops.
//!
//! Dropping the first `overlap_chars` characters of every fragment after the
//! first and concatenating reproduces the trimmed text exactly.
//!
//! # Example
//!
//! ```rust
//! use kbsync_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("abcdefghij", 4, 1);
//! assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
//! ```

/// Split `text` into overlapping windows of at most `max_chars` characters.
///
/// `overlap_chars` is clamped so the window always advances by at least one
/// character; a zero `max_chars` is treated as one.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let max_chars = max_chars.max(1);
    let step = max_chars - overlap_chars.min(max_chars - 1);

    // Byte offset of every char, plus the end of the text.
    let mut offsets: Vec<usize> = trimmed.char_indices().map(|(i, _)| i).collect();
    let char_count = offsets.len();
    offsets.push(trimmed.len());

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + max_chars).min(char_count);
        chunks.push(trimmed[offsets[start]..offsets[end]].to_string());
        if end >= char_count {
            break;
        }
        start += step;
    }
    chunks
}

/// Rebuild the text a chunk sequence was cut from.
///
/// Inverse of [`chunk_text`] for the same `overlap_chars`.
pub fn reassemble(chunks: &[String], overlap_chars: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(chunk);
        } else {
            out.extend(chunk.chars().skip(overlap_chars));
        }
    }
    out
}
