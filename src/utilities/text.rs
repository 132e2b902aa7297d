//! Text helpers shared by history trimming and the summarizer.

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Split text into overlapping chunks of at most `chunk_size` characters.
///
/// Consecutive chunks share `overlap` characters so sentences cut at a
/// boundary appear whole in at least one chunk. `chunk_size` must exceed
/// `overlap`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(chunk_size > overlap);
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += chunk_size - overlap;
    }
    chunks
}
