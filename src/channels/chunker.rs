//! Splits long replies into platform-sized messages.

/// Split `text` into consecutive segments of at most `max_len` characters.
///
/// Lengths are counted in `char`s, since LINE limits characters rather than
/// bytes. Within each window the split falls just after the last newline when
/// there is one; otherwise it is a hard cut. Nothing is trimmed, so the
/// segments concatenate back to exactly `text`. Empty input yields no segments
/// and a `max_len` of zero is treated as one.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        // Byte offset just past the `max_len`-th char, or the whole tail.
        let window_end = remaining
            .char_indices()
            .nth(max_len)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());

        if window_end == remaining.len() {
            chunks.push(remaining.to_string());
            break;
        }

        let window = &remaining[..window_end];
        let split_at = match window.rfind('\n') {
            Some(i) if i + 1 < window_end => i + 1,
            _ => window_end,
        };

        chunks.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at..];
    }

    chunks
}
