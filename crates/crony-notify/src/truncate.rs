//! Output shortening for mail bodies.
//!
//! The capture buffers already bound each stream, but a full mebibyte of log
//! text makes an unreadable mail. Middle-omission keeps both the first lines
//! (what the job was doing) and the last lines (how it ended).

/// Shorten `output` to at most `max_chars` characters by cutting out the middle.
///
/// Splits on character boundaries, so multi-byte sequences stay intact.
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_owned();
    }

    let half = max_chars / 2;
    let head_end = byte_offset(output, half);
    let tail_start = byte_offset(output, total - half);
    let omitted = total - 2 * half;

    format!(
        "{}\n\n[... {omitted} characters omitted ...]\n\n{}",
        &output[..head_end],
        &output[tail_start..]
    )
}

/// Byte index of the `n`th character (or the end of the string).
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
