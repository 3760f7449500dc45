/// Test whether bit `bit` of `x` is set.
pub fn test_bit(bit: u32, x: u32) -> bool {
    (x >> bit) & 1 == 1
}

/// Decode a fixed-width, NUL-padded text field.
///
/// Trailing NUL bytes are trimmed; invalid UTF-8 is replaced rather than rejected,
/// switches are not trusted to send clean strings.
pub fn text_of_bytes(buf: &[u8]) -> String {
    let end = buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Encode `s` into a fixed-width, NUL-padded text field of `width` bytes.
///
/// Text longer than the field is truncated.
pub fn bytes_of_text(s: &str, width: usize, bytes: &mut Vec<u8>) {
    let raw = s.as_bytes();
    let n = raw.len().min(width);
    bytes.extend_from_slice(&raw[..n]);
    bytes.resize(bytes.len() + (width - n), 0);
}

/// Round `len` up to the next multiple of 8.
pub fn pad8(len: usize) -> usize {
    (len + 7) & !7
}
