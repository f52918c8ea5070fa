//! Canonical text form for signing: CRLF line endings, no trailing blanks.

/// Rewrite `data` so every line ends in `\r\n` and carries no trailing spaces
/// or tabs. A final line without a terminator stays unterminated.
pub fn canonicalize(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 32);
    let mut lines = data.split(|b| *b == b'\n').peekable();

    while let Some(line) = lines.next() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let end = line
            .iter()
            .rposition(|b| *b != b' ' && *b != b'\t')
            .map_or(0, |i| i + 1);
        out.extend_from_slice(&line[..end]);
        if lines.peek().is_some() {
            out.extend_from_slice(b"\r\n");
        }
    }
    out
}
