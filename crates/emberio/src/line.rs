use bytes::{Bytes, BytesMut};
use memchr::memchr2;

/// Accumulates raw connection bytes and yields complete lines.
///
/// Telnet clients are sloppy about line endings: `\r\n`, bare `\n`, bare
/// `\r`, and `\r\0` all occur in the wild. Any of `\n`/`\r` terminates a
/// line; a `\r` immediately followed by `\n` or `\0` consumes both bytes.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    max_line_len: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_max_len(8 * 1024)
    }

    pub fn with_max_len(max: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            max_line_len: max.max(1),
        }
    }

    /// Append a chunk read from the connection.
    ///
    /// Returns `false` when the pending (unterminated) data exceeds the
    /// line-length bound; the caller should drop the connection.
    #[must_use]
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        self.buf.extend_from_slice(chunk);
        self.buf.len() <= self.max_line_len || self.has_terminator()
    }

    fn has_terminator(&self) -> bool {
        memchr2(b'\n', b'\r', &self.buf).is_some()
    }

    /// Pop the next complete line, without its terminator. May be empty.
    pub fn pop_line(&mut self) -> Option<Bytes> {
        let i = memchr2(b'\n', b'\r', &self.buf)?;
        let line = self.buf.split_to(i).freeze();

        // Drain the terminator: one byte, or two for `\r\n` / `\r\0`.
        let first = self.buf.split_to(1);
        if first[0] == b'\r' && matches!(self.buf.first(), Some(&b'\n') | Some(&0)) {
            let _ = self.buf.split_to(1);
        }
        Some(line)
    }
}

/// Trim ASCII whitespace from both ends of a byte slice.
pub fn trim_ascii_ws(s: &[u8]) -> &[u8] {
    let mut a = 0usize;
    let mut b = s.len();
    while a < b && s[a].is_ascii_whitespace() {
        a += 1;
    }
    while b > a && s[b - 1].is_ascii_whitespace() {
        b -= 1;
    }
    &s[a..b]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pop_str(lb: &mut LineBuffer) -> Option<String> {
        lb.pop_line()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    #[test]
    fn splits_crlf_and_lf() {
        let mut lb = LineBuffer::new();
        assert!(lb.push(b"hello\r\nworld\nrest"));
        assert_eq!(pop_str(&mut lb).as_deref(), Some("hello"));
        assert_eq!(pop_str(&mut lb).as_deref(), Some("world"));
        assert_eq!(pop_str(&mut lb), None);
        assert!(lb.push(b"\n"));
        assert_eq!(pop_str(&mut lb).as_deref(), Some("rest"));
    }

    #[test]
    fn handles_bare_cr_and_crnul() {
        let mut lb = LineBuffer::new();
        assert!(lb.push(b"one\rtwo\r\0three\r\n"));
        assert_eq!(pop_str(&mut lb).as_deref(), Some("one"));
        assert_eq!(pop_str(&mut lb).as_deref(), Some("two"));
        assert_eq!(pop_str(&mut lb).as_deref(), Some("three"));
        assert_eq!(pop_str(&mut lb), None);
    }

    #[test]
    fn empty_lines_are_popped() {
        let mut lb = LineBuffer::new();
        assert!(lb.push(b"\r\n\r\n"));
        assert_eq!(pop_str(&mut lb).as_deref(), Some(""));
        assert_eq!(pop_str(&mut lb).as_deref(), Some(""));
    }

    #[test]
    fn terminator_split_across_pushes() {
        let mut lb = LineBuffer::new();
        assert!(lb.push(b"abc\r"));
        assert_eq!(pop_str(&mut lb).as_deref(), Some("abc"));
        // The dangling `\n` of the `\r\n` pair arrives later and reads as an
        // empty line; callers ignore empty input anyway.
        assert!(lb.push(b"\ndef\n"));
        assert_eq!(pop_str(&mut lb).as_deref(), Some(""));
        assert_eq!(pop_str(&mut lb).as_deref(), Some("def"));
    }

    #[test]
    fn overlong_pending_line_is_rejected() {
        let mut lb = LineBuffer::with_max_len(8);
        assert!(lb.push(b"12345678"));
        assert!(!lb.push(b"9"));
    }

    #[test]
    fn trim_ascii_ws_basic() {
        assert_eq!(trim_ascii_ws(b""), b"");
        assert_eq!(trim_ascii_ws(b"  x "), b"x");
        assert_eq!(trim_ascii_ws(b"\r\nx\t"), b"x");
        assert_eq!(trim_ascii_ws(b"   "), b"");
    }
}
