//! Newline framing for the line-hashing tool

use bytes::{Buf, Bytes, BytesMut};

/// Accumulates bytes and yields complete `\n`-terminated lines.
///
/// Lines are returned without their terminator. A trailing partial line stays
/// buffered until more bytes arrive.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: BytesMut,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `data` and drain every complete line
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(pos).freeze();
            self.buffer.advance(1);
            lines.push(line);
        }
        lines
    }

    /// Bytes of the unterminated tail
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

/// Lowercase hex MD5 of `line`, newline-terminated
pub fn md5_reply(line: &[u8]) -> String {
    use md5::{Digest, Md5};

    let mut reply = hex::encode(Md5::digest(line));
    reply.push('\n');
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_across_pushes() {
        let mut splitter = LineSplitter::new();

        assert!(splitter.push(b"abc").is_empty());
        let lines = splitter.push(b"def\nghi\n\njk");
        assert_eq!(lines, vec![&b"abcdef"[..], &b"ghi"[..], &b""[..]]);
        assert_eq!(splitter.pending(), b"jk");

        let lines = splitter.push(b"\n");
        assert_eq!(lines, vec![&b"jk"[..]]);
        assert!(splitter.pending().is_empty());
    }

    #[test]
    fn test_md5_reply() {
        assert_eq!(md5_reply(b""), "d41d8cd98f00b204e9800998ecf8427e\n");
        assert_eq!(md5_reply(b"abc"), "900150983cd24fb0d6963f7d28e17f72\n");
    }
}
