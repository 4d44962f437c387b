//! Newline framing over an upstream byte stream.
//!
//! Upstream bodies arrive in arbitrarily sized reads. A read may end in the
//! middle of a line or in the middle of a multibyte character, so raw bytes
//! are buffered and only decoded once a full line (terminated by `\n`, which
//! never occurs inside a UTF-8 sequence) is available.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Default)]
pub struct FrameReader {
    pending: BytesMut,
    /// Bytes of the buffer already known to contain no newline
    next_index: usize,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a read and return every line it completed, without terminators.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(line) = take_line(&mut self.pending, &mut self.next_index) {
            lines.push(line);
        }
        lines
    }

    /// Return the unterminated remainder, if any, as a last logical line.
    pub fn flush(&mut self) -> Option<String> {
        take_remainder(&mut self.pending, &mut self.next_index)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Decoder for FrameReader {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        Ok(take_line(src, &mut self.next_index))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(line) = take_line(src, &mut self.next_index) {
            return Ok(Some(line));
        }
        Ok(take_remainder(src, &mut self.next_index))
    }
}

fn take_line(buf: &mut BytesMut, next_index: &mut usize) -> Option<String> {
    let start = (*next_index).min(buf.len());
    match buf[start..].iter().position(|b| *b == b'\n') {
        Some(offset) => {
            let newline_at = start + offset;
            let line = buf.split_to(newline_at + 1);
            *next_index = 0;
            Some(decode_text(&line[..newline_at]))
        }
        None => {
            *next_index = buf.len();
            None
        }
    }
}

fn take_remainder(buf: &mut BytesMut, next_index: &mut usize) -> Option<String> {
    *next_index = 0;
    if buf.is_empty() {
        return None;
    }
    let rest = buf.split();
    Some(decode_text(&rest))
}

fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio_util::codec::FramedRead;

    fn reassemble(lines: &[String], remainder: Option<String>) -> String {
        let mut out = String::new();
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }
        if let Some(rest) = remainder {
            out.push_str(&rest);
        }
        out
    }

    #[test]
    fn test_lines_split_across_reads() {
        let mut reader = FrameReader::new();
        assert!(reader.feed(b"0:\"He").is_empty());
        assert_eq!(reader.feed(b"llo\"\ng:"), vec!["0:\"Hello\"".to_string()]);
        assert_eq!(reader.feed(b"\"x\"\n\n"), vec!["g:\"x\"".to_string(), String::new()]);
        assert_eq!(reader.flush(), None);
    }

    #[test]
    fn test_flush_returns_unterminated_tail() {
        let mut reader = FrameReader::new();
        assert!(reader.feed(b"e:{\"finishReason\"").is_empty());
        assert_eq!(reader.pending_len(), 17);
        assert_eq!(reader.flush(), Some("e:{\"finishReason\"".to_string()));
        assert_eq!(reader.flush(), None);
    }

    #[test]
    fn test_every_split_point_preserves_bytes() {
        let original = "data:{\"content\":\"你好，世界\"}\r\n0:\"naïve\"\n\ntail→end";
        let bytes = original.as_bytes();

        for first in 0..=bytes.len() {
            for second in first..=bytes.len() {
                let mut reader = FrameReader::new();
                let mut lines = reader.feed(&bytes[..first]);
                lines.extend(reader.feed(&bytes[first..second]));
                lines.extend(reader.feed(&bytes[second..]));
                let rebuilt = reassemble(&lines, reader.flush());
                assert_eq!(rebuilt, original, "split at {} / {}", first, second);
            }
        }
    }

    #[test]
    fn test_single_byte_reads() {
        let original = "g:\"思考\"\n0:\"答案\"\nd:{}";
        let mut reader = FrameReader::new();
        let mut lines = Vec::new();
        for b in original.as_bytes() {
            lines.extend(reader.feed(std::slice::from_ref(b)));
        }
        assert_eq!(lines, vec!["g:\"思考\"".to_string(), "0:\"答案\"".to_string()]);
        assert_eq!(reader.flush(), Some("d:{}".to_string()));
    }

    #[tokio::test]
    async fn test_decoder_over_chunked_stream() {
        let chunks: Vec<std::io::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(b"data:{\"a\":")),
            Ok(bytes::Bytes::from_static(b"1}\ndata:{\"b\"")),
            Ok(bytes::Bytes::from_static(b":2}")),
        ];
        let reader = tokio_util::io::StreamReader::new(futures_util::stream::iter(chunks));
        let lines: Vec<String> = FramedRead::new(reader, FrameReader::new())
            .filter_map(|r| async move { r.ok() })
            .collect()
            .await;
        assert_eq!(
            lines,
            vec!["data:{\"a\":1}".to_string(), "data:{\"b\":2}".to_string()]
        );
    }
}
