use lazy_static::lazy_static;
use regex::Regex;
use std::io::Write;

lazy_static! {
    static ref REDACTION_REGEX: Regex = Regex::new(
        r#"(?i)(sk-[A-Za-z0-9]{6,}|Bearer\s+[^\s"]+|\bsign"?\s*[:=]\s*"?[A-F0-9]{32})"#
    )
    .expect("Invalid redaction regex");
}

/// Masks API keys, bearer tokens and request signatures before they hit a log sink.
pub struct RedactingWriter<W: Write> {
    inner: W,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

pub fn redact(input: &str) -> std::borrow::Cow<'_, str> {
    REDACTION_REGEX.replace_all(input, "[REDACTED]")
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let input = String::from_utf8_lossy(buf);
        let redacted = redact(&input);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_are_masked() {
        assert_eq!(redact("auth: Bearer abc.def"), "auth: [REDACTED]");
        assert_eq!(redact("key sk-180867 used"), "key [REDACTED] used");
        assert_eq!(
            redact(r#""sign": "199D235FFF597F594FB560F8BC31DC8D""#),
            r#""[REDACTED]""#
        );
        assert_eq!(redact("nothing to see"), "nothing to see");
    }

    #[test]
    fn test_writer_reports_full_length() {
        let mut sink = Vec::new();
        let written = {
            let mut writer = RedactingWriter::new(&mut sink);
            match writer.write(b"token Bearer secret\n") {
                Ok(n) => n,
                Err(e) => panic!("write failed: {}", e),
            }
        };
        assert_eq!(written, 20);
        assert_eq!(String::from_utf8_lossy(&sink), "token [REDACTED]\n");
    }
}
