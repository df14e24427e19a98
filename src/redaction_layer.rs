use lazy_static::lazy_static;
use regex::Regex;
use std::io::Write;

lazy_static! {
    static ref REDACTION_REGEX: Regex = Regex::new(
        r"(?i)(Bearer\s+[^\s]+|(?:api[_-]?key|key_secret|apikey)[\x22']?\s*[:=]\s*[\x22']?[^\s\x22',}]+)"
    )
    .expect("Invalid redaction regex");
}

/// Masks bearer tokens and API keys before log lines reach disk.
pub fn redact(input: &str) -> std::borrow::Cow<'_, str> {
    REDACTION_REGEX.replace_all(input, "[REDACTED]")
}

pub struct RedactingWriter<W: Write> {
    inner: W,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let input = String::from_utf8_lossy(buf);
        self.inner.write_all(redact(&input).as_bytes())?;
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
    fn test_redacts_bearer_and_keys() {
        let line = r#"Authorization: Bearer abc.def {"apikey":"s3cr3t"} api_key=xyz"#;
        let out = redact(line);
        assert!(!out.contains("abc.def"));
        assert!(!out.contains("s3cr3t"));
        assert!(!out.contains("xyz"));
        assert!(out.contains("Authorization:"));
    }

    #[test]
    fn test_writer_passes_plain_text_through() {
        let mut out = Vec::new();
        {
            let mut w = RedactingWriter::new(&mut out);
            w.write_all(b"relay stream closed chunks=3\n").unwrap();
        }
        assert_eq!(out, b"relay stream closed chunks=3\n");
    }
}
