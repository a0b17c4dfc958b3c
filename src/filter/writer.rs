//! Byte-counting writer decorator.
//!
//! Character writes are measured with a per-character width rule instead of
//! encoding the text, so the count is an approximation for code points above
//! U+FFFF (counted as 3 bytes). Byte writes are counted exactly.

use std::fmt;
use std::io;

#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// Encoded width of a character: 1 byte up to U+007F, 2 up to U+07FF, 3 otherwise.
pub fn encoded_len(c: char) -> u64 {
    match u32::from(c) {
        0..=0x7F => 1,
        0x80..=0x7FF => 2,
        _ => 3,
    }
}

fn str_len(s: &str) -> u64 {
    s.chars().map(encoded_len).sum()
}

/// Mirrors every write to `inner` and keeps a running byte total.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        CountingWriter { inner, count: 0 }
    }

    /// Bytes written so far.
    pub fn byte_count(&self) -> u64 {
        self.count
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: fmt::Write> CountingWriter<W> {
    /// Writes `s` if present; `None` is a no-op.
    pub fn write_opt(&mut self, s: Option<&str>) -> fmt::Result {
        match s {
            Some(s) => fmt::Write::write_str(self, s),
            None => Ok(()),
        }
    }

    /// Writes `s` (if any) followed by the platform line separator.
    pub fn write_line(&mut self, s: Option<&str>) -> fmt::Result {
        self.write_opt(s)?;
        fmt::Write::write_str(self, LINE_SEPARATOR)
    }
}

impl<W: fmt::Write> fmt::Write for CountingWriter<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write_str(s)?;
        self.count += str_len(s);
        Ok(())
    }

    fn write_char(&mut self, c: char) -> fmt::Result {
        self.inner.write_char(c)?;
        self.count += encoded_len(c);
        Ok(())
    }
}

impl<W: io::Write> io::Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
