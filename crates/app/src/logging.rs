use std::io::{self, Write};

use crossterm::terminal;

/// Log sink for the terminal. While the keyboard holds the terminal in raw
/// mode a bare `\n` no longer returns the cursor, so line ends are written as
/// `\r\n` to keep every log line starting at column zero.
pub struct TerminalWriter<W> {
    inner: W,
    raw: bool,
}

impl<W: Write> TerminalWriter<W> {
    pub fn new(inner: W, raw: bool) -> Self {
        Self { inner, raw }
    }
}

/// Used as the `tracing_subscriber` writer factory; checks the terminal mode
/// once per event.
pub fn stderr() -> TerminalWriter<io::Stderr> {
    let raw = terminal::is_raw_mode_enabled().unwrap_or(false);
    TerminalWriter::new(io::stderr(), raw)
}

impl<W: Write> Write for TerminalWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.raw {
            return self.inner.write(buf);
        }
        let mut lines = buf.split(|b| *b == b'\n').peekable();
        while let Some(line) = lines.next() {
            self.inner.write_all(line)?;
            if lines.peek().is_some() {
                self.inner.write_all(b"\r\n")?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_mode_gets_carriage_returns() {
        let mut writer = TerminalWriter::new(Vec::new(), true);
        writer.write_all(b"first\nsecond\n").unwrap();
        assert_eq!(writer.inner, b"first\r\nsecond\r\n");
    }

    #[test]
    fn cooked_mode_passes_through() {
        let mut writer = TerminalWriter::new(Vec::new(), false);
        writer.write_all(b"line\n").unwrap();
        assert_eq!(writer.inner, b"line\n");
    }
}
