//! Newline-delimited transport
//!
//! Generic over reader and writer so tests can drive it from memory.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{trace, warn};

use crate::error::Result;

/// Longest accepted request line, newline excluded.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// One line read off the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Text with surrounding whitespace removed; empty for blank lines.
    Line(String),
    /// A line that cannot be a request (not UTF-8, or too long). The
    /// stream stays usable.
    Rejected(String),
}

pub struct LineTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
    max_line_bytes: usize,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Next line, or `None` on EOF.
    ///
    /// Only I/O failures are errors; bad content comes back as
    /// `Inbound::Rejected`.
    pub async fn read_line(&mut self) -> Result<Option<Inbound>> {
        let mut buf = Vec::new();
        let limit = self.max_line_bytes as u64 + 1;
        let read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            return Ok(None);
        }

        if buf.len() > self.max_line_bytes && buf.last() != Some(&b'\n') {
            self.skip_rest_of_line().await?;
            warn!(max = self.max_line_bytes, "dropping oversized line");
            return Ok(Some(Inbound::Rejected(format!(
                "line exceeds {} bytes",
                self.max_line_bytes
            ))));
        }

        match String::from_utf8(buf) {
            Ok(line) => {
                let trimmed = line.trim();
                trace!(len = trimmed.len(), "read line");
                Ok(Some(Inbound::Line(trimmed.to_string())))
            }
            Err(e) => {
                warn!(error = %e.utf8_error(), "dropping non UTF-8 line");
                Ok(Some(Inbound::Rejected(format!(
                    "line is not valid UTF-8: {}",
                    e.utf8_error()
                ))))
            }
        }
    }

    async fn skip_rest_of_line(&mut self) -> Result<()> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    self.reader.consume(end + 1);
                    return Ok(());
                }
                None => {
                    let len = buf.len();
                    self.reader.consume(len);
                }
            }
        }
    }

    /// Write one message followed by `\n`, then flush.
    pub async fn write_line(&mut self, message: &str) -> Result<()> {
        trace!(len = message.len(), "write line");
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}
