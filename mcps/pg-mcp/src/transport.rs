//! Streaming JSON transport
//!
//! Requests are read as a stream of JSON values with no framing beyond the
//! JSON itself: a request may span several lines, and several requests may
//! share one line. Responses are written one per line.
//!
//! A value that is not a valid request is reported as
//! [`TransportError::Decode`]. Malformed JSON also drops the rest of the
//! line the error occurred on, so the next `receive` starts on a fresh
//! message.

use mcp_common::{Request, Response};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};

/// Errors from reading or writing a message
#[derive(Error, Debug)]
pub enum TransportError {
    /// The message was not a valid request; the stream itself is fine
    #[error("failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),

    /// The underlying stream failed
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of decoding from the front of the pending buffer
enum Decoded {
    Value(Value),
    Incomplete,
    Invalid(serde_json::Error),
}

/// Transport over any buffered reader and writer
pub struct JsonTransport<R, W> {
    reader: R,
    writer: W,
    /// Bytes read from `reader` but not yet decoded
    pending: Vec<u8>,
    /// Drop input up to the next newline before decoding again
    discard_line: bool,
}

/// Transport bound to the process's stdin/stdout
pub type StdioTransport = JsonTransport<BufReader<Stdin>, Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> JsonTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            pending: Vec::with_capacity(4096),
            discard_line: false,
        }
    }

    /// Read the next request
    ///
    /// Returns `Ok(None)` once the input is exhausted.
    pub async fn receive(&mut self) -> Result<Option<Request>, TransportError> {
        loop {
            if self.discard_line {
                match self.pending.iter().position(|b| *b == b'\n') {
                    Some(end) => {
                        self.pending.drain(..=end);
                        self.discard_line = false;
                    }
                    None => self.pending.clear(),
                }
            }

            if !self.discard_line {
                let start = self
                    .pending
                    .iter()
                    .position(|b| !b.is_ascii_whitespace())
                    .unwrap_or(self.pending.len());
                self.pending.drain(..start);

                if !self.pending.is_empty() {
                    match self.decode_front() {
                        Decoded::Value(value) => return Ok(Some(serde_json::from_value(value)?)),
                        Decoded::Invalid(e) => {
                            self.skip_error_line(e.line());
                            return Err(e.into());
                        }
                        Decoded::Incomplete => {}
                    }
                }
            }

            let chunk = self.reader.fill_buf().await?;
            if chunk.is_empty() {
                return self.finish();
            }
            let len = chunk.len();
            self.pending.extend_from_slice(chunk);
            self.reader.consume(len);
        }
    }

    /// Decode one value from the front of `pending`, removing its bytes
    fn decode_front(&mut self) -> Decoded {
        let (next, used) = {
            let mut values =
                serde_json::Deserializer::from_slice(&self.pending).into_iter::<Value>();
            let next = values.next();
            (next, values.byte_offset())
        };
        match next {
            Some(Ok(value)) => {
                self.pending.drain(..used);
                Decoded::Value(value)
            }
            Some(Err(e)) if e.is_eof() => Decoded::Incomplete,
            Some(Err(e)) => Decoded::Invalid(e),
            None => Decoded::Incomplete,
        }
    }

    /// Drop `pending` through the end of `line` (1-based)
    fn skip_error_line(&mut self, line: usize) {
        let end = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .nth(line.saturating_sub(1))
            .map(|(i, _)| i);
        match end {
            Some(end) => {
                self.pending.drain(..=end);
            }
            None => {
                self.pending.clear();
                self.discard_line = true;
            }
        }
    }

    /// Input ended; anything still pending is a truncated message
    fn finish(&mut self) -> Result<Option<Request>, TransportError> {
        self.discard_line = false;
        let truncated = std::mem::take(&mut self.pending);
        if truncated.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&truncated)?))
    }

    /// Write one response followed by a newline and flush
    pub async fn send(&mut self, response: &Response) -> Result<(), TransportError> {
        let mut bytes = serde_json::to_vec(response)?;
        bytes.push(b'\n');
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
