//! Gzip-compressed JSON Lines decoding
//!
//! Decompresses a byte stream as it arrives and yields one JSON value per
//! line. Nothing is buffered beyond the current partial line.

use crate::error::{Error, Result};
use bytes::Bytes;
use flate2::write::MultiGzDecoder;
use futures::Stream;
use pin_project_lite::pin_project;
use serde_json::Value;
use std::collections::VecDeque;
use std::io::Write;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

pin_project! {
    /// Stream of JSON values decoded from a gzip JSON Lines body.
    ///
    /// Blank lines are skipped. The first malformed line (or invalid gzip
    /// data) is yielded as an error and ends the stream.
    pub struct JsonLinesStream<S> {
        #[pin]
        body: S,
        decoder: MultiGzDecoder<Vec<u8>>,
        ready: VecDeque<Result<Value>>,
        bytes_in: usize,
        lines_read: usize,
        finished: bool,
    }
}

impl<S> JsonLinesStream<S> {
    /// Wrap a stream of compressed chunks
    pub fn new(body: S) -> Self {
        Self {
            body,
            decoder: MultiGzDecoder::new(Vec::new()),
            ready: VecDeque::new(),
            bytes_in: 0,
            lines_read: 0,
            finished: false,
        }
    }

    /// Lines consumed so far, blank ones included
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }
}

impl<S> std::fmt::Debug for JsonLinesStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesStream")
            .field("lines_read", &self.lines_read)
            .field("buffered", &self.ready.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<S, E> Stream for JsonLinesStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<Error>,
{
    type Item = Result<Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.ready.pop_front() {
                return Poll::Ready(Some(item));
            }
            if *this.finished {
                return Poll::Ready(None);
            }

            match ready!(this.body.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    *this.bytes_in += chunk.len();
                    if let Err(e) = this.decoder.write_all(&chunk) {
                        *this.finished = true;
                        this.ready
                            .push_back(Err(Error::decode(format!("Invalid gzip data: {e}"))));
                        continue;
                    }
                    let ok = split_lines(this.decoder.get_mut(), this.ready, this.lines_read, false);
                    *this.finished = !ok;
                }
                Some(Err(e)) => {
                    *this.finished = true;
                    this.ready.push_back(Err(e.into()));
                }
                None => {
                    *this.finished = true;
                    if *this.bytes_in > 0 {
                        if let Err(e) = this.decoder.try_finish() {
                            this.ready
                                .push_back(Err(Error::decode(format!("Invalid gzip data: {e}"))));
                            continue;
                        }
                    }
                    split_lines(this.decoder.get_mut(), this.ready, this.lines_read, true);
                }
            }
        }
    }
}

/// Move every complete line out of `buf` and parse it. At end of input the
/// unterminated remainder is parsed too. Returns false after a bad line.
fn split_lines(
    buf: &mut Vec<u8>,
    out: &mut VecDeque<Result<Value>>,
    lines_read: &mut usize,
    at_eof: bool,
) -> bool {
    let mut consumed = 0;
    let mut ok = true;

    while let Some(pos) = buf[consumed..].iter().position(|b| *b == b'\n') {
        let line = &buf[consumed..consumed + pos];
        consumed += pos + 1;
        *lines_read += 1;
        if !push_line(line, *lines_read, out) {
            ok = false;
            break;
        }
    }

    if ok && at_eof && consumed < buf.len() {
        *lines_read += 1;
        ok = push_line(&buf[consumed..], *lines_read, out);
        consumed = buf.len();
    }

    buf.drain(..consumed);
    ok
}

fn push_line(line: &[u8], line_num: usize, out: &mut VecDeque<Result<Value>>) -> bool {
    match parse_line(line, line_num) {
        Ok(Some(value)) => {
            out.push_back(Ok(value));
            true
        }
        Ok(None) => true,
        Err(e) => {
            out.push_back(Err(e));
            false
        }
    }
}

/// Parse one line; `None` for a blank line
pub fn parse_line(line: &[u8], line_num: usize) -> Result<Option<Value>> {
    let text = std::str::from_utf8(line)
        .map_err(|e| Error::decode(format!("Invalid UTF-8 at line {line_num}: {e}")))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| Error::decode(format!("Failed to parse JSONL at line {line_num}: {e}")))
}
