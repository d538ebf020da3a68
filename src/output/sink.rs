//! Message sinks

use crate::engine::Message;
use crate::error::Result;
use std::io::{self, Write};

/// Destination for emitted messages
pub trait RecordSink: Send {
    fn write(&mut self, message: &Message) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one Singer message per line
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
    written: usize,
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Messages written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn write(&mut self, message: &Message) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &message.to_json())?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> std::fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink")
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}

/// Keeps messages in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Vec<Message>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Record payloads written for `stream`
    pub fn records(&self, stream: &str) -> Vec<&serde_json::Value> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Record {
                    stream: s, record, ..
                } if s == stream => Some(record),
                _ => None,
            })
            .collect()
    }

    /// State payloads, in order
    pub fn states(&self) -> Vec<&serde_json::Value> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::State { value } => Some(value),
                _ => None,
            })
            .collect()
    }
}

impl RecordSink for MemorySink {
    fn write(&mut self, message: &Message) -> Result<()> {
        self.messages.push(message.clone());
        Ok(())
    }
}
