//! Character-counting program streamer
//!
//! Grbl has a fixed serial receive buffer. The streamer keeps it as full as
//! possible by tracking exactly how many bytes are in flight: every line
//! written is remembered in a FIFO, and every `ok`/`error:N` frees the
//! oldest line's bytes. Acknowledgments are never reordered, since the
//! firmware processes one line at a time.

use crate::firmware::grbl::message::ResponseMessage;
use async_trait::async_trait;
use grblkit_core::{ControllerError, GcodeError, Result};
use grblkit_gcode::Parser;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::io::BufRead;
use std::pin::Pin;

/// The two halves of the wire the streamer needs
#[async_trait]
pub trait AckLink: Send {
    /// Write bytes to the controller
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;

    /// Wait for the next `ok` or `error:N`
    async fn next_acknowledgment(&mut self) -> Result<ResponseMessage>;
}

/// Counters for a finished stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Lines sent
    pub lines: usize,
    /// Bytes sent, line terminators included
    pub bytes: usize,
    /// Calls to [`AckLink::write_chunk`]
    pub writes: usize,
    /// Acknowledgments waited for
    pub acknowledgment_waits: usize,
}

/// Parse a whole program into wire lines before anything is sent
///
/// Each returned line is the compact form of one block plus `\n`. EEPROM
/// writes are refused, as is any line that could never fit into a receive
/// buffer of `max_rx_buffer_bytes`.
pub fn prepare_program<R: BufRead>(program: R, max_rx_buffer_bytes: usize) -> Result<Vec<String>> {
    let mut parser = Parser::new(program);
    let mut lines = Vec::new();

    while let Some(block) = parser.next_block()? {
        let line_number = parser.block_line_number();
        if block.is_eeprom_write() {
            return Err(GcodeError::EepromCommand {
                line_number,
                block: block.to_string(),
            }
            .into());
        }

        let line = format!("{}\n", block);
        if line.len() > max_rx_buffer_bytes {
            return Err(GcodeError::LineTooLong {
                line_number,
                length: line.len(),
                capacity: max_rx_buffer_bytes,
            }
            .into());
        }
        lines.push(line);
    }

    tracing::debug!("Prepared {} lines for streaming", lines.len());
    Ok(lines)
}

/// Streams a program over an [`AckLink`] using character counting
pub struct ProgramStreamer<L> {
    link: L,
    max_rx_buffer_bytes: usize,
    available_buffer_bytes: usize,
    sent_chunk_bytes: VecDeque<usize>,
}

impl<L: AckLink> ProgramStreamer<L> {
    /// Create a streamer for a controller with `max_rx_buffer_bytes` of receive buffer
    pub fn new(link: L, max_rx_buffer_bytes: usize) -> Self {
        Self {
            link,
            max_rx_buffer_bytes,
            available_buffer_bytes: max_rx_buffer_bytes,
            sent_chunk_bytes: VecDeque::new(),
        }
    }

    pub fn max_rx_buffer_bytes(&self) -> usize {
        self.max_rx_buffer_bytes
    }

    /// Receive buffer bytes not yet claimed by unacknowledged lines
    pub fn available_buffer_bytes(&self) -> usize {
        self.available_buffer_bytes
    }

    /// Lines written but not yet acknowledged
    pub fn in_flight(&self) -> usize {
        self.sent_chunk_bytes.len()
    }

    /// True when nothing is in flight and the whole buffer is free
    pub fn is_balanced(&self) -> bool {
        self.sent_chunk_bytes.is_empty() && self.available_buffer_bytes == self.max_rx_buffer_bytes
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// Stream `program` and wait until every line is acknowledged
    ///
    /// The program is parsed and validated in full first, so a bad program
    /// sends nothing. Completing `cancel` while the streamer waits for an
    /// acknowledgment returns [`ControllerError::Cancelled`] immediately;
    /// the controller may still hold buffered lines afterwards.
    ///
    /// An `error:N` acknowledgment frees its bytes and then fails the stream
    /// with [`ControllerError::CommandRejected`].
    pub async fn run<R, F>(&mut self, program: R, cancel: F) -> Result<StreamSummary>
    where
        R: BufRead,
        F: Future<Output = ()>,
    {
        let lines = prepare_program(program, self.max_rx_buffer_bytes)?;
        tokio::pin!(cancel);

        let mut summary = StreamSummary::default();
        for line in &lines {
            let bytes = line.as_bytes();
            let mut offset = 0;
            while offset < bytes.len() {
                if self.available_buffer_bytes == 0 {
                    self.wait_for_acknowledgment(cancel.as_mut(), &mut summary)
                        .await?;
                }
                let end = (offset + self.available_buffer_bytes).min(bytes.len());
                self.link.write_chunk(&bytes[offset..end]).await?;
                self.available_buffer_bytes -= end - offset;
                summary.writes += 1;
                offset = end;
            }
            self.sent_chunk_bytes.push_back(bytes.len());
            summary.lines += 1;
            summary.bytes += bytes.len();
        }

        while !self.sent_chunk_bytes.is_empty() {
            self.wait_for_acknowledgment(cancel.as_mut(), &mut summary)
                .await?;
        }

        assert!(
            self.is_balanced(),
            "character counting out of balance: {} of {} bytes available, {} lines in flight",
            self.available_buffer_bytes,
            self.max_rx_buffer_bytes,
            self.sent_chunk_bytes.len()
        );

        tracing::debug!(
            "Streamed {} lines ({} bytes) in {} writes",
            summary.lines,
            summary.bytes,
            summary.writes
        );
        Ok(summary)
    }

    async fn wait_for_acknowledgment<F>(
        &mut self,
        cancel: Pin<&mut F>,
        summary: &mut StreamSummary,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        summary.acknowledgment_waits += 1;
        let response = tokio::select! {
            biased;
            _ = cancel => {
                tracing::debug!("Stream cancelled with {} lines in flight", self.sent_chunk_bytes.len());
                return Err(ControllerError::Cancelled.into());
            }
            response = self.link.next_acknowledgment() => response?,
        };

        let Some(freed) = self.sent_chunk_bytes.pop_front() else {
            tracing::error!("Received {} with no line in flight", response);
            return Err(ControllerError::Desynchronized.into());
        };
        self.available_buffer_bytes += freed;

        if let ResponseMessage::Error { .. } = response {
            tracing::warn!("Stream stopped by {}", response);
        }
        response.into_result()?;
        Ok(())
    }
}
