// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Send-wait-drain-compare transactions against the modem.
//!
//! A transaction writes one command line, waits a fixed settle time, drains
//! whatever the modem has produced so far into a bounded buffer and compares
//! it against the expected reply. Responses are framed as `\r\n<text>\r\n`,
//! so the comparison skips the first two bytes.

use std::time::Duration;

use tracing::{debug, warn};

use trk_core::{LinkError, SerialLink};

pub const LINE_TERMINATOR: &[u8] = b"\r\n";
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(50);
pub const DEFAULT_RX_CAPACITY: usize = 128;

/// Leading and trailing CRLF around every modem reply.
const FRAME_EDGE_LEN: usize = 2;
const DRAIN_CHUNK: usize = 64;

/// One command and the reply prefix it should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec<'a> {
    pub command: &'a str,
    pub expected: Option<&'a str>,
}

impl<'a> CommandSpec<'a> {
    /// Command whose reply must start with `expected`.
    pub const fn expect(command: &'a str, expected: &'a str) -> Self {
        Self {
            command,
            expected: Some(expected),
        }
    }

    /// Command whose reply is not checked.
    pub const fn unchecked(command: &'a str) -> Self {
        Self {
            command,
            expected: None,
        }
    }
}

/// Receive buffer with a hard capacity.
///
/// Bytes offered past capacity are refused and the buffer is flagged as
/// overflowed; nothing is ever written beyond `capacity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBuffer {
    bytes: Vec<u8>,
    capacity: usize,
    overflowed: bool,
}

impl ResponseBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
            overflowed: false,
        }
    }

    /// Append as much of `data` as fits. Returns the number of bytes taken.
    pub fn extend(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.remaining());
        self.bytes.extend_from_slice(&data[..take]);
        if take < data.len() {
            self.overflowed = true;
        }
        take
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mark_overflow(&mut self) {
        self.overflowed = true;
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Outcome of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    pub matched: bool,
    pub response: Vec<u8>,
    /// The modem produced more than the receive buffer holds.
    pub overflowed: bool,
}

impl TransactionResult {
    pub fn response_text(&self) -> String {
        String::from_utf8_lossy(&self.response).into_owned()
    }
}

/// True when `response`, after its two-byte line-ending prefix, starts with
/// `expected`. Responses too short to hold the prefix never match.
pub fn response_matches(response: &[u8], expected: &[u8]) -> bool {
    response
        .get(FRAME_EDGE_LEN..FRAME_EDGE_LEN + expected.len())
        .is_some_and(|window| window == expected)
}

/// Response with the framing CRLF stripped from both ends, for display.
pub fn response_body(response: &[u8]) -> &[u8] {
    let end = response.len().saturating_sub(FRAME_EDGE_LEN);
    let start = FRAME_EDGE_LEN.min(end);
    &response[start..end]
}

/// Runs command transactions over a modem link.
pub struct TransactionEngine<L> {
    link: L,
    settle: Duration,
    rx_capacity: usize,
}

impl<L: SerialLink> TransactionEngine<L> {
    pub fn new(link: L, settle: Duration, rx_capacity: usize) -> Self {
        Self {
            link,
            settle,
            rx_capacity,
        }
    }

    pub fn with_defaults(link: L) -> Self {
        Self::new(link, DEFAULT_SETTLE, DEFAULT_RX_CAPACITY)
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Send `spec.command`, wait, drain and judge the reply.
    ///
    /// A mismatch is reported through tracing and in the result; it is never
    /// an error. Only link failures produce `Err`.
    pub async fn execute(
        &mut self,
        spec: &CommandSpec<'_>,
    ) -> Result<TransactionResult, LinkError> {
        self.write_line(spec.command).await?;
        let response = self.settle_and_drain().await?;

        if response.overflowed() {
            warn!(
                "Modem reply to {} exceeded {} byte receive buffer; excess left unread",
                spec.command,
                response.capacity()
            );
        }

        let matched = match spec.expected {
            None => true,
            Some(expected) => response_matches(response.as_bytes(), expected.as_bytes()),
        };

        if matched {
            debug!(
                "Modem {} -> {:?}",
                spec.command,
                String::from_utf8_lossy(response.as_bytes())
            );
        } else {
            warn!(
                "Modem command error: command={} expected={} received={}",
                spec.command,
                spec.expected.unwrap_or_default(),
                String::from_utf8_lossy(response_body(response.as_bytes()))
            );
        }

        Ok(TransactionResult {
            matched,
            overflowed: response.overflowed(),
            response: response.into_bytes(),
        })
    }

    /// Write `line` followed by CRLF.
    pub async fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        let mut frame = Vec::with_capacity(line.len() + LINE_TERMINATOR.len());
        frame.extend_from_slice(line.as_bytes());
        frame.extend_from_slice(LINE_TERMINATOR);
        self.link.write_all(&frame).await
    }

    /// Write bytes exactly as given.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.link.write_all(bytes).await
    }

    /// Wait the settle time, then drain.
    pub async fn settle_and_drain(&mut self) -> Result<ResponseBuffer, LinkError> {
        tokio::time::sleep(self.settle).await;
        self.drain().await
    }

    /// Read what the link holds right now, up to the receive capacity.
    ///
    /// Stops as soon as the link reports nothing available; never waits for
    /// more. Bytes past capacity stay in the link and flag the buffer.
    pub async fn drain(&mut self) -> Result<ResponseBuffer, LinkError> {
        let mut response = ResponseBuffer::with_capacity(self.rx_capacity);
        let mut chunk = [0u8; DRAIN_CHUNK];
        loop {
            let room = response.remaining();
            if room == 0 {
                if self.link.bytes_available()? > 0 {
                    response.mark_overflow();
                }
                break;
            }
            let want = room.min(chunk.len());
            let n = self.link.read_available(&mut chunk[..want]).await?;
            if n == 0 {
                break;
            }
            response.extend(&chunk[..n]);
        }
        Ok(response)
    }
}
