// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Detection of location requests in unsolicited modem text.
//!
//! With `AT+CNMI=1,2,0,0,0` the modem pushes every received message as
//!
//! ```text
//! \r\n+CMT: "+48123456789","","26/10/16,12:00:00+08"\r\nStart\r\n
//! ```
//!
//! so the sender's number (without `+`) begins at byte 10 of the text.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use trk_core::{LinkError, RequesterAddress, SerialLink};

/// Text that marks a message as a location request.
pub const REQUEST_MARKER: &[u8] = b"Start";
/// Byte offset of the requester's number inside a `+CMT:` notification.
pub const ADDRESS_OFFSET: usize = 10;
pub const DEFAULT_REASSEMBLY_CAPACITY: usize = 512;

const NOTIFICATION_HEADER: &[u8] = b"+CMT:";
const CRLF: &[u8] = b"\r\n";
const READ_CHUNK: usize = 256;

/// How received bytes are grouped before request detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundFraming {
    /// Everything read in one poll is one blob. A message split across two
    /// polls is seen as two unrelated blobs.
    #[default]
    Blob,
    /// Bytes accumulate until a complete CRLF-terminated notification is
    /// buffered, so split messages are joined.
    Reassemble,
}

/// Look for a request in `blob`.
///
/// Only the first occurrence of the marker counts, and it must sit after
/// offset 0. The address is the window at `ADDRESS_OFFSET`, not validated.
pub fn detect_request(blob: &[u8]) -> Option<RequesterAddress> {
    let pos = find(blob, REQUEST_MARKER)?;
    // TODO: confirm with product owner whether a marker at offset 0 should
    // count; a bare "Start" with no notification header is ignored today.
    if pos == 0 {
        return None;
    }
    let start = ADDRESS_OFFSET.min(blob.len());
    Some(RequesterAddress::from_bytes(&blob[start..]))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .filter(|window| *window == needle)
        .count()
}

/// Polls the modem link for inbound text once per scheduler tick.
#[derive(Debug)]
pub struct InboundParser {
    framing: InboundFraming,
    pending: Vec<u8>,
    capacity: usize,
}

impl InboundParser {
    pub fn new(framing: InboundFraming, reassembly_capacity: usize) -> Self {
        Self {
            framing,
            pending: Vec::new(),
            capacity: reassembly_capacity,
        }
    }

    pub fn framing(&self) -> InboundFraming {
        self.framing
    }

    /// Bytes held back waiting for the rest of a message (reassembly only).
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Drain the link and return a requester address if the drained text
    /// carries a request. No bytes means no action and no log output.
    pub async fn poll<L: SerialLink>(
        &mut self,
        link: &mut L,
    ) -> Result<Option<RequesterAddress>, LinkError> {
        let bytes = read_available(link).await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        match self.framing {
            InboundFraming::Blob => Ok(handle_blob(&bytes)),
            InboundFraming::Reassemble => {
                self.accumulate(&bytes);
                Ok(self.take_complete().and_then(|blob| handle_blob(&blob)))
            }
        }
    }

    fn accumulate(&mut self, bytes: &[u8]) {
        if self.pending.len() + bytes.len() > self.capacity {
            warn!(
                "Inbound reassembly buffer full ({} bytes); dropping {} buffered bytes",
                self.capacity,
                self.pending.len() + bytes.len()
            );
            self.pending.clear();
            return;
        }
        self.pending.extend_from_slice(bytes);
    }

    /// Release the buffer once it ends on a line boundary and does not hold
    /// a notification still waiting for its body line.
    ///
    /// Blank lines alone are held back. A released notification starts at
    /// the CRLF just before `+CMT:`, keeping the address at
    /// `ADDRESS_OFFSET`; anything earlier is logged and dropped.
    fn take_complete(&mut self) -> Option<Vec<u8>> {
        if !self.pending.ends_with(CRLF) {
            return None;
        }
        if self.pending.iter().all(|b| *b == b'\r' || *b == b'\n') {
            return None;
        }
        let Some(header) = find(&self.pending, NOTIFICATION_HEADER) else {
            return Some(std::mem::take(&mut self.pending));
        };
        if count(&self.pending[header..], CRLF) < 2 {
            return None;
        }
        let start = if self.pending[..header].ends_with(CRLF) {
            header - CRLF.len()
        } else {
            header
        };
        let mut blob = std::mem::take(&mut self.pending);
        let residue: Vec<u8> = blob.drain(..start).collect();
        if residue.iter().any(|b| !b.is_ascii_whitespace()) {
            info!("{}", String::from_utf8_lossy(&residue));
        }
        Some(blob)
    }
}

fn handle_blob(blob: &[u8]) -> Option<RequesterAddress> {
    match detect_request(blob) {
        Some(address) => {
            info!("Requested location! (from +{})", address);
            Some(address)
        }
        None => {
            info!("{}", String::from_utf8_lossy(blob));
            None
        }
    }
}

async fn read_available<L: SerialLink>(link: &mut L) -> Result<Vec<u8>, LinkError> {
    let mut bytes = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = link.read_available(&mut chunk).await?;
        if n == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..n]);
    }
    Ok(bytes)
}
