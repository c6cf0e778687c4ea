// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Byte-oriented serial channel shared by the modem and the GPS receiver.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Alias to reduce type complexity in `SerialLink`.
pub type LinkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LinkError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("link closed")]
    Closed,
}

/// A bidirectional byte channel.
///
/// Reads never wait for data to arrive: they hand back whatever the
/// channel holds at that instant, which may be nothing.
pub trait SerialLink: Send {
    /// Write every byte and flush the outbound buffer.
    fn write_all<'a>(&'a mut self, bytes: &'a [u8]) -> LinkFuture<'a, ()>;

    /// Number of received bytes waiting to be read right now.
    fn bytes_available(&mut self) -> Result<usize, LinkError>;

    /// Copy up to `buf.len()` already-received bytes into `buf`.
    /// Returns 0 when nothing is waiting.
    fn read_available<'a>(&'a mut self, buf: &'a mut [u8]) -> LinkFuture<'a, usize>;
}

impl<T: SerialLink + ?Sized> SerialLink for Box<T> {
    fn write_all<'a>(&'a mut self, bytes: &'a [u8]) -> LinkFuture<'a, ()> {
        (**self).write_all(bytes)
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        (**self).bytes_available()
    }

    fn read_available<'a>(&'a mut self, buf: &'a mut [u8]) -> LinkFuture<'a, usize> {
        (**self).read_available(buf)
    }
}

/// In-memory link with scripted replies.
///
/// Each `write_all` records the written bytes and, if a reply has been
/// queued with `queue_reply`, moves the next one into the receive side, the
/// way a modem answers a command.
#[derive(Debug, Default)]
pub struct MemoryLink {
    inbound: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    closed: bool,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make bytes immediately available to the reader.
    pub fn push_inbound(&mut self, bytes: impl AsRef<[u8]>) {
        self.inbound.extend(bytes.as_ref());
    }

    /// Queue bytes to be received after the next write.
    pub fn queue_reply(&mut self, bytes: impl AsRef<[u8]>) {
        self.replies.push_back(bytes.as_ref().to_vec());
    }

    /// Every write so far, one entry per `write_all` call.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.written
    }

    pub fn take_writes(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.written)
    }

    /// Fail every later operation with `LinkError::Closed`.
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn write_now(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        self.written.push(bytes.to_vec());
        if let Some(reply) = self.replies.pop_front() {
            self.inbound.extend(reply);
        }
        Ok(())
    }

    fn read_now(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl SerialLink for MemoryLink {
    fn write_all<'a>(&'a mut self, bytes: &'a [u8]) -> LinkFuture<'a, ()> {
        Box::pin(std::future::ready(self.write_now(bytes)))
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        Ok(self.inbound.len())
    }

    fn read_available<'a>(&'a mut self, buf: &'a mut [u8]) -> LinkFuture<'a, usize> {
        Box::pin(std::future::ready(self.read_now(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_arrives_after_write() {
        let mut link = MemoryLink::new();
        link.queue_reply(b"\r\nOK\r\n");
        assert_eq!(link.bytes_available().unwrap(), 0);

        link.write_all(b"AT\r\n").await.unwrap();
        assert_eq!(link.bytes_available().unwrap(), 6);

        let mut buf = [0u8; 4];
        assert_eq!(link.read_available(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"\r\nOK");
        assert_eq!(link.read_available(&mut buf).await.unwrap(), 2);
        assert_eq!(link.read_available(&mut buf).await.unwrap(), 0);
        assert_eq!(link.writes(), &[b"AT\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_boxed_link_forwards() {
        let mut link: Box<dyn SerialLink> = Box::new(MemoryLink::new());
        link.write_all(b"AT\r\n").await.unwrap();
        assert_eq!(link.bytes_available().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_link_errors() {
        let mut link = MemoryLink::new();
        link.close();
        assert!(matches!(
            link.write_all(b"AT").await,
            Err(LinkError::Closed)
        ));
        assert!(link.bytes_available().is_err());
    }
}
