// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::debug;

use trk_core::{LinkError, LinkFuture, SerialLink};

/// A real serial port behind [`SerialLink`].
pub struct SerialPortLink {
    port: SerialStream,
    path: String,
}

impl SerialPortLink {
    pub fn open(path: &str, baud: u32) -> Result<Self, LinkError> {
        let port = tokio_serial::new(path, baud)
            .open_native_async()
            .map_err(std::io::Error::from)?;
        // Anything buffered before we opened belongs to nobody.
        if let Err(e) = port.clear(ClearBuffer::Input) {
            debug!("Could not clear input buffer of {}: {}", path, e);
        }
        Ok(Self {
            port,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SerialLink for SerialPortLink {
    fn write_all<'a>(&'a mut self, bytes: &'a [u8]) -> LinkFuture<'a, ()> {
        Box::pin(async move {
            self.port.write_all(bytes).await?;
            self.port.flush().await?;
            Ok(())
        })
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        let n = self
            .port
            .bytes_to_read()
            .map_err(std::io::Error::from)?;
        Ok(n as usize)
    }

    fn read_available<'a>(&'a mut self, buf: &'a mut [u8]) -> LinkFuture<'a, usize> {
        Box::pin(async move {
            let n = self.bytes_available()?.min(buf.len());
            if n == 0 {
                return Ok(0);
            }
            self.port.read_exact(&mut buf[..n]).await?;
            Ok(n)
        })
    }
}
