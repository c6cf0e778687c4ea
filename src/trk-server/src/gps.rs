// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! GPS receiver polling and a simulated receiver.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use tokio::time::Instant;
use tracing::info;

use trk_core::nmea::encode_rmc;
use trk_core::{Fix, FixStore, LinkError, LinkFuture, NmeaDecoder, SerialLink};

const READ_CHUNK: usize = 128;

/// Feeds bytes from the receiver link into the NMEA decoder.
pub struct GpsPoller<G> {
    link: G,
    decoder: NmeaDecoder,
}

impl<G: SerialLink> GpsPoller<G> {
    pub fn new(link: G) -> Self {
        Self {
            link,
            decoder: NmeaDecoder::new(),
        }
    }

    pub fn link_mut(&mut self) -> &mut G {
        &mut self.link
    }

    /// Consume everything the receiver has sent so far. Every completed fix
    /// replaces the stored one. Returns how many fixes were completed.
    pub async fn poll(&mut self, store: &mut FixStore) -> Result<usize, LinkError> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut fixes = 0;
        loop {
            let n = self.link.read_available(&mut chunk).await?;
            if n == 0 {
                return Ok(fixes);
            }
            for &byte in &chunk[..n] {
                if let Some(fix) = self.decoder.push_byte(byte) {
                    store.update(fix);
                    fixes += 1;
                    info!("Location acquired! ({:.6}, {:.6})", fix.latitude, fix.longitude);
                }
            }
        }
    }
}

/// Receiver that reports a fixed position once per interval.
pub struct SimulatedGps {
    latitude: f64,
    longitude: f64,
    interval: Duration,
    next: Instant,
    outbound: VecDeque<u8>,
}

impl SimulatedGps {
    pub fn new(latitude: f64, longitude: f64, interval: Duration) -> Self {
        Self {
            latitude,
            longitude,
            interval,
            next: Instant::now(),
            outbound: VecDeque::new(),
        }
    }

    fn emit_due(&mut self) {
        let now = Instant::now();
        if now < self.next {
            return;
        }
        self.next = now + self.interval;
        let (date, time) = utc_date_time(Utc::now());
        let sentence = encode_rmc(&Fix {
            latitude: self.latitude,
            longitude: self.longitude,
            date,
            time,
            valid: true,
        });
        self.outbound.extend(sentence.as_bytes());
    }
}

impl SerialLink for SimulatedGps {
    /// Receivers take configuration sentences; the simulation ignores them.
    fn write_all<'a>(&'a mut self, _bytes: &'a [u8]) -> LinkFuture<'a, ()> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        self.emit_due();
        Ok(self.outbound.len())
    }

    fn read_available<'a>(&'a mut self, buf: &'a mut [u8]) -> LinkFuture<'a, usize> {
        self.emit_due();
        let n = buf.len().min(self.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        Box::pin(std::future::ready(Ok(n)))
    }
}

/// Wall clock as (DDMMYY, HHMMSSCC).
fn utc_date_time(now: DateTime<Utc>) -> (u32, u32) {
    let date = now.day() * 10_000 + now.month() * 100 + now.year().rem_euclid(100) as u32;
    // Leap seconds report nanos past 1e9; clamp to the last centisecond.
    let centis = (now.nanosecond() / 10_000_000).min(99);
    let time = now.hour() * 1_000_000 + now.minute() * 10_000 + now.second() * 100 + centis;
    (date, time)
}
