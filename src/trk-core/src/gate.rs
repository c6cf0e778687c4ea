// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Interval gate over a wrapping millisecond clock.

/// Opens at most once per `interval_ms` of elapsed time.
///
/// Elapsed time is `now - last` in wrapping `u32` arithmetic, so the gate
/// keeps working when the millisecond counter rolls over (about every
/// 49.7 days).
#[derive(Debug, Clone)]
pub struct RateGate {
    interval_ms: u32,
    last_open_ms: u32,
}

impl RateGate {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_open_ms: 0,
        }
    }

    /// Start the watermark at `now_ms` instead of zero.
    pub fn starting_at(interval_ms: u32, now_ms: u32) -> Self {
        Self {
            interval_ms,
            last_open_ms: now_ms,
        }
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn last_open_ms(&self) -> u32 {
        self.last_open_ms
    }

    /// Returns true and moves the watermark to `now_ms` when strictly more
    /// than the interval has elapsed since the previous opening.
    pub fn poll(&mut self, now_ms: u32) -> bool {
        if now_ms.wrapping_sub(self.last_open_ms) > self.interval_ms {
            self.last_open_ms = now_ms;
            true
        } else {
            false
        }
    }
}
