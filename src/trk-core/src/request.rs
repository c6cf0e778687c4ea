// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

/// Reply-to number of a location request, without the leading `+`.
///
/// Holds at most `MAX_LEN` bytes and stops at the first NUL. The content is
/// not validated as a phone number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequesterAddress(String);

impl RequesterAddress {
    pub const MAX_LEN: usize = 11;

    /// Build an address from raw bytes, cutting at `MAX_LEN` or at a NUL.
    pub fn from_bytes(raw: &[u8]) -> Self {
        let window = &raw[..raw.len().min(Self::MAX_LEN)];
        let end = window.iter().position(|b| *b == 0).unwrap_or(window.len());
        Self(String::from_utf8_lossy(&window[..end]).into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RequesterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// At most one outstanding location request.
///
/// A new request replaces the address of one that has not been served yet;
/// nothing is queued.
#[derive(Debug, Default)]
pub struct PendingRequest {
    address: Option<RequesterAddress>,
}

impl PendingRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, address: RequesterAddress) {
        self.address = Some(address);
    }

    pub fn is_pending(&self) -> bool {
        self.address.is_some()
    }

    pub fn address(&self) -> Option<&RequesterAddress> {
        self.address.as_ref()
    }

    /// Clear the flag and hand back the address.
    pub fn take(&mut self) -> Option<RequesterAddress> {
        self.address.take()
    }
}
