// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod fix;
pub mod gate;
pub mod link;
pub mod nmea;
pub mod request;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use fix::{Fix, FixStore};
pub use gate::RateGate;
pub use link::{LinkError, LinkFuture, MemoryLink, SerialLink};
pub use nmea::NmeaDecoder;
pub use request::{PendingRequest, RequesterAddress};
