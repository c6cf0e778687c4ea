// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Cellular modem protocol engine: AT command transactions, inbound
//! request detection and location report sending.

pub mod bringup;
pub mod inbound;
pub mod report;
pub mod serial;
pub mod sim;
pub mod transaction;

pub use bringup::{bring_up, BringUpReport, StepOutcome, BRING_UP_SEQUENCE};
pub use inbound::{detect_request, InboundFraming, InboundParser};
pub use report::{ReportDispatcher, ReportSettings, SentReport, TickOutcome};
pub use serial::SerialPortLink;
pub use sim::{SimulatedModem, SimulatedSms};
pub use transaction::{
    CommandSpec, ResponseBuffer, TransactionEngine, TransactionResult, DEFAULT_RX_CAPACITY,
    DEFAULT_SETTLE,
};
