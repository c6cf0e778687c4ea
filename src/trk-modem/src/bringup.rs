// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! One-shot modem configuration at startup.

use tracing::{info, warn};

use trk_core::SerialLink;

use crate::transaction::{CommandSpec, TransactionEngine};

/// Commands issued at startup, in order.
pub const BRING_UP_SEQUENCE: [CommandSpec<'static>; 4] = [
    // Echo off, so replies carry only the answer.
    CommandSpec::unchecked("ATE0"),
    // Handshake.
    CommandSpec::expect("AT", "OK"),
    // Text-mode messaging.
    CommandSpec::expect("AT+CMGF=1", "OK"),
    // Push received messages straight to the serial line as +CMT.
    CommandSpec::expect("AT+CNMI=1,2,0,0,0", "OK"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Matched,
    Mismatched,
    LinkFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringUpReport {
    pub steps: Vec<(&'static str, StepOutcome)>,
}

impl BringUpReport {
    pub fn all_matched(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, outcome)| *outcome == StepOutcome::Matched)
    }
}

/// Run every step of [`BRING_UP_SEQUENCE`] once.
///
/// A failed step is logged and the next one runs anyway; there are no
/// retries and no abort.
pub async fn bring_up<L: SerialLink>(engine: &mut TransactionEngine<L>) -> BringUpReport {
    info!("Initializing modem...");
    let mut steps = Vec::with_capacity(BRING_UP_SEQUENCE.len());
    for spec in &BRING_UP_SEQUENCE {
        let outcome = match engine.execute(spec).await {
            Ok(result) if result.matched => StepOutcome::Matched,
            Ok(_) => StepOutcome::Mismatched,
            Err(e) => {
                warn!("Modem command {} failed: {}", spec.command, e);
                StepOutcome::LinkFailed
            }
        };
        steps.push((spec.command, outcome));
    }
    let report = BringUpReport { steps };
    if report.all_matched() {
        info!("Modem initialized");
    } else {
        warn!("Modem initialized with errors: {:?}", report.steps);
    }
    report
}
