// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Location report sending, gated to once per interval.

use tracing::{debug, info};

use trk_core::{Fix, FixStore, LinkError, PendingRequest, RateGate, RequesterAddress, SerialLink};

use crate::transaction::{CommandSpec, TransactionEngine};

pub const DEFAULT_REPORT_INTERVAL_MS: u32 = 1000;
pub const DEFAULT_URL_PREFIX: &str = "http://www.google.com/maps/place/";
/// Ctrl-Z; ends message text and tells the modem to send.
pub const SEND_TERMINATOR: u8 = 0x1A;

/// Report behavior knobs.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub interval_ms: u32,
    /// Hold requests until a valid fix exists instead of sending an empty one.
    pub require_fix: bool,
    pub url_prefix: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_REPORT_INTERVAL_MS,
            require_fix: false,
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
        }
    }
}

/// What a dispatcher tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Interval not yet elapsed.
    Gated,
    /// Gate opened with no request waiting.
    Idle,
    /// A request is waiting but no valid fix exists yet.
    AwaitingFix,
    Sent(SentReport),
}

/// The lines handed to the modem for one report.
#[derive(Debug, Clone, PartialEq)]
pub struct SentReport {
    pub address: RequesterAddress,
    pub request_line: String,
    pub payload: String,
}

/// `AT+CMGS` line addressing `address` in international form.
pub fn request_line(address: &RequesterAddress) -> String {
    format!("AT+CMGS=\"+{}\"", address)
}

/// Map link for `fix`, coordinates with six decimals.
pub fn compose_payload(url_prefix: &str, fix: &Fix) -> String {
    format!("{}{:.6},{:.6}", url_prefix, fix.latitude, fix.longitude)
}

pub struct ReportDispatcher {
    gate: RateGate,
    require_fix: bool,
    url_prefix: String,
}

impl ReportDispatcher {
    pub fn new(settings: ReportSettings) -> Self {
        Self {
            gate: RateGate::new(settings.interval_ms),
            require_fix: settings.require_fix,
            url_prefix: settings.url_prefix,
        }
    }

    /// Run once per scheduler iteration.
    ///
    /// When the gate opens and a request is pending, the request is cleared
    /// before anything is written; a link failure part way through loses
    /// that request rather than repeating a half-sent message.
    pub async fn tick<L: SerialLink>(
        &mut self,
        now_ms: u32,
        pending: &mut PendingRequest,
        fixes: &FixStore,
        engine: &mut TransactionEngine<L>,
    ) -> Result<TickOutcome, LinkError> {
        if !self.gate.poll(now_ms) {
            return Ok(TickOutcome::Gated);
        }
        if self.require_fix && pending.is_pending() && !fixes.has_fix() {
            debug!("Location requested but no fix yet; holding request");
            return Ok(TickOutcome::AwaitingFix);
        }
        let Some(address) = pending.take() else {
            return Ok(TickOutcome::Idle);
        };
        let report = self.send(address, &fixes.snapshot(), engine).await?;
        Ok(TickOutcome::Sent(report))
    }

    async fn send<L: SerialLink>(
        &self,
        address: RequesterAddress,
        fix: &Fix,
        engine: &mut TransactionEngine<L>,
    ) -> Result<SentReport, LinkError> {
        let request_line = request_line(&address);
        let payload = compose_payload(&self.url_prefix, fix);

        // The modem answers with a "> " prompt; nothing to check.
        let prompt = engine
            .execute(&CommandSpec::unchecked(&request_line))
            .await?;
        debug!("Modem echo: {}", prompt.response_text());

        engine.write_raw(payload.as_bytes()).await?;
        let echo = engine.settle_and_drain().await?;
        debug!("Modem echo: {}", String::from_utf8_lossy(echo.as_bytes()));

        engine.write_raw(&[SEND_TERMINATOR]).await?;

        info!("{}", request_line);
        info!("{}", payload);
        Ok(SentReport {
            address,
            request_line,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trk_core::MemoryLink;

    fn warsaw() -> Fix {
        Fix {
            latitude: 52.2297,
            longitude: 21.0122,
            date: 160126,
            time: 12000000,
            valid: true,
        }
    }

    fn pending_from(number: &str) -> PendingRequest {
        let mut pending = PendingRequest::new();
        pending.set(RequesterAddress::from_bytes(number.as_bytes()));
        pending
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_wire_sequence() {
        let mut link = MemoryLink::new();
        link.queue_reply("\r\n> ");
        let mut engine = TransactionEngine::with_defaults(link);
        let mut fixes = FixStore::new();
        fixes.update(warsaw());
        let mut pending = pending_from("48123456789");
        let mut dispatcher = ReportDispatcher::new(ReportSettings::default());

        let outcome = dispatcher
            .tick(1001, &mut pending, &fixes, &mut engine)
            .await
            .unwrap();

        assert!(matches!(outcome, TickOutcome::Sent(_)));
        assert!(!pending.is_pending());
        assert_eq!(
            engine.link().writes(),
            &[
                b"AT+CMGS=\"+48123456789\"\r\n".to_vec(),
                b"http://www.google.com/maps/place/52.229700,21.012200".to_vec(),
                vec![0x1A],
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_closed_leaves_request() {
        let mut engine = TransactionEngine::with_defaults(MemoryLink::new());
        let fixes = FixStore::new();
        let mut pending = pending_from("48123456789");
        let mut dispatcher = ReportDispatcher::new(ReportSettings::default());

        let outcome = dispatcher
            .tick(1000, &mut pending, &fixes, &mut engine)
            .await
            .unwrap();
        assert_eq!(outcome, TickOutcome::Gated);
        assert!(pending.is_pending());
        assert!(engine.link().writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_empty_fix_by_default() {
        let mut engine = TransactionEngine::with_defaults(MemoryLink::new());
        let fixes = FixStore::new();
        let mut pending = pending_from("48123456789");
        let mut dispatcher = ReportDispatcher::new(ReportSettings::default());

        let outcome = dispatcher
            .tick(5000, &mut pending, &fixes, &mut engine)
            .await
            .unwrap();
        let TickOutcome::Sent(report) = outcome else {
            panic!("expected a report, got {:?}", outcome);
        };
        assert_eq!(
            report.payload,
            "http://www.google.com/maps/place/0.000000,0.000000"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_require_fix_holds_request() {
        let mut engine = TransactionEngine::with_defaults(MemoryLink::new());
        let mut fixes = FixStore::new();
        let mut pending = pending_from("48123456789");
        let mut dispatcher = ReportDispatcher::new(ReportSettings {
            require_fix: true,
            ..ReportSettings::default()
        });

        let outcome = dispatcher
            .tick(1001, &mut pending, &fixes, &mut engine)
            .await
            .unwrap();
        assert_eq!(outcome, TickOutcome::AwaitingFix);
        assert!(pending.is_pending());

        fixes.update(warsaw());
        let outcome = dispatcher
            .tick(2002, &mut pending, &fixes, &mut engine)
            .await
            .unwrap();
        assert!(matches!(outcome, TickOutcome::Sent(_)));
        assert!(!pending.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_most_once_per_interval() {
        let mut engine = TransactionEngine::with_defaults(MemoryLink::new());
        let fixes = FixStore::new();
        let mut pending = PendingRequest::new();
        let mut dispatcher = ReportDispatcher::new(ReportSettings::default());

        let mut sent_at = Vec::new();
        let start = u32::MAX - 3_000;
        for step in 0..2_000u32 {
            let now = start.wrapping_add(step * 5);
            // A fresh request every tick; only the gate limits sending.
            pending.set(RequesterAddress::from_bytes(b"48123456789"));
            let outcome = dispatcher
                .tick(now, &mut pending, &fixes, &mut engine)
                .await
                .unwrap();
            if matches!(outcome, TickOutcome::Sent(_)) {
                sent_at.push(now);
            }
        }
        assert!(sent_at.len() >= 9);
        for pair in sent_at.windows(2) {
            assert!(pair[1].wrapping_sub(pair[0]) > 1000);
        }
        assert_eq!(engine.link().writes().len(), sent_at.len() * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_failure_drops_request() {
        let mut link = MemoryLink::new();
        link.close();
        let mut engine = TransactionEngine::with_defaults(link);
        let fixes = FixStore::new();
        let mut pending = pending_from("48123456789");
        let mut dispatcher = ReportDispatcher::new(ReportSettings::default());

        assert!(dispatcher
            .tick(1001, &mut pending, &fixes, &mut engine)
            .await
            .is_err());
        assert!(!pending.is_pending());
    }

    #[test]
    fn test_compose_payload_negative_coordinates() {
        let fix = Fix {
            latitude: -33.8688,
            longitude: -70.625,
            ..Fix::default()
        };
        assert_eq!(
            compose_payload(DEFAULT_URL_PREFIX, &fix),
            "http://www.google.com/maps/place/-33.868800,-70.625000"
        );
    }
}
