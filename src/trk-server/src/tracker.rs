// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The tracker's cooperative main loop.
//!
//! Each iteration reads the millisecond clock, gives the report dispatcher a
//! chance to send, then polls the GPS receiver and the modem for new input.
//! Dispatch happens before polling, so a request read in one iteration is
//! sent no earlier than the next one.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

use trk_core::{FixStore, PendingRequest, SerialLink};
use trk_modem::{
    bring_up, InboundFraming, InboundParser, ReportDispatcher, ReportSettings, TickOutcome,
    TransactionEngine,
};

use crate::gps::GpsPoller;

/// Configuration for the tracker task.
pub struct TrackerConfig {
    pub settle: Duration,
    pub rx_capacity: usize,
    pub report: ReportSettings,
    pub framing: InboundFraming,
    pub reassembly_capacity: usize,
    pub tick: Duration,
}

/// State shared between the loop's components.
///
/// The GPS poller is the only writer of `fixes` and the dispatcher its only
/// reader; the inbound parser sets `pending` and the dispatcher clears it.
#[derive(Debug, Default)]
pub struct TrackerContext {
    pub fixes: FixStore,
    pub pending: PendingRequest,
}

/// Milliseconds since start, wrapping at `u32::MAX`.
struct MillisClock {
    origin: Instant,
}

impl MillisClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    fn now_ms(&self) -> u32 {
        // Truncation is the wrap.
        self.origin.elapsed().as_millis() as u32
    }
}

pub struct Tracker<M, G> {
    engine: TransactionEngine<M>,
    gps: Option<GpsPoller<G>>,
    parser: InboundParser,
    dispatcher: ReportDispatcher,
    ctx: TrackerContext,
    tick: Duration,
}

impl<M: SerialLink, G: SerialLink> Tracker<M, G> {
    pub fn new(config: TrackerConfig, modem: M, gps: Option<G>) -> Self {
        Self {
            engine: TransactionEngine::new(modem, config.settle, config.rx_capacity),
            gps: gps.map(GpsPoller::new),
            parser: InboundParser::new(config.framing, config.reassembly_capacity),
            dispatcher: ReportDispatcher::new(config.report),
            ctx: TrackerContext::default(),
            tick: config.tick,
        }
    }

    /// One loop iteration at time `now_ms`. Link failures are logged and the
    /// iteration carries on with the next step.
    pub async fn step(&mut self, now_ms: u32) -> Option<TickOutcome> {
        let outcome = match self
            .dispatcher
            .tick(
                now_ms,
                &mut self.ctx.pending,
                &self.ctx.fixes,
                &mut self.engine,
            )
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("Sending location report failed: {}", e);
                None
            }
        };

        if let Some(gps) = self.gps.as_mut() {
            if let Err(e) = gps.poll(&mut self.ctx.fixes).await {
                warn!("GPS read failed: {}", e);
            }
        }

        match self.parser.poll(self.engine.link_mut()).await {
            Ok(Some(address)) => self.ctx.pending.set(address),
            Ok(None) => {}
            Err(e) => warn!("Modem read failed: {}", e),
        }

        outcome
    }

    /// Bring the modem up, then loop until shutdown is signalled.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        bring_up(&mut self.engine).await;
        info!("Started");

        let clock = MillisClock::new();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            self.step(clock.now_ms()).await;
            tokio::select! {
                _ = time::sleep(self.tick) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Tracker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trk_core::MemoryLink;

    const REQUEST: &str = "\r\n+CMT: \"+48123456789\",\"\",\"26/10/16,12:00:00+08\"\r\nStart\r\n";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n";

    fn config() -> TrackerConfig {
        TrackerConfig {
            settle: Duration::from_millis(50),
            rx_capacity: 128,
            report: ReportSettings::default(),
            framing: InboundFraming::Blob,
            reassembly_capacity: 512,
            tick: Duration::from_millis(10),
        }
    }

    fn tracker() -> Tracker<MemoryLink, MemoryLink> {
        Tracker::new(config(), MemoryLink::new(), Some(MemoryLink::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_is_sent_on_a_later_tick() {
        let mut tracker = tracker();
        tracker.engine.link_mut().push_inbound(REQUEST);

        // Gate opens first, finds nothing, then the request is read.
        assert_eq!(tracker.step(2000).await, Some(TickOutcome::Idle));
        assert!(tracker.ctx.pending.is_pending());
        assert!(tracker.engine.link().writes().is_empty());

        assert_eq!(tracker.step(2500).await, Some(TickOutcome::Gated));
        assert!(tracker.ctx.pending.is_pending());

        let outcome = tracker.step(3001).await;
        assert!(matches!(outcome, Some(TickOutcome::Sent(_))));
        assert!(!tracker.ctx.pending.is_pending());
        assert_eq!(tracker.engine.link().writes().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fix_reaches_report() {
        let mut tracker = tracker();
        tracker.gps.as_mut().unwrap().link_mut().push_inbound(RMC);
        tracker.engine.link_mut().push_inbound(REQUEST);

        tracker.step(0).await;
        assert!(tracker.ctx.fixes.has_fix());

        let Some(TickOutcome::Sent(report)) = tracker.step(1001).await else {
            panic!("expected a report");
        };
        assert_eq!(report.address.as_str(), "48123456789");
        assert_eq!(
            report.payload,
            "http://www.google.com/maps/place/48.117300,11.516667"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_runs_while_gate_closed() {
        let mut tracker = tracker();
        tracker.step(0).await;
        tracker.gps.as_mut().unwrap().link_mut().push_inbound(RMC);
        tracker.engine.link_mut().push_inbound("\r\nRING\r\n");

        assert_eq!(tracker.step(10).await, Some(TickOutcome::Gated));
        assert!(tracker.ctx.fixes.has_fix());
        assert_eq!(tracker.engine.link_mut().bytes_available().unwrap(), 0);
        assert!(!tracker.ctx.pending.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_errors_do_not_stop_loop() {
        let mut modem = MemoryLink::new();
        modem.close();
        let mut gps = MemoryLink::new();
        gps.close();
        let mut tracker = Tracker::new(config(), modem, Some(gps));
        tracker
            .ctx
            .pending
            .set(trk_core::RequesterAddress::from_bytes(b"48123456789"));

        assert_eq!(tracker.step(1001).await, None);
        assert_eq!(tracker.step(2002).await, Some(TickOutcome::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_brings_up_and_stops_on_shutdown() {
        let mut modem = MemoryLink::new();
        for _ in 0..4 {
            modem.queue_reply("\r\nOK\r\n");
        }
        let tracker: Tracker<MemoryLink, MemoryLink> = Tracker::new(config(), modem, None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(tracker.run(shutdown_rx));

        time::sleep(Duration::from_secs(2)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
