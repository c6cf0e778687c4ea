// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Simulated SIM800-class modem for development without hardware.
//!
//! Answers the AT commands the tracker uses, collects composed messages
//! and can push location requests on a timer.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use trk_core::{LinkError, LinkFuture, SerialLink};

use crate::report::SEND_TERMINATOR;

/// A message the simulated modem "sent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedSms {
    pub to: String,
    pub text: String,
}

struct ScheduledRequest {
    from: String,
    body: String,
    every: Duration,
    next: Instant,
}

pub struct SimulatedModem {
    inbound: VecDeque<u8>,
    line: Vec<u8>,
    echo: bool,
    text_mode: bool,
    composing: Option<(String, Vec<u8>)>,
    sent: Vec<SimulatedSms>,
    message_ref: u32,
    scheduled: Option<ScheduledRequest>,
}

impl SimulatedModem {
    pub fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            line: Vec::new(),
            echo: true,
            text_mode: false,
            composing: None,
            sent: Vec::new(),
            message_ref: 0,
            scheduled: None,
        }
    }

    /// Push a request from `from` (digits, no `+`) every `every`, starting
    /// one period from now.
    pub fn with_periodic_request(mut self, from: &str, body: &str, every: Duration) -> Self {
        self.scheduled = Some(ScheduledRequest {
            from: from.to_string(),
            body: body.to_string(),
            every,
            next: Instant::now() + every,
        });
        self
    }

    /// Deliver a received message as an unsolicited `+CMT:` notification.
    pub fn inject_message(&mut self, from: &str, body: &str) {
        let notification = format!(
            "\r\n+CMT: \"+{}\",\"\",\"26/10/16,12:00:00+08\"\r\n{}\r\n",
            from, body
        );
        self.inbound.extend(notification.as_bytes());
    }

    pub fn sent(&self) -> &[SimulatedSms] {
        &self.sent
    }

    fn release_due(&mut self) {
        let now = Instant::now();
        let Some(scheduled) = self.scheduled.as_mut() else {
            return;
        };
        if now < scheduled.next {
            return;
        }
        scheduled.next = now + scheduled.every;
        let (from, body) = (scheduled.from.clone(), scheduled.body.clone());
        self.inject_message(&from, &body);
    }

    fn reply(&mut self, text: &str) {
        self.inbound.extend(text.as_bytes());
    }

    fn receive(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.composing.is_some() {
                self.compose_byte(byte);
                continue;
            }
            match byte {
                b'\r' => {
                    let line = std::mem::take(&mut self.line);
                    self.command(&String::from_utf8_lossy(&line));
                }
                b'\n' => {}
                _ => self.line.push(byte),
            }
        }
    }

    fn compose_byte(&mut self, byte: u8) {
        let Some((to, text)) = self.composing.as_mut() else {
            return;
        };
        if byte != SEND_TERMINATOR {
            text.push(byte);
            if self.echo {
                self.inbound.push_back(byte);
            }
            return;
        }
        let sms = SimulatedSms {
            to: to.clone(),
            text: String::from_utf8_lossy(text).into_owned(),
        };
        self.composing = None;
        self.message_ref = self.message_ref.wrapping_add(1);
        info!("Simulated modem sent SMS to {}: {}", sms.to, sms.text);
        self.sent.push(sms);
        let ack = format!("\r\n+CMGS: {}\r\n\r\nOK\r\n", self.message_ref);
        self.reply(&ack);
    }

    fn command(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if self.echo {
            self.reply(&format!("{}\r", line));
        }
        let upper = line.to_ascii_uppercase();
        match upper.as_str() {
            "AT" => self.reply("\r\nOK\r\n"),
            "ATE0" => {
                self.echo = false;
                self.reply("\r\nOK\r\n");
            }
            "ATE1" => {
                self.echo = true;
                self.reply("\r\nOK\r\n");
            }
            "AT+CMGF=1" => {
                self.text_mode = true;
                self.reply("\r\nOK\r\n");
            }
            "AT+CMGF=0" => {
                self.text_mode = false;
                self.reply("\r\nOK\r\n");
            }
            cmd if cmd.starts_with("AT+CNMI=") => self.reply("\r\nOK\r\n"),
            cmd if cmd.starts_with("AT+CMGS=") && self.text_mode => {
                let to = line["AT+CMGS=".len()..].trim_matches('"').to_string();
                self.composing = Some((to, Vec::new()));
                self.reply("\r\n> ");
            }
            _ => self.reply("\r\nERROR\r\n"),
        }
    }
}

impl Default for SimulatedModem {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialLink for SimulatedModem {
    fn write_all<'a>(&'a mut self, bytes: &'a [u8]) -> LinkFuture<'a, ()> {
        self.receive(bytes);
        Box::pin(std::future::ready(Ok(())))
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        self.release_due();
        Ok(self.inbound.len())
    }

    fn read_available<'a>(&'a mut self, buf: &'a mut [u8]) -> LinkFuture<'a, usize> {
        self.release_due();
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Box::pin(std::future::ready(Ok(n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bringup::bring_up;
    use crate::inbound::{InboundFraming, InboundParser};
    use crate::report::{ReportDispatcher, ReportSettings, TickOutcome};
    use crate::transaction::TransactionEngine;
    use trk_core::{Fix, FixStore, PendingRequest};

    #[tokio::test(start_paused = true)]
    async fn test_bring_up_against_simulator() {
        let mut engine = TransactionEngine::with_defaults(SimulatedModem::new());
        let report = bring_up(&mut engine).await;
        assert!(report.all_matched(), "{:?}", report.steps);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cmgs_before_text_mode_is_error() {
        let mut modem = SimulatedModem::new();
        modem.write_all(b"ATE0\r\n").await.unwrap();
        modem.write_all(b"AT+CMGS=\"+48123456789\"\r\n").await.unwrap();
        let mut buf = [0u8; 64];
        let n = modem.read_available(&mut buf).await.unwrap();
        // Echo is still on while ATE0 itself is processed.
        assert_eq!(&buf[..n], b"ATE0\r\r\nOK\r\n\r\nERROR\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_to_report_round_trip() {
        let mut engine = TransactionEngine::with_defaults(SimulatedModem::new());
        bring_up(&mut engine).await;
        engine.link_mut().inject_message("48123456789", "Start");

        let mut parser = InboundParser::new(InboundFraming::Blob, 512);
        let address = parser.poll(engine.link_mut()).await.unwrap().unwrap();
        let mut pending = PendingRequest::new();
        pending.set(address);

        let mut fixes = FixStore::new();
        fixes.update(Fix {
            latitude: 52.2297,
            longitude: 21.0122,
            date: 160126,
            time: 12000000,
            valid: true,
        });
        let mut dispatcher = ReportDispatcher::new(ReportSettings::default());
        let outcome = dispatcher
            .tick(1001, &mut pending, &fixes, &mut engine)
            .await
            .unwrap();
        assert!(matches!(outcome, TickOutcome::Sent(_)));
        assert_eq!(
            engine.link().sent(),
            &[SimulatedSms {
                to: "+48123456789".to_string(),
                text: "http://www.google.com/maps/place/52.229700,21.012200".to_string(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_request() {
        let mut modem = SimulatedModem::new().with_periodic_request(
            "48123456789",
            "Start",
            Duration::from_secs(5),
        );
        assert_eq!(modem.bytes_available().unwrap(), 0);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(modem.bytes_available().unwrap() > 0);
    }
}
