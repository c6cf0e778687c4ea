// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for trk-server.
//!
//! Config is loaded from the `[trk-server]` section of `trk-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./trk-rs.toml`
//! 3. `~/.config/trk-rs/trk-rs.toml`
//! 4. `/etc/trk-rs/trk-rs.toml`

use std::time::Duration;

use serde::{Deserialize, Serialize};
use trk_app::{parse_level, ConfigFile};
use trk_modem::inbound::DEFAULT_REASSEMBLY_CAPACITY;
use trk_modem::report::{DEFAULT_REPORT_INTERVAL_MS, DEFAULT_URL_PREFIX};
use trk_modem::{InboundFraming, ReportSettings, DEFAULT_RX_CAPACITY};

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    /// Cellular modem link
    pub modem: ModemConfig,
    /// Satellite receiver link
    pub gps: GpsConfig,
    /// Location report behavior
    pub report: ReportConfig,
    /// Inbound message framing
    pub inbound: InboundConfig,
    /// Main loop pacing
    pub scheduler: SchedulerConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModemAccess {
    #[default]
    Serial,
    Simulated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpsAccess {
    #[default]
    Serial,
    Simulated,
    #[serde(rename = "none")]
    Disabled,
}

/// Modem link configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    pub access: ModemAccess,
    /// Serial port path (for serial access)
    pub port: Option<String>,
    pub baud: u32,
    /// Wait between sending a command and reading its reply
    pub settle_ms: u64,
    /// Receive buffer size for command replies
    pub rx_capacity: usize,
    /// Simulated access: number (no `+`) that periodically asks for a report
    pub simulated_requester: Option<String>,
    pub simulated_request_interval_ms: u64,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            access: ModemAccess::Serial,
            port: None,
            baud: 9600,
            settle_ms: 50,
            rx_capacity: DEFAULT_RX_CAPACITY,
            simulated_requester: None,
            simulated_request_interval_ms: 30_000,
        }
    }
}

impl ModemConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// GPS receiver link configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    pub access: GpsAccess,
    /// Serial port path (for serial access)
    pub port: Option<String>,
    pub baud: u32,
    /// Simulated access: reported position (decimal degrees, WGS84)
    pub latitude: f64,
    pub longitude: f64,
    /// Simulated access: sentence period
    pub interval_ms: u64,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            access: GpsAccess::Serial,
            port: None,
            baud: 9600,
            latitude: 52.2297,
            longitude: 21.0122,
            interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Minimum spacing between reports
    pub interval_ms: u32,
    /// Hold requests until the receiver has produced a valid fix
    pub require_fix: bool,
    /// Text placed before "<lat>,<lon>" in the report
    pub url_prefix: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_REPORT_INTERVAL_MS,
            require_fix: false,
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundConfig {
    pub framing: InboundFraming,
    pub reassembly_capacity: usize,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            framing: InboundFraming::Blob,
            reassembly_capacity: DEFAULT_REASSEMBLY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause between loop iterations
    pub tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_ms: 10 }
    }
}

impl ServerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if self.modem.access == ModemAccess::Serial {
            validate_port("[modem]", self.modem.port.as_deref(), self.modem.baud)?;
        }
        if self.modem.settle_ms == 0 {
            return Err("[modem].settle_ms must be > 0".to_string());
        }
        if self.modem.rx_capacity < 4 {
            return Err("[modem].rx_capacity must be >= 4".to_string());
        }
        if self.modem.access == ModemAccess::Simulated
            && self.modem.simulated_requester.is_some()
            && self.modem.simulated_request_interval_ms == 0
        {
            return Err("[modem].simulated_request_interval_ms must be > 0".to_string());
        }

        match self.gps.access {
            GpsAccess::Serial => {
                validate_port("[gps]", self.gps.port.as_deref(), self.gps.baud)?;
            }
            GpsAccess::Simulated => {
                validate_coordinates(self.gps.latitude, self.gps.longitude)?;
                if self.gps.interval_ms == 0 {
                    return Err("[gps].interval_ms must be > 0".to_string());
                }
            }
            GpsAccess::Disabled => {}
        }

        if self.report.interval_ms == 0 {
            return Err("[report].interval_ms must be > 0".to_string());
        }
        if self.inbound.reassembly_capacity == 0 {
            return Err("[inbound].reassembly_capacity must be > 0".to_string());
        }
        if self.scheduler.tick_ms == 0 {
            return Err("[scheduler].tick_ms must be > 0".to_string());
        }
        Ok(())
    }

    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            interval_ms: self.report.interval_ms,
            require_fix: self.report.require_fix,
            url_prefix: self.report.url_prefix.clone(),
        }
    }

    /// Example configuration printed by `--print-config`.
    pub fn example_toml() -> &'static str {
        r#"[trk-server.general]
log_level = "info"

[trk-server.modem]
access = "serial"        # or "simulated"
port = "/dev/ttyS3"
baud = 9600
settle_ms = 50
rx_capacity = 128

[trk-server.gps]
access = "serial"        # or "simulated", "none"
port = "/dev/ttyS1"
baud = 9600

[trk-server.report]
interval_ms = 1000
require_fix = false
url_prefix = "http://www.google.com/maps/place/"

[trk-server.inbound]
framing = "blob"         # or "reassemble"
reassembly_capacity = 512

[trk-server.scheduler]
tick_ms = 10
"#
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    match level {
        Some(name) if parse_level(name).is_none() => Err(format!(
            "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
            name
        )),
        _ => Ok(()),
    }
}

fn validate_port(section: &str, port: Option<&str>, baud: u32) -> Result<(), String> {
    match port {
        Some(p) if !p.trim().is_empty() => {}
        _ => return Err(format!("{}.port is required for serial access", section)),
    }
    if baud == 0 {
        return Err(format!("{}.baud must be > 0", section));
    }
    Ok(())
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), String> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err("[gps].latitude must be in range -90..=90".to_string());
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err("[gps].longitude must be in range -180..=180".to_string());
    }
    Ok(())
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "trk-server"
    }
}
