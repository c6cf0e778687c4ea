// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod gps;
mod tracker;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use trk_app::{init_logging, ConfigFile};
use trk_core::{DynResult, SerialLink};
use trk_modem::{SerialPortLink, SimulatedModem};

use config::{GpsAccess, ModemAccess, ServerConfig};
use gps::SimulatedGps;
use tracker::{Tracker, TrackerConfig};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - SMS location tracker daemon");
const SIMULATED_REQUEST_BODY: &str = "Start";
const SHUTDOWN_GRACE: Duration = Duration::from_millis(400);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Modem serial port (overrides [modem].port)
    #[arg(short = 'm', long = "modem", value_name = "PATH")]
    modem: Option<String>,
    /// GPS receiver serial port (overrides [gps].port)
    #[arg(short = 'g', long = "gps", value_name = "PATH")]
    gps: Option<String>,
    /// Run against a simulated modem and receiver
    #[arg(long = "simulate")]
    simulate: bool,
}

fn apply_cli_overrides(cli: &Cli, cfg: &mut ServerConfig) {
    if let Some(ref port) = cli.modem {
        cfg.modem.access = ModemAccess::Serial;
        cfg.modem.port = Some(port.clone());
    }
    if let Some(ref port) = cli.gps {
        cfg.gps.access = GpsAccess::Serial;
        cfg.gps.port = Some(port.clone());
    }
    if cli.simulate {
        cfg.modem.access = ModemAccess::Simulated;
        cfg.gps.access = GpsAccess::Simulated;
    }
}

fn open_modem(cfg: &ServerConfig) -> DynResult<Box<dyn SerialLink>> {
    match cfg.modem.access {
        ModemAccess::Serial => {
            let path = cfg
                .modem
                .port
                .as_deref()
                .ok_or("Serial modem access requires [modem].port")?;
            let link = SerialPortLink::open(path, cfg.modem.baud)
                .map_err(|e| format!("Failed to open modem port {}: {}", path, e))?;
            info!("Modem on {} at {} baud", path, cfg.modem.baud);
            Ok(Box::new(link))
        }
        ModemAccess::Simulated => {
            let mut modem = SimulatedModem::new();
            if let Some(ref from) = cfg.modem.simulated_requester {
                let every = Duration::from_millis(cfg.modem.simulated_request_interval_ms);
                modem = modem.with_periodic_request(from, SIMULATED_REQUEST_BODY, every);
                info!("Simulated modem; {} requests a report every {:?}", from, every);
            } else {
                info!("Simulated modem");
            }
            Ok(Box::new(modem))
        }
    }
}

fn open_gps(cfg: &ServerConfig) -> DynResult<Option<Box<dyn SerialLink>>> {
    match cfg.gps.access {
        GpsAccess::Serial => {
            let path = cfg
                .gps
                .port
                .as_deref()
                .ok_or("Serial GPS access requires [gps].port")?;
            let link = SerialPortLink::open(path, cfg.gps.baud)
                .map_err(|e| format!("Failed to open GPS port {}: {}", path, e))?;
            info!("GPS receiver on {} at {} baud", path, cfg.gps.baud);
            Ok(Some(Box::new(link)))
        }
        GpsAccess::Simulated => {
            info!(
                "Simulated GPS receiver at ({:.6}, {:.6})",
                cfg.gps.latitude, cfg.gps.longitude
            );
            Ok(Some(Box::new(SimulatedGps::new(
                cfg.gps.latitude,
                cfg.gps.longitude,
                Duration::from_millis(cfg.gps.interval_ms),
            ))))
        }
        GpsAccess::Disabled => {
            info!("GPS receiver disabled; reports carry an empty fix");
            Ok(None)
        }
    }
}

fn build_tracker_config(cfg: &ServerConfig) -> TrackerConfig {
    TrackerConfig {
        settle: cfg.modem.settle(),
        rx_capacity: cfg.modem.rx_capacity,
        report: cfg.report_settings(),
        framing: cfg.inbound.framing,
        reassembly_capacity: cfg.inbound.reassembly_capacity,
        tick: Duration::from_millis(cfg.scheduler.tick_ms),
    }
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    apply_cli_overrides(&cli, &mut cfg);
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let modem = open_modem(&cfg)?;
    let gps = open_gps(&cfg)?;
    let tracker = Tracker::new(build_tracker_config(&cfg), modem, gps);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(tracker.run(shutdown_rx));

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    if !handle.is_finished() {
        handle.abort();
    }
    if let Err(e) = handle.await {
        if !e.is_cancelled() {
            error!("Tracker task failed: {:?}", e);
        }
    }
    Ok(())
}
