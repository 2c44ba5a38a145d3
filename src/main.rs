/*
 * This file is part of Tempsense Exporter.
 *
 * Copyright (C) 2025 Tempsense Exporter contributors
 *
 * Tempsense Exporter is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tempsense Exporter is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tempsense Exporter. If not, see <https://www.gnu.org/licenses/>.
 */

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use tempsense_exporter::collector::Collector;
use tempsense_exporter::config;
use tempsense_exporter::exporter;
use tempsense_exporter::hid::HidTransport;
use tempsense_exporter::logger;
use tempsense_exporter::metadata::MetadataStore;

#[derive(Parser, Debug)]
#[command(name = "tempsense-exporter", version, about = "Prometheus exporter for DS18B20 probes behind a USB HID controller")]
struct Args {
    /// Listen address for the metrics endpoint (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Path to the sensors metadata CSV (overrides config).
    #[arg(long)]
    sensors_csv: Option<PathBuf>,

    /// USB vendor id of the probe controller, decimal or 0x-prefixed hex.
    #[arg(long, value_parser = parse_usb_id)]
    vendor_id: Option<u16>,

    /// USB product id of the probe controller, decimal or 0x-prefixed hex.
    #[arg(long, value_parser = parse_usb_id)]
    product_id: Option<u16>,

    /// Path to the JSON config file.
    #[arg(long, default_value_os_t = config::config_path())]
    config: PathBuf,

    /// Append JSON events to the log file.
    #[arg(long)]
    logging: bool,
}

fn parse_usb_id(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid usb id {:?}: {}", s, e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.logging {
        logger::init_logging();
        logger::log_event(
            "startup",
            serde_json::json!({ "config": args.config.display().to_string() }),
        );
    }

    // hidraw nodes are root-only on most distributions unless a udev rule
    // grants access, so be loud about it but keep going.
    if unsafe { libc::geteuid() } != 0 {
        eprintln!("tempsense: not running as root; /dev/hidraw* access may require a udev rule");
    }

    let mut cfg = config::load_config(&args.config).unwrap_or_default();
    if let Some(listen) = args.listen {
        cfg.listen = listen;
    }
    if let Some(path) = args.sensors_csv {
        cfg.sensors_csv = path;
    }
    if let Some(id) = args.vendor_id {
        cfg.vendor_id = id;
    }
    if let Some(id) = args.product_id {
        cfg.product_id = id;
    }
    config::validate_config(&cfg).map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    let addr: SocketAddr = cfg.listen.parse().context("parse listen address")?;
    let transport = HidTransport::new(cfg.vendor_id, cfg.product_id);
    let collector = Arc::new(Collector::new(
        MetadataStore::new(cfg.sensors_csv.clone()),
        Box::new(transport),
    ));
    let registry = exporter::build_registry(collector).context("register collector")?;

    exporter::serve(addr, registry).await
}
