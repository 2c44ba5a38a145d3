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

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::hid::{DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};

fn default_listen() -> String {
    "0.0.0.0:9184".to_string()
}

fn default_sensors_csv() -> PathBuf {
    PathBuf::from("/etc/tempsense/sensors.csv")
}

fn default_vendor_id() -> u16 {
    DEFAULT_VENDOR_ID
}

fn default_product_id() -> u16 {
    DEFAULT_PRODUCT_ID
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    /// Listen address for the metrics endpoint.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Path to the operator metadata CSV.
    #[serde(default = "default_sensors_csv")]
    pub sensors_csv: PathBuf,
    /// USB IDs of the probe controller.
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    #[serde(default = "default_product_id")]
    pub product_id: u16,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        ExporterConfig {
            listen: default_listen(),
            sensors_csv: default_sensors_csv(),
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
        }
    }
}

pub fn config_path() -> PathBuf {
    PathBuf::from("/etc/tempsense/config.json")
}

/// Load the JSON config file, returning None when absent or unparseable;
/// the caller falls back to defaults plus CLI flags.
pub fn load_config(path: &Path) -> Option<ExporterConfig> {
    let data = fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

pub fn validate_config(cfg: &ExporterConfig) -> Result<(), String> {
    if cfg.listen.parse::<SocketAddr>().is_err() {
        return Err(format!("listen address {:?} is not host:port", cfg.listen));
    }
    if cfg.sensors_csv.as_os_str().is_empty() {
        return Err("sensors_csv path is empty".to_string());
    }
    Ok(())
}
