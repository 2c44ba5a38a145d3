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

//! Contract between the collector and a physical probe controller.
//!
//! The collector only depends on these traits; the hidraw transport in
//! [`crate::hid`] is one implementation, test fakes are another.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("short report: expected {expected} bytes, got {got}")]
    ShortReport { expected: usize, got: usize },
    #[error("unexpected frame marker 0x{0:02x}")]
    BadFrame(u8),
    #[error("discovery failed: {0}")]
    Discovery(String),
}

/// One successful sensor read. Produced per physical read, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    /// ROM code exactly as the controller reported it, hex encoded.
    pub raw_address_hex: String,
    pub temperature_c: f64,
    /// Total number of sensors the device claims to carry. Only trusted
    /// once observed from a successful read on that device.
    pub sensor_count: u8,
    pub device_ordinal: u32,
}

/// Outcome of a single `read_next_sensor` call.
#[derive(Debug)]
pub enum ReadOutcome {
    Reading(RawReading),
    EndOfStream,
    Failed(ProbeError),
}

/// One attached device, yielding a bounded sequence of per-sensor readings.
#[cfg_attr(test, mockall::automock)]
pub trait SensorReader: Send {
    /// Yield the next sensor's current temperature, or a terminal signal.
    fn read_next_sensor(&mut self) -> ReadOutcome;

    /// Numeric device ordinal, for diagnostics only.
    fn ordinal(&self) -> u32;
}

/// Discovery of the currently attached devices. An empty set is a valid
/// result, not an error.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceDiscovery {
    fn discover(&self) -> Result<Vec<Box<dyn SensorReader>>, ProbeError>;
}
