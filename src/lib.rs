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

//! Tempsense Exporter - Prometheus exporter for DS18B20 1-Wire probes
//! behind a USB HID controller.
//!
//! Each scrape runs one collection pass: discover attached controllers,
//! enumerate their sensors, canonicalize the reported ROM codes, enrich them
//! with operator metadata from a hot-reloaded CSV, and emit one
//! `temperature_sensor_celsius` gauge sample per sensor.

pub mod address;
pub mod collector;
pub mod config;
pub mod exporter;
pub mod hid;
pub mod logger;
pub mod metadata;
pub mod probe;
