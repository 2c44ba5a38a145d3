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

//! Collection orchestration: discovery, bounded per-device enumeration,
//! address normalization, metadata enrichment, best-effort emission.
//!
//! One call to [`Collector::collect`] is one collection pass. Every error is
//! contained at the smallest possible scope: a bad address skips one reading,
//! a read error stops one device, a discovery error empties one pass. A pass
//! as a whole never fails.

use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Mutex, MutexGuard};

use serde_json::json;

use crate::address;
use crate::logger;
use crate::metadata::MetadataStore;
use crate::probe::{DeviceDiscovery, RawReading, ReadOutcome, SensorReader};

pub const METRIC_NAME: &str = "temperature_sensor_celsius";
pub const METRIC_HELP: &str = "Current temperature in Celsius as reported by a DS18B20 probe";
pub const METRIC_LABELS: [&str; 4] = ["display_name", "id", "sensor_nr", "sensor_type"];

/// Hard per-device iteration bound, independent of whatever sensor count the
/// device claims. Guarantees termination under a device that keeps producing
/// readings without ever signalling end of stream.
pub const MAX_SENSORS_PER_DEVICE: usize = 32;

const FALLBACK_NAME: &str = "Unknown";
const FALLBACK_NR: &str = "0";
const FALLBACK_TYPE: &str = "unknown";

/// Descriptor of the single exposed metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: [&'static str; 4],
}

/// One fully labeled gauge observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub display_name: String,
    pub id: String,
    pub sensor_nr: String,
    pub sensor_type: String,
    pub temperature_c: f64,
}

/// Receiving end of a collection pass. `offer` must not block: it returns
/// false when the sample cannot be accepted right now, and the collector
/// drops (and logs) the sample instead of stalling.
pub trait SampleSink {
    fn offer(&mut self, sample: Sample) -> bool;
}

impl<F: FnMut(Sample) -> bool> SampleSink for F {
    fn offer(&mut self, sample: Sample) -> bool {
        self(sample)
    }
}

/// Non-blocking sink over a bounded channel. Refused sends are counted so
/// backpressure stays observable.
pub struct ChannelSink {
    tx: SyncSender<Sample>,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(tx: SyncSender<Sample>) -> Self {
        ChannelSink { tx, dropped: 0 }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SampleSink for ChannelSink {
    fn offer(&mut self, sample: Sample) -> bool {
        match self.tx.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                false
            }
        }
    }
}

/// Per-device enumeration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumState {
    Enumerating,
    Done,
    Failed,
}

/// Owns the metadata store and the discovery handle; constructed once at
/// startup and shared with the export trigger.
pub struct Collector {
    desc: MetricDesc,
    discovery: Box<dyn DeviceDiscovery + Send + Sync>,
    store: Mutex<MetadataStore>,
}

impl Collector {
    pub fn new(store: MetadataStore, discovery: Box<dyn DeviceDiscovery + Send + Sync>) -> Self {
        Collector {
            desc: MetricDesc {
                name: METRIC_NAME,
                help: METRIC_HELP,
                labels: METRIC_LABELS,
            },
            discovery,
            store: Mutex::new(store),
        }
    }

    pub fn describe(&self) -> &MetricDesc {
        &self.desc
    }

    /// Run one collection pass, writing zero or more samples into `sink`.
    /// A discovery error is logged and treated as zero devices found.
    pub fn collect(&self, sink: &mut dyn SampleSink) {
        let devices = match self.discovery.discover() {
            Ok(devices) => devices,
            Err(e) => {
                eprintln!("tempsense: discovery failed: {}", e);
                logger::log_event("discovery_failed", json!({ "error": e.to_string() }));
                return;
            }
        };

        for mut device in devices {
            let (state, emitted) = self.enumerate_device(device.as_mut(), sink);
            logger::log_event(
                "device_pass",
                json!({
                    "device": device.ordinal(),
                    "emitted": emitted,
                    "failed": state == EnumState::Failed,
                }),
            );
        }
    }

    /// Enumerate one device until its reported sensor count is satisfied or
    /// a terminal condition is hit. Returns the final state and how many
    /// readings were successfully obtained.
    fn enumerate_device(
        &self,
        device: &mut dyn SensorReader,
        sink: &mut dyn SampleSink,
    ) -> (EnumState, usize) {
        // Once per device-pass, not once per reading, to bound file I/O.
        {
            let mut store = lock_store(&self.store);
            if let Err(e) = store.refresh_if_stale() {
                eprintln!("tempsense: metadata reload failed, serving stale data: {}", e);
                logger::log_event("metadata_reload_failed", json!({ "error": e.to_string() }));
            }
        }

        let mut state = EnumState::Enumerating;
        let mut successes: usize = 0;

        while state == EnumState::Enumerating {
            if successes >= MAX_SENSORS_PER_DEVICE {
                logger::log_event(
                    "enumeration_bound_hit",
                    json!({ "device": device.ordinal(), "bound": MAX_SENSORS_PER_DEVICE }),
                );
                state = EnumState::Done;
                break;
            }
            match device.read_next_sensor() {
                ReadOutcome::Reading(reading) => {
                    successes += 1;
                    self.emit(&reading, sink);
                    // The count is authoritative only once a successful read
                    // reported it; a downward misreport just truncates.
                    if successes >= reading.sensor_count as usize {
                        state = EnumState::Done;
                    }
                }
                ReadOutcome::EndOfStream => state = EnumState::Done,
                ReadOutcome::Failed(e) => {
                    eprintln!(
                        "tempsense: error reading device {}: {}",
                        device.ordinal(),
                        e
                    );
                    logger::log_event(
                        "device_read_failed",
                        json!({ "device": device.ordinal(), "error": e.to_string() }),
                    );
                    state = EnumState::Failed;
                }
            }
        }

        (state, successes)
    }

    /// Normalize, enrich, and offer a single reading. A malformed address
    /// skips only this reading.
    fn emit(&self, reading: &RawReading, sink: &mut dyn SampleSink) {
        let id = match address::normalize(&reading.raw_address_hex) {
            Ok(id) => id,
            Err(e) => {
                eprintln!(
                    "tempsense: skipping unparseable address on device {}: {}",
                    reading.device_ordinal, e
                );
                logger::log_event(
                    "bad_address",
                    json!({
                        "device": reading.device_ordinal,
                        "raw": reading.raw_address_hex,
                        "error": e.to_string(),
                    }),
                );
                return;
            }
        };

        let sample = {
            let store = lock_store(&self.store);
            match store.lookup(&id) {
                Some(meta) => Sample {
                    display_name: meta.display_name.clone(),
                    id: id.clone(),
                    sensor_nr: meta.ordinal.clone(),
                    sensor_type: meta.sensor_type.clone(),
                    temperature_c: reading.temperature_c,
                },
                None => Sample {
                    display_name: FALLBACK_NAME.to_string(),
                    id: id.clone(),
                    sensor_nr: FALLBACK_NR.to_string(),
                    sensor_type: FALLBACK_TYPE.to_string(),
                    temperature_c: reading.temperature_c,
                },
            }
        };

        if !sink.offer(sample) {
            eprintln!("tempsense: export sink refused sample for {}", id);
            logger::log_event("sample_dropped", json!({ "id": id }));
        }
    }
}

fn lock_store(store: &Mutex<MetadataStore>) -> MutexGuard<'_, MetadataStore> {
    match store.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
