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

//! hidraw transport for the USB multi-sensor controller.
//!
//! Devices are discovered by scanning `/sys/class/hidraw` and matching the
//! `HID_ID` line of each node's uevent against the configured vendor and
//! product IDs, then opening the corresponding `/dev/hidrawN`.
//!
//! Per read, the controller is sent a one-byte poll command and answers with
//! a 64-byte report:
//!
//! ```text
//! byte 0      frame marker, 0x54
//! byte 1      advertised sensor count for this device
//! bytes 2..10 8-byte 1-Wire ROM code (family, serial LSB-first, terminator)
//! bytes 10..12 big-endian i16, temperature in 1/16 degree Celsius
//! ```
//!
//! An all-zero report or a zero-length read means the device has no further
//! sensors to offer in this cycle.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use serde_json::json;

use crate::logger;
use crate::probe::{DeviceDiscovery, ProbeError, RawReading, ReadOutcome, SensorReader};

/// Default USB IDs of the supported controller; overridable via config.
pub const DEFAULT_VENDOR_ID: u16 = 0x16c0;
pub const DEFAULT_PRODUCT_ID: u16 = 0x05dc;

const REPORT_LEN: usize = 64;
const MIN_REPORT_LEN: usize = 12;
const FRAME_MARKER: u8 = 0x54;

/// Poll command; the leading zero is the hidraw report number.
const POLL_COMMAND: [u8; 2] = [0x00, 0x52];

/// hidraw-backed device discovery.
#[derive(Debug, Clone)]
pub struct HidTransport {
    vendor_id: u16,
    product_id: u16,
    sysfs_root: PathBuf,
    dev_root: PathBuf,
}

impl HidTransport {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        HidTransport {
            vendor_id,
            product_id,
            sysfs_root: PathBuf::from("/sys/class/hidraw"),
            dev_root: PathBuf::from("/dev"),
        }
    }

    /// Same transport with both filesystem roots redirected; lets tests run
    /// against a synthetic tree instead of real hardware.
    pub fn with_roots<P: Into<PathBuf>, Q: Into<PathBuf>>(
        vendor_id: u16,
        product_id: u16,
        sysfs_root: P,
        dev_root: Q,
    ) -> Self {
        HidTransport {
            vendor_id,
            product_id,
            sysfs_root: sysfs_root.into(),
            dev_root: dev_root.into(),
        }
    }
}

impl DeviceDiscovery for HidTransport {
    fn discover(&self) -> Result<Vec<Box<dyn SensorReader>>, ProbeError> {
        let mut nodes: Vec<String> = Vec::new();
        let entries = match fs::read_dir(&self.sysfs_root) {
            Ok(it) => it,
            // No hidraw class at all is "no devices", not a failure.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProbeError::Io(e)),
        };
        for ent in entries.flatten() {
            let name = ent.file_name().to_string_lossy().to_string();
            if !name.starts_with("hidraw") {
                continue;
            }
            let uevent = ent.path().join("device").join("uevent");
            match fs::read_to_string(&uevent) {
                Ok(contents) => {
                    if uevent_matches(&contents, self.vendor_id, self.product_id) {
                        nodes.push(name);
                    }
                }
                Err(_) => continue,
            }
        }
        // Stable device order across passes.
        nodes.sort();

        let mut devices: Vec<Box<dyn SensorReader>> = Vec::new();
        for (ordinal, name) in nodes.iter().enumerate() {
            let dev_path = self.dev_root.join(name);
            match OpenOptions::new().read(true).write(true).open(&dev_path) {
                Ok(file) => {
                    devices.push(Box::new(HidDevice { file, ordinal: ordinal as u32 }));
                }
                Err(e) => {
                    // One unopenable node must not sink the whole pass.
                    eprintln!("tempsense: cannot open {}: {}", dev_path.display(), e);
                    logger::log_event(
                        "device_open_failed",
                        json!({ "path": dev_path.display().to_string(), "error": e.to_string() }),
                    );
                }
            }
        }
        Ok(devices)
    }
}

fn uevent_matches(contents: &str, vendor_id: u16, product_id: u16) -> bool {
    // Looking for e.g. "HID_ID=0003:000016C0:000005DC".
    for line in contents.lines() {
        let Some(id) = line.strip_prefix("HID_ID=") else { continue };
        let parts: Vec<&str> = id.split(':').collect();
        if parts.len() != 3 {
            return false;
        }
        let vendor = u32::from_str_radix(parts[1], 16).unwrap_or(0);
        let product = u32::from_str_radix(parts[2], 16).unwrap_or(0);
        return vendor == vendor_id as u32 && product == product_id as u32;
    }
    false
}

struct HidDevice {
    file: std::fs::File,
    ordinal: u32,
}

impl SensorReader for HidDevice {
    fn read_next_sensor(&mut self) -> ReadOutcome {
        if let Err(e) = self.file.write_all(&POLL_COMMAND) {
            return ReadOutcome::Failed(ProbeError::Io(e));
        }
        let mut buf = [0u8; REPORT_LEN];
        let n = match self.file.read(&mut buf) {
            Ok(n) => n,
            Err(e) => return ReadOutcome::Failed(ProbeError::Io(e)),
        };
        if n == 0 {
            return ReadOutcome::EndOfStream;
        }
        parse_report(&buf[..n], self.ordinal)
    }

    fn ordinal(&self) -> u32 {
        self.ordinal
    }
}

/// Decode one controller report. Kept free of any file handle so the wire
/// format stays testable without hardware.
pub fn parse_report(buf: &[u8], device_ordinal: u32) -> ReadOutcome {
    if buf.iter().all(|&b| b == 0) {
        return ReadOutcome::EndOfStream;
    }
    if buf.len() < MIN_REPORT_LEN {
        return ReadOutcome::Failed(ProbeError::ShortReport {
            expected: MIN_REPORT_LEN,
            got: buf.len(),
        });
    }
    if buf[0] != FRAME_MARKER {
        return ReadOutcome::Failed(ProbeError::BadFrame(buf[0]));
    }

    let sensor_count = buf[1];
    let raw_address_hex = hex::encode(&buf[2..10]);
    let raw_temp = i16::from_be_bytes([buf[10], buf[11]]);
    let temperature_c = f64::from(raw_temp) / 16.0;

    ReadOutcome::Reading(RawReading {
        raw_address_hex,
        temperature_c,
        sensor_count,
        device_ordinal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn valid_report() -> [u8; REPORT_LEN] {
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = FRAME_MARKER;
        buf[1] = 3; // sensor count
        buf[2..10].copy_from_slice(&[0x28, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xaa]);
        // 0x0188 = 392 sixteenths = 24.5 C
        buf[10] = 0x01;
        buf[11] = 0x88;
        buf
    }

    #[test]
    fn test_parse_report_valid() {
        let buf = valid_report();
        match parse_report(&buf, 7) {
            ReadOutcome::Reading(r) => {
                assert_eq!(r.raw_address_hex, "28010203040506aa");
                assert_eq!(r.temperature_c, 24.5);
                assert_eq!(r.sensor_count, 3);
                assert_eq!(r.device_ordinal, 7);
            }
            other => panic!("expected Reading, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_report_negative_temperature() {
        let mut buf = valid_report();
        // -10.5 C = -168 sixteenths
        let raw = (-168i16).to_be_bytes();
        buf[10] = raw[0];
        buf[11] = raw[1];
        match parse_report(&buf, 0) {
            ReadOutcome::Reading(r) => assert_eq!(r.temperature_c, -10.5),
            other => panic!("expected Reading, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_report_all_zero_is_end_of_stream() {
        let buf = [0u8; REPORT_LEN];
        assert!(matches!(parse_report(&buf, 0), ReadOutcome::EndOfStream));
    }

    #[test]
    fn test_parse_report_short() {
        let buf = [FRAME_MARKER, 1, 0x28];
        match parse_report(&buf, 0) {
            ReadOutcome::Failed(ProbeError::ShortReport { expected, got }) => {
                assert_eq!(expected, MIN_REPORT_LEN);
                assert_eq!(got, 3);
            }
            other => panic!("expected ShortReport, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_report_bad_marker() {
        let mut buf = valid_report();
        buf[0] = 0x7f;
        assert!(matches!(
            parse_report(&buf, 0),
            ReadOutcome::Failed(ProbeError::BadFrame(0x7f))
        ));
    }

    #[test]
    fn test_uevent_matches() {
        let contents = "DRIVER=hid-generic\nHID_ID=0003:000016C0:000005DC\nHID_NAME=probe\n";
        assert!(uevent_matches(contents, 0x16c0, 0x05dc));
        assert!(!uevent_matches(contents, 0x16c0, 0x0001));
        assert!(!uevent_matches(contents, 0x0001, 0x05dc));
        assert!(!uevent_matches("DRIVER=hid-generic\n", 0x16c0, 0x05dc));
        assert!(!uevent_matches("HID_ID=0003:000016C0\n", 0x16c0, 0x05dc));
    }

    fn fake_node(sysfs: &Path, dev: &Path, name: &str, hid_id: &str) {
        let node = sysfs.join(name).join("device");
        fs::create_dir_all(&node).unwrap();
        fs::write(node.join("uevent"), format!("HID_ID={}\n", hid_id)).unwrap();
        fs::write(dev.join(name), [0u8; REPORT_LEN]).unwrap();
    }

    #[test]
    fn test_discover_matching_nodes_only() {
        let sysfs = TempDir::new().unwrap();
        let dev = TempDir::new().unwrap();
        fake_node(sysfs.path(), dev.path(), "hidraw0", "0003:000016C0:000005DC");
        fake_node(sysfs.path(), dev.path(), "hidraw1", "0003:0000DEAD:0000BEEF");
        fake_node(sysfs.path(), dev.path(), "hidraw2", "0003:000016C0:000005DC");

        let transport =
            HidTransport::with_roots(0x16c0, 0x05dc, sysfs.path(), dev.path());
        let devices = transport.discover().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].ordinal(), 0);
        assert_eq!(devices[1].ordinal(), 1);
    }

    #[test]
    fn test_discover_missing_root_is_empty() {
        let transport = HidTransport::with_roots(
            0x16c0,
            0x05dc,
            "/nonexistent/sysfs",
            "/nonexistent/dev",
        );
        assert!(transport.discover().unwrap().is_empty());
    }

    #[test]
    fn test_discover_unopenable_node_skipped() {
        let sysfs = TempDir::new().unwrap();
        let dev = TempDir::new().unwrap();
        // uevent matches but there is no device node to open.
        let node = sysfs.path().join("hidraw0").join("device");
        fs::create_dir_all(&node).unwrap();
        fs::write(node.join("uevent"), "HID_ID=0003:000016C0:000005DC\n").unwrap();

        let transport =
            HidTransport::with_roots(0x16c0, 0x05dc, sysfs.path(), dev.path());
        assert!(transport.discover().unwrap().is_empty());
    }
}
