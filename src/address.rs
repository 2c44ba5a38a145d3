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

//! Canonicalization of raw 1-Wire ROM codes.
//!
//! The controller reports each probe's 8-byte ROM code as 16 hex characters:
//! one family byte, six serial bytes (least-significant first), and a frame
//! terminator byte. The canonical form used everywhere else in this crate,
//! including the `sensors.csv` id column, is the family byte, a dash, and
//! the six serial bytes reversed into the conventional 1-Wire textual order:
//! `28-xxxxxxxxxxxx` (lowercase hex, no trailing terminator).
//!
//! Canonicalization validates the family and terminator bytes rather than
//! passing unknown frames through, so two distinct probes can never collapse
//! onto one key.

use thiserror::Error;

/// DS18B20 1-Wire temperature family code.
pub const FAMILY_TEMPERATURE: u8 = 0x28;

/// Terminator byte the controller appends to every reported ROM code.
pub const ROM_TERMINATOR: u8 = 0xaa;

/// Raw ROM code length in bytes: family + 6 serial + terminator.
pub const ROM_LEN: usize = 8;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("address is not valid hex: {0}")]
    InvalidHex(String),
    #[error("unexpected family byte 0x{0:02x} (want 0x28)")]
    WrongFamily(u8),
    #[error("unexpected terminator byte 0x{0:02x} (want 0xaa)")]
    WrongTerminator(u8),
}

/// Normalize a raw ROM-code hex string into the canonical address key.
///
/// Total and deterministic; distinct serials always yield distinct keys.
pub fn normalize(raw_hex: &str) -> Result<String, AddressError> {
    let bytes = hex::decode(raw_hex.trim())
        .map_err(|_| AddressError::InvalidHex(raw_hex.to_string()))?;
    if bytes.len() != ROM_LEN {
        return Err(AddressError::InvalidLength { expected: ROM_LEN, got: bytes.len() });
    }
    if bytes[0] != FAMILY_TEMPERATURE {
        return Err(AddressError::WrongFamily(bytes[0]));
    }
    if bytes[ROM_LEN - 1] != ROM_TERMINATOR {
        return Err(AddressError::WrongTerminator(bytes[ROM_LEN - 1]));
    }

    // The probe reports its serial least-significant-byte first; the
    // canonical textual convention is most-significant first.
    let mut serial: Vec<u8> = bytes[1..ROM_LEN - 1].to_vec();
    serial.reverse();

    Ok(format!("{:02x}-{}", FAMILY_TEMPERATURE, hex::encode(serial)))
}
