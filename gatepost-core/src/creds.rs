// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost-core - Network credentials and their persisted record layout
//!
//! Credentials are a bounded ssid/password pair.  They persist as a single
//! 128-byte record that the firmware writes into the last flash sector, so
//! both fields always commit together:
//!
//! ```text
//! magic (4) | version (1) | ssid_len (1) | ssid (31) |
//! password_len (1) | password (63) | pad (23) | crc32 (4)
//! ```
//!
//! An erased sector (all 0xFF), a bad magic/version or a checksum mismatch
//! all decode as "no credentials".

use crc::{CRC_32_ISO_HDLC, Crc};
use static_assertions::const_assert_eq;

/// Maximum ssid length in bytes (802.11 limit).
pub const SSID_MAX_LEN: usize = 31;

/// Maximum WPA2 passphrase length in bytes.
pub const PASSWORD_MAX_LEN: usize = 63;

/// Size of the persisted credential record.
pub const RECORD_LEN: usize = 128;

const RECORD_MAGIC: u32 = 0x4750_5354; // "GPST"
const RECORD_VERSION: u8 = 1;

const SSID_LEN_OFFSET: usize = 5;
const SSID_OFFSET: usize = 6;
const PASSWORD_LEN_OFFSET: usize = SSID_OFFSET + SSID_MAX_LEN;
const PASSWORD_OFFSET: usize = PASSWORD_LEN_OFFSET + 1;
const CRC_OFFSET: usize = RECORD_LEN - 4;

const_assert_eq!(PASSWORD_OFFSET + PASSWORD_MAX_LEN + 23 + 4, RECORD_LEN);

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// A stored network name and secret.  The ssid is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: heapless::String<SSID_MAX_LEN>,
    pub password: heapless::String<PASSWORD_MAX_LEN>,
}

/// Why a [`Credentials`] value could not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsError {
    EmptySsid,
    SsidTooLong,
    PasswordTooLong,
}

impl Credentials {
    /// Builds credentials, enforcing the field bounds.  An empty password
    /// is allowed (open networks); an empty ssid is not.
    pub fn new(ssid: &str, password: &str) -> Result<Self, CredentialsError> {
        if ssid.is_empty() {
            return Err(CredentialsError::EmptySsid);
        }

        let mut out = Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        out.ssid
            .push_str(ssid)
            .map_err(|_| CredentialsError::SsidTooLong)?;
        out.password
            .push_str(password)
            .map_err(|_| CredentialsError::PasswordTooLong)?;
        Ok(out)
    }
}

/// Serializes `creds` into a record image ready to be written to flash.
pub fn encode_record(creds: &Credentials, out: &mut [u8; RECORD_LEN]) {
    out.fill(0);
    out[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
    out[4] = RECORD_VERSION;
    out[SSID_LEN_OFFSET] = creds.ssid.len() as u8;
    out[SSID_OFFSET..SSID_OFFSET + creds.ssid.len()].copy_from_slice(creds.ssid.as_bytes());
    out[PASSWORD_LEN_OFFSET] = creds.password.len() as u8;
    out[PASSWORD_OFFSET..PASSWORD_OFFSET + creds.password.len()]
        .copy_from_slice(creds.password.as_bytes());

    let crc = CRC32.checksum(&out[..CRC_OFFSET]);
    out[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
}

/// Deserializes a record image.  Returns `None` for anything that is not a
/// valid record, including an erased sector.
pub fn decode_record(record: &[u8; RECORD_LEN]) -> Option<Credentials> {
    if record.iter().all(|&byte| byte == 0xFF) {
        return None;
    }
    if u32::from_le_bytes([record[0], record[1], record[2], record[3]]) != RECORD_MAGIC {
        return None;
    }
    if record[4] != RECORD_VERSION {
        return None;
    }

    let crc = u32::from_le_bytes([
        record[CRC_OFFSET],
        record[CRC_OFFSET + 1],
        record[CRC_OFFSET + 2],
        record[CRC_OFFSET + 3],
    ]);
    if crc != CRC32.checksum(&record[..CRC_OFFSET]) {
        return None;
    }

    let ssid_len = record[SSID_LEN_OFFSET] as usize;
    let password_len = record[PASSWORD_LEN_OFFSET] as usize;
    if ssid_len == 0 || ssid_len > SSID_MAX_LEN || password_len > PASSWORD_MAX_LEN {
        return None;
    }

    let ssid = core::str::from_utf8(&record[SSID_OFFSET..SSID_OFFSET + ssid_len]).ok()?;
    let password =
        core::str::from_utf8(&record[PASSWORD_OFFSET..PASSWORD_OFFSET + password_len]).ok()?;
    Credentials::new(ssid, password).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trip() {
        let creds = Credentials::new("HomeNet", "Secret123").unwrap();
        let mut record = [0u8; RECORD_LEN];
        encode_record(&creds, &mut record);

        let decoded = decode_record(&record).unwrap();
        assert_eq!(decoded, creds);
    }

    #[test]
    fn empty_password_round_trips() {
        let creds = Credentials::new("OpenNet", "").unwrap();
        let mut record = [0u8; RECORD_LEN];
        encode_record(&creds, &mut record);
        assert_eq!(decode_record(&record).unwrap(), creds);
    }

    #[test]
    fn erased_sector_decodes_as_absent() {
        let record = [0xFFu8; RECORD_LEN];
        assert!(decode_record(&record).is_none());
    }

    #[test]
    fn corrupted_record_decodes_as_absent() {
        let creds = Credentials::new("HomeNet", "Secret123").unwrap();
        let mut record = [0u8; RECORD_LEN];
        encode_record(&creds, &mut record);

        record[SSID_OFFSET] ^= 0x01;
        assert!(decode_record(&record).is_none());
    }

    #[test]
    fn empty_ssid_rejected() {
        assert_eq!(
            Credentials::new("", "whatever"),
            Err(CredentialsError::EmptySsid)
        );
    }

    #[test]
    fn over_long_fields_rejected() {
        let long = "x".repeat(SSID_MAX_LEN + 1);
        assert_eq!(
            Credentials::new(&long, ""),
            Err(CredentialsError::SsidTooLong)
        );

        let long = "x".repeat(PASSWORD_MAX_LEN + 1);
        assert_eq!(
            Credentials::new("net", &long),
            Err(CredentialsError::PasswordTooLong)
        );
    }

    #[test]
    fn maximum_length_fields_round_trip() {
        let ssid = "s".repeat(SSID_MAX_LEN);
        let password = "p".repeat(PASSWORD_MAX_LEN);
        let creds = Credentials::new(&ssid, &password).unwrap();

        let mut record = [0u8; RECORD_LEN];
        encode_record(&creds, &mut record);
        assert_eq!(decode_record(&record).unwrap(), creds);
    }
}
