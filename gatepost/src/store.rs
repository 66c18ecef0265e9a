// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost - Persistent credential store
//!
//! Keeps the provisioned network credentials in the last flash sector as a
//! single checksummed record (layout in `gatepost_core::creds`).  Writing
//! the whole record in one call commits both fields together; a write that
//! completed survives power loss.

use embedded_storage::{ReadStorage, Storage};
use esp_storage::FlashStorage;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use gatepost_core::creds::{Credentials, RECORD_LEN, decode_record, encode_record};

use crate::SetupError;

pub struct CredentialStore {
    flash: FlashStorage,
    offset: u32,
}

impl CredentialStore {
    pub fn new() -> Self {
        let flash = FlashStorage::new();
        let offset = (flash.capacity() as u32).saturating_sub(FlashStorage::SECTOR_SIZE);
        Self { flash, offset }
    }

    /// True iff a valid record with a non-empty ssid is stored.  Never
    /// fails - storage errors read as "no credentials".
    pub fn has_credentials(&mut self) -> bool {
        self.get_credentials().is_ok()
    }

    pub fn get_credentials(&mut self) -> Result<Credentials, SetupError> {
        let mut record = [0u8; RECORD_LEN];
        self.flash
            .read(self.offset, &mut record)
            .map_err(|e| storage_error("read", e))?;
        decode_record(&record).ok_or(SetupError::NotFound)
    }

    pub fn set_credentials(&mut self, creds: &Credentials) -> Result<(), SetupError> {
        let mut record = [0u8; RECORD_LEN];
        encode_record(creds, &mut record);
        self.flash
            .write(self.offset, &record)
            .map_err(|e| storage_error("write", e))?;
        info!("store: credentials saved");
        Ok(())
    }

    #[allow(unused)]
    pub fn clear_credentials(&mut self) -> Result<(), SetupError> {
        let record = [0xFFu8; RECORD_LEN];
        self.flash
            .write(self.offset, &record)
            .map_err(|e| storage_error("clear", e))?;
        info!("store: credentials cleared");
        Ok(())
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

fn storage_error(op: &str, e: esp_storage::FlashStorageError) -> SetupError {
    error!("store: flash {op} failed: {e:?}");
    SetupError::Storage
}
