// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost - Device identity helpers

use alloc::format;
use alloc::string::{String, ToString};
use esp_hal::chip;
use esp_hal::efuse::Efuse;
use esp_hal::system::Cpu;
use esp_hal::timer::systimer::{SystemTimer, Unit};

/// Length of the generated setup secret, in characters.
pub const SETUP_SECRET_LEN: usize = 8;

/// Device-specific information and identity-derived values.
pub struct Device;

impl Device {
    pub fn chip() -> String {
        chip!().to_string().to_ascii_uppercase()
    }

    pub fn mac_address() -> [u8; 6] {
        Efuse::read_base_mac_address()
    }

    pub fn mac_address_str() -> String {
        let mac = Self::mac_address();
        format!(
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
        )
    }

    /// The shared setup secret: the lower four bytes of the base MAC
    /// address as eight uppercase hex characters.  Used both as the setup
    /// AP's WPA2 passphrase and as the portal's setup password.
    pub fn setup_secret() -> String {
        let mac = Self::mac_address();
        format!("{:02X}{:02X}{:02X}{:02X}", mac[2], mac[3], mac[4], mac[5])
    }

    #[allow(unused)]
    pub fn uptime_us() -> u64 {
        let uptime_ticks = SystemTimer::unit_value(Unit::Unit0);
        uptime_ticks / (SystemTimer::ticks_per_second() / 1_000_000)
    }

    #[allow(unused)]
    pub fn uptime_secs() -> u64 {
        Self::uptime_us() / 1_000_000
    }

    pub fn reset_reason() -> String {
        let cpu = Cpu::current();
        let reset_reason = esp_hal::rtc_cntl::reset_reason(cpu);
        match reset_reason {
            Some(reason) => format!("{reason:?}"),
            None => "Unknown".to_string(),
        }
    }
}
