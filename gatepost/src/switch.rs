// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost - Gate contact input
//!
//! The contact sits between the pin and ground, with the internal pull-up
//! enabled, so a closed gate reads low.  The caller picks the pin; it must
//! be an RTC-capable one if it is also used as the deep-sleep wake source.

use esp_hal::gpio::Input;

use crate::SetupError;

pub struct Contact<'d> {
    input: Input<'d>,
}

impl<'d> Contact<'d> {
    /// Wraps a configured input.  Returns an error only if the pin cannot
    /// be used as a contact input.
    pub fn init(input: Input<'d>) -> Result<Self, SetupError> {
        Ok(Self { input })
    }

    /// True when the gate contact is closed (pin pulled to ground).
    pub fn is_closed(&self) -> bool {
        self.input.is_low()
    }
}
