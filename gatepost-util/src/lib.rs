// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! Gatepost is a battery-powered gate-contact sensor for ESP32-C3.
//!
//! gatepost-util - Networking helpers for building the Gatepost firmware.
//!
//! [`net`] - provides a helper for WiFi and networking, using `esp-wifi`
//! and `embassy-net`.

#![no_std]
#![feature(type_alias_impl_trait)]
#![feature(impl_trait_in_assoc_type)]

extern crate alloc;

pub mod net;
