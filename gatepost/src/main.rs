// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost - Default Firmware
//!
//! A battery-powered gate-contact sensor.  The device deep-sleeps with two
//! wake sources armed - the gate contact and a daily heartbeat timer - and
//! on each wake runs exactly one routine:
//!
//! - boot/reset: connect with the stored credentials, or start the
//!   provisioning portal when none are stored;
//! - contact wake: read the gate state and connect to report it;
//! - timer wake: daily heartbeat connect.
//!
//! Every routine ends back in deep sleep.  The provisioning portal is a
//! WPA2 access point (password derived from the device MAC) with a small
//! HTTP form, DHCP server and captive DNS; submitted credentials are
//! persisted to flash and handed straight to a connection attempt.
//!
//! To change other configuration:
//! - `HEAP_SIZE`: heap used by the application, set below.
//! - `NUM_SOCKETS`: sockets per network stack, set below.
//! - The contact input/wake pin is GPIO3 (`peripherals.GPIO3` below); it
//!   must be an RTC-capable pin.
//! - Portal and connection timeouts live in `setup/mod.rs`; the heartbeat
//!   interval lives in `sleep.rs`.

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![feature(type_alias_impl_trait)]
#![feature(impl_trait_in_assoc_type)]

extern crate alloc;

use alloc::string::String;
use embassy_executor::Spawner;
use embassy_net::{Ipv4Cidr, StackResources, StaticConfigV4};
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::gpio::{Input, InputConfig, Pull};
use esp_hal::rtc_cntl::Rtc;
use esp_hal::{clock::CpuClock, timer::timg::TimerGroup};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use static_cell::make_static;

use gatepost_util::net::{InterfaceConfig, Wifi, WifiType};

mod device;
mod error;
mod setup;
mod sleep;
mod store;
mod switch;

use device::Device;
pub(crate) use error::{SecurityReason, SetupError};
use store::CredentialStore;
use switch::Contact;

// Creates the app-descriptor required by the esp-idf bootloader.
esp_bootloader_esp_idf::esp_app_desc!();

// Heap size for the application.
pub const HEAP_SIZE: usize = 96 * 1024;

// Sockets per network stack: the portal's HTTP listener, DHCP and DNS
// servers on the AP side, the DHCP client on the STA side, plus spares.
const NUM_SOCKETS: usize = 8;

/// SSID of the setup access point.
pub const SETUP_AP_SSID: &str = "gatepost-setup";

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) -> ! {
    //
    // Common setup code
    //

    // Set up the logger
    esp_println::logger::init_logger_from_env();

    info!("*** gatepost ***");

    // Set up the HAL
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    // Set up the heap allocator
    esp_alloc::heap_allocator!(size: HEAP_SIZE);

    // Initialize embassy
    let timg1 = TimerGroup::new(peripherals.TIMG1);
    esp_hal_embassy::init(timg1.timer0);

    info!(
        "device: {} mac {} reset: {}",
        Device::chip(),
        Device::mac_address_str(),
        Device::reset_reason()
    );

    let mut rtc = Rtc::new(peripherals.LPWR);
    let mut contact_pin = peripherals.GPIO3;

    // Read the gate state once, before the radio comes up.
    let contact_closed = {
        let input = Input::new(
            contact_pin.reborrow(),
            InputConfig::default().with_pull(Pull::Up),
        );
        let contact = Contact::init(input).expect("contact input unavailable");
        contact.is_closed()
    };

    // The shared setup secret doubles as the AP passphrase and the
    // portal's setup password.
    let secret: &'static str = Device::setup_secret().leak();
    info!("device: setup secret {secret}");

    // Station credentials may not exist yet; the connection manager
    // applies fresh ones before every attempt.
    let stored = CredentialStore::new().get_credentials().ok();
    let sta_if = InterfaceConfig {
        ssid: stored
            .as_ref()
            .map(|creds| String::from(creds.ssid.as_str()))
            .unwrap_or_default(),
        password: stored
            .as_ref()
            .map(|creds| String::from(creds.password.as_str()))
            .unwrap_or_default(),
        net: embassy_net::Config::dhcpv4(Default::default()),
    };
    let ap_if = InterfaceConfig {
        ssid: String::from(SETUP_AP_SSID),
        password: String::from(secret),
        net: ap_net_config(),
    };

    // Set up the WiFi interfaces and spawn the WiFi/networking tasks.
    let sta_resources = make_static!(StackResources::<NUM_SOCKETS>::new());
    let ap_resources = make_static!(StackResources::<NUM_SOCKETS>::new());
    let wifi = Wifi::builder()
        .with_sta_if(sta_if, sta_resources)
        .with_ap_if(ap_if, ap_resources)
        .build(
            &spawner,
            peripherals.TIMG0,
            peripherals.RNG,
            peripherals.WIFI,
        )
        .expect("failed to initialize WiFi");
    let wifi: &'static mut Wifi = make_static!(wifi);
    wifi.must_spawn();
    let wifi: &'static Wifi = wifi;

    // Spawn the setup subsystem: portal tasks idle until released, the
    // connection manager and the timeout supervisor wait for work.
    let ap_stack = wifi
        .net_stack(WifiType::Ap)
        .expect("AP stack not configured");
    spawner.must_spawn(setup::supervisor_task(wifi));
    spawner.must_spawn(setup::connect::connection_task(wifi));
    spawner.must_spawn(setup::portal::http_task(ap_stack, secret, wifi.rng()));
    spawner.must_spawn(setup::portal::dhcp_task(ap_stack));
    spawner.must_spawn(setup::portal::captive_dns_task(ap_stack));
    spawner.must_spawn(setup::portal::handoff_task(wifi));

    // Figure out why we woke and run the matching routine to completion.
    sleep::handle_wakeup(
        &mut contact_pin,
        async || signal_routine(contact_closed).await,
        async || timer_routine().await,
        async || boot_routine(wifi).await,
    )
    .await;

    // Whatever happened, the radio is quiet again: power down until the
    // gate moves or the heartbeat timer fires.
    sleep::enter_deep_sleep(&mut rtc, &mut contact_pin)
}

fn ap_net_config() -> embassy_net::Config {
    let mut dns_servers = heapless::Vec::new();
    let _ = dns_servers.push(setup::portal::AP_IP);
    embassy_net::Config::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(setup::portal::AP_IP, setup::portal::AP_PREFIX_LEN),
        gateway: Some(setup::portal::AP_IP),
        dns_servers,
    })
}

// Boot or reset: connect if provisioned, otherwise run the portal.  The
// portal either hands off into a connection or times out.
async fn boot_routine(wifi: &'static Wifi) {
    if CredentialStore::new().has_credentials() {
        connect_and_report().await;
    } else {
        info!("boot: no stored credentials, starting provisioning portal");
        match setup::start_portal(wifi).await {
            Ok(()) => drain_outcomes().await,
            Err(e) => error!("boot: failed to start portal: {e}"),
        }
    }
}

// Gate contact wake: report the contact state.
async fn signal_routine(contact_closed: bool) {
    info!(
        "signal: gate contact {}",
        if contact_closed { "closed" } else { "open" }
    );
    connect_and_report().await;
}

// Daily timer wake: heartbeat so the outside world knows we are alive.
async fn timer_routine() {
    info!("timer: daily heartbeat");
    connect_and_report().await;
}

async fn connect_and_report() {
    match setup::connect(false) {
        Ok(()) => drain_outcomes().await,
        Err(e) => error!("connect request refused: {e}"),
    }
}

// Waits until the session reaches a terminal outcome.  A successful
// connection is followed by the auto-disconnect outcome, which is the
// signal to go back to sleep.
async fn drain_outcomes() {
    loop {
        let outcome = setup::next_outcome().await;
        if outcome.success {
            if let Some(config) = outcome.addr {
                info!("main: network up at {}", config.address);
            }
        } else {
            debug!("main: session finished in state {}", setup::state());
            break;
        }
    }
}
