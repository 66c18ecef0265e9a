// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost - Station connection manager
//!
//! Drives one station association per connect request: applies the stored
//! credentials, brings the station up, and reacts to link events from the
//! radio.  Retry policy lives here (and in the engine), not in the WiFi
//! helper: a disassociation while Connecting re-attempts up to the
//! engine's bound, anything beyond that fails the session and releases
//! the radio.

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use gatepost_core::creds::Credentials;
use gatepost_core::state::{Applied, SetupEvent, SetupState};
use gatepost_util::net::{Control, LinkEvent, Status, Wifi, WifiType};

use crate::setup::{self, CONNECT_TIMEOUT};

// Pause between declaring failure and releasing the radio, so the failure
// outcome is observable before the interface drops.
const CLEANUP_GRACE: Duration = Duration::from_secs(1);

static CONNECT_REQ: Signal<CriticalSectionRawMutex, Credentials> = Signal::new();

/// Queues a connect request for the connection task.  The caller has
/// already moved the session state to Connecting.
pub(crate) fn request(creds: Credentials) {
    CONNECT_REQ.signal(creds);
}

#[embassy_executor::task]
pub(crate) async fn connection_task(wifi: &'static Wifi) {
    loop {
        let creds = CONNECT_REQ.wait().await;
        run_session(wifi, creds).await;
    }
}

// One connect request, from association start to a terminal state.
async fn run_session(wifi: &'static Wifi, creds: Credentials) {
    // Drop any link event left over from a previous session's teardown.
    wifi.clear_sta_link_events();
    wifi.set_sta_credentials(creds.ssid.as_str().into(), creds.password.as_str().into());

    // Bring the station interface up...
    if wifi.control_and_wait(WifiType::Sta, Control::Enable).await != Status::Enabled {
        error!("connect: station bring-up failed");
        setup::notify(false, None);
        let _ = setup::apply_event(SetupEvent::Disconnect);
        return;
    }
    // ...and start associating.
    wifi.control(WifiType::Sta, Control::Connect);

    loop {
        match wifi.sta_link_event().await {
            LinkEvent::Up => {
                // Associated; the session completes when an address
                // arrives, unless the link drops first.
                match select(wifi.wait_for_ipv4(WifiType::Sta), wifi.sta_link_event()).await {
                    Either::First(Ok(config)) => {
                        let _ = setup::apply_event(SetupEvent::AddressAcquired);
                        info!("connect: up, address {}", config.address);
                        let stay_connected = setup::stay_connected();
                        setup::notify(true, Some(config));
                        if !stay_connected {
                            setup::arm_timeout(CONNECT_TIMEOUT);
                        }
                        // Stay in the loop to catch a later link drop.
                    }
                    Either::First(Err(e)) => {
                        error!("connect: no station stack: {e}");
                        fail(wifi).await;
                        return;
                    }
                    Either::Second(LinkEvent::Down) => {
                        if !handle_disassociation(wifi).await {
                            return;
                        }
                    }
                    Either::Second(LinkEvent::Stopped) => return,
                    Either::Second(LinkEvent::Up) => {}
                }
            }
            LinkEvent::Down => {
                if !handle_disassociation(wifi).await {
                    return;
                }
            }
            // The station was disabled underneath us (explicit disconnect
            // or auto-disconnect); whoever did it sent the outcome.
            LinkEvent::Stopped => return,
        }
    }
}

// Applies a disassociation to the engine and acts on the result.  Returns
// false when the session is over.
async fn handle_disassociation(wifi: &'static Wifi) -> bool {
    match setup::apply_event(SetupEvent::Disassociated) {
        Ok(Applied::Retry(attempt)) => {
            info!(
                "connect: retrying association ({attempt}/{})",
                gatepost_core::state::MAX_CONNECT_RETRIES
            );
            wifi.control(WifiType::Sta, Control::Connect);
            true
        }
        Ok(Applied::Entered(SetupState::Failed)) => {
            fail(wifi).await;
            false
        }
        _ => {
            // The state moved on before the event landed.
            debug!("connect: stale disassociation ignored");
            false
        }
    }
}

// Retries exhausted (or the link died while Connected): report failure,
// then release the radio after a short grace period.
async fn fail(wifi: &'static Wifi) {
    warn!("connect: failed");
    setup::notify(false, None);
    Timer::after(CLEANUP_GRACE).await;
    wifi.control_and_wait(WifiType::Sta, Control::Disable).await;
    if !matches!(
        setup::apply_event(SetupEvent::CleanupDone),
        Ok(Applied::Entered(SetupState::Disabled))
    ) {
        // Not in Failed (e.g. bring-up died mid-flight); land in Disabled
        // regardless.
        let _ = setup::apply_event(SetupEvent::Disconnect);
    }
    info!("connect: station released");
}
