// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost - Provisioning and connection control
//!
//! The single owner of the session state: every transition goes through
//! [`apply_event`] into the `gatepost-core` engine, and all of the
//! operations the wake routines use live here - portal start/stop,
//! connect, disconnect - together with the single-slot timeout supervisor
//! that bounds the portal's and a temporary connection's lifetime.
//!
//! Outcomes (`(success, address-info)`) are delivered over a channel
//! rather than a stored callback; the wake routines await them.

use core::cell::RefCell;
use embassy_futures::select::{Either, select};
use embassy_net::StaticConfigV4;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use gatepost_core::state::{Applied, InvalidTransition, SetupEngine, SetupEvent, SetupState};
use gatepost_util::net::{Control, Status, Wifi, WifiType};

use crate::SetupError;
use crate::store::CredentialStore;

pub(crate) mod connect;
pub(crate) mod html;
pub(crate) mod http;
pub(crate) mod portal;

/// How long the portal stays up without a successful submission.
pub const PORTAL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How long a `stay_connected = false` connection is held before the
/// automatic disconnect.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A terminal notification for the caller: connection success with the
/// acquired address, or failure/timeout/disconnect.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub success: bool,
    pub addr: Option<StaticConfigV4>,
}

// All shared mutable session state sits behind one mutex: the engine
// (state + retry counter) and the stay-connected flag.
struct Shared {
    engine: SetupEngine,
    stay_connected: bool,
}

static SHARED: BlockingMutex<CriticalSectionRawMutex, RefCell<Shared>> =
    BlockingMutex::new(RefCell::new(Shared {
        engine: SetupEngine::new(),
        stay_connected: false,
    }));

// Outcome delivery.  Small and bounded: a wake cycle produces at most a
// success and a terminal failure before the routine drains it.
static OUTCOMES: Channel<CriticalSectionRawMutex, Outcome, 4> = Channel::new();

/// Current session state.
pub fn state() -> SetupState {
    SHARED.lock(|shared| shared.borrow().engine.state())
}

pub(crate) fn stay_connected() -> bool {
    SHARED.lock(|shared| shared.borrow().stay_connected)
}

/// Routes an event through the engine, logging the transition.
pub(crate) fn apply_event(event: SetupEvent) -> Result<Applied, InvalidTransition> {
    SHARED.lock(|shared| {
        let mut shared = shared.borrow_mut();
        let before = shared.engine.state();
        let result = shared.engine.apply(event);
        match &result {
            Ok(Applied::Entered(after)) => debug!("state: {before} -> {after} ({event:?})"),
            Ok(Applied::Retry(n)) => debug!("state: {before} retry {n} ({event:?})"),
            Ok(Applied::Ignored) => trace!("state: {before} ignored {event:?}"),
            Err(_) => debug!("state: {before} rejected {event:?}"),
        }
        result
    })
}

/// Sends an outcome to whoever is waiting.
pub(crate) fn notify(success: bool, addr: Option<StaticConfigV4>) {
    if OUTCOMES.try_send(Outcome { success, addr }).is_err() {
        warn!("setup: outcome channel full, notification dropped");
    }
}

/// Waits for the next outcome.
pub async fn next_outcome() -> Outcome {
    OUTCOMES.receive().await
}

/// Starts the provisioning portal: session state to PortalRunning, the
/// setup access point up, the portal tasks released, and the portal
/// timeout armed.
pub async fn start_portal(wifi: &'static Wifi) -> Result<(), SetupError> {
    apply_event(SetupEvent::StartPortal).map_err(|t| {
        warn!("setup: cannot start portal in state {}", t.state);
        SetupError::InvalidState
    })?;

    info!("setup: starting portal");
    if wifi.control_and_wait(WifiType::Ap, Control::Enable).await != Status::Enabled {
        error!("setup: access point bring-up failed");
        let _ = apply_event(SetupEvent::StopPortal);
        return Err(SetupError::Infrastructure);
    }

    portal::set_running(true);
    arm_timeout(PORTAL_TIMEOUT);
    info!("setup: portal running at http://{}", portal::AP_IP);
    Ok(())
}

/// Stops the portal: timeout cancelled, portal tasks parked, access point
/// down, session state back to Idle.  Safe to call when no portal is
/// running.
pub async fn stop_portal(wifi: &'static Wifi) {
    cancel_timeout();
    portal::set_running(false);
    wifi.control_and_wait(WifiType::Ap, Control::Disable).await;
    let _ = apply_event(SetupEvent::StopPortal);
    info!("setup: portal stopped");
}

/// Starts a station connection using the stored credentials.
///
/// Guards run synchronously: already connected, no credentials, storage
/// failure.  On success the session is in Connecting and the connection
/// task drives the association; the result arrives as an [`Outcome`].
pub fn connect(stay_connected: bool) -> Result<(), SetupError> {
    if state() == SetupState::Connected {
        warn!("setup: connect refused, already connected");
        return Err(SetupError::InvalidState);
    }

    let mut store = CredentialStore::new();
    if !store.has_credentials() {
        warn!("setup: connect refused, no stored credentials");
        return Err(SetupError::NotFound);
    }
    let creds = store.get_credentials()?;

    SHARED.lock(|shared| {
        let mut shared = shared.borrow_mut();
        shared.stay_connected = stay_connected;
        shared.engine.apply(SetupEvent::StartConnect)
    })
    .map_err(|_| SetupError::InvalidState)?;

    info!(
        "setup: connecting to '{}' (stay_connected: {stay_connected})",
        creds.ssid
    );
    connect::request(creds);
    Ok(())
}

/// Unconditionally releases the station, lands the session in Disabled
/// and reports a failure outcome.  Safe to call in any state.
pub async fn disconnect(wifi: &'static Wifi) {
    cancel_timeout();
    wifi.control_and_wait(WifiType::Sta, Control::Disable).await;
    let _ = apply_event(SetupEvent::Disconnect);
    notify(false, None);
    info!("setup: disconnected");
}

// ---- Single-slot timeout supervisor ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeoutCommand {
    Arm(Duration),
    Cancel,
}

static TIMEOUT_CTRL: Signal<CriticalSectionRawMutex, TimeoutCommand> = Signal::new();

/// Arms the supervisor, replacing any pending deadline.
pub(crate) fn arm_timeout(delay: Duration) {
    TIMEOUT_CTRL.signal(TimeoutCommand::Arm(delay));
}

/// Cancels the pending deadline, if any.
pub(crate) fn cancel_timeout() {
    TIMEOUT_CTRL.signal(TimeoutCommand::Cancel);
}

/// Owns the one outstanding delayed action.  Arming cancels-and-replaces;
/// a deadline that fires after the state already moved on degrades to a
/// no-op.
#[embassy_executor::task]
pub(crate) async fn supervisor_task(wifi: &'static Wifi) {
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            None => Some(TIMEOUT_CTRL.wait().await),
            Some(at) => match select(TIMEOUT_CTRL.wait(), Timer::at(at)).await {
                Either::First(command) => Some(command),
                Either::Second(()) => None,
            },
        };

        match command {
            Some(TimeoutCommand::Arm(delay)) => {
                debug!("timeout: armed for {}s", delay.as_secs());
                deadline = Some(Instant::now() + delay);
            }
            Some(TimeoutCommand::Cancel) => {
                if deadline.take().is_some() {
                    debug!("timeout: cancelled");
                }
            }
            None => {
                deadline = None;
                fire(wifi).await;
            }
        }
    }
}

// The armed deadline elapsed.
async fn fire(wifi: &'static Wifi) {
    let (current, stay) = SHARED.lock(|shared| {
        let shared = shared.borrow();
        (shared.engine.state(), shared.stay_connected)
    });

    match current {
        SetupState::Connected if !stay => {
            info!("timeout: auto-disconnecting");
            disconnect(wifi).await;
        }
        SetupState::PortalRunning => {
            info!("timeout: portal expired");
            stop_portal(wifi).await;
            let _ = apply_event(SetupEvent::Disconnect);
            notify(false, None);
        }
        state => {
            // The state moved on before the deadline fired.
            debug!("timeout: fired in state {state}, nothing to do");
        }
    }
}
