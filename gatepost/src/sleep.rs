// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost - Wake-cause dispatch and deep-sleep entry
//!
//! The device spends almost all of its life in deep sleep with two armed
//! wake sources: the gate contact (RTC-IO, active low) and a daily timer.
//! On each wake, [`handle_wakeup`] classifies the cause and runs exactly
//! one of the supplied routines; [`enter_deep_sleep`] arms the wake
//! sources and powers back down.

use core::time::Duration;
use esp_hal::delay::Delay;
use esp_hal::gpio::RtcPinWithResistors;
use esp_hal::rtc_cntl::sleep::{RtcioWakeupSource, TimerWakeupSource, WakeupLevel};
use esp_hal::rtc_cntl::{Rtc, wakeup_cause};
use esp_hal::system::SleepSource;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

/// Interval between timer wakes: one heartbeat per day.
pub const HEARTBEAT_WAKE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

// Time to let the log output drain before the chip powers down.
const SLEEP_LOG_DRAIN_MS: u32 = 100;

/// Why the device became active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    /// The gate contact changed the wake pin's level.
    ExternalSignal,

    /// The daily heartbeat timer elapsed.
    TimerElapsed,

    /// Cold boot, reset button, or firmware flash.
    ColdBootOrReset,

    /// A wake source this firmware does not arm.
    Other,
}

/// Maps the hardware's wake reason onto the causes this firmware acts on.
pub fn classify(source: SleepSource) -> WakeCause {
    match source {
        SleepSource::Gpio | SleepSource::Ext0 | SleepSource::Ext1 => WakeCause::ExternalSignal,
        SleepSource::Timer => WakeCause::TimerElapsed,
        SleepSource::Undefined => WakeCause::ColdBootOrReset,
        _ => WakeCause::Other,
    }
}

/// Reads the wake cause once and invokes exactly one of the supplied
/// routines.  When the wake came from the contact pin, the pin is first
/// released from its sleep-hold state so it reads normally again.  An
/// unrecognized cause invokes none of the routines.
pub async fn handle_wakeup<S, T, B>(
    contact_pin: &mut dyn RtcPinWithResistors,
    on_signal: S,
    on_timer: T,
    on_boot: B,
) where
    S: AsyncFnOnce(),
    T: AsyncFnOnce(),
    B: AsyncFnOnce(),
{
    let source = wakeup_cause();
    let cause = classify(source);
    info!("wake: cause {cause:?} ({source:?})");

    if cause == WakeCause::ExternalSignal {
        // Hand the pin back to the digital domain.
        contact_pin.rtcio_pad_hold(false);
    }

    match cause {
        WakeCause::ExternalSignal => on_signal().await,
        WakeCause::TimerElapsed => on_timer().await,
        WakeCause::ColdBootOrReset => on_boot().await,
        WakeCause::Other => warn!("wake: unhandled wake source {source:?}"),
    }
}

/// Arms the daily timer and the contact pin (active low, pull-up enabled)
/// as wake sources and enters deep sleep.  Does not return; the next wake
/// is a fresh boot.
pub fn enter_deep_sleep(rtc: &mut Rtc<'_>, contact_pin: &mut dyn RtcPinWithResistors) -> ! {
    info!(
        "sleep: entering deep sleep, next heartbeat in {}s",
        HEARTBEAT_WAKE_INTERVAL.as_secs()
    );

    let timer = TimerWakeupSource::new(HEARTBEAT_WAKE_INTERVAL);

    // Keep the contact pin from floating while asleep.
    contact_pin.rtcio_pullup(true);
    contact_pin.rtcio_pulldown(false);

    let mut wakeup_pins: [(&mut dyn RtcPinWithResistors, WakeupLevel); 1] =
        [(contact_pin, WakeupLevel::Low)];
    let rtcio = RtcioWakeupSource::new(&mut wakeup_pins);

    Delay::new().delay_millis(SLEEP_LOG_DRAIN_MS);

    rtc.sleep_deep(&[&timer, &rtcio])
}
