// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost-util - WiFi and networking helper
//!
//! The [`Wifi`] object configures and controls Gatepost's WiFi interfaces.
//! Both interfaces exist for the lifetime of the firmware; the controller
//! task brings the radio up and down on demand:
//!
//! - the AP interface hosts the provisioning portal,
//! - the STA interface associates with the provisioned network.
//!
//! Control is signal-driven.  [`Control::Enable`]/[`Control::Disable`]
//! change the radio mode and are acknowledged with a [`Status`];
//! [`Control::Connect`] starts one station association attempt.  The
//! station's link transitions are published separately as [`LinkEvent`]s,
//! so a task waiting for a control acknowledgement never races a task
//! waiting for association events.  The helper never retries association
//! on its own - retry policy belongs to the caller.
//!
//! # Example
//! ```rust
//! let sta_resources = make_static!(StackResources::<8>::new());
//! let sta_config = InterfaceConfig {
//!     ssid: String::from("MyNetwork"),
//!     password: String::from("password123"),
//!     net: embassy_net::Config::dhcpv4(Default::default()),
//! };
//!
//! let mut wifi = Wifi::builder::<8, 8>()
//!     .with_sta_if(sta_config, sta_resources)
//!     .build(&spawner, timg0, rng, wifi_hw)
//!     .expect("Failed to build WiFi object");
//! wifi.must_spawn();
//!
//! wifi.control_and_wait(WifiType::Sta, Control::Enable).await;
//! wifi.control(WifiType::Sta, Control::Connect);
//! match wifi.sta_link_event().await {
//!     LinkEvent::Up => { /* wait for an address */ }
//!     _ => { /* retry or give up */ }
//! }
//! ```

use alloc::format;
use alloc::string::String;
use core::cell::RefCell;
use core::fmt;
use core::future::pending;
use embassy_executor::Spawner;
use embassy_futures::select::{Either3, select3};
use embassy_net::{Config as NetConfig, Runner, Stack, StackResources, StaticConfigV4};
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Timer;
use esp_hal::peripherals::{RNG, TIMG0, WIFI};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_wifi::wifi::{
    AccessPointConfiguration, ClientConfiguration, Configuration, WifiController, WifiDevice,
    WifiEvent, WifiMode,
};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use static_cell::make_static;

const AP_CHANNEL: u8 = 1;
// The provisioning portal serves a single operator.
const MAX_AP_CONNECTIONS: u16 = 1;

/// Error type for WiFi operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Hit error in the esp-wifi stack
    Wifi(String),

    /// Configuration error, e.g. missing required configuration
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Wifi(msg) => write!(f, "WiFi stack error: {msg}"),
            Error::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

/// WiFi controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Enable the WiFi interface
    Enable,

    /// Disable the WiFi interface
    Disable,

    /// Start one station association attempt (STA only)
    Connect,
}

/// WiFi interface status, acknowledging a control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// WiFi interface is enabled
    Enabled,

    /// WiFi interface is disabled
    Disabled,
}

/// Station link transitions, published independently of control
/// acknowledgements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Association succeeded
    Up,

    /// Association failed, or an established link dropped
    Down,

    /// The station interface was disabled while a link operation was
    /// outstanding
    Stopped,
}

/// Type of WiFi interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiType {
    Sta,
    Ap,
}

// Signals used to command the Wifi controller and to provide notifications
// about changes in WiFi state.  Used internally, with [`Wifi`] wrapping
// them.
static CONTROL_STA: Signal<CriticalSectionRawMutex, Control> = Signal::new();
static CONTROL_AP: Signal<CriticalSectionRawMutex, Control> = Signal::new();
static STATUS_STA: Signal<CriticalSectionRawMutex, Status> = Signal::new();
static STATUS_AP: Signal<CriticalSectionRawMutex, Status> = Signal::new();
static STA_LINK: Signal<CriticalSectionRawMutex, LinkEvent> = Signal::new();

// Replacement station credentials, picked up by the controller task before
// the next enable/connect.
static STA_RECONFIG: BlockingMutex<CriticalSectionRawMutex, RefCell<Option<ClientConfiguration>>> =
    BlockingMutex::new(RefCell::new(None));

/// Configuration for a WiFi interface.  For an AP, ensure the password is
/// at least 8 characters long, otherwise esp-wifi will return an error.
// Do not derive Debug as there appears to be a bug in the embassy-net
// crate leading to a crash when trying to print the Debug representation
// of (Net)Config
#[derive(Clone)]
pub struct InterfaceConfig {
    /// SSID of the WiFi network
    pub ssid: String,

    /// Password for the WiFi network
    pub password: String,

    /// Network configuration for the WiFi interface.  Either a static IP
    /// or DHCP configuration.  It is likely you want to use static IP for
    /// an AP interface.
    pub net: NetConfig,
}

impl core::fmt::Debug for InterfaceConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // DO NOT output net
        f.debug_struct("InterfaceConfig")
            .field("ssid", &self.ssid)
            .finish()
    }
}

/// Builder for the WiFi interface.  Use [`Wifi::builder`] to create a new
/// instance of this builder.
#[derive(Default)]
pub struct WifiBuilder<const STA: usize, const AP: usize> {
    sta_config: Option<InterfaceConfig>,
    ap_config: Option<InterfaceConfig>,
    sta_stack_resources: Option<&'static mut StackResources<STA>>,
    ap_stack_resources: Option<&'static mut StackResources<AP>>,
}

impl<const STA: usize, const AP: usize> WifiBuilder<STA, AP> {
    fn new() -> Self {
        Self::default()
    }

    /// Adds a STA (station) interface configuration to the builder.
    pub fn with_sta_if(
        mut self,
        config: InterfaceConfig,
        stack_resources: &'static mut StackResources<STA>,
    ) -> Self {
        self.sta_config = Some(config);
        self.sta_stack_resources = Some(stack_resources);
        self
    }

    /// Adds an AP (access point) interface configuration to the builder.
    pub fn with_ap_if(
        mut self,
        config: InterfaceConfig,
        stack_resources: &'static mut StackResources<AP>,
    ) -> Self {
        self.ap_config = Some(config);
        self.ap_stack_resources = Some(stack_resources);
        self
    }

    /// Builds the WiFi interface with the specified configurations.
    ///
    /// After this function you likely want to call [`Wifi::must_spawn`] to
    /// start the various networking and WiFi tasks.
    pub fn build(
        self,
        spawner: &Spawner,
        timg0: TIMG0<'static>,
        rng: RNG<'static>,
        wifi: WIFI<'static>,
    ) -> Result<Wifi, Error> {
        let mut wifi_obj = Wifi::new(spawner);
        wifi_obj.init(
            timg0,
            rng,
            wifi,
            self.sta_config,
            self.ap_config,
            self.sta_stack_resources,
            self.ap_stack_resources,
        )?;
        Ok(wifi_obj)
    }
}

/// Main WiFi object.  Uses `esp-wifi` and `embassy-net`.
///
/// See the module documentation for an example of creating and starting
/// WiFi using this object.
pub struct Wifi {
    spawner: Spawner,
    controller: Option<WifiController<'static>>,
    rng: Option<Rng>,
    sta_client_config: Option<ClientConfiguration>,
    ap_point_config: Option<AccessPointConfiguration>,
    sta_stack: Option<Stack<'static>>,
    ap_stack: Option<Stack<'static>>,
    sta_runner: Option<Runner<'static, WifiDevice<'static>>>,
    ap_runner: Option<Runner<'static, WifiDevice<'static>>>,
}

impl Wifi {
    /// Creates a new WiFi builder with the specified resource (socket)
    /// sizes for STA and AP interfaces.
    pub fn builder<const STA: usize, const AP: usize>() -> WifiBuilder<STA, AP> {
        WifiBuilder::new()
    }

    fn new(spawner: &Spawner) -> Self {
        Self {
            spawner: *spawner,
            controller: None,
            rng: None,
            sta_client_config: None,
            ap_point_config: None,
            sta_stack: None,
            ap_stack: None,
            sta_runner: None,
            ap_runner: None,
        }
    }

    // Initializes the WiFi controller and creates the WiFi interfaces (AP
    // and STA).
    #[allow(clippy::too_many_arguments)]
    fn init<const STA: usize, const AP: usize>(
        &mut self,
        timg0: TIMG0<'static>,
        rng: RNG<'static>,
        wifi: WIFI<'static>,
        sta_config: Option<InterfaceConfig>,
        ap_config: Option<InterfaceConfig>,
        sta_stack_resources: Option<&'static mut StackResources<STA>>,
        ap_stack_resources: Option<&'static mut StackResources<AP>>,
    ) -> Result<(), Error> {
        // Set up the peripherals for WiFi
        let timg0 = TimerGroup::new(timg0);
        let mut rng = Rng::new(rng);
        self.rng = Some(rng);

        // Create and configure the WiFi controller.
        // Use &* to make the mutable reference that make_static! returns
        // immutable, which is what esp_wifi expects.
        let esp_wifi_ctrl = &*make_static!(
            esp_wifi::init(timg0.timer0, rng)
                .map_err(|e| Error::Wifi(format!("Failed to initialize esp-wifi: {e:?}")))?
        );
        let (mut controller, interfaces) = esp_wifi::wifi::new(esp_wifi_ctrl, wifi)
            .map_err(|e| Error::Wifi(format!("Failed to create WiFi interfaces: {e:?}")))?;

        // Configure and store the controller
        self.configure_wifi(&mut controller, sta_config.as_ref(), ap_config.as_ref())?;
        self.controller = Some(controller);

        // Set up the the STA interface, if configured.
        if let Some(sta_config) = sta_config {
            debug!(
                "Info:  Configuring STA interface with SSID: {}",
                sta_config.ssid
            );
            let sta_seed = (rng.random() as u64) << 32 | rng.random() as u64;
            let (sta_stack, sta_runner) = embassy_net::new(
                interfaces.sta,
                sta_config.net.clone(),
                sta_stack_resources.expect("STA stack resources not provided"),
                sta_seed,
            );
            self.sta_stack = Some(sta_stack);
            self.sta_runner = Some(sta_runner);
        }

        // Set up the AP interface, if configured.
        if let Some(ap_config) = ap_config {
            debug!(
                "Info:  Configuring AP interface with SSID: {}",
                ap_config.ssid
            );
            let ap_seed = (rng.random() as u64) << 32 | rng.random() as u64;
            let (ap_stack, ap_runner) = embassy_net::new(
                interfaces.ap,
                ap_config.net.clone(),
                ap_stack_resources.expect("AP stack resources not provided"),
                ap_seed,
            );
            self.ap_stack = Some(ap_stack);
            self.ap_runner = Some(ap_runner);
        }

        Ok(())
    }

    // Builds and applies the initial WiFi configuration, keeping copies so
    // the controller task can re-apply it when the station credentials
    // change.
    fn configure_wifi(
        &mut self,
        controller: &mut WifiController<'static>,
        sta_if: Option<&InterfaceConfig>,
        ap_if: Option<&InterfaceConfig>,
    ) -> Result<(), Error> {
        // Avoid power saving mode for more reliable WiFi
        controller
            .set_power_saving(esp_wifi::config::PowerSaveMode::None)
            .inspect_err(|e| {
                error!("Error: Failed to set power WiFi saving mode {e:?}");
            })
            .ok();

        self.sta_client_config = sta_if.map(|sta_if| ClientConfiguration {
            ssid: sta_if.ssid.clone(),
            password: sta_if.password.clone(),
            ..Default::default()
        });
        self.ap_point_config = ap_if.map(|ap_if| AccessPointConfiguration {
            ssid: ap_if.ssid.clone(),
            password: ap_if.password.clone(),
            channel: AP_CHANNEL,
            max_connections: MAX_AP_CONNECTIONS,
            auth_method: esp_wifi::wifi::AuthMethod::WPA2Personal,
            ssid_hidden: false,
            secondary_channel: None,
            ..Default::default()
        });

        let config = match compose_configuration(
            self.sta_client_config.as_ref(),
            self.ap_point_config.as_ref(),
        ) {
            Some(config) => config,
            None => return Ok(()), // No config
        };

        controller
            .set_configuration(&config)
            .inspect(|_| trace!("Ok:    WiFi configuration set successfully"))
            .inspect_err(|e| {
                warn!("Error: Failed to set WiFi configuration: {e:?}");
            })
            .map_err(|e| Error::Wifi(format!("Failed to set WiFi configuration: {e:?}")))
    }

    /// Spawns the WiFi and networking tasks.  Networking tasks are spawned
    /// first, so they are ready to handle events when the WiFi connection
    /// is established.
    ///
    /// Uses `Spawner::must_spawn` to ensure that the tasks are spawned or
    /// panics.
    pub fn must_spawn(&mut self) {
        // Start the STA runner
        if self.sta_runner.is_some() {
            let sta_runner = self.sta_runner.take().unwrap();
            self.spawner.must_spawn(net_task(sta_runner));
        }

        // Start the AP runner
        if self.ap_runner.is_some() {
            let ap_runner = self.ap_runner.take().unwrap();
            self.spawner.must_spawn(net_task(ap_runner));
        }

        // Start the WiFi controller task
        let controller = self
            .controller
            .take()
            .expect("WiFi controller not initialized");
        self.spawner.must_spawn(wifi_controller(
            controller,
            self.sta_client_config.clone(),
            self.ap_point_config.clone(),
        ));
    }

    /// Waits for the acknowledgement of a control sent with
    /// [`Self::control`].
    pub async fn wait_for_control_update(&self, wifi_type: WifiType) -> Status {
        match wifi_type {
            WifiType::Sta => STATUS_STA.wait().await,
            WifiType::Ap => STATUS_AP.wait().await,
        }
    }

    /// Sends a control to the WiFi interface (STA or AP).  Use
    /// [`Self::wait_for_control_update`] to wait for Enable/Disable to be
    /// acknowledged; `Connect` is not acknowledged with a status - its
    /// outcome arrives as a [`LinkEvent`].
    pub fn control(&self, wifi_type: WifiType, control: Control) {
        match wifi_type {
            WifiType::Sta => CONTROL_STA.signal(control),
            WifiType::Ap => CONTROL_AP.signal(control),
        }
    }

    /// Sends an Enable/Disable control and waits for its acknowledgement.
    /// Acknowledged even when the interface was already in the requested
    /// state, so this is safe to call repeatedly.
    pub async fn control_and_wait(&self, wifi_type: WifiType, control: Control) -> Status {
        self.control(wifi_type, control);
        self.wait_for_control_update(wifi_type).await
    }

    /// Waits for the next station link transition.
    pub async fn sta_link_event(&self) -> LinkEvent {
        STA_LINK.wait().await
    }

    /// Drops any undelivered station link event.  Useful before starting
    /// a fresh association sequence.
    pub fn clear_sta_link_events(&self) {
        STA_LINK.reset();
    }

    /// Replaces the station credentials.  Applied by the controller task
    /// before the next enable/connect on the STA interface.
    pub fn set_sta_credentials(&self, ssid: String, password: String) {
        let config = ClientConfiguration {
            ssid,
            password,
            ..Default::default()
        };
        STA_RECONFIG.lock(|cell| *cell.borrow_mut() = Some(config));
    }

    /// Returns a copy of the RNG handed to the radio, for callers that
    /// need entropy (e.g. token generation).
    pub fn rng(&self) -> Rng {
        self.rng.expect("WiFi not initialized")
    }

    /// Gets the networking stack for the specified WiFi type.
    pub fn net_stack(&self, wifi_type: WifiType) -> Option<Stack<'static>> {
        match wifi_type {
            WifiType::Sta => self.sta_stack,
            WifiType::Ap => self.ap_stack,
        }
    }

    /// Waits for a network stack link up status for the specified WiFi
    /// type.
    pub async fn wait_for_link_up(&self, wifi_type: WifiType) -> Result<(), Error> {
        let net_stack = match wifi_type {
            WifiType::Sta => self.sta_stack.as_ref(),
            WifiType::Ap => self.ap_stack.as_ref(),
        }
        .ok_or(Error::Config(format!(
            "Network stack for WiFi {wifi_type:?} not configured"
        )))?;
        wait_for_wifi_connection(net_stack).await;
        Ok(())
    }

    /// Waits for an IPv4 address to be assigned for the specified WiFi
    /// type.  Useful when using DHCP to obtain an IP address.
    pub async fn wait_for_ipv4(&self, wifi_type: WifiType) -> Result<StaticConfigV4, Error> {
        let net_stack = match wifi_type {
            WifiType::Sta => self.sta_stack.as_ref(),
            WifiType::Ap => self.ap_stack.as_ref(),
        }
        .ok_or(Error::Config(format!(
            "Network stack for WiFi {wifi_type:?} not configured"
        )))?;
        Ok(wait_for_ipv4(net_stack).await)
    }
}

// Station sub-state tracked by the controller task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StaState {
    // No association outstanding or established.
    Idle,

    // A Connect control was received; an association attempt should run.
    ConnectRequested,

    // Associated.
    Connected,
}

// Future to handle connecting to or waiting for disconnect from the
// station interface.  Having a single async function allows this call to
// be put in a single select arm.
//
// This function also publishes the station link events.
async fn sta_future(
    controller: &mut WifiController<'_>,
    wifi_mode: Option<WifiMode>,
    sta_state: StaState,
) -> StaState {
    let sta_active = matches!(wifi_mode, Some(WifiMode::Sta | WifiMode::ApSta));
    if !sta_active {
        return pending().await;
    }

    match sta_state {
        StaState::ConnectRequested => {
            info!("Exec:  Connecting WiFi station");
            match controller.connect_async().await {
                Ok(()) => {
                    STA_LINK.signal(LinkEvent::Up);
                    StaState::Connected
                }
                Err(e) => {
                    debug!("Info:  WiFi station association failed: {e:?}");
                    STA_LINK.signal(LinkEvent::Down);
                    StaState::Idle
                }
            }
        }
        StaState::Connected => {
            controller
                .wait_for_all_events(WifiEvent::StaDisconnected.into(), false)
                .await;
            warn!("Warn:  WiFi station disconnected");
            STA_LINK.signal(LinkEvent::Down);
            StaState::Idle
        }
        StaState::Idle => pending().await,
    }
}

// Handles starting and stopping STA and AP interfaces on demand, and
// drives station association attempts.
#[embassy_executor::task]
async fn wifi_controller(
    mut controller: WifiController<'static>,
    mut sta_config: Option<ClientConfiguration>,
    ap_config: Option<AccessPointConfiguration>,
) -> ! {
    debug!(
        "Info:  WiFi device capabilities: {:?}",
        controller.capabilities()
    );

    let mut wifi_mode: Option<WifiMode> = None;
    let mut sta_state = StaState::Idle;

    loop {
        // Single select to detect:
        // - Control signal for the STA interface
        // - Control signal for the AP interface
        // - Completion of a station link operation
        let (control, wifi_type) = match select3(
            CONTROL_STA.wait(),
            CONTROL_AP.wait(),
            sta_future(&mut controller, wifi_mode, sta_state),
        )
        .await
        {
            Either3::First(control) => (control, WifiType::Sta),
            Either3::Second(control) => (control, WifiType::Ap),
            Either3::Third(next_state) => {
                sta_state = next_state;
                continue;
            }
        };
        debug!("Info:  WiFi control signal received: {control:?} {wifi_type:?}");

        // Connect is a station-only control and does not change the mode.
        if control == Control::Connect {
            if wifi_type != WifiType::Sta {
                warn!("Warning: Connect control ignored for AP interface");
                continue;
            }
            apply_sta_reconfig(&mut controller, &mut sta_config, ap_config.as_ref());
            sta_state = StaState::ConnectRequested;
            continue;
        }

        // If we get here, a new WiFi mode has been requested - figure out
        // what
        let new_wifi_mode = match control {
            Control::Enable => enable_mode(wifi_mode, wifi_type),
            Control::Disable => disable_mode(wifi_mode, wifi_type),
            Control::Connect => unreachable!(),
        };
        debug!("Info:  Old WiFi mode {wifi_mode:?} new WiFi mode: {new_wifi_mode:?}");

        if new_wifi_mode != wifi_mode {
            // Pick up replacement station credentials before the radio
            // comes back up.
            if wifi_type == WifiType::Sta && control == Control::Enable {
                apply_sta_reconfig(&mut controller, &mut sta_config, ap_config.as_ref());
            }

            let result = reconfigure_wifi(&mut controller, new_wifi_mode)
                .await
                .inspect_err(|e| {
                    warn!("Error: Failed to reconfigure WiFi: {e}");
                });
            if result.is_err() {
                continue;
            }
            wifi_mode = new_wifi_mode;
        } else {
            debug!("Info:  WiFi mode unchanged");
        }

        // A disabled station has no outstanding link operation.  Anyone
        // waiting on a link event needs to hear that it was called off.
        if wifi_type == WifiType::Sta && control == Control::Disable {
            if sta_state != StaState::Idle {
                STA_LINK.signal(LinkEvent::Stopped);
            }
            sta_state = StaState::Idle;
        }

        // Always acknowledge, even when the mode did not change - controls
        // must be idempotent from the caller's perspective.
        match (control, wifi_type) {
            (Control::Enable, WifiType::Sta) => STATUS_STA.signal(Status::Enabled),
            (Control::Disable, WifiType::Sta) => STATUS_STA.signal(Status::Disabled),
            (Control::Enable, WifiType::Ap) => STATUS_AP.signal(Status::Enabled),
            (Control::Disable, WifiType::Ap) => STATUS_AP.signal(Status::Disabled),
            (Control::Connect, _) => unreachable!(),
        }
    }
}

// Applies any replacement station credentials left by
// `Wifi::set_sta_credentials`.
fn apply_sta_reconfig(
    controller: &mut WifiController<'static>,
    sta_config: &mut Option<ClientConfiguration>,
    ap_config: Option<&AccessPointConfiguration>,
) {
    let fresh = STA_RECONFIG.lock(|cell| cell.borrow_mut().take());
    let Some(fresh) = fresh else {
        return;
    };

    debug!("Info:  Applying new STA credentials for SSID: {}", fresh.ssid);
    *sta_config = Some(fresh);

    if let Some(config) = compose_configuration(sta_config.as_ref(), ap_config) {
        if let Err(e) = controller.set_configuration(&config) {
            warn!("Error: Failed to apply STA credentials: {e:?}");
        }
    }
}

// Builds the esp-wifi Configuration from the interface configs.
fn compose_configuration(
    sta: Option<&ClientConfiguration>,
    ap: Option<&AccessPointConfiguration>,
) -> Option<Configuration> {
    match (sta, ap) {
        (Some(sta), Some(ap)) => Some(Configuration::Mixed(sta.clone(), ap.clone())),
        (Some(sta), None) => Some(Configuration::Client(sta.clone())),
        (None, Some(ap)) => Some(Configuration::AccessPoint(ap.clone())),
        (None, None) => None,
    }
}

// Figures out what combination of interfaces is required when an enable
// control signal is received.
fn enable_mode(current: Option<WifiMode>, target: WifiType) -> Option<WifiMode> {
    match (current, target) {
        (None, WifiType::Sta) => Some(WifiMode::Sta),
        (None, WifiType::Ap) => Some(WifiMode::Ap),
        (Some(WifiMode::Sta), WifiType::Ap) => Some(WifiMode::ApSta),
        (Some(WifiMode::Ap), WifiType::Sta) => Some(WifiMode::ApSta),
        (current, _) => current, // Already enabled
    }
}

// Figures out what combination of interfaces is required when a disable
// control signal is received.
fn disable_mode(current: Option<WifiMode>, target: WifiType) -> Option<WifiMode> {
    match (current, target) {
        (Some(WifiMode::Sta), WifiType::Sta) => None,
        (Some(WifiMode::Ap), WifiType::Ap) => None,
        (Some(WifiMode::ApSta), WifiType::Sta) => Some(WifiMode::Ap),
        (Some(WifiMode::ApSta), WifiType::Ap) => Some(WifiMode::Sta),
        (current, _) => current, // Already disabled or not applicable
    }
}

// Perform the requested WiFi reconfiguration
async fn reconfigure_wifi(
    controller: &mut WifiController<'static>,
    new_wifi_mode: Option<WifiMode>,
) -> Result<(), Error> {
    // Stop the controller
    match controller.is_started() {
        Ok(true) => {
            info!("Exec:  Stopping WiFi for reconfiguration");
            match controller.stop_async().await {
                Ok(_) => debug!("Ok:    WiFi stopped"),
                Err(e) => return Err(Error::Wifi(format!("Failed to stop WiFi: {e:?}"))),
            }
        }
        Ok(false) => trace!("Info:  WiFi already stopped"),
        Err(e) => return Err(Error::Wifi(format!("Failed to check WiFi state: {e:?}"))),
    }

    // New mode is Some
    if let Some(new_wifi_mode) = new_wifi_mode {
        // Reconfigure it
        match controller.set_mode(new_wifi_mode) {
            Ok(()) => debug!("Ok:    WiFi mode set to {new_wifi_mode:?}"),
            Err(e) => return Err(Error::Wifi(format!("Failed to set WiFi mode: {e:?}"))),
        }

        // Start the controller
        match controller.start_async().await {
            Ok(_) => info!("Ok:    WiFi started in mode {new_wifi_mode:?}"),
            Err(e) => return Err(Error::Wifi(format!("Failed to start WiFi: {e:?}"))),
        }
    } else {
        debug!("Info:  WiFi mode disabled, not starting controller");
    }

    Ok(())
}

// Pool size of 2 required, one for STA, one for AP
#[embassy_executor::task(pool_size = 2)]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

/// This function waits for a WiFi connection
async fn wait_for_wifi_connection(net_stack: &Stack<'static>) {
    loop {
        if net_stack.is_link_up() {
            break;
        }
        Timer::after_millis(100).await;
    }
}

/// This function waits for an IP address to be assigned
async fn wait_for_ipv4(net_stack: &Stack<'static>) -> StaticConfigV4 {
    loop {
        // Wait for the network stack to receive valid IP configuration
        net_stack.wait_config_up().await;
        if let Some(config) = net_stack.config_v4() {
            info!("OK:    Received IP {}", config.address);
            return config;
        }
        Timer::after_millis(100).await;
    }
}
