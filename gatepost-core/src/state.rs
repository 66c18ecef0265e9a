// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost-core - Provisioning session state machine
//!
//! One authoritative [`SetupState`] value plus the association retry
//! counter, owned by a [`SetupEngine`].  Every mutation goes through
//! [`SetupEngine::apply`], which either performs a legal transition,
//! reports a documented no-op, or rejects the event.

/// Number of re-association attempts made after the initial attempt before
/// a connection is declared failed.
pub const MAX_CONNECT_RETRIES: u8 = 3;

/// The provisioning session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SetupState {
    /// Nothing running.  Initial state on every boot.
    Idle,

    /// The setup access point and portal are serving.
    PortalRunning,

    /// Station association in progress (including retries).
    Connecting,

    /// Associated and holding an IPv4 address.
    Connected,

    /// Association retries exhausted; cleanup pending.
    Failed,

    /// Radio released.  Re-enterable via a new connect or portal start.
    Disabled,
}

/// Events that drive the state machine.  Radio-originated events
/// (`Disassociated`, `AddressAcquired`) may arrive in states where they no
/// longer apply; those degrade to [`Applied::Ignored`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupEvent {
    StartPortal,
    StopPortal,
    StartConnect,
    Disassociated,
    AddressAcquired,
    CleanupDone,
    Disconnect,
}

/// What an accepted event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Transitioned into the given state.
    Entered(SetupState),

    /// Stayed in `Connecting`; this is re-association attempt `n`.
    Retry(u8),

    /// The event does not apply in the current state.  Not an error: the
    /// state changed before the event was delivered.
    Ignored,
}

/// The event is not legal in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub state: SetupState,
    pub event: SetupEvent,
}

/// Owner of the session state and retry counter.
#[derive(Debug)]
pub struct SetupEngine {
    state: SetupState,
    retries: u8,
}

impl SetupEngine {
    pub const fn new() -> Self {
        Self {
            state: SetupState::Idle,
            retries: 0,
        }
    }

    pub fn state(&self) -> SetupState {
        self.state
    }

    pub fn retries(&self) -> u8 {
        self.retries
    }

    /// Applies `event` to the current state.
    pub fn apply(&mut self, event: SetupEvent) -> Result<Applied, InvalidTransition> {
        use SetupEvent::*;
        use SetupState::*;

        let applied = match (self.state, event) {
            (Idle | Disabled | Failed, StartPortal) => self.enter(PortalRunning),
            (_, StartPortal) => return Err(self.invalid(event)),

            (PortalRunning, StopPortal) => self.enter(Idle),
            // Safe to call when no portal is running.
            (_, StopPortal) => Applied::Ignored,

            // The already-connected guard sits with the caller, which can
            // report it as an error rather than a transition problem.
            (Connected, StartConnect) => return Err(self.invalid(event)),
            (_, StartConnect) => {
                self.retries = 0;
                self.enter(Connecting)
            }

            (Connecting, Disassociated) if self.retries < MAX_CONNECT_RETRIES => {
                self.retries += 1;
                Applied::Retry(self.retries)
            }
            (Connecting | Connected, Disassociated) => self.enter(Failed),
            (_, Disassociated) => Applied::Ignored,

            (Connecting, AddressAcquired) => {
                self.retries = 0;
                self.enter(Connected)
            }
            (_, AddressAcquired) => Applied::Ignored,

            (Failed, CleanupDone) => self.enter(Disabled),
            (_, CleanupDone) => Applied::Ignored,

            (Disabled, Disconnect) => Applied::Ignored,
            (_, Disconnect) => self.enter(Disabled),
        };

        Ok(applied)
    }

    fn enter(&mut self, next: SetupState) -> Applied {
        self.state = next;
        Applied::Entered(next)
    }

    fn invalid(&self, event: SetupEvent) -> InvalidTransition {
        InvalidTransition {
            state: self.state,
            event,
        }
    }
}

impl Default for SetupEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_to_portal_to_connecting() {
        let mut engine = SetupEngine::new();
        assert_eq!(engine.state(), SetupState::Idle);

        let applied = engine.apply(SetupEvent::StartPortal).unwrap();
        assert_eq!(applied, Applied::Entered(SetupState::PortalRunning));

        // Credential submission hands off: portal stops, connect starts.
        engine.apply(SetupEvent::StopPortal).unwrap();
        assert_eq!(engine.state(), SetupState::Idle);
        engine.apply(SetupEvent::StartConnect).unwrap();
        assert_eq!(engine.state(), SetupState::Connecting);
    }

    #[test]
    fn portal_rejected_while_connecting() {
        let mut engine = SetupEngine::new();
        engine.apply(SetupEvent::StartConnect).unwrap();
        let err = engine.apply(SetupEvent::StartPortal).unwrap_err();
        assert_eq!(err.state, SetupState::Connecting);
        assert_eq!(engine.state(), SetupState::Connecting);
    }

    #[test]
    fn exactly_three_retries_then_failed() {
        let mut engine = SetupEngine::new();
        engine.apply(SetupEvent::StartConnect).unwrap();

        for expected in 1..=MAX_CONNECT_RETRIES {
            let applied = engine.apply(SetupEvent::Disassociated).unwrap();
            assert_eq!(applied, Applied::Retry(expected));
            assert_eq!(engine.state(), SetupState::Connecting);
        }

        // The fourth disassociation exhausts the retries.
        let applied = engine.apply(SetupEvent::Disassociated).unwrap();
        assert_eq!(applied, Applied::Entered(SetupState::Failed));

        let applied = engine.apply(SetupEvent::CleanupDone).unwrap();
        assert_eq!(applied, Applied::Entered(SetupState::Disabled));
    }

    #[test]
    fn address_acquired_resets_retries() {
        let mut engine = SetupEngine::new();
        engine.apply(SetupEvent::StartConnect).unwrap();
        engine.apply(SetupEvent::Disassociated).unwrap();
        engine.apply(SetupEvent::Disassociated).unwrap();
        assert_eq!(engine.retries(), 2);

        let applied = engine.apply(SetupEvent::AddressAcquired).unwrap();
        assert_eq!(applied, Applied::Entered(SetupState::Connected));
        assert_eq!(engine.retries(), 0);
    }

    #[test]
    fn disassociation_while_connected_fails() {
        let mut engine = SetupEngine::new();
        engine.apply(SetupEvent::StartConnect).unwrap();
        engine.apply(SetupEvent::AddressAcquired).unwrap();

        let applied = engine.apply(SetupEvent::Disassociated).unwrap();
        assert_eq!(applied, Applied::Entered(SetupState::Failed));
    }

    #[test]
    fn stop_portal_is_idempotent() {
        let mut engine = SetupEngine::new();
        engine.apply(SetupEvent::StartPortal).unwrap();
        assert_eq!(
            engine.apply(SetupEvent::StopPortal).unwrap(),
            Applied::Entered(SetupState::Idle)
        );
        assert_eq!(
            engine.apply(SetupEvent::StopPortal).unwrap(),
            Applied::Ignored
        );
        assert_eq!(engine.state(), SetupState::Idle);
    }

    #[test]
    fn disconnect_from_idle_lands_in_disabled() {
        let mut engine = SetupEngine::new();
        assert_eq!(
            engine.apply(SetupEvent::Disconnect).unwrap(),
            Applied::Entered(SetupState::Disabled)
        );
        // And again: no error, still Disabled.
        assert_eq!(
            engine.apply(SetupEvent::Disconnect).unwrap(),
            Applied::Ignored
        );
        assert_eq!(engine.state(), SetupState::Disabled);
    }

    #[test]
    fn connect_while_connected_rejected() {
        let mut engine = SetupEngine::new();
        engine.apply(SetupEvent::StartConnect).unwrap();
        engine.apply(SetupEvent::AddressAcquired).unwrap();
        assert!(engine.apply(SetupEvent::StartConnect).is_err());
        assert_eq!(engine.state(), SetupState::Connected);
    }

    #[test]
    fn failed_and_disabled_are_reenterable() {
        let mut engine = SetupEngine::new();
        engine.apply(SetupEvent::StartConnect).unwrap();
        for _ in 0..=MAX_CONNECT_RETRIES {
            engine.apply(SetupEvent::Disassociated).unwrap();
        }
        assert_eq!(engine.state(), SetupState::Failed);
        engine.apply(SetupEvent::StartPortal).unwrap();
        assert_eq!(engine.state(), SetupState::PortalRunning);

        engine.apply(SetupEvent::Disconnect).unwrap();
        assert_eq!(engine.state(), SetupState::Disabled);
        engine.apply(SetupEvent::StartConnect).unwrap();
        assert_eq!(engine.state(), SetupState::Connecting);
    }

    #[test]
    fn stale_radio_events_are_ignored() {
        let mut engine = SetupEngine::new();
        assert_eq!(
            engine.apply(SetupEvent::Disassociated).unwrap(),
            Applied::Ignored
        );
        assert_eq!(
            engine.apply(SetupEvent::AddressAcquired).unwrap(),
            Applied::Ignored
        );
        assert_eq!(engine.state(), SetupState::Idle);
    }
}
