//! Loco acquisition manager: four slots, each with its own acquisition
//! state machine, driven by key presses and polled network results.
//!
//! # Overview
//!
//! [`LocoManager`] owns the four [`LocoSlot`]s, the layout server link and
//! the debounced keys. Nothing here blocks: acquire requests are sent
//! once and their outcome is picked up by [`request_loco`] on a later poll,
//! so the slot's state *is* the suspension point.
//!
//! # Main Loop
//!
//! ```rust
//! use rs_wireless_throttle::{Config, LocoConfig, LocoManager, RequestStatus, SlotState};
//! use rs_wireless_throttle::analog::SpeedSignal;
//! use rs_wireless_throttle::hal::{MockInputs, MockServer};
//! use rs_wireless_throttle::traits::Key;
//!
//! let config = Config::default().with_loco(0, LocoConfig::default().with_address(3, false));
//! let server = MockServer::auto_resolve(1, RequestStatus::Success);
//! let mut manager = LocoManager::new(server, MockInputs::new(), &config.locos).unwrap();
//! let signal = SpeedSignal::new();
//!
//! manager.inputs_mut().press(Key::Loco1);
//! for _ in 0..3 {
//!     manager.poll();
//!     if signal.speed_triggered() {
//!         manager.drive(signal.read_speed());
//!     }
//! }
//!
//! assert_eq!(manager.slot(0).state(), SlotState::Online);
//! assert_eq!(manager.loco_running(), [true, false, false, false]);
//! ```
//!
//! # Releasing While Acquiring
//!
//! A slot abandoned while its acquire is still pending goes `Offline`
//! straight away. The pending handle is kept as a stale acquisition and
//! polled by [`request_loco`]; if the server grants it after all, the
//! address is released right then. A new acquisition on that slot waits
//! until the stale one has resolved, so a late release can never hit the
//! new session.
//!
//! [`request_loco`]: LocoManager::request_loco

use log::{debug, info, warn};

use crate::analog::MAX_SPEED;
use crate::config::{ConfigError, LocoConfig};
use crate::loco::{
    FunctionMode, LocoAddress, LocoSlot, ReleaseKind, SlotState, StaleAcquire, LOCO_SLOTS,
};
use crate::traits::{DigitalInputs, Key, LocoServer, RequestStatus};

/// Acquisition manager for all loco slots.
///
/// # Type Parameters
///
/// - `S`: The layout server link ([`LocoServer`] trait)
/// - `I`: The debounced keys ([`DigitalInputs`] trait)
///
/// # Panics
///
/// Every method taking a slot index panics if it is not below
/// [`LOCO_SLOTS`]; an out-of-range slot is a caller bug.
pub struct LocoManager<S: LocoServer, I: DigitalInputs> {
    server: S,
    inputs: I,
    slots: [LocoSlot; LOCO_SLOTS],
    all_locos_off: bool,
    forward: bool,
}

impl<S: LocoServer, I: DigitalInputs> LocoManager<S, I> {
    /// Create a manager with every slot offline.
    pub fn new(
        server: S,
        inputs: I,
        locos: &[LocoConfig; LOCO_SLOTS],
    ) -> Result<Self, ConfigError> {
        let mut slots: [LocoSlot; LOCO_SLOTS] = Default::default();
        for (slot, (target, config)) in slots.iter_mut().zip(locos).enumerate() {
            *target = LocoSlot::from_config(config)
                .map_err(|error| ConfigError::InvalidAddress { slot, error })?;
        }
        Ok(Self {
            server,
            inputs,
            slots,
            all_locos_off: false,
            forward: true,
        })
    }

    /// One main-loop tick: keys, one pump step per slot, function mirroring.
    pub fn poll(&mut self) {
        self.handle_inputs();
        for slot in 0..LOCO_SLOTS {
            self.request_loco(slot);
        }
        self.sync_functions();
    }

    /// Consume key edges: emergency stop, direction, loco keys.
    pub fn handle_inputs(&mut self) {
        if self.inputs.input_pressed(Key::EStop) {
            self.set_all_locos_off(true);
        }
        if self.inputs.input_pressed(Key::Forward) {
            self.forward = true;
        }
        if self.inputs.input_pressed(Key::Reverse) {
            self.forward = false;
        }

        let shift = self.inputs.input_state(Key::Shift);
        for slot in 0..LOCO_SLOTS {
            if self.inputs.input_pressed(Key::loco(slot)) {
                self.press_loco(slot, shift);
            }
        }
    }

    /// Apply a loco key press to `slot`.
    ///
    /// | State | Press | Shift + press |
    /// |-------|-------|---------------|
    /// | `Offline` / `Connected` | `Acquiring` | `AcquiringSingle` |
    /// | `Acquiring*` | `Offline` | `Offline` |
    /// | `Online` | `Connected` (park) | `Offline` (drop) |
    pub fn press_loco(&mut self, slot: usize, shift: bool) {
        assert_slot(slot);
        match self.slots[slot].state {
            SlotState::Offline => match self.slots[slot].configured {
                Some(address) => self.begin_acquire(slot, address, shift),
                None => warn!("slot {}: no loco configured, ignoring key", slot + 1),
            },
            SlotState::Connected => {
                if let Some(address) = self.slots[slot].address {
                    self.begin_acquire(slot, address, shift);
                }
            }
            SlotState::Acquiring | SlotState::AcquiringSingle => self.abandon(slot),
            SlotState::Online => {
                let kind = if shift {
                    ReleaseKind::Drop
                } else {
                    ReleaseKind::Park
                };
                self.release(slot, kind);
            }
        }
    }

    /// Advance `slot`'s acquisition by at most one step.
    ///
    /// Returns `slot` while something is still in flight and `slot + 1` once
    /// the slot is settled (`Online`, `Connected` or `Offline`), so a caller
    /// can walk the slots with `while i < 4 { i = request_loco(i) }` spread
    /// over as many ticks as the network needs.
    pub fn request_loco(&mut self, slot: usize) -> usize {
        assert_slot(slot);

        if let Some(stale) = self.slots[slot].stale {
            match self.server.poll_result(stale.handle) {
                RequestStatus::Pending => return slot,
                RequestStatus::Success => {
                    info!(
                        "slot {}: late grant for {}, releasing",
                        slot + 1,
                        stale.address
                    );
                    self.server.send_release(stale.address);
                }
                RequestStatus::Failure if stale.held => {
                    info!(
                        "slot {}: abandoned re-acquire of {} failed, releasing",
                        slot + 1,
                        stale.address
                    );
                    self.server.send_release(stale.address);
                }
                RequestStatus::Failure => {
                    debug!("slot {}: abandoned acquire of {} failed", slot + 1, stale.address);
                }
            }
            self.slots[slot].stale = None;
            return slot;
        }

        match self.slots[slot].state {
            SlotState::Acquiring | SlotState::AcquiringSingle => self.step_acquire(slot),
            SlotState::Online | SlotState::Connected => {
                if let Some(address) = self.slots[slot].address {
                    if !self.server.session_alive(address) {
                        warn!("slot {}: session for {} lost", slot + 1, address);
                        self.slots[slot].set_offline();
                    }
                }
                slot + 1
            }
            SlotState::Offline => slot + 1,
        }
    }

    fn step_acquire(&mut self, slot: usize) -> usize {
        let Some(address) = self.slots[slot].address else {
            self.slots[slot].set_offline();
            return slot + 1;
        };

        let Some(handle) = self.slots[slot].pending else {
            let handle = self.server.send_acquire(address);
            debug!("slot {}: acquire {} sent ({:?})", slot + 1, address, handle);
            self.slots[slot].pending = Some(handle);
            return slot;
        };

        match self.server.poll_result(handle) {
            RequestStatus::Pending => slot,
            RequestStatus::Success => {
                self.go_online(slot, address);
                slot + 1
            }
            RequestStatus::Failure => {
                warn!("slot {}: acquire {} failed", slot + 1, address);
                if self.slots[slot].held {
                    // Still ours from before the re-activation
                    self.server.send_release(address);
                }
                self.slots[slot].set_offline();
                slot + 1
            }
        }
    }

    fn begin_acquire(&mut self, slot: usize, address: LocoAddress, exclusive: bool) {
        let s = &mut self.slots[slot];
        s.state = if exclusive {
            SlotState::AcquiringSingle
        } else {
            SlotState::Acquiring
        };
        s.address = Some(address);
        s.pending = None;
        s.running = false;
        info!("slot {}: acquiring {}", slot + 1, address);
    }

    fn go_online(&mut self, slot: usize, address: LocoAddress) {
        let exclusive = self.slots[slot].state == SlotState::AcquiringSingle;
        if exclusive {
            for other in 0..LOCO_SLOTS {
                if other == slot {
                    continue;
                }
                if self.is_running(other) {
                    if let Some(running) = self.slots[other].address {
                        let forward = self.direction_for(other);
                        self.server.send_speed(running, 0, forward);
                    }
                }
                self.slots[other].running = false;
            }
        }

        let s = &mut self.slots[slot];
        s.state = SlotState::Online;
        s.pending = None;
        s.held = true;
        s.running = true;
        info!("slot {}: {} online", slot + 1, address);

        self.apply_functions(slot, address);
    }

    /// Push the whole function map; only called on entering `Online`.
    fn apply_functions(&mut self, slot: usize, address: LocoAddress) {
        let functions = self.slots[slot].functions;
        let mut sent = 0u16;
        for (index, mode) in functions.iter() {
            let active = match mode {
                FunctionMode::AlwaysOn => true,
                FunctionMode::AlwaysOff => false,
                FunctionMode::Throttle => {
                    Key::function(index).is_some_and(|key| self.inputs.input_state(key))
                }
                FunctionMode::Unknown => continue,
            };
            self.server.send_function(address, index as u8, active);
            if active {
                sent |= 1 << index;
            }
        }
        self.slots[slot].sent_functions = sent;
    }

    /// Mirror function keys onto every online slot's throttle-linked
    /// functions, sending only what changed.
    pub fn sync_functions(&mut self) {
        for slot in 0..LOCO_SLOTS {
            let s = &self.slots[slot];
            if s.state != SlotState::Online {
                continue;
            }
            let Some(address) = s.address else {
                continue;
            };
            let functions = s.functions;
            let mut sent = s.sent_functions;

            for (index, mode) in functions.iter() {
                if mode != FunctionMode::Throttle {
                    continue;
                }
                let Some(key) = Key::function(index) else {
                    continue;
                };
                let level = self.inputs.input_state(key);
                let bit = 1u16 << index;
                if level != (sent & bit != 0) {
                    self.server.send_function(address, index as u8, level);
                    sent ^= bit;
                }
            }
            self.slots[slot].sent_functions = sent;
        }
    }

    /// Let go of `slot`.
    ///
    /// `Park` keeps an online loco addressed but stops driving it. `Drop`
    /// releases it on the server and forgets the address. Either kind
    /// cancels an acquisition in flight.
    pub fn release(&mut self, slot: usize, kind: ReleaseKind) {
        assert_slot(slot);
        let state = self.slots[slot].state;
        match state {
            SlotState::Offline => {}
            SlotState::Acquiring | SlotState::AcquiringSingle => self.abandon(slot),
            SlotState::Online | SlotState::Connected => {
                let Some(address) = self.slots[slot].address else {
                    self.slots[slot].set_offline();
                    return;
                };
                if state == SlotState::Online {
                    let forward = self.direction_for(slot);
                    self.server.send_speed(address, 0, forward);
                }
                match kind {
                    ReleaseKind::Park => {
                        let s = &mut self.slots[slot];
                        s.state = SlotState::Connected;
                        s.running = false;
                        info!("slot {}: {} parked", slot + 1, address);
                    }
                    ReleaseKind::Drop => {
                        self.server.send_release(address);
                        self.slots[slot].set_offline();
                        info!("slot {}: {} released", slot + 1, address);
                    }
                }
            }
        }
    }

    /// Cancel an acquisition: offline now, stale handle kept for cleanup.
    fn abandon(&mut self, slot: usize) {
        let s = &mut self.slots[slot];
        match (s.pending, s.address) {
            (Some(handle), Some(address)) => {
                s.stale = Some(StaleAcquire {
                    handle,
                    address,
                    held: s.held,
                });
            }
            (None, Some(address)) if s.held => {
                // Re-activation from Connected; we still own it
                self.server.send_release(address);
            }
            _ => {}
        }
        self.slots[slot].set_offline();
        info!("slot {}: acquisition cancelled", slot + 1);
    }

    /// Set or clear the all-locos-off emergency flag.
    ///
    /// Setting it sends speed 0 to every online loco once. Slot states are
    /// left alone; locos that were running resume when the flag clears.
    pub fn set_all_locos_off(&mut self, off: bool) {
        if off && !self.all_locos_off {
            warn!("emergency stop");
            for slot in 0..LOCO_SLOTS {
                let s = &self.slots[slot];
                if s.state != SlotState::Online {
                    continue;
                }
                if let Some(address) = s.address {
                    let forward = self.direction_for(slot);
                    self.server.send_speed(address, 0, forward);
                }
            }
        } else if !off && self.all_locos_off {
            info!("emergency stop cleared");
        }
        self.all_locos_off = off;
    }

    /// Send `speed` (clamped to 0..=126) to every running loco.
    ///
    /// While all locos are off nothing is sent; a speed of 0 clears the
    /// flag, so the knob has to come back to zero before locos move again.
    /// Returns the number of locos the speed was sent to.
    pub fn drive(&mut self, speed: u8) -> usize {
        let speed = speed.min(MAX_SPEED);
        if self.all_locos_off {
            if speed != 0 {
                return 0;
            }
            self.set_all_locos_off(false);
        }

        let mut sent = 0;
        for slot in 0..LOCO_SLOTS {
            if !self.is_running(slot) {
                continue;
            }
            if let Some(address) = self.slots[slot].address {
                let forward = self.direction_for(slot);
                self.server.send_speed(address, speed, forward);
                sent += 1;
            }
        }
        sent
    }

    fn direction_for(&self, slot: usize) -> bool {
        self.forward != self.slots[slot].reverse
    }

    /// Whether `slot` is effectively driven by the throttle.
    pub fn is_running(&self, slot: usize) -> bool {
        assert_slot(slot);
        let s = &self.slots[slot];
        s.running && s.state == SlotState::Online && !self.all_locos_off
    }

    /// Effective running flag per slot.
    pub fn loco_running(&self) -> [bool; LOCO_SLOTS] {
        core::array::from_fn(|slot| self.is_running(slot))
    }

    /// At least one slot is online.
    pub fn loco_active(&self) -> bool {
        self.slots.iter().any(|s| s.state == SlotState::Online)
    }

    /// Whether the all-locos-off emergency flag is set.
    pub fn all_locos_off(&self) -> bool {
        self.all_locos_off
    }

    /// Throttle direction (`true` = forward) before per-loco reversal.
    pub fn forward(&self) -> bool {
        self.forward
    }

    /// Set the throttle direction.
    pub fn set_forward(&mut self, forward: bool) {
        self.forward = forward;
    }

    /// One slot.
    pub fn slot(&self, slot: usize) -> &LocoSlot {
        assert_slot(slot);
        &self.slots[slot]
    }

    /// All slots.
    pub fn slots(&self) -> &[LocoSlot; LOCO_SLOTS] {
        &self.slots
    }

    /// The server link.
    pub fn server(&self) -> &S {
        &self.server
    }

    /// The server link, mutably.
    pub fn server_mut(&mut self) -> &mut S {
        &mut self.server
    }

    /// The key input.
    pub fn inputs(&self) -> &I {
        &self.inputs
    }

    /// The key input, mutably.
    pub fn inputs_mut(&mut self) -> &mut I {
        &mut self.inputs
    }

    /// Snapshot for status display.
    pub fn status(&self) -> ThrottleStatus {
        ThrottleStatus {
            slots: core::array::from_fn(|slot| SlotStatus {
                address: self.slots[slot].address,
                state: self.slots[slot].state,
                running: self.is_running(slot),
            }),
            loco_active: self.loco_active(),
            all_locos_off: self.all_locos_off,
            forward: self.forward,
        }
    }
}

#[inline]
fn assert_slot(slot: usize) {
    assert!(
        slot < LOCO_SLOTS,
        "loco slot {} out of range (0..{})",
        slot,
        LOCO_SLOTS
    );
}

/// Per-slot part of [`ThrottleStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotStatus {
    /// Held address, if any.
    pub address: Option<LocoAddress>,
    /// Acquisition state.
    pub state: SlotState,
    /// Effective running flag.
    pub running: bool,
}

/// Full state snapshot for LEDs, display or a status page.
///
/// # Example
///
/// ```rust
/// use rs_wireless_throttle::{Config, LocoManager, SlotState};
/// use rs_wireless_throttle::hal::{MockInputs, MockServer};
///
/// let manager = LocoManager::new(MockServer::new(), MockInputs::new(), &Config::default().locos).unwrap();
///
/// let status = manager.status();
/// assert!(!status.loco_active);
/// assert!(status.slots.iter().all(|s| s.state == SlotState::Offline));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThrottleStatus {
    /// One entry per slot.
    pub slots: [SlotStatus; LOCO_SLOTS],
    /// At least one slot is online.
    pub loco_active: bool,
    /// Emergency stop is in effect.
    pub all_locos_off: bool,
    /// Throttle direction.
    pub forward: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::hal::{MockInputs, MockServer};
    use crate::loco::FunctionMap;

    fn manager_with(locos: &[(usize, LocoConfig)]) -> LocoManager<MockServer, MockInputs> {
        let mut config = Config::default();
        for (slot, loco) in locos {
            config.locos[*slot] = *loco;
        }
        LocoManager::new(MockServer::new(), MockInputs::new(), &config.locos).unwrap()
    }

    fn addr(n: u16) -> LocoAddress {
        LocoAddress::short(n).unwrap()
    }

    #[test]
    fn new_rejects_invalid_address() {
        let mut config = Config::default();
        config.locos[1] = LocoConfig::default().with_address(300, false);
        let result = LocoManager::new(MockServer::new(), MockInputs::new(), &config.locos);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidAddress { slot: 1, .. })
        ));
    }

    #[test]
    fn press_without_configured_address_is_ignored() {
        let mut manager = manager_with(&[]);
        manager.press_loco(0, false);
        assert_eq!(manager.slot(0).state(), SlotState::Offline);
        assert_eq!(manager.request_loco(0), 1);
        assert!(manager.server().calls.is_empty());
    }

    #[test]
    fn acquire_request_sent_on_first_pump() {
        let mut manager = manager_with(&[(2, LocoConfig::default().with_address(7, false))]);
        manager.press_loco(2, false);
        assert_eq!(manager.slot(2).state(), SlotState::Acquiring);
        assert!(manager.server().calls.is_empty());

        assert_eq!(manager.request_loco(2), 2);
        assert_eq!(manager.server().acquires(), vec![addr(7)]);

        // Pending: no second request
        assert_eq!(manager.request_loco(2), 2);
        assert_eq!(manager.server().acquires().len(), 1);
    }

    #[test]
    fn functions_applied_on_online() {
        let functions = FunctionMap::all(FunctionMode::Unknown)
            .with(0, FunctionMode::Throttle)
            .with(1, FunctionMode::AlwaysOn)
            .with(2, FunctionMode::AlwaysOff)
            .with(10, FunctionMode::Throttle);
        let loco = LocoConfig::default()
            .with_address(3, false)
            .with_functions(functions);
        let mut manager = manager_with(&[(0, loco)]);
        manager.inputs_mut().hold(Key::F0);

        manager.press_loco(0, false);
        manager.request_loco(0);
        let handle = manager.server().last_handle().unwrap();
        manager.server_mut().resolve(handle, RequestStatus::Success);
        assert_eq!(manager.request_loco(0), 1);

        assert_eq!(
            manager.server().functions_for(addr(3)),
            vec![(0, true), (1, true), (2, false), (10, false)]
        );
        assert_eq!(manager.slot(0).sent_functions, 0b11);
    }

    #[test]
    fn sync_only_sends_changes() {
        let mut manager = manager_with(&[(0, LocoConfig::default().with_address(3, false))]);
        manager.press_loco(0, false);
        manager.request_loco(0);
        let handle = manager.server().last_handle().unwrap();
        manager.server_mut().resolve(handle, RequestStatus::Success);
        manager.request_loco(0);
        manager.server_mut().clear_calls();

        manager.sync_functions();
        assert!(manager.server().calls.is_empty());

        manager.inputs_mut().hold(Key::F4);
        manager.sync_functions();
        manager.sync_functions();
        assert_eq!(manager.server().functions_for(addr(3)), vec![(4, true)]);

        manager.inputs_mut().let_go(Key::F4);
        manager.sync_functions();
        assert_eq!(
            manager.server().functions_for(addr(3)),
            vec![(4, true), (4, false)]
        );
    }

    #[test]
    fn direction_respects_reverse_flag() {
        let mut manager = manager_with(&[(0, LocoConfig::default().with_reverse(true))]);
        assert!(manager.forward());
        assert!(!manager.direction_for(0));
        manager.set_forward(false);
        assert!(manager.direction_for(0));
        assert!(!manager.direction_for(1));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_slot_panics() {
        let mut manager = manager_with(&[]);
        manager.request_loco(LOCO_SLOTS);
    }
}
