//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for all hardware and network traits,
//! enabling development and testing on desktop without a throttle or a
//! layout server.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockFrontEnd`] | [`AnalogFrontEnd`] | Records channel selects and conversion starts |
//! | [`MockInputs`] | [`DigitalInputs`] | Scripted key levels and edges |
//! | [`MockServer`] | [`LocoServer`] | Records commands, scripted request results |
//!
//! # Example
//!
//! ```rust
//! use rs_wireless_throttle::{Config, LocoConfig, LocoManager, RequestStatus, SlotState};
//! use rs_wireless_throttle::hal::{MockInputs, MockServer};
//! use rs_wireless_throttle::traits::Key;
//!
//! let config = Config::default().with_loco(0, LocoConfig::default().with_address(3, false));
//! let mut manager = LocoManager::new(MockServer::new(), MockInputs::new(), &config.locos).unwrap();
//!
//! manager.inputs_mut().press(Key::Loco1);
//! manager.poll(); // key press -> Acquiring, acquire sent
//!
//! let handle = manager.server().last_handle().unwrap();
//! manager.server_mut().resolve(handle, RequestStatus::Success);
//! assert_eq!(manager.request_loco(0), 1);
//! assert_eq!(manager.slot(0).state(), SlotState::Online);
//! ```
//!
//! [`AnalogFrontEnd`]: crate::traits::AnalogFrontEnd
//! [`DigitalInputs`]: crate::traits::DigitalInputs
//! [`LocoServer`]: crate::traits::LocoServer

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::loco::LocoAddress;
use crate::traits::{
    AnalogFrontEnd, DigitalInputs, Key, LocoServer, MeasureMode, PendingHandle, RequestStatus,
};

// ============================================================================
// Hardware Mocks
// ============================================================================

/// Mock analog front end.
///
/// # Example
///
/// ```rust
/// use rs_wireless_throttle::hal::MockFrontEnd;
/// use rs_wireless_throttle::traits::{AnalogFrontEnd, MeasureMode};
///
/// let mut adc = MockFrontEnd::new();
/// adc.select_channel(MeasureMode::Battery);
/// adc.start_conversion();
///
/// assert_eq!(adc.selected, Some(MeasureMode::Battery));
/// assert_eq!(adc.conversions_started, 1);
/// ```
#[derive(Debug, Default)]
pub struct MockFrontEnd {
    /// Last selected input, `None` until the first select.
    pub selected: Option<MeasureMode>,
    /// Number of `select_channel` calls.
    pub channel_switches: usize,
    /// Number of `start_conversion` calls.
    pub conversions_started: usize,
}

impl MockFrontEnd {
    /// Creates a front end with nothing selected.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnalogFrontEnd for MockFrontEnd {
    fn select_channel(&mut self, mode: MeasureMode) {
        self.selected = Some(mode);
        self.channel_switches += 1;
    }

    fn start_conversion(&mut self) {
        self.conversions_started += 1;
    }
}

/// Mock debounced key input.
///
/// Levels and edges are set directly; edges clear on read like a real
/// debouncer's.
///
/// # Example
///
/// ```rust
/// use rs_wireless_throttle::hal::MockInputs;
/// use rs_wireless_throttle::traits::{DigitalInputs, Key};
///
/// let mut inputs = MockInputs::new();
/// inputs.hold(Key::Shift); // level only, no edge
/// assert!(inputs.input_state(Key::Shift));
/// assert!(!inputs.input_changed(Key::Shift));
///
/// inputs.press(Key::F0);
/// assert!(inputs.input_pressed(Key::F0));
///
/// inputs.release(Key::F0);
/// assert!(!inputs.input_state(Key::F0));
/// assert!(inputs.input_changed(Key::F0));
/// ```
#[derive(Debug, Default)]
pub struct MockInputs {
    levels: [bool; Key::COUNT],
    edges: [bool; Key::COUNT],
}

impl MockInputs {
    /// Creates inputs with every key released.
    pub fn new() -> Self {
        Self::default()
    }

    /// Key goes down, raising an edge.
    pub fn press(&mut self, key: Key) {
        self.levels[key.index()] = true;
        self.edges[key.index()] = true;
    }

    /// Key goes up, raising an edge.
    pub fn release(&mut self, key: Key) {
        self.levels[key.index()] = false;
        self.edges[key.index()] = true;
    }

    /// Set a level without raising an edge.
    pub fn hold(&mut self, key: Key) {
        self.levels[key.index()] = true;
    }

    /// Clear a level without raising an edge.
    pub fn let_go(&mut self, key: Key) {
        self.levels[key.index()] = false;
    }

    /// Whether an unread edge is pending for `key`.
    pub fn has_edge(&self, key: Key) -> bool {
        self.edges[key.index()]
    }
}

impl DigitalInputs for MockInputs {
    fn input_state(&self, key: Key) -> bool {
        self.levels[key.index()]
    }

    fn input_changed(&mut self, key: Key) -> bool {
        core::mem::take(&mut self.edges[key.index()])
    }
}

// ============================================================================
// Network Mocks
// ============================================================================

/// A command the mock server received.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerCall {
    /// `send_acquire`
    Acquire {
        /// Requested address.
        address: LocoAddress,
        /// Handle returned.
        handle: PendingHandle,
    },
    /// `send_release`
    Release {
        /// Released address.
        address: LocoAddress,
        /// Handle returned.
        handle: PendingHandle,
    },
    /// `send_function`
    Function {
        /// Target address.
        address: LocoAddress,
        /// Function index.
        index: u8,
        /// New state.
        active: bool,
    },
    /// `send_speed`
    Speed {
        /// Target address.
        address: LocoAddress,
        /// Speed step.
        speed: u8,
        /// Direction.
        forward: bool,
    },
}

/// Mock layout-control server.
///
/// Records every command and answers `poll_result` from results set with
/// [`resolve`](Self::resolve). Unresolved handles report `Pending`, unless
/// the server was built with [`auto_resolve`](Self::auto_resolve).
///
/// # Example
///
/// ```rust
/// use rs_wireless_throttle::hal::MockServer;
/// use rs_wireless_throttle::traits::{LocoServer, RequestStatus};
/// use rs_wireless_throttle::LocoAddress;
///
/// let mut server = MockServer::auto_resolve(2, RequestStatus::Success);
/// let handle = server.send_acquire(LocoAddress::short(3).unwrap());
///
/// assert_eq!(server.poll_result(handle), RequestStatus::Pending);
/// assert_eq!(server.poll_result(handle), RequestStatus::Pending);
/// assert_eq!(server.poll_result(handle), RequestStatus::Success);
/// ```
#[derive(Debug, Default)]
pub struct MockServer {
    /// Every command received, in order.
    pub calls: Vec<ServerCall>,
    results: BTreeMap<u16, RequestStatus>,
    polls: BTreeMap<u16, u32>,
    auto: Option<(u32, RequestStatus)>,
    lost_sessions: Vec<LocoAddress>,
    next_handle: u16,
}

impl MockServer {
    /// Creates a server where every request stays pending until resolved.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a server that resolves each request to `status` after it
    /// has been polled `pending_polls` times.
    pub fn auto_resolve(pending_polls: u32, status: RequestStatus) -> Self {
        Self {
            auto: Some((pending_polls, status)),
            ..Self::default()
        }
    }

    /// Set the result `poll_result` reports for `handle`.
    pub fn resolve(&mut self, handle: PendingHandle, status: RequestStatus) {
        self.results.insert(handle.0, status);
    }

    /// Handle of the most recent acquire.
    pub fn last_handle(&self) -> Option<PendingHandle> {
        self.calls.iter().rev().find_map(|call| match call {
            ServerCall::Acquire { handle, .. } => Some(*handle),
            _ => None,
        })
    }

    /// Make `session_alive` report false for `address`.
    pub fn drop_session(&mut self, address: LocoAddress) {
        self.lost_sessions.push(address);
    }

    /// Addresses acquired, in order.
    pub fn acquires(&self) -> Vec<LocoAddress> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ServerCall::Acquire { address, .. } => Some(*address),
                _ => None,
            })
            .collect()
    }

    /// Addresses released, in order.
    pub fn releases(&self) -> Vec<LocoAddress> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ServerCall::Release { address, .. } => Some(*address),
                _ => None,
            })
            .collect()
    }

    /// `(index, active)` function commands sent to `address`, in order.
    pub fn functions_for(&self, address: LocoAddress) -> Vec<(u8, bool)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ServerCall::Function {
                    address: a,
                    index,
                    active,
                } if *a == address => Some((*index, *active)),
                _ => None,
            })
            .collect()
    }

    /// `(speed, forward)` commands sent to `address`, in order.
    pub fn speeds_for(&self, address: LocoAddress) -> Vec<(u8, bool)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ServerCall::Speed {
                    address: a,
                    speed,
                    forward,
                } if *a == address => Some((*speed, *forward)),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls (results are kept).
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn issue(&mut self) -> PendingHandle {
        self.next_handle = self.next_handle.wrapping_add(1);
        PendingHandle(self.next_handle)
    }
}

impl LocoServer for MockServer {
    fn send_acquire(&mut self, address: LocoAddress) -> PendingHandle {
        let handle = self.issue();
        self.calls.push(ServerCall::Acquire { address, handle });
        handle
    }

    fn send_release(&mut self, address: LocoAddress) -> PendingHandle {
        let handle = self.issue();
        self.calls.push(ServerCall::Release { address, handle });
        handle
    }

    fn send_function(&mut self, address: LocoAddress, index: u8, active: bool) {
        self.calls.push(ServerCall::Function {
            address,
            index,
            active,
        });
    }

    fn send_speed(&mut self, address: LocoAddress, speed: u8, forward: bool) {
        self.calls.push(ServerCall::Speed {
            address,
            speed,
            forward,
        });
    }

    fn poll_result(&mut self, handle: PendingHandle) -> RequestStatus {
        if let Some(status) = self.results.get(&handle.0) {
            return *status;
        }
        let Some((pending_polls, status)) = self.auto else {
            return RequestStatus::Pending;
        };
        let count = self.polls.entry(handle.0).or_insert(0);
        *count += 1;
        if *count > pending_polls {
            self.results.insert(handle.0, status);
            status
        } else {
            RequestStatus::Pending
        }
    }

    fn session_alive(&mut self, address: LocoAddress) -> bool {
        !self.lost_sessions.contains(&address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u16) -> LocoAddress {
        LocoAddress::short(n).unwrap()
    }

    #[test]
    fn handles_are_unique() {
        let mut server = MockServer::new();
        let a = server.send_acquire(addr(3));
        let b = server.send_release(addr(3));
        assert_ne!(a, b);
    }

    #[test]
    fn unresolved_handle_stays_pending() {
        let mut server = MockServer::new();
        let handle = server.send_acquire(addr(3));
        for _ in 0..10 {
            assert_eq!(server.poll_result(handle), RequestStatus::Pending);
        }
    }

    #[test]
    fn resolved_result_is_sticky() {
        let mut server = MockServer::new();
        let handle = server.send_acquire(addr(3));
        server.resolve(handle, RequestStatus::Failure);
        assert_eq!(server.poll_result(handle), RequestStatus::Failure);
        assert_eq!(server.poll_result(handle), RequestStatus::Failure);
    }

    #[test]
    fn auto_resolve_zero_polls_is_immediate() {
        let mut server = MockServer::auto_resolve(0, RequestStatus::Success);
        let handle = server.send_acquire(addr(3));
        assert_eq!(server.poll_result(handle), RequestStatus::Success);
    }

    #[test]
    fn call_filters() {
        let mut server = MockServer::new();
        server.send_acquire(addr(3));
        server.send_function(addr(3), 0, true);
        server.send_function(addr(4), 1, true);
        server.send_speed(addr(3), 50, false);
        server.send_release(addr(3));

        assert_eq!(server.acquires(), vec![addr(3)]);
        assert_eq!(server.releases(), vec![addr(3)]);
        assert_eq!(server.functions_for(addr(3)), vec![(0, true)]);
        assert_eq!(server.speeds_for(addr(3)), vec![(50, false)]);
        assert_eq!(server.last_handle(), Some(PendingHandle(1)));
    }

    #[test]
    fn dropped_session_reported() {
        let mut server = MockServer::new();
        assert!(server.session_alive(addr(3)));
        server.drop_session(addr(3));
        assert!(!server.session_alive(addr(3)));
        assert!(server.session_alive(addr(4)));
    }

    #[test]
    fn inputs_edges_clear_on_read() {
        let mut inputs = MockInputs::new();
        inputs.press(Key::Loco2);
        assert!(inputs.has_edge(Key::Loco2));
        assert!(inputs.input_changed(Key::Loco2));
        assert!(!inputs.has_edge(Key::Loco2));
        assert!(inputs.input_state(Key::Loco2));
    }
}
