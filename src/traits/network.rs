//! Network abstraction for the layout-control server.
//!
//! The throttle talks to a layout-control server over an unreliable
//! wireless link. The wire protocol and the transport live outside this
//! crate; the core only needs the command surface below.
//!
//! # Request Model
//!
//! Acquire and release are **fire-and-forget**: the send returns a
//! [`PendingHandle`] immediately and the outcome is observed later through
//! [`LocoServer::poll_result`]. Nothing in the core ever blocks on a
//! round-trip.
//!
//! ```text
//! send_acquire(S3) ──▶ handle #7
//! poll_result(#7)  ──▶ Pending
//! poll_result(#7)  ──▶ Pending
//! poll_result(#7)  ──▶ Success   (slot goes Online)
//! ```
//!
//! Function and speed commands have no reply.

use crate::loco::LocoAddress;

/// Opaque ticket for an in-flight acquire or release.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PendingHandle(pub u16);

/// Outcome of a pending request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RequestStatus {
    /// No reply yet.
    Pending,
    /// The server confirmed the request.
    Success,
    /// Rejected, timed out, or the link dropped.
    Failure,
}

impl RequestStatus {
    /// Returns true once the request has an outcome.
    #[inline]
    pub const fn is_resolved(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

/// Layout-control server command interface.
///
/// # Implementation Notes
///
/// - Every method must return without waiting on the network
/// - `poll_result` may be called any number of times for the same handle;
///   once it reports `Success` or `Failure` it should keep reporting that
///   until the handle is forgotten
/// - Handles for releases may be dropped by the caller without polling
///
/// # Example Implementation
///
/// ```rust,ignore
/// use rs_wireless_throttle::traits::{LocoServer, PendingHandle, RequestStatus};
/// use rs_wireless_throttle::LocoAddress;
///
/// struct WiThrottleLink { /* socket, reply table */ }
///
/// impl LocoServer for WiThrottleLink {
///     fn send_acquire(&mut self, address: LocoAddress) -> PendingHandle {
///         // queue "MT+..." line, remember the handle
///         PendingHandle(1)
///     }
///     fn send_release(&mut self, address: LocoAddress) -> PendingHandle {
///         PendingHandle(2)
///     }
///     fn send_function(&mut self, address: LocoAddress, index: u8, active: bool) {}
///     fn send_speed(&mut self, address: LocoAddress, speed: u8, forward: bool) {}
///     fn poll_result(&mut self, handle: PendingHandle) -> RequestStatus {
///         RequestStatus::Pending
///     }
/// }
/// ```
pub trait LocoServer {
    /// Request exclusive control of `address`.
    fn send_acquire(&mut self, address: LocoAddress) -> PendingHandle;

    /// Give up control of `address`.
    fn send_release(&mut self, address: LocoAddress) -> PendingHandle;

    /// Set function `index` of `address` on or off.
    fn send_function(&mut self, address: LocoAddress, index: u8, active: bool);

    /// Set the speed step (0..=126) and direction of `address`.
    fn send_speed(&mut self, address: LocoAddress, speed: u8, forward: bool);

    /// Check the outcome of a pending request.
    fn poll_result(&mut self, handle: PendingHandle) -> RequestStatus;

    /// Returns false once the server's session for `address` is gone.
    ///
    /// Called on every poll for acquired slots. The default assumes sessions
    /// never drop; override when the transport runs a keep-alive.
    fn session_alive(&mut self, _address: LocoAddress) -> bool {
        true
    }
}
