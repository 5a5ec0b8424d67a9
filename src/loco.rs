//! Loco slot data model: addresses, function mappings and slot state.
//!
//! A throttle controls up to [`LOCO_SLOTS`] locomotives. Each slot carries
//! the address it was configured with, the address it is currently holding
//! on the layout server, a [`FunctionMap`] and the acquisition [`SlotState`].
//!
//! # Slot Invariant
//!
//! A slot is [`SlotState::Offline`] exactly when it holds no address. The
//! configured address survives going offline, so the slot can be acquired
//! again with a single key press.
//!
//! ```text
//!             press               success
//!   Offline ─────────▶ Acquiring ─────────▶ Online
//!      ▲                  │ failure          │  │
//!      └──────────────────┘                  │  │ press (park)
//!      ▲           drop                      │  ▼
//!      └─────────────────────────────────── Connected
//! ```

use core::fmt;

use crate::config::LocoConfig;
use crate::traits::PendingHandle;

/// Number of loco slots on one throttle.
pub const LOCO_SLOTS: usize = 4;

/// Highest function index a loco can be mapped for.
pub const MAX_FUNCTION: usize = 12;

/// Number of entries in a [`FunctionMap`].
pub const FUNCTION_COUNT: usize = MAX_FUNCTION + 1;

/// Highest short (7-bit) address.
pub const MAX_SHORT_ADDRESS: u16 = 127;

/// Highest long (14-bit) address.
pub const MAX_LONG_ADDRESS: u16 = 10239;

// ============================================================================
// Addresses
// ============================================================================

/// A validated locomotive address.
///
/// Short addresses are `1..=127`, long addresses `1..=10239`.
///
/// # Example
///
/// ```rust
/// use rs_wireless_throttle::LocoAddress;
///
/// let short = LocoAddress::short(3).unwrap();
/// assert_eq!(short.number(), 3);
/// assert!(!short.is_long());
///
/// let long = LocoAddress::long(1234).unwrap();
/// assert!(long.is_long());
///
/// assert!(LocoAddress::short(128).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocoAddress {
    number: u16,
    long: bool,
}

impl LocoAddress {
    /// Creates an address, checking it against its addressing mode.
    pub fn new(number: u16, long: bool) -> Result<Self, AddressError> {
        let max = if long {
            MAX_LONG_ADDRESS
        } else {
            MAX_SHORT_ADDRESS
        };
        if number == 0 || number > max {
            return Err(AddressError::OutOfRange {
                raw: i32::from(number),
                long,
            });
        }
        Ok(Self { number, long })
    }

    /// Creates a short address.
    pub fn short(number: u16) -> Result<Self, AddressError> {
        Self::new(number, false)
    }

    /// Creates a long address.
    pub fn long(number: u16) -> Result<Self, AddressError> {
        Self::new(number, true)
    }

    /// Converts the stored representation (`address < 0` = unassigned).
    ///
    /// ```
    /// use rs_wireless_throttle::LocoAddress;
    ///
    /// assert_eq!(LocoAddress::from_raw(-1, false), Ok(None));
    /// assert_eq!(LocoAddress::from_raw(3, false), Ok(Some(LocoAddress::short(3).unwrap())));
    /// assert!(LocoAddress::from_raw(0, false).is_err());
    /// ```
    pub fn from_raw(raw: i16, long: bool) -> Result<Option<Self>, AddressError> {
        if raw < 0 {
            return Ok(None);
        }
        // Non-negative i16 always fits a u16
        Self::new(raw as u16, long).map(Some)
    }

    /// The numeric address.
    #[inline]
    pub const fn number(&self) -> u16 {
        self.number
    }

    /// Whether this is a long address.
    #[inline]
    pub const fn is_long(&self) -> bool {
        self.long
    }
}

impl fmt::Display for LocoAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.long {
            write!(f, "L{}", self.number)
        } else {
            write!(f, "S{}", self.number)
        }
    }
}

/// Address rejected by [`LocoAddress::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressError {
    /// Zero, or above the maximum for the addressing mode.
    OutOfRange {
        /// The rejected value.
        raw: i32,
        /// Whether long addressing was requested.
        long: bool,
    },
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::OutOfRange { raw, long: false } => write!(
                f,
                "short address {} out of range 1..={}",
                raw, MAX_SHORT_ADDRESS
            ),
            AddressError::OutOfRange { raw, long: true } => write!(
                f,
                "long address {} out of range 1..={}",
                raw, MAX_LONG_ADDRESS
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AddressError {}

// ============================================================================
// Function Mapping
// ============================================================================

/// How one loco function is driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FunctionMode {
    /// Follows the matching function key on the throttle.
    Throttle,
    /// Forced on whenever the loco comes online.
    AlwaysOn,
    /// Forced off whenever the loco comes online.
    AlwaysOff,
    /// Not configured; the throttle never touches this function.
    Unknown,
}

/// Per-function modes for function indexes `0..=MAX_FUNCTION`.
///
/// Defaults to every function following the throttle keys.
///
/// # Example
///
/// ```rust
/// use rs_wireless_throttle::{FunctionMap, FunctionMode};
///
/// let map = FunctionMap::default()
///     .with(0, FunctionMode::AlwaysOn)
///     .with(12, FunctionMode::Unknown);
///
/// assert_eq!(map.get(0), FunctionMode::AlwaysOn);
/// assert_eq!(map.get(1), FunctionMode::Throttle);
/// assert_eq!(map.iter().count(), 13);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FunctionMap([FunctionMode; FUNCTION_COUNT]);

impl Default for FunctionMap {
    fn default() -> Self {
        Self::all(FunctionMode::Throttle)
    }
}

impl FunctionMap {
    /// A map with every function set to `mode`.
    pub const fn all(mode: FunctionMode) -> Self {
        Self([mode; FUNCTION_COUNT])
    }

    /// Mode of function `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > MAX_FUNCTION`.
    #[inline]
    pub fn get(&self, index: usize) -> FunctionMode {
        self.0[index]
    }

    /// Set the mode of function `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > MAX_FUNCTION`.
    pub fn set(&mut self, index: usize, mode: FunctionMode) {
        self.0[index] = mode;
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, index: usize, mode: FunctionMode) -> Self {
        self.set(index, mode);
        self
    }

    /// Iterate `(index, mode)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, FunctionMode)> + '_ {
        self.0.iter().copied().enumerate()
    }
}

// ============================================================================
// Slot State
// ============================================================================

/// Acquisition state of one loco slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SlotState {
    /// No address held.
    #[default]
    Offline,
    /// Address held and functions retained, but the throttle does not drive it.
    Connected,
    /// Acquisition in flight; joins the running set on success.
    Acquiring,
    /// Acquisition in flight; becomes the only running slot on success.
    AcquiringSingle,
    /// Acquired and driven by the throttle.
    Online,
}

impl SlotState {
    /// Returns true for either acquiring variant.
    #[inline]
    pub const fn is_acquiring(&self) -> bool {
        matches!(self, SlotState::Acquiring | SlotState::AcquiringSingle)
    }

    /// Returns the state as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SlotState::Offline => "offline",
            SlotState::Connected => "connected",
            SlotState::Acquiring => "acquiring",
            SlotState::AcquiringSingle => "acquiring_single",
            SlotState::Online => "online",
        }
    }
}

/// How an online loco is let go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseKind {
    /// Keep the address and functions, stop driving speed (`Connected`).
    Park,
    /// Release on the server and forget the address (`Offline`).
    Drop,
}

/// An acquisition that was abandoned while its request was still pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StaleAcquire {
    pub(crate) handle: PendingHandle,
    pub(crate) address: LocoAddress,
    /// The address was already granted before this request went out.
    pub(crate) held: bool,
}

/// One loco control context.
///
/// Slots are owned and mutated by [`LocoManager`](crate::LocoManager); the
/// accessors here are read-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocoSlot {
    pub(crate) configured: Option<LocoAddress>,
    pub(crate) address: Option<LocoAddress>,
    pub(crate) functions: FunctionMap,
    pub(crate) reverse: bool,
    pub(crate) state: SlotState,
    pub(crate) running: bool,
    pub(crate) pending: Option<PendingHandle>,
    pub(crate) stale: Option<StaleAcquire>,
    /// The server has granted `address` to us.
    pub(crate) held: bool,
    /// Bit `i` set = function `i` was last sent active.
    pub(crate) sent_functions: u16,
}

impl Default for LocoSlot {
    fn default() -> Self {
        Self {
            configured: None,
            address: None,
            functions: FunctionMap::default(),
            reverse: false,
            state: SlotState::Offline,
            running: false,
            pending: None,
            stale: None,
            held: false,
            sent_functions: 0,
        }
    }
}

impl LocoSlot {
    /// Builds an offline slot from its stored configuration.
    pub fn from_config(config: &LocoConfig) -> Result<Self, AddressError> {
        Ok(Self {
            configured: config.loco_address()?,
            functions: config.functions,
            reverse: config.reverse,
            ..Self::default()
        })
    }

    /// Address currently held on the server (`None` while offline).
    #[inline]
    pub fn address(&self) -> Option<LocoAddress> {
        self.address
    }

    /// Whether the held address uses long addressing.
    #[inline]
    pub fn long_address(&self) -> bool {
        self.address.is_some_and(|a| a.is_long())
    }

    /// Address the slot acquires when its key is pressed.
    #[inline]
    pub fn configured_address(&self) -> Option<LocoAddress> {
        self.configured
    }

    /// Function mapping applied when the loco comes online.
    #[inline]
    pub fn functions(&self) -> &FunctionMap {
        &self.functions
    }

    /// Whether the loco's direction sense is inverted.
    #[inline]
    pub fn reverse(&self) -> bool {
        self.reverse
    }

    /// Acquisition state.
    #[inline]
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Stored running flag, before emergency stop is applied.
    ///
    /// Use [`LocoManager::loco_running`](crate::LocoManager::loco_running)
    /// for the effective value.
    #[inline]
    pub fn running(&self) -> bool {
        self.running
    }

    /// Whether an abandoned acquisition is still awaiting its result.
    #[inline]
    pub fn has_stale_acquisition(&self) -> bool {
        self.stale.is_some()
    }

    /// Drop to `Offline`, forgetting the held address.
    pub(crate) fn set_offline(&mut self) {
        self.state = SlotState::Offline;
        self.address = None;
        self.running = false;
        self.pending = None;
        self.held = false;
        self.sent_functions = 0;
    }
}
