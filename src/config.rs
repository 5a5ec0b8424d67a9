//! Throttle configuration.
//!
//! Uses `heapless::String` for `no_std` compatibility while remaining
//! ergonomic to use on desktop with `std`. Persisting the configuration is
//! the platform's job; this module only defines, validates and (with the
//! `serde-json-core` feature) parses it.
//!
//! # Example
//!
//! ```rust
//! use rs_wireless_throttle::config::{AnalogConfig, Config, LocoConfig, ServerConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.analog.divisor(), 129);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_loco(0, LocoConfig::default().with_address(3, false))
//!     .with_server(ServerConfig::default().with_host("192.168.1.10"))
//!     .with_analog(AnalogConfig::default().with_speed_tolerance(3));
//! assert!(config.validate().is_ok());
//! ```

use core::fmt;

use heapless::String as HString;

use crate::analog::MAX_SPEED;
use crate::loco::{AddressError, FunctionMap, LocoAddress, LOCO_SLOTS};
use crate::traits::RawThreshold;

/// Maximum length for short config strings (hostnames, names)
pub const MAX_SHORT_STRING: usize = 64;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Stored address value for a slot with no loco.
pub const UNASSIGNED_ADDRESS: i16 = -1;

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let take = s.len().min(MAX_SHORT_STRING);
    // Cut on a char boundary
    let valid_end = s
        .char_indices()
        .take_while(|(i, c)| i + c.len_utf8() <= take)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

// ============================================================================
// Errors
// ============================================================================

/// Invalid configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A slot's stored address is not valid for its addressing mode.
    InvalidAddress {
        /// Slot index (`0..4`).
        slot: usize,
        /// Underlying address error.
        error: AddressError,
    },
    /// Oversampling needs at least one sample per cycle.
    ZeroSamples,
    /// The ADC range is too small to resolve every speed step.
    AdcRangeTooSmall,
    /// JSON input could not be parsed.
    Json,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidAddress { slot, error } => {
                write!(f, "loco slot {}: {}", slot + 1, error)
            }
            ConfigError::ZeroSamples => write!(f, "samples_per_cycle must be at least 1"),
            ConfigError::AdcRangeTooSmall => write!(
                f,
                "ADC range times samples_per_cycle must cover {} speed steps",
                MAX_SPEED as u32 + 1
            ),
            ConfigError::Json => write!(f, "malformed JSON configuration"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

// ============================================================================
// Main Config
// ============================================================================

/// Complete throttle configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Speed potentiometer and battery sampling
    pub analog: AnalogConfig,
    /// One entry per loco slot
    pub locos: [LocoConfig; LOCO_SLOTS],
    /// Layout-control server to connect to
    pub server: ServerConfig,
    /// Device identification
    pub device: DeviceConfig,
}

impl Config {
    /// Set analog configuration
    pub fn with_analog(mut self, analog: AnalogConfig) -> Self {
        self.analog = analog;
        self
    }

    /// Set the configuration of one loco slot
    ///
    /// # Panics
    ///
    /// Panics if `slot >= LOCO_SLOTS`.
    pub fn with_loco(mut self, slot: usize, loco: LocoConfig) -> Self {
        self.locos[slot] = loco;
        self
    }

    /// Set server configuration
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    /// Set device configuration
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    /// Check every section for values the core cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analog.validate()?;
        for (slot, loco) in self.locos.iter().enumerate() {
            loco.loco_address()
                .map_err(|error| ConfigError::InvalidAddress { slot, error })?;
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    ///
    /// ```rust
    /// use rs_wireless_throttle::Config;
    ///
    /// let json = br#"{
    ///     "analog": {"samples_per_cycle": 16, "adc_full_scale": 1023, "speed_tolerance": 2,
    ///                "battery_low_raw": 0, "battery_empty_raw": 0},
    ///     "locos": [
    ///         {"address": 3, "long_address": false, "functions": ["always_on", "throttle", "throttle",
    ///           "throttle", "throttle", "throttle", "throttle", "throttle", "throttle",
    ///           "unknown", "unknown", "unknown", "unknown"], "reverse": false},
    ///         {"address": -1, "long_address": false, "functions": ["throttle", "throttle", "throttle",
    ///           "throttle", "throttle", "throttle", "throttle", "throttle", "throttle",
    ///           "throttle", "throttle", "throttle", "throttle"], "reverse": false},
    ///         {"address": -1, "long_address": false, "functions": ["throttle", "throttle", "throttle",
    ///           "throttle", "throttle", "throttle", "throttle", "throttle", "throttle",
    ///           "throttle", "throttle", "throttle", "throttle"], "reverse": false},
    ///         {"address": 1234, "long_address": true, "functions": ["throttle", "throttle", "throttle",
    ///           "throttle", "throttle", "throttle", "throttle", "throttle", "throttle",
    ///           "throttle", "throttle", "throttle", "throttle"], "reverse": true}
    ///     ],
    ///     "server": {"host": "10.0.0.2", "port": 12090},
    ///     "device": {"name": "throttle-1"}
    /// }"#;
    ///
    /// let config = Config::from_json(json).unwrap();
    /// assert_eq!(config.locos[3].address, 1234);
    /// assert_eq!(config.server.port, 12090);
    /// ```
    #[cfg(feature = "serde-json-core")]
    pub fn from_json(json: &[u8]) -> Result<Self, ConfigError> {
        let (config, _): (Config, _) =
            serde_json_core::from_slice(json).map_err(|_| ConfigError::Json)?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Analog Config
// ============================================================================

/// Oversampling, hysteresis and battery threshold settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalogConfig {
    /// Raw conversions accumulated per measurement cycle
    pub samples_per_cycle: u8,
    /// Largest raw value the converter produces (1023 for 10-bit)
    pub adc_full_scale: u16,
    /// Dead band around the current speed, in speed steps
    pub speed_tolerance: u8,
    /// Averaged battery reading below which the battery is low (0 = off)
    pub battery_low_raw: u16,
    /// Averaged battery reading below which the battery is empty (0 = off)
    pub battery_empty_raw: u16,
}

impl Default for AnalogConfig {
    fn default() -> Self {
        Self {
            samples_per_cycle: 16,
            adc_full_scale: 1023,
            speed_tolerance: 2,
            battery_low_raw: 0,
            battery_empty_raw: 0,
        }
    }
}

impl AnalogConfig {
    /// Set the oversampling depth
    pub fn with_samples_per_cycle(mut self, samples: u8) -> Self {
        self.samples_per_cycle = samples;
        self
    }

    /// Set the converter full-scale value
    pub fn with_adc_full_scale(mut self, full_scale: u16) -> Self {
        self.adc_full_scale = full_scale;
        self
    }

    /// Set the hysteresis dead band
    pub fn with_speed_tolerance(mut self, tolerance: u8) -> Self {
        self.speed_tolerance = tolerance;
        self
    }

    /// Set both battery thresholds
    pub fn with_battery_thresholds(mut self, low_raw: u16, empty_raw: u16) -> Self {
        self.battery_low_raw = low_raw;
        self.battery_empty_raw = empty_raw;
        self
    }

    /// Divisor mapping an accumulated speed reading onto `0..=MAX_SPEED`
    ///
    /// `(adc_full_scale + 1) * samples_per_cycle / (MAX_SPEED + 1)`, so the
    /// defaults (10-bit, 16 samples) give 129.
    pub fn divisor(&self) -> u32 {
        (u32::from(self.adc_full_scale) + 1) * u32::from(self.samples_per_cycle)
            / (u32::from(MAX_SPEED) + 1)
    }

    /// Battery thresholds as a [`RawThreshold`]
    pub fn battery_threshold(&self) -> RawThreshold {
        RawThreshold::new(self.battery_low_raw, self.battery_empty_raw)
    }

    /// Check the sampling parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.samples_per_cycle == 0 {
            return Err(ConfigError::ZeroSamples);
        }
        if self.divisor() == 0 {
            return Err(ConfigError::AdcRangeTooSmall);
        }
        Ok(())
    }
}

// ============================================================================
// Loco Config
// ============================================================================

/// Stored settings for one loco slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocoConfig {
    /// Loco address; negative means no loco is assigned
    pub address: i16,
    /// Whether `address` is a long address
    pub long_address: bool,
    /// How each function is driven
    pub functions: FunctionMap,
    /// Invert the direction sense of this loco
    pub reverse: bool,
}

impl Default for LocoConfig {
    fn default() -> Self {
        Self {
            address: UNASSIGNED_ADDRESS,
            long_address: false,
            functions: FunctionMap::default(),
            reverse: false,
        }
    }
}

impl LocoConfig {
    /// Set the address
    pub fn with_address(mut self, address: i16, long: bool) -> Self {
        self.address = address;
        self.long_address = long;
        self
    }

    /// Set the function mapping
    pub fn with_functions(mut self, functions: FunctionMap) -> Self {
        self.functions = functions;
        self
    }

    /// Set the reverse flag
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// The validated address, `None` if unassigned
    pub fn loco_address(&self) -> Result<Option<LocoAddress>, AddressError> {
        LocoAddress::from_raw(self.address, self.long_address)
    }

    /// Check if a loco is assigned to this slot
    pub fn is_assigned(&self) -> bool {
        self.address >= 0
    }
}

// ============================================================================
// Server Config
// ============================================================================

/// Layout-control server endpoint
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerConfig {
    /// Server hostname or IP
    pub host: ShortString,
    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: ShortString::new(),
            port: 12090,
        }
    }
}

impl ServerConfig {
    /// Set the server host
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = short_string(host);
        self
    }

    /// Set the server port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Check if a server host is configured (empty = discover automatically)
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }
}

// ============================================================================
// Device Config
// ============================================================================

/// Device identification configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    /// Throttle name announced to the server
    pub name: ShortString,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: short_string("rs-throttle"),
        }
    }
}

impl DeviceConfig {
    /// Set the device name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = short_string(name);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
