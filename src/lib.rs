//! # rs-wireless-throttle
//!
//! Control core of a battery-powered handheld throttle for a networked
//! model railway: a speed knob, a row of keys and a link to the layout
//! control server.
//!
//! ## Features
//!
//! - **Analog filter**: Time-multiplexed, oversampled speed knob and battery
//!   sensing with hysteresis, published lock-free from interrupt context
//! - **Loco acquisition**: Four slots with a non-blocking acquire/release
//!   state machine, pumped one step per main-loop tick
//! - **Function mapping**: Per-loco functions forced on/off or following the
//!   throttle's function keys
//! - **Emergency stop**: One key stops every loco until the knob returns to zero
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Hardware and network abstractions
//! - `analog` - Speed/battery filter and the interrupt-shared speed signal
//! - `loco` - Addresses, function maps and slot state
//! - `manager` - Loco acquisition manager that ties everything together
//! - `config` - Stored settings
//! - `hal` - Concrete implementations (mock for testing, keypad debouncer, esp32)
//!
//! ## Example
//!
//! ```rust
//! use rs_wireless_throttle::{
//!     AnalogFilter, Config, LocoConfig, LocoManager, RequestStatus, SpeedSignal,
//!     hal::{MockFrontEnd, MockInputs, MockServer},
//!     traits::Key,
//! };
//!
//! let config = Config::default().with_loco(0, LocoConfig::default().with_address(3, false));
//!
//! // Interrupt side: knob at mid travel
//! let signal = SpeedSignal::new();
//! let mut adc = MockFrontEnd::new();
//! let mut filter = AnalogFilter::new(&signal, config.analog, config.analog.battery_threshold());
//! filter.start(&mut adc);
//! for _ in 0..config.analog.samples_per_cycle {
//!     filter.on_conversion_complete(512, &mut adc);
//! }
//!
//! // Main loop side
//! let server = MockServer::auto_resolve(0, RequestStatus::Success);
//! let mut manager = LocoManager::new(server, MockInputs::new(), &config.locos).unwrap();
//! manager.inputs_mut().press(Key::Loco1);
//! manager.poll();
//! manager.poll();
//!
//! assert!(signal.speed_triggered());
//! assert_eq!(signal.peek_speed(), 63);
//! assert_eq!(manager.drive(signal.read_speed()), 1);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

/// Speed and battery filtering for the time-multiplexed ADC.
pub mod analog;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Loco addresses, function mappings and slot state.
pub mod loco;
/// Loco acquisition manager driving the slot state machines.
pub mod manager;
/// Core traits for hardware and network abstraction.
pub mod traits;

/// Shared configuration system for desktop and ESP32.
pub mod config;

// Re-exports for convenience
pub use analog::{accept_candidate, AnalogFilter, SpeedSignal, MAX_SPEED};
pub use loco::{
    AddressError, FunctionMap, FunctionMode, LocoAddress, LocoSlot, ReleaseKind, SlotState,
    FUNCTION_COUNT, LOCO_SLOTS, MAX_FUNCTION,
};
pub use manager::{LocoManager, SlotStatus, ThrottleStatus};
pub use traits::{
    // Hardware
    AnalogFrontEnd,
    BatteryLevel,
    BatteryThreshold,
    DigitalInputs,
    Key,
    MeasureMode,
    RawThreshold,
    // Network
    LocoServer,
    PendingHandle,
    RequestStatus,
};

// Config re-exports
pub use config::{AnalogConfig, Config, ConfigError, DeviceConfig, LocoConfig, ServerConfig};
