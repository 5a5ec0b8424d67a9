//! ESP32-C3 SuperMini hardware abstraction layer for the handheld throttle.
//!
//! # Hardware Configuration
//!
//! - **MCU**: ESP32-C3 SuperMini (RISC-V 160MHz, 4MB Flash)
//! - **Speed knob**: Linear potentiometer between 3V3 and GND
//! - **Battery sense**: Resistor divider from the cell to an ADC pin
//! - **Keys**: Momentary switches to GND, read through [`Keypad`](crate::hal::Keypad)
//!
//! # Pin Assignments
//!
//! See the [`pins`] module for GPIO assignments matching the SuperMini layout.

mod analog;

pub use analog::Esp32Analog;

/// Pin assignments for SuperMini ESP32-C3.
///
/// Both analog inputs are on ADC1; ADC2 is unusable while the radio is up.
pub mod pins {
    // =========================================================================
    // Analog (ADC1)
    // =========================================================================

    /// Speed potentiometer wiper
    pub const SPEED_POT: i32 = 0;

    /// Battery divider midpoint
    pub const BATTERY_SENSE: i32 = 1;

    // =========================================================================
    // Keys (active low, internal pull-up)
    // =========================================================================

    /// Function keys F0..F8
    pub const FUNCTION_KEYS: [i32; 9] = [2, 3, 4, 5, 6, 7, 10, 20, 21];

    /// Loco select keys 1..4
    pub const LOCO_KEYS: [i32; 4] = [8, 9, 18, 19];
}
