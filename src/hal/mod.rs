//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`] for various platforms.
//!
//! # Available Implementations
//!
//! - `mock`: Test implementations for desktop development
//! - `keypad`: Debounced keys over any `embedded-hal` input pin
//! - `esp32`: ESP32-C3 one-shot ADC front end (requires `esp32` feature)

pub mod keypad;
pub mod mock;

#[cfg(feature = "esp32")]
pub mod esp32;

pub use keypad::Keypad;
pub use mock::*;

#[cfg(feature = "esp32")]
pub use esp32::*;
