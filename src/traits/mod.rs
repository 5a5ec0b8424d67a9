//! Trait definitions for hardware and network abstraction.
//!
//! This module defines the collaborator interfaces the throttle core is
//! written against, so the same logic runs on the handheld and in desktop
//! tests.
//!
//! # Submodules
//!
//! - `hardware`: Analog front end, battery thresholds, debounced keys
//! - `network`: Layout-control server commands and pending requests
//!
//! # Hardware Abstraction
//!
//! - [`AnalogFrontEnd`]: Multiplexer select and conversion start
//! - [`BatteryThreshold`]: Battery reading classification
//! - [`DigitalInputs`]: Debounced key levels and edges
//!
//! # Network Abstraction
//!
//! - [`LocoServer`]: Fire-and-forget acquire/release with polled results

pub mod hardware;
pub mod network;

pub use hardware::*;
pub use network::*;
