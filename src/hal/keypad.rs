//! Debounced keypad over plain GPIO inputs.
//!
//! Each bound key is sampled once per [`Keypad::tick`]. The last eight
//! samples are kept as a shift register; a key only changes state once all
//! eight agree. Pins are active-low (key pulls the line to ground).
//!
//! # Example
//!
//! ```rust
//! use core::convert::Infallible;
//! use embedded_hal::digital::{ErrorType, InputPin};
//! use rs_wireless_throttle::hal::Keypad;
//! use rs_wireless_throttle::traits::{DigitalInputs, Key};
//!
//! struct Grounded;
//!
//! impl ErrorType for Grounded {
//!     type Error = Infallible;
//! }
//!
//! impl InputPin for Grounded {
//!     fn is_high(&mut self) -> Result<bool, Infallible> { Ok(false) }
//!     fn is_low(&mut self) -> Result<bool, Infallible> { Ok(true) }
//! }
//!
//! let mut keypad = Keypad::new();
//! keypad.bind(Key::EStop, Grounded);
//!
//! for _ in 0..8 {
//!     keypad.tick().unwrap();
//! }
//! assert!(keypad.input_pressed(Key::EStop));
//! assert!(!keypad.input_changed(Key::EStop));
//! ```

use embedded_hal::digital::InputPin;

use crate::traits::{DigitalInputs, Key};

const STABLE_PRESSED: u8 = 0xff;
const STABLE_RELEASED: u8 = 0x00;

/// Debounced [`DigitalInputs`] over one [`InputPin`] per key.
///
/// Unbound keys always read released.
pub struct Keypad<P: InputPin> {
    pins: [Option<P>; Key::COUNT],
    history: [u8; Key::COUNT],
    pressed: [bool; Key::COUNT],
    changed: [bool; Key::COUNT],
}

impl<P: InputPin> Default for Keypad<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: InputPin> Keypad<P> {
    /// Creates a keypad with no keys bound.
    pub fn new() -> Self {
        Self {
            pins: core::array::from_fn(|_| None),
            history: [STABLE_RELEASED; Key::COUNT],
            pressed: [false; Key::COUNT],
            changed: [false; Key::COUNT],
        }
    }

    /// Attach `pin` to `key`, replacing any earlier binding.
    ///
    /// The key starts released and must be held for a full debounce window
    /// before it reads pressed.
    pub fn bind(&mut self, key: Key, pin: P) {
        let i = key.index();
        self.pins[i] = Some(pin);
        self.history[i] = STABLE_RELEASED;
        self.pressed[i] = false;
        self.changed[i] = false;
    }

    /// Builder form of [`bind`](Self::bind).
    pub fn with(mut self, key: Key, pin: P) -> Self {
        self.bind(key, pin);
        self
    }

    /// Sample every bound pin once. Call at a fixed rate (1-5 ms).
    ///
    /// # Errors
    ///
    /// Returns the first pin read error; keys after it are not sampled this
    /// tick.
    pub fn tick(&mut self) -> Result<(), P::Error> {
        for i in 0..Key::COUNT {
            let Some(pin) = self.pins[i].as_mut() else {
                continue;
            };
            let down = pin.is_low()?;
            let history = (self.history[i] << 1) | u8::from(down);
            self.history[i] = history;

            let next = match history {
                STABLE_PRESSED => true,
                STABLE_RELEASED => false,
                _ => continue,
            };
            if next != self.pressed[i] {
                self.pressed[i] = next;
                self.changed[i] = true;
            }
        }
        Ok(())
    }
}

impl<P: InputPin> DigitalInputs for Keypad<P> {
    fn input_state(&self, key: Key) -> bool {
        self.pressed[key.index()]
    }

    fn input_changed(&mut self, key: Key) -> bool {
        core::mem::take(&mut self.changed[key.index()])
    }
}
