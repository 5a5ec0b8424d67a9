//! Hardware abstraction traits for the analog front end, battery sensing and
//! debounced key input.
//!
//! This module defines the interfaces the throttle core consumes from the
//! hardware layer. Register access, pin mapping and debounce timing all live
//! behind these traits.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`AnalogFrontEnd`] | Multiplexer select and conversion start for the shared ADC input |
//! | [`BatteryThreshold`] | Classifies an accumulated battery reading |
//! | [`DigitalInputs`] | Debounced key levels and one-shot edges |
//!
//! # Implementation
//!
//! For testing and desktop development, use the mock implementations
//! from [`crate::hal::mock`]. For real key pins use [`crate::hal::Keypad`],
//! and for ESP32 hardware the front end in `hal::esp32` (requires `esp32`
//! feature).
//!
//! # Example
//!
//! ```rust
//! use rs_wireless_throttle::traits::{DigitalInputs, Key};
//! use rs_wireless_throttle::hal::MockInputs;
//!
//! let mut inputs = MockInputs::new();
//! inputs.press(Key::Loco1);
//!
//! assert!(inputs.input_state(Key::Loco1));
//! assert!(inputs.input_changed(Key::Loco1)); // edge, once
//! assert!(!inputs.input_changed(Key::Loco1)); // consumed
//! ```

/// Which physical input the shared analog channel is measuring.
///
/// The analog filter alternates between the two every completed
/// oversampling cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MeasureMode {
    /// Speed potentiometer wiper.
    #[default]
    Speed,
    /// Battery voltage divider.
    Battery,
}

impl MeasureMode {
    /// Returns the mode measured after this one.
    #[inline]
    pub const fn next(self) -> Self {
        match self {
            MeasureMode::Speed => MeasureMode::Battery,
            MeasureMode::Battery => MeasureMode::Speed,
        }
    }
}

/// Analog-to-digital converter front end.
///
/// The filter drives the converter one conversion at a time: it selects the
/// multiplexer channel when the measured input changes and starts the next
/// conversion after every sample. Conversion-complete notification goes the
/// other way, from the interrupt handler into
/// [`AnalogFilter::on_conversion_complete`](crate::analog::AnalogFilter::on_conversion_complete).
///
/// Both methods are called from interrupt context and must not block.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use rs_wireless_throttle::traits::{AnalogFrontEnd, MeasureMode};
///
/// struct AvrAdc;
///
/// impl AnalogFrontEnd for AvrAdc {
///     fn select_channel(&mut self, mode: MeasureMode) {
///         let mux = match mode {
///             MeasureMode::Speed => 0x07,
///             MeasureMode::Battery => 0x0e,
///         };
///         // ADMUX = (ADMUX & 0xf0) | mux
///     }
///
///     fn start_conversion(&mut self) {
///         // ADCSRA |= 1 << ADSC
///     }
/// }
/// ```
pub trait AnalogFrontEnd {
    /// Route the converter input to the given measurement.
    fn select_channel(&mut self, mode: MeasureMode);

    /// Start the next single conversion.
    fn start_conversion(&mut self);
}

/// Battery state derived from one accumulated battery measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BatteryLevel {
    /// Battery is fine.
    #[default]
    Normal,
    /// Battery is running low; warn the user.
    Low,
    /// Battery is empty; the device is about to shut down.
    Empty,
}

/// Battery threshold test.
///
/// Called from interrupt context once per battery cycle with the raw sum of
/// `samples` conversions. Thresholds depend on the cell chemistry and the
/// divider on the board, so they are left to the implementation.
pub trait BatteryThreshold {
    /// Classify an accumulated battery reading.
    fn classify(&mut self, accumulator: u32, samples: u8) -> BatteryLevel;
}

/// Fixed thresholds on the averaged raw reading.
///
/// A threshold of `0` is disabled. Readings strictly below `empty_raw` are
/// [`BatteryLevel::Empty`], below `low_raw` are [`BatteryLevel::Low`].
///
/// # Example
///
/// ```rust
/// use rs_wireless_throttle::traits::{BatteryLevel, BatteryThreshold, RawThreshold};
///
/// let mut threshold = RawThreshold::new(700, 600);
/// assert_eq!(threshold.classify(16 * 800, 16), BatteryLevel::Normal);
/// assert_eq!(threshold.classify(16 * 650, 16), BatteryLevel::Low);
/// assert_eq!(threshold.classify(16 * 500, 16), BatteryLevel::Empty);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RawThreshold {
    /// Averaged raw reading below which the battery is low.
    pub low_raw: u16,
    /// Averaged raw reading below which the battery is empty.
    pub empty_raw: u16,
}

impl RawThreshold {
    /// Creates thresholds from averaged raw readings.
    pub const fn new(low_raw: u16, empty_raw: u16) -> Self {
        Self { low_raw, empty_raw }
    }
}

impl BatteryThreshold for RawThreshold {
    fn classify(&mut self, accumulator: u32, samples: u8) -> BatteryLevel {
        let average = accumulator / u32::from(samples.max(1));
        if average < u32::from(self.empty_raw) {
            BatteryLevel::Empty
        } else if average < u32::from(self.low_raw) {
            BatteryLevel::Low
        } else {
            BatteryLevel::Normal
        }
    }
}

/// Physical keys on the throttle.
///
/// Function keys `F0..F8` drive throttle-linked functions, `Loco1..Loco4`
/// select slots, `Shift` modifies loco key presses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Key {
    /// Function 0 (usually the headlight).
    F0 = 0,
    /// Function 1.
    F1,
    /// Function 2.
    F2,
    /// Function 3.
    F3,
    /// Function 4.
    F4,
    /// Function 5.
    F5,
    /// Function 6.
    F6,
    /// Function 7.
    F7,
    /// Function 8.
    F8,
    /// Emergency stop for all locos.
    EStop,
    /// Modifier key.
    Shift,
    /// Direction: forward.
    Forward,
    /// Direction: reverse.
    Reverse,
    /// Slot 0 select.
    Loco1,
    /// Slot 1 select.
    Loco2,
    /// Slot 2 select.
    Loco3,
    /// Slot 3 select.
    Loco4,
}

impl Key {
    /// Number of keys.
    pub const COUNT: usize = 17;

    /// Every key, in index order.
    pub const ALL: [Key; Key::COUNT] = [
        Key::F0,
        Key::F1,
        Key::F2,
        Key::F3,
        Key::F4,
        Key::F5,
        Key::F6,
        Key::F7,
        Key::F8,
        Key::EStop,
        Key::Shift,
        Key::Forward,
        Key::Reverse,
        Key::Loco1,
        Key::Loco2,
        Key::Loco3,
        Key::Loco4,
    ];

    /// Dense index of this key (`0..Key::COUNT`).
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The function key driving function `index`, if there is one.
    ///
    /// ```
    /// use rs_wireless_throttle::traits::Key;
    ///
    /// assert_eq!(Key::function(0), Some(Key::F0));
    /// assert_eq!(Key::function(8), Some(Key::F8));
    /// assert_eq!(Key::function(9), None);
    /// ```
    pub const fn function(index: usize) -> Option<Key> {
        if index <= 8 {
            Some(Key::ALL[index])
        } else {
            None
        }
    }

    /// The select key for loco slot `slot` (`0..4`).
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not a valid slot index.
    pub const fn loco(slot: usize) -> Key {
        assert!(slot < 4, "loco slot out of range");
        Key::ALL[Key::Loco1.index() + slot]
    }
}

/// Debounced digital input collaborator.
///
/// Implementations own debounce timing; consumers only ever see stable
/// levels and edges.
///
/// # Implementation Notes
///
/// - `input_state()` is the current debounced level, `true` = pressed
/// - `input_changed()` is true exactly once per debounced transition (press
///   or release) and clears on read
pub trait DigitalInputs {
    /// Returns the debounced level of `key` (`true` while pressed).
    fn input_state(&self, key: Key) -> bool;

    /// Returns true once per debounced transition of `key`, clearing it.
    fn input_changed(&mut self, key: Key) -> bool;

    /// Returns true if `key` went down since the last call.
    ///
    /// Consumes the edge for either direction.
    fn input_pressed(&mut self, key: Key) -> bool {
        self.input_changed(key) && self.input_state(key)
    }
}
