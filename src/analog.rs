//! Oversampled, time-multiplexed speed and battery measurement.
//!
//! A single analog input is shared between the speed potentiometer and the
//! battery divider. The filter runs in the converter's interrupt:
//!
//! 1. Every conversion is added to an accumulator.
//! 2. After `samples_per_cycle` conversions the accumulated value is turned
//!    into a speed candidate (speed mode) or a battery classification
//!    (battery mode), and the multiplexer switches to the other input.
//! 3. A speed candidate only replaces the current speed if it passes the
//!    hysteresis test in [`accept_candidate`].
//!
//! Results are published through a [`SpeedSignal`], which the main loop
//! reads without disabling the interrupt.
//!
//! # Example
//!
//! ```rust
//! use rs_wireless_throttle::analog::{AnalogFilter, SpeedSignal};
//! use rs_wireless_throttle::config::AnalogConfig;
//! use rs_wireless_throttle::hal::MockFrontEnd;
//!
//! let signal = SpeedSignal::new();
//! let config = AnalogConfig::default();
//! let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
//! let mut adc = MockFrontEnd::new();
//!
//! filter.start(&mut adc);
//!
//! // Pot at its counter-clockwise stop reads 0 -> full speed
//! for _ in 0..16 {
//!     filter.on_conversion_complete(0, &mut adc);
//! }
//!
//! assert!(signal.speed_triggered());
//! assert_eq!(signal.read_speed(), 126);
//! ```

use core::sync::atomic::{AtomicU16, Ordering};

use crate::config::AnalogConfig;
use crate::traits::{AnalogFrontEnd, BatteryLevel, BatteryThreshold, MeasureMode};

/// Highest speed step.
pub const MAX_SPEED: u8 = 126;

// ============================================================================
// Shared Signal
// ============================================================================

const SPEED_MASK: u16 = 0x00ff;
const SPEED_CHANGED: u16 = 1 << 8;
const BATTERY_LOW: u16 = 1 << 9;
const BATTERY_EMPTY: u16 = 1 << 10;

/// Speed and battery state shared between the sampling interrupt and the
/// main loop.
///
/// All fields live in one `AtomicU16`, so every read is a consistent
/// snapshot and flag clears from the main loop cannot race with the
/// interrupt's updates.
///
/// ```text
/// bit  0..7   current speed (0..=126)
/// bit  8      speed changed (one-shot)
/// bit  9      battery low (latched)
/// bit 10      battery empty (latched)
/// ```
#[derive(Debug, Default)]
pub struct SpeedSignal {
    word: AtomicU16,
}

impl SpeedSignal {
    /// Creates a signal at speed 0 with no flags set.
    pub const fn new() -> Self {
        Self {
            word: AtomicU16::new(0),
        }
    }

    /// Returns true once per accepted speed change, clearing the flag.
    pub fn speed_triggered(&self) -> bool {
        self.word.fetch_and(!SPEED_CHANGED, Ordering::AcqRel) & SPEED_CHANGED != 0
    }

    /// Returns the current speed (0..=126), acknowledging any pending change.
    pub fn read_speed(&self) -> u8 {
        let word = self.word.fetch_and(!SPEED_CHANGED, Ordering::AcqRel);
        (word & SPEED_MASK) as u8
    }

    /// Returns the current speed without touching the changed flag.
    pub fn peek_speed(&self) -> u8 {
        (self.word.load(Ordering::Acquire) & SPEED_MASK) as u8
    }

    /// Whether the battery has been reported low since the last clear.
    pub fn battery_low(&self) -> bool {
        self.word.load(Ordering::Acquire) & BATTERY_LOW != 0
    }

    /// Whether the battery has been reported empty since the last clear.
    pub fn battery_empty(&self) -> bool {
        self.word.load(Ordering::Acquire) & BATTERY_EMPTY != 0
    }

    /// Clear both latched battery flags (e.g. after charging).
    pub fn clear_battery_flags(&self) {
        self.word
            .fetch_and(!(BATTERY_LOW | BATTERY_EMPTY), Ordering::AcqRel);
    }

    /// Interrupt side: store an accepted speed and raise the changed flag.
    fn publish_speed(&self, speed: u8) {
        let _ = self
            .word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                Some((word & !SPEED_MASK) | SPEED_CHANGED | u16::from(speed))
            });
    }

    /// Interrupt side: latch battery flags for a classification.
    fn publish_battery(&self, level: BatteryLevel) {
        let bits = match level {
            BatteryLevel::Normal => return,
            BatteryLevel::Low => BATTERY_LOW,
            BatteryLevel::Empty => BATTERY_LOW | BATTERY_EMPTY,
        };
        self.word.fetch_or(bits, Ordering::AcqRel);
    }
}

// ============================================================================
// Hysteresis
// ============================================================================

/// Hysteresis test for a new speed candidate.
///
/// A candidate is accepted if it leaves the dead band of `tolerance` steps
/// around `current`, or if it sits exactly on a rail (`0` or
/// [`MAX_SPEED`]) that `current` is already within `tolerance` of. The rail
/// rule lets the speed settle on the end stops instead of hovering just
/// short of them.
///
/// # Example
///
/// ```rust
/// use rs_wireless_throttle::analog::accept_candidate;
///
/// // Inside the dead band
/// assert!(!accept_candidate(60, 62, 2));
/// // Outside it
/// assert!(accept_candidate(60, 63, 2));
/// // Snapping to the top rail
/// assert!(accept_candidate(125, 126, 2));
/// // Snapping to zero
/// assert!(accept_candidate(2, 0, 2));
/// ```
pub fn accept_candidate(current: u8, candidate: u8, tolerance: u8) -> bool {
    if current.abs_diff(candidate) > tolerance {
        return true;
    }
    candidate != current
        && ((candidate == MAX_SPEED && current >= MAX_SPEED.saturating_sub(tolerance))
            || (candidate == 0 && current <= tolerance))
}

// ============================================================================
// Filter
// ============================================================================

/// Interrupt-side accumulator for the shared analog input.
///
/// Owns everything the interrupt touches exclusively (accumulator, sample
/// count, mode) and publishes results to a [`SpeedSignal`]. Call
/// [`on_conversion_complete`](Self::on_conversion_complete) from the
/// conversion-complete interrupt; it is O(1) and never blocks.
pub struct AnalogFilter<'a, B: BatteryThreshold> {
    signal: &'a SpeedSignal,
    battery: B,
    samples_per_cycle: u8,
    adc_full_scale: u16,
    tolerance: u8,
    divisor: u32,
    accumulator: u32,
    sample_count: u8,
    mode: MeasureMode,
    current_speed: u8,
}

impl<'a, B: BatteryThreshold> AnalogFilter<'a, B> {
    /// Create a filter publishing to `signal`.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not pass [`AnalogConfig::validate`].
    pub fn new(signal: &'a SpeedSignal, config: AnalogConfig, battery: B) -> Self {
        assert!(config.validate().is_ok(), "invalid analog configuration");
        Self {
            signal,
            battery,
            samples_per_cycle: config.samples_per_cycle,
            adc_full_scale: config.adc_full_scale,
            tolerance: config.speed_tolerance,
            divisor: config.divisor(),
            accumulator: 0,
            sample_count: 0,
            mode: MeasureMode::Speed,
            current_speed: signal.peek_speed(),
        }
    }

    /// Select the speed input and kick off the first conversion.
    pub fn start<F: AnalogFrontEnd>(&mut self, front_end: &mut F) {
        self.accumulator = 0;
        self.sample_count = 0;
        self.mode = MeasureMode::Speed;
        front_end.select_channel(self.mode);
        front_end.start_conversion();
    }

    /// Ingest one raw conversion and start the next.
    pub fn on_conversion_complete<F: AnalogFrontEnd>(&mut self, raw: u16, front_end: &mut F) {
        self.accumulator += u32::from(raw.min(self.adc_full_scale));
        self.sample_count += 1;

        if self.sample_count >= self.samples_per_cycle {
            self.sample_count = 0;
            match self.mode {
                MeasureMode::Speed => self.finish_speed_cycle(),
                MeasureMode::Battery => {
                    let level = self.battery.classify(self.accumulator, self.samples_per_cycle);
                    self.signal.publish_battery(level);
                }
            }
            self.accumulator = 0;
            self.mode = self.mode.next();
            front_end.select_channel(self.mode);
        }

        front_end.start_conversion();
    }

    fn finish_speed_cycle(&mut self) {
        let steps = (self.accumulator / self.divisor).min(u32::from(MAX_SPEED)) as u8;
        // Pot is wired so that a full-scale reading is speed 0
        let candidate = MAX_SPEED - steps;
        if accept_candidate(self.current_speed, candidate, self.tolerance) {
            self.current_speed = candidate;
            self.signal.publish_speed(candidate);
        }
    }

    /// Input currently being measured.
    #[inline]
    pub fn mode(&self) -> MeasureMode {
        self.mode
    }

    /// Conversions accumulated in the current cycle.
    #[inline]
    pub fn sample_count(&self) -> u8 {
        self.sample_count
    }

    /// Raw sum of the current cycle's conversions.
    #[inline]
    pub fn accumulator(&self) -> u32 {
        self.accumulator
    }

    /// Last accepted speed.
    #[inline]
    pub fn current_speed(&self) -> u8 {
        self.current_speed
    }

    /// Mapping divisor in use.
    #[inline]
    pub fn divisor(&self) -> u32 {
        self.divisor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockFrontEnd;
    use crate::traits::RawThreshold;

    fn run_cycle<B: BatteryThreshold>(
        filter: &mut AnalogFilter<'_, B>,
        adc: &mut MockFrontEnd,
        raw: u16,
    ) {
        for _ in 0..16 {
            filter.on_conversion_complete(raw, adc);
        }
    }

    // =========================================================================
    // Hysteresis Tests
    // =========================================================================

    #[test]
    fn equal_candidate_never_accepted() {
        for value in 0..=MAX_SPEED {
            assert!(!accept_candidate(value, value, 2));
        }
    }

    #[test]
    fn dead_band_is_symmetric() {
        assert!(!accept_candidate(60, 58, 2));
        assert!(!accept_candidate(60, 62, 2));
        assert!(accept_candidate(60, 57, 2));
        assert!(accept_candidate(60, 63, 2));
    }

    #[test]
    fn rail_snap_top() {
        assert!(accept_candidate(124, 126, 2));
        assert!(accept_candidate(125, 126, 2));
        // Top rail only snaps from within the band
        assert!(!accept_candidate(125, 124, 2));
    }

    #[test]
    fn rail_snap_bottom() {
        assert!(accept_candidate(1, 0, 2));
        assert!(accept_candidate(2, 0, 2));
        assert!(!accept_candidate(1, 2, 2));
    }

    #[test]
    fn zero_tolerance_accepts_any_change() {
        assert!(accept_candidate(60, 61, 0));
        assert!(!accept_candidate(60, 60, 0));
    }

    // =========================================================================
    // SpeedSignal Tests
    // =========================================================================

    #[test]
    fn signal_starts_idle() {
        let signal = SpeedSignal::new();
        assert!(!signal.speed_triggered());
        assert_eq!(signal.read_speed(), 0);
        assert!(!signal.battery_low());
        assert!(!signal.battery_empty());
    }

    #[test]
    fn publish_preserves_battery_flags() {
        let signal = SpeedSignal::new();
        signal.publish_battery(BatteryLevel::Low);
        signal.publish_speed(42);
        assert!(signal.battery_low());
        assert_eq!(signal.peek_speed(), 42);
        assert!(signal.speed_triggered());
    }

    #[test]
    fn empty_battery_sets_both_flags() {
        let signal = SpeedSignal::new();
        signal.publish_battery(BatteryLevel::Empty);
        assert!(signal.battery_low());
        assert!(signal.battery_empty());
        signal.clear_battery_flags();
        assert!(!signal.battery_low());
        assert!(!signal.battery_empty());
    }

    #[test]
    fn normal_battery_does_not_clear_latch() {
        let signal = SpeedSignal::new();
        signal.publish_battery(BatteryLevel::Low);
        signal.publish_battery(BatteryLevel::Normal);
        assert!(signal.battery_low());
    }

    #[test]
    fn peek_does_not_acknowledge() {
        let signal = SpeedSignal::new();
        signal.publish_speed(10);
        assert_eq!(signal.peek_speed(), 10);
        assert!(signal.speed_triggered());
    }

    // =========================================================================
    // Filter Tests
    // =========================================================================

    #[test]
    fn start_selects_speed_and_converts() {
        let signal = SpeedSignal::new();
        let mut filter = AnalogFilter::new(&signal, AnalogConfig::default(), RawThreshold::default());
        let mut adc = MockFrontEnd::new();
        filter.start(&mut adc);
        assert_eq!(adc.selected, Some(MeasureMode::Speed));
        assert_eq!(adc.conversions_started, 1);
    }

    #[test]
    fn same_channel_until_cycle_completes() {
        let signal = SpeedSignal::new();
        let mut filter = AnalogFilter::new(&signal, AnalogConfig::default(), RawThreshold::default());
        let mut adc = MockFrontEnd::new();
        filter.start(&mut adc);

        for i in 1..16u32 {
            filter.on_conversion_complete(100, &mut adc);
            assert_eq!(filter.sample_count() as u32, i);
            assert_eq!(filter.accumulator(), 100 * i);
        }
        assert_eq!(adc.channel_switches, 1); // only the start() select
        filter.on_conversion_complete(100, &mut adc);
        assert_eq!(filter.mode(), MeasureMode::Battery);
        assert_eq!(adc.selected, Some(MeasureMode::Battery));
        assert_eq!(filter.accumulator(), 0);
        assert_eq!(adc.conversions_started, 17);
    }

    #[test]
    fn battery_cycle_does_not_touch_speed() {
        let signal = SpeedSignal::new();
        let mut filter = AnalogFilter::new(&signal, AnalogConfig::default(), RawThreshold::default());
        let mut adc = MockFrontEnd::new();
        filter.start(&mut adc);

        run_cycle(&mut filter, &mut adc, 1023); // speed 0, unchanged
        run_cycle(&mut filter, &mut adc, 0); // battery
        assert_eq!(filter.current_speed(), 0);
        assert!(!signal.speed_triggered());
        assert_eq!(filter.mode(), MeasureMode::Speed);
    }

    #[test]
    fn battery_cycle_latches_low() {
        let signal = SpeedSignal::new();
        let mut filter = AnalogFilter::new(&signal, AnalogConfig::default(), RawThreshold::new(700, 600));
        let mut adc = MockFrontEnd::new();
        filter.start(&mut adc);

        run_cycle(&mut filter, &mut adc, 1023);
        run_cycle(&mut filter, &mut adc, 650);
        assert!(signal.battery_low());
        assert!(!signal.battery_empty());

        run_cycle(&mut filter, &mut adc, 1023);
        run_cycle(&mut filter, &mut adc, 900);
        assert!(signal.battery_low());
    }

    #[test]
    fn raw_values_above_full_scale_are_clamped() {
        let signal = SpeedSignal::new();
        let mut filter = AnalogFilter::new(&signal, AnalogConfig::default(), RawThreshold::default());
        let mut adc = MockFrontEnd::new();
        filter.start(&mut adc);
        run_cycle(&mut filter, &mut adc, u16::MAX);
        assert_eq!(filter.current_speed(), 0);
    }

    #[test]
    fn filter_resumes_from_published_speed() {
        let signal = SpeedSignal::new();
        signal.publish_speed(80);
        let filter = AnalogFilter::new(&signal, AnalogConfig::default(), RawThreshold::default());
        assert_eq!(filter.current_speed(), 80);
    }

    #[test]
    #[should_panic]
    fn invalid_config_panics() {
        let signal = SpeedSignal::new();
        let config = AnalogConfig::default().with_samples_per_cycle(0);
        let _ = AnalogFilter::new(&signal, config, RawThreshold::default());
    }
}
