//! Integration tests for the speed/battery filter

use std::cell::RefCell;
use std::rc::Rc;

use rs_wireless_throttle::{
    hal::MockFrontEnd, AnalogConfig, AnalogFilter, BatteryLevel, BatteryThreshold, MeasureMode,
    RawThreshold, SpeedSignal, MAX_SPEED,
};

const SAMPLES: usize = 16;

/// Raw reading that maps exactly onto `speed` with the default divisor.
fn raw_for(speed: u8) -> u16 {
    let steps = u32::from(MAX_SPEED - speed);
    ((steps * 129).div_ceil(SAMPLES as u32)) as u16
}

/// Feed one speed cycle followed by one battery cycle.
fn speed_then_battery<B: BatteryThreshold>(
    filter: &mut AnalogFilter<'_, B>,
    adc: &mut MockFrontEnd,
    speed_raw: u16,
    battery_raw: u16,
) {
    assert_eq!(filter.mode(), MeasureMode::Speed);
    for _ in 0..SAMPLES {
        filter.on_conversion_complete(speed_raw, adc);
    }
    for _ in 0..SAMPLES {
        filter.on_conversion_complete(battery_raw, adc);
    }
}

/// Small deterministic generator for randomized sample streams.
struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.0 >> 8
    }
}

// ============================================================================
// Mapping
// ============================================================================

#[test]
fn default_divisor() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default();
    let filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    assert_eq!(filter.divisor(), 129);
}

#[test]
fn full_scale_maps_to_zero() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default();
    let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);

    // Leave zero first so the full-scale cycle is a real change
    speed_then_battery(&mut filter, &mut adc, 0, 0);
    assert_eq!(signal.read_speed(), 126);

    for _ in 0..SAMPLES {
        filter.on_conversion_complete(1023, &mut adc);
    }
    // 126 - (16 * 1023) / 129 = 126 - 126
    assert_eq!((16 * 1023) / 129, 126);
    assert!(signal.speed_triggered());
    assert_eq!(signal.read_speed(), 0);
}

#[test]
fn mid_scale_maps_bit_exact() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default();
    let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);

    for _ in 0..SAMPLES {
        filter.on_conversion_complete(700, &mut adc);
    }
    let expected = MAX_SPEED - ((16 * 700) / 129) as u8;
    assert_eq!(signal.read_speed(), expected);
    assert_eq!(expected, 40);
}

#[test]
fn over_range_samples_are_clamped() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default();
    let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);

    speed_then_battery(&mut filter, &mut adc, 0, 0);
    for _ in 0..SAMPLES {
        filter.on_conversion_complete(u16::MAX, &mut adc);
    }
    assert_eq!(signal.read_speed(), 0);
}

#[test]
fn raw_for_helper_is_exact() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default().with_speed_tolerance(0);
    let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);

    for speed in [126, 100, 63, 17, 1, 0] {
        speed_then_battery(&mut filter, &mut adc, raw_for(speed), 0);
        assert_eq!(filter.current_speed(), speed);
    }
}

// ============================================================================
// Hysteresis
// ============================================================================

#[test]
fn jitter_inside_dead_band_is_ignored() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default();
    let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);

    speed_then_battery(&mut filter, &mut adc, raw_for(60), 0);
    assert_eq!(signal.read_speed(), 60);

    for candidate in [61, 62, 59, 58, 60, 62] {
        speed_then_battery(&mut filter, &mut adc, raw_for(candidate), 0);
        assert_eq!(filter.current_speed(), 60);
        assert!(!signal.speed_triggered());
    }
}

#[test]
fn leaving_dead_band_is_accepted() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default();
    let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);

    speed_then_battery(&mut filter, &mut adc, raw_for(60), 0);
    signal.read_speed();

    speed_then_battery(&mut filter, &mut adc, raw_for(63), 0);
    assert!(signal.speed_triggered());
    assert_eq!(signal.read_speed(), 63);
}

#[test]
fn snaps_to_top_rail_within_one_cycle() {
    for start in [124, 125] {
        let signal = SpeedSignal::new();
        let config = AnalogConfig::default();
        let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
        let mut adc = MockFrontEnd::new();
        filter.start(&mut adc);

        speed_then_battery(&mut filter, &mut adc, raw_for(start), 0);
        assert_eq!(signal.read_speed(), start);

        speed_then_battery(&mut filter, &mut adc, raw_for(126), 0);
        assert!(signal.speed_triggered());
        assert_eq!(signal.read_speed(), 126);
    }
}

#[test]
fn snaps_to_zero_within_one_cycle() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default();
    let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);

    speed_then_battery(&mut filter, &mut adc, raw_for(10), 0);
    speed_then_battery(&mut filter, &mut adc, raw_for(2), 0);
    assert_eq!(signal.read_speed(), 2);

    speed_then_battery(&mut filter, &mut adc, 1023, 0);
    assert_eq!(signal.read_speed(), 0);
}

// ============================================================================
// Multiplexing
// ============================================================================

#[test]
fn mode_alternates_every_cycle() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default();
    let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);
    assert_eq!(adc.selected, Some(MeasureMode::Speed));

    let mut rng = Lcg(7);
    let mut expected = MeasureMode::Speed;
    for _ in 0..40 {
        for i in 0..SAMPLES {
            assert_eq!(filter.mode(), expected);
            assert_eq!(filter.sample_count() as usize, i);
            filter.on_conversion_complete((rng.next() % 1024) as u16, &mut adc);
        }
        expected = expected.next();
        assert_eq!(filter.mode(), expected);
        assert_eq!(adc.selected, Some(expected));
        assert_eq!(filter.accumulator(), 0);
    }
    // One select per cycle plus the initial one
    assert_eq!(adc.channel_switches, 41);
    assert_eq!(adc.conversions_started, 40 * SAMPLES + 1);
}

#[test]
fn battery_cycles_do_not_move_speed() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default();
    let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);

    speed_then_battery(&mut filter, &mut adc, raw_for(80), 0);
    assert_eq!(signal.read_speed(), 80);

    speed_then_battery(&mut filter, &mut adc, raw_for(80), 1023);
    speed_then_battery(&mut filter, &mut adc, raw_for(80), 0);
    assert!(!signal.speed_triggered());
    assert_eq!(signal.peek_speed(), 80);
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn speed_stays_in_range_for_random_input() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default().with_speed_tolerance(0);
    let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);

    let mut rng = Lcg(0xdead_beef);
    for _ in 0..20_000 {
        let raw = (rng.next() % 2048) as u16;
        filter.on_conversion_complete(raw, &mut adc);
        assert!(filter.current_speed() <= MAX_SPEED);
        assert!(signal.peek_speed() <= MAX_SPEED);
    }
}

#[test]
fn trigger_fires_once_per_change() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default();
    let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);

    let mut rng = Lcg(42);
    let mut accepted = 0;
    let mut triggers = 0;
    for _ in 0..200 {
        let before = filter.current_speed();
        speed_then_battery(&mut filter, &mut adc, (rng.next() % 1024) as u16, 0);
        if filter.current_speed() != before {
            accepted += 1;
        }
        if signal.speed_triggered() {
            triggers += 1;
            assert!(!signal.speed_triggered());
        }
    }
    assert!(accepted > 0);
    assert_eq!(accepted, triggers);
}

// ============================================================================
// Battery
// ============================================================================

#[test]
fn battery_low_then_empty_latch() {
    let signal = SpeedSignal::new();
    let config = AnalogConfig::default().with_battery_thresholds(600, 300);
    let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);

    speed_then_battery(&mut filter, &mut adc, 1023, 800);
    assert!(!signal.battery_low());
    assert!(!signal.battery_empty());

    speed_then_battery(&mut filter, &mut adc, 1023, 500);
    assert!(signal.battery_low());
    assert!(!signal.battery_empty());

    speed_then_battery(&mut filter, &mut adc, 1023, 200);
    assert!(signal.battery_low());
    assert!(signal.battery_empty());

    // Recovered voltage does not clear the latch
    speed_then_battery(&mut filter, &mut adc, 1023, 800);
    assert!(signal.battery_empty());

    signal.clear_battery_flags();
    assert!(!signal.battery_low());
    assert!(!signal.battery_empty());
}

#[test]
fn custom_battery_threshold_sees_accumulator() {
    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<(u32, u8)>>>);

    impl BatteryThreshold for Recorder {
        fn classify(&mut self, accumulator: u32, samples: u8) -> BatteryLevel {
            self.0.borrow_mut().push((accumulator, samples));
            BatteryLevel::Normal
        }
    }

    let recorder = Recorder::default();
    let signal = SpeedSignal::new();
    let mut filter = AnalogFilter::new(&signal, AnalogConfig::default(), recorder.clone());
    let mut adc = MockFrontEnd::new();
    filter.start(&mut adc);

    speed_then_battery(&mut filter, &mut adc, 0, 100);
    speed_then_battery(&mut filter, &mut adc, 0, 1023);

    // Only battery cycles reach the threshold
    assert_eq!(*recorder.0.borrow(), vec![(1600, 16), (16 * 1023, 16)]);
    assert!(!signal.battery_low());
}

#[test]
fn disabled_thresholds_never_flag() {
    let mut threshold = AnalogConfig::default().battery_threshold();
    assert_eq!(threshold, RawThreshold::new(0, 0));
    assert_eq!(threshold.classify(0, 16), BatteryLevel::Normal);
}
