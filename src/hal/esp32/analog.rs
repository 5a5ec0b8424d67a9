//! Speed knob and battery divider via the ESP32 one-shot ADC.
//!
//! The C3 has no conversion-complete interrupt in one-shot mode. Starting a
//! conversion only marks it requested; the blocking read happens when the
//! main loop collects the sample with [`Esp32Analog::take_sample`]. A failed
//! read leaves the request standing, so the next loop retries it.
//!
//! # Wiring
//!
//! - Speed wiper → GPIO0 (ADC1 channel 0)
//! - Battery divider → GPIO1 (ADC1 channel 1)
//!
//! Readings are 12-bit; set `AnalogConfig::adc_full_scale` to 4095.

use esp_idf_hal::adc::attenuation::DB_11;
use esp_idf_hal::adc::oneshot::config::AdcChannelConfig;
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::adc::ADC1;
use esp_idf_hal::gpio::{Gpio0, Gpio1};
use esp_idf_hal::peripheral::Peripheral;
use log::warn;

use crate::traits::{AnalogFrontEnd, MeasureMode};

/// Two-channel analog front end on ADC1.
///
/// # Example
///
/// ```ignore
/// use rs_wireless_throttle::hal::esp32::Esp32Analog;
/// use rs_wireless_throttle::{AnalogConfig, AnalogFilter, SpeedSignal};
///
/// let peripherals = Peripherals::take()?;
/// let adc = AdcDriver::new(peripherals.adc1)?;
/// let mut front_end = Esp32Analog::new(&adc, peripherals.pins.gpio0, peripherals.pins.gpio1)?;
///
/// let config = AnalogConfig::default().with_adc_full_scale(4095);
/// let signal = SpeedSignal::new();
/// let mut filter = AnalogFilter::new(&signal, config, config.battery_threshold());
/// filter.start(&mut front_end);
///
/// loop {
///     if let Some(raw) = front_end.take_sample() {
///         filter.on_conversion_complete(raw, &mut front_end);
///     }
///     // ...
/// }
/// ```
pub struct Esp32Analog<'d> {
    speed: AdcChannelDriver<'d, Gpio0, &'d AdcDriver<'d, ADC1>>,
    battery: AdcChannelDriver<'d, Gpio1, &'d AdcDriver<'d, ADC1>>,
    selected: MeasureMode,
    requested: bool,
}

impl<'d> Esp32Analog<'d> {
    /// Creates the front end with the speed input selected.
    ///
    /// # Errors
    ///
    /// Returns an error if ADC channel initialization fails.
    pub fn new(
        adc: &'d AdcDriver<'d, ADC1>,
        speed_pin: impl Peripheral<P = Gpio0> + 'd,
        battery_pin: impl Peripheral<P = Gpio1> + 'd,
    ) -> Result<Self, esp_idf_hal::sys::EspError> {
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        Ok(Self {
            speed: AdcChannelDriver::new(adc, speed_pin, &config)?,
            battery: AdcChannelDriver::new(adc, battery_pin, &config)?,
            selected: MeasureMode::Speed,
            requested: false,
        })
    }

    /// Run the requested conversion, if any, and return its sample.
    pub fn take_sample(&mut self) -> Option<u16> {
        if !self.requested {
            return None;
        }
        let result = match self.selected {
            MeasureMode::Speed => self.speed.read(),
            MeasureMode::Battery => self.battery.read(),
        };
        match result {
            Ok(raw) => {
                self.requested = false;
                Some(raw)
            }
            Err(e) => {
                warn!("adc read failed: {}", e);
                None
            }
        }
    }

    /// Input the next conversion reads.
    #[inline]
    pub fn selected(&self) -> MeasureMode {
        self.selected
    }
}

impl AnalogFrontEnd for Esp32Analog<'_> {
    fn select_channel(&mut self, mode: MeasureMode) {
        self.selected = mode;
    }

    fn start_conversion(&mut self) {
        self.requested = true;
    }
}
