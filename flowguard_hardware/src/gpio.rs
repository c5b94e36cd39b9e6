//! Raspberry Pi GPIO inputs for the movement sensor and runout switch.

use flowguard_traits::{PulseSource, RunoutSensor};
use rppal::gpio::{Gpio, InputPin};
use tracing::debug;

use crate::error::{HwError, Result};

fn open_input(bcm: u8) -> Result<InputPin> {
    let gpio = Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))?;
    let pin = gpio
        .get(bcm)
        .map_err(|e| HwError::Gpio(format!("open pin {bcm}: {e}")))?;
    debug!(pin = bcm, "input pin opened with pull-up");
    Ok(pin.into_input_pullup())
}

pub struct GpioPulseInput {
    pin: InputPin,
}

impl GpioPulseInput {
    pub fn new(bcm: u8) -> Result<Self> {
        Ok(Self {
            pin: open_input(bcm)?,
        })
    }
}

impl PulseSource for GpioPulseInput {
    fn read_level(
        &mut self,
    ) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.pin.is_high())
    }
}

/// Switch that reads low when filament is missing (`active_low = true`).
pub struct GpioRunoutSwitch {
    pin: InputPin,
    active_low: bool,
}

impl GpioRunoutSwitch {
    pub fn new(bcm: u8, active_low: bool) -> Result<Self> {
        Ok(Self {
            pin: open_input(bcm)?,
            active_low,
        })
    }
}

impl RunoutSensor for GpioRunoutSwitch {
    fn filament_present(
        &mut self,
    ) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let high = self.pin.is_high();
        Ok(if self.active_low { high } else { !high })
    }
}
