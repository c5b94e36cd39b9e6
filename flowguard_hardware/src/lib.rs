pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

use flowguard_traits::{PrintControl, PulseSource, RunoutSensor};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::error::HwError;

/// Shared handle describing how much filament has physically moved past a
/// simulated sensor. Feeding it from one thread and reading the sensor from
/// another is fine; distance is kept in micrometres.
#[derive(Debug, Clone)]
pub struct SimFilament {
    travelled_um: Arc<AtomicU64>,
    pulse_um: u64,
}

impl SimFilament {
    pub fn new(mm_per_pulse: f32) -> Self {
        let pulse_um = (mm_per_pulse.max(0.001) * 1000.0).round() as u64;
        Self {
            travelled_um: Arc::new(AtomicU64::new(0)),
            pulse_um: pulse_um.max(1),
        }
    }

    /// Move filament forward by `mm`. Negative or non-finite input is ignored
    /// because the wheel cannot report direction.
    pub fn feed_mm(&self, mm: f32) {
        if !(mm.is_finite() && mm > 0.0) {
            return;
        }
        let um = (mm * 1000.0).round() as u64;
        self.travelled_um.fetch_add(um, Ordering::Relaxed);
    }

    pub fn travelled_mm(&self) -> f32 {
        self.travelled_um.load(Ordering::Relaxed) as f32 / 1000.0
    }

    /// Whole pulses the sensor owes for the distance fed so far.
    pub fn pulses_due(&self) -> u64 {
        self.travelled_um.load(Ordering::Relaxed) / self.pulse_um
    }
}

/// Simulated movement sensor. Each read toggles the output at most once, so a
/// poller sees every edge as long as it keeps up with the feed rate.
pub struct SimulatedPulseSensor {
    filament: SimFilament,
    level: bool,
    emitted: u64,
}

impl SimulatedPulseSensor {
    pub fn new(filament: SimFilament) -> Self {
        Self {
            filament,
            level: false,
            emitted: 0,
        }
    }
}

impl PulseSource for SimulatedPulseSensor {
    fn read_level(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        if self.emitted < self.filament.pulses_due() {
            self.level = !self.level;
            self.emitted += 1;
        }
        Ok(self.level)
    }
}

/// Simulated runout switch; clones share state.
#[derive(Debug, Clone)]
pub struct SimulatedRunout {
    present: Arc<AtomicBool>,
}

impl Default for SimulatedRunout {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRunout {
    pub fn new() -> Self {
        Self {
            present: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::Relaxed);
    }
}

impl RunoutSensor for SimulatedRunout {
    fn filament_present(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.present.load(Ordering::Relaxed))
    }
}

/// Simulated printer link that counts pause/resume commands.
///
/// `set_connected(false)` makes every command fail with `HwError::Disconnected`.
#[derive(Debug, Clone)]
pub struct SimulatedPrinter {
    pauses: Arc<AtomicU32>,
    resumes: Arc<AtomicU32>,
    connected: Arc<AtomicBool>,
}

impl Default for SimulatedPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPrinter {
    pub fn new() -> Self {
        Self {
            pauses: Arc::new(AtomicU32::new(0)),
            resumes: Arc::new(AtomicU32::new(0)),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn pauses(&self) -> u32 {
        self.pauses.load(Ordering::Relaxed)
    }

    pub fn resumes(&self) -> u32 {
        self.resumes.load(Ordering::Relaxed)
    }

    fn check_link(&self) -> Result<(), HwError> {
        if self.connected.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(HwError::Disconnected)
        }
    }
}

impl PrintControl for SimulatedPrinter {
    fn pause(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check_link()?;
        self.pauses.fetch_add(1, Ordering::Relaxed);
        tracing::info!("pause sent (simulated)");
        Ok(())
    }

    fn resume(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check_link()?;
        self.resumes.fetch_add(1, Ordering::Relaxed);
        tracing::info!("resume sent (simulated)");
        Ok(())
    }
}
