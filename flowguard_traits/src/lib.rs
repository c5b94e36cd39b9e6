//! Hardware and timing seams shared by the flowguard crates.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Digital input wired to the filament movement sensor.
///
/// The sensor toggles its output once per `mm_per_pulse` of filament travel;
/// callers detect edges by comparing successive levels.
pub trait PulseSource {
    fn read_level(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Switch-type runout sensor.
pub trait RunoutSensor {
    /// `true` while filament is present at the switch.
    fn filament_present(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Printer-side commands the monitor is allowed to issue.
pub trait PrintControl {
    fn pause(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn resume(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: PrintControl + ?Sized> PrintControl for Box<T> {
    fn pause(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).pause()
    }
    fn resume(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).resume()
    }
}
