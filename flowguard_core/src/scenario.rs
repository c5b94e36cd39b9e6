//! Deterministic trace generators for common printing situations.
//!
//! Each generator drives a simulated extruder: commanded extrusion is
//! reported as absolute telemetry every `telemetry_ms`, while the filament
//! that physically moves produces pulses at `real_mm_per_pulse`. Pulses for
//! an interval are emitted right after that interval's telemetry. Setting
//! `real_mm_per_pulse` away from the configured value models calibration
//! drift.

use std::fmt;
use std::str::FromStr;

use flowguard_config::{TraceEntry, TraceEvent, TraceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Healthy,
    HardJam,
    SoftJam,
    SparseInfill,
    Retraction,
    Spike,
    Slow,
    Drift,
}

impl Scenario {
    pub const ALL: [Scenario; 8] = [
        Scenario::Healthy,
        Scenario::HardJam,
        Scenario::SoftJam,
        Scenario::SparseInfill,
        Scenario::Retraction,
        Scenario::Spike,
        Scenario::Slow,
        Scenario::Drift,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::HardJam => "hard_jam",
            Self::SoftJam => "soft_jam",
            Self::SparseInfill => "sparse_infill",
            Self::Retraction => "retraction",
            Self::Spike => "spike",
            Self::Slow => "slow",
            Self::Drift => "drift",
        }
    }

    /// Whether a correct detector should pause on this scenario.
    pub fn expects_jam(self) -> bool {
        matches!(self, Self::HardJam | Self::SoftJam)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|sc| sc.name() == norm)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|sc| sc.name()).collect();
                format!("unknown scenario '{s}' (expected one of {})", names.join(", "))
            })
    }
}

/// Knobs shared by every generator.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioParams {
    /// Distance per sensor pulse the hardware actually produces.
    pub real_mm_per_pulse: f32,
    /// Nominal extrusion rate while printing (mm/s).
    pub rate_mm_s: f32,
    pub telemetry_ms: u64,
    pub duration_ms: u64,
    /// Time the failure in jam and spike scenarios begins.
    pub fault_at_ms: u64,
    /// Percent by which `Drift` lengthens the real distance per pulse.
    pub drift_error_pct: f32,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            real_mm_per_pulse: 2.88,
            rate_mm_s: 20.0,
            telemetry_ms: 1000,
            duration_ms: 30_000,
            fault_at_ms: 10_000,
            drift_error_pct: 10.0,
        }
    }
}

/// Extruder model that turns commanded and physical motion into events.
struct Extruder {
    mm_per_pulse: f32,
    commanded_mm: f32,
    physical_mm: f32,
    emitted: u64,
    out: Vec<TraceEntry>,
}

impl Extruder {
    fn new(mm_per_pulse: f32) -> Self {
        let mut out = Vec::new();
        out.push(TraceEntry {
            t_ms: 0,
            event: TraceEvent::Status(TraceStatus::Printing),
        });
        out.push(TraceEntry {
            t_ms: 0,
            event: TraceEvent::Total(0.0),
        });
        Self {
            mm_per_pulse: mm_per_pulse.max(0.001),
            commanded_mm: 0.0,
            physical_mm: 0.0,
            emitted: 0,
            out,
        }
    }

    /// Commanded extrusion `mm` over the interval ending at `t_ms`, of which
    /// `flow` (0..=1) physically moves.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn step(&mut self, t_ms: u64, mm: f32, flow: f32) {
        self.commanded_mm += mm;
        self.out.push(TraceEntry {
            t_ms,
            event: TraceEvent::Total(self.commanded_mm),
        });
        if mm > 0.0 {
            self.physical_mm += mm * flow.clamp(0.0, 1.0);
        }
        let due = (self.physical_mm / self.mm_per_pulse).floor() as u64;
        let n = due.saturating_sub(self.emitted);
        if n > 0 {
            self.emitted = due;
            self.out.push(TraceEntry {
                t_ms,
                event: TraceEvent::Pulse(u32::try_from(n).unwrap_or(u32::MAX)),
            });
        }
    }

    fn finish(self) -> Vec<TraceEntry> {
        self.out
    }
}

/// Build the event trace for `scenario`.
#[allow(clippy::cast_precision_loss)]
pub fn generate(scenario: Scenario, p: &ScenarioParams) -> Vec<TraceEntry> {
    let step_ms = p.telemetry_ms.max(1);
    let per_step = p.rate_mm_s * step_ms as f32 / 1000.0;
    let real = match scenario {
        Scenario::Drift => p.real_mm_per_pulse * (1.0 + p.drift_error_pct / 100.0),
        _ => p.real_mm_per_pulse,
    };
    let mut ex = Extruder::new(real);

    let mut t = step_ms;
    while t <= p.duration_ms {
        let faulted = t > p.fault_at_ms;
        match scenario {
            Scenario::Healthy | Scenario::Drift => ex.step(t, per_step, 1.0),
            Scenario::HardJam => ex.step(t, per_step, if faulted { 0.0 } else { 1.0 }),
            Scenario::SoftJam => ex.step(t, per_step, if faulted { 0.2 } else { 1.0 }),
            Scenario::Spike => {
                // one interval of no movement, then normal flow
                let in_spike = faulted && t <= p.fault_at_ms + step_ms;
                ex.step(t, per_step, if in_spike { 0.0 } else { 1.0 });
            }
            Scenario::SparseInfill => {
                // 2 s of extrusion, then 3 s of travel with no extrusion
                let extruding = (t % 5000) <= 2000 && (t % 5000) != 0;
                ex.step(t, if extruding { per_step } else { 0.0 }, 1.0);
            }
            Scenario::Retraction => {
                if t % 5000 == 0 {
                    ex.step(t, -2.0, 1.0);
                } else {
                    ex.step(t, per_step, 1.0);
                }
            }
            Scenario::Slow => ex.step(t, 1.5 * step_ms as f32 / 1000.0, 1.0),
        }
        t += step_ms;
    }
    ex.finish()
}

/// Commanded length of `length_mm` at the default rate with the real pulse
/// distance off by `error_pct`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn drift_trace(error_pct: f32, length_mm: f32, p: &ScenarioParams) -> Vec<TraceEntry> {
    let rate = p.rate_mm_s.max(0.1);
    let duration_ms = (length_mm.max(0.0) / rate * 1000.0).ceil() as u64;
    let params = ScenarioParams {
        duration_ms,
        drift_error_pct: error_pct,
        ..*p
    };
    generate(Scenario::Drift, &params)
}
