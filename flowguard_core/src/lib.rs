#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Filament flow tracking and jam detection (hardware-agnostic).
//!
//! This crate compares how much filament the printer commanded with how much
//! a movement sensor actually saw, and decides when that gap means a jam.
//! All hardware interaction goes through `flowguard_traits::PulseSource`,
//! `RunoutSensor` and `PrintControl`.
//!
//! ## Architecture
//!
//! - **Configuration**: runtime config structs (`config` module)
//! - **Tracking**: expected vs actual distance, cumulative, windowed or EWMA
//!   (`tracker`, backed by the fixed-capacity `sample` ring)
//! - **Classification**: dual hard/soft streaks with grace and latching
//!   (`classifier`)
//! - **Orchestration**: print state, runout and pause decisions (`monitor`,
//!   built through `builder`)
//! - **Sampling**: background edge detection on the pulse input (`sampler`)
//! - **Simulation**: trace replay and scenario generators (`runner`, `scenario`)
//!
//! ## Example
//!
//! ```
//! use flowguard_core::{FlowMonitor, PrintState, mocks::RecordingControl};
//! use flowguard_traits::ManualClock;
//!
//! let clock = ManualClock::new();
//! let mut monitor = FlowMonitor::builder()
//!     .with_control(RecordingControl::new())
//!     .with_clock(clock.clone())
//!     .build()
//!     .unwrap();
//! monitor.set_print_state(PrintState::Printing);
//! monitor.on_telemetry(0.0);
//! clock.advance_ms(1000);
//! monitor.on_telemetry(20.0);
//! monitor.on_pulses(7);
//! let _status = monitor.poll();
//! ```

pub mod builder;
pub mod classifier;
pub mod config;
mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod monitor;
pub mod runner;
pub mod sample;
pub mod sampler;
pub mod scenario;
pub mod status;
pub mod tracker;
pub mod util;

pub use builder::{DynMonitor, MonitorBuilder, build_monitor};
pub use classifier::{JamClassifier, Streak, StreakPhase};
pub use config::{
    DiagnosticsCfg, JamParams, MonitorCfg, PauseCfg, TrackingCfg, TrackingMode, Tuning,
};
pub use error::{BuildError, MonitorError, Report, Result};
pub use monitor::{FlowMonitor, PrintState};
pub use runner::{PollRecord, ReplayReport, compare_modes, replay};
pub use sample::{SAMPLE_CAPACITY, Sample, SampleRing};
pub use sampler::PulseSampler;
pub use scenario::{Scenario, ScenarioParams};
pub use status::{JamKind, JamVerdict, MonitorStatus, PauseReason};
pub use tracker::{FlowTracker, TrackerSnapshot};
