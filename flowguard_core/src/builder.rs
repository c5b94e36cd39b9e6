//! Type-state builder for `FlowMonitor` and generic `build_monitor` constructor.
//!
//! The builder enforces at compile time that printer control is provided
//! before `build()` is available. `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use flowguard_traits::PrintControl;
use flowguard_traits::clock::{Clock, MonotonicClock};

use crate::classifier::JamClassifier;
use crate::config::*;
use crate::error::{BuildError, Result};
use crate::monitor::{FlowMonitor, PrintState};
use crate::status::JamVerdict;
use crate::tracker::FlowTracker;

/// Monitor over a boxed printer control, as produced by `MonitorBuilder`.
pub type DynMonitor = FlowMonitor<Box<dyn PrintControl>>;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `FlowMonitor`. All fields are validated on `build()`.
pub struct MonitorBuilder<K, C = Box<dyn PrintControl>> {
    control: Option<C>,
    cfg: MonitorCfg,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    _k: PhantomData<K>,
}

impl<C> Default for MonitorBuilder<Missing, C> {
    fn default() -> Self {
        Self {
            control: None,
            cfg: MonitorCfg::default(),
            clock: None,
            _k: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(cfg: &MonitorCfg) -> Result<()> {
    if !cfg.mm_per_pulse.is_finite() || cfg.mm_per_pulse <= 0.0 {
        return Err(invalid("mm_per_pulse must be > 0"));
    }
    if cfg.tracking.window_ms == 0 {
        return Err(invalid("window_ms must be >= 1"));
    }
    if !cfg.tracking.ewma_alpha.is_finite() {
        return Err(invalid("ewma_alpha must be finite"));
    }
    if cfg.detection.check_interval_ms == 0 {
        return Err(invalid("check_interval_ms must be >= 1"));
    }
    if !cfg.detection.hard_jam_threshold_mm.is_finite()
        || cfg.detection.hard_jam_threshold_mm.is_sign_negative()
    {
        return Err(invalid("hard_jam_threshold_mm must be >= 0"));
    }
    let t = &cfg.tuning;
    for v in [
        t.noise_floor_mm,
        t.min_advance_mm,
        t.soft_min_deficit_mm,
        t.min_ratio_expected_mm,
    ] {
        if !v.is_finite() || v.is_sign_negative() {
            return Err(invalid("tuning distances must be finite and >= 0"));
        }
    }
    if !(0.0..=1.0).contains(&t.hard_pass_ratio) {
        return Err(invalid("hard_pass_ratio must be in [0, 1]"));
    }
    if t.sample_stale_ms == 0 {
        return Err(invalid("sample_stale_ms must be >= 1"));
    }
    if t.flow_telemetry_stale_ms == 0 {
        return Err(invalid("flow_telemetry_stale_ms must be >= 1"));
    }
    Ok(())
}

/// Validate configuration and construct a monitor.
///
/// Shared by `MonitorBuilder::try_build()` and `build_monitor()`.
fn validate_and_build<C: PrintControl>(
    control: C,
    cfg: MonitorCfg,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
) -> Result<FlowMonitor<C>> {
    validate(&cfg)?;

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(c) => c,
        None => Arc::new(MonotonicClock::new()),
    };
    let tracker = FlowTracker::new(clock, cfg.tracking, cfg.tuning);

    tracing::debug!(
        mode = cfg.tracking.mode.as_str(),
        window_ms = cfg.tracking.window_ms,
        mm_per_pulse = cfg.mm_per_pulse,
        "flow monitor built"
    );

    Ok(FlowMonitor {
        control,
        cfg,
        tracker,
        classifier: JamClassifier::new(cfg.tuning),
        state: PrintState::Idle,
        print_started_ms: 0,
        last_check_ms: None,
        last_verdict: JamVerdict::Inactive,
        runout: false,
        pause_issued: false,
        pauses: 0,
        pulses: 0,
        telemetry_seen_ms: 0,
        last_edge_ms: 0,
    })
}

impl<K, C: PrintControl> MonitorBuilder<K, C> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<FlowMonitor<C>> {
        let control = self
            .control
            .ok_or_else(|| eyre::Report::new(BuildError::MissingControl))?;
        validate_and_build(control, self.cfg, self.clock)
    }
}

/// Chainable setters that do not affect type-state.
impl<K, C> MonitorBuilder<K, C> {
    pub fn with_config(mut self, cfg: MonitorCfg) -> Self {
        self.cfg = cfg;
        self
    }
    pub fn with_mm_per_pulse(mut self, mm: f32) -> Self {
        self.cfg.mm_per_pulse = mm;
        self
    }
    pub fn with_tracking(mut self, tracking: TrackingCfg) -> Self {
        self.cfg.tracking = tracking;
        self
    }
    pub fn with_detection(mut self, detection: JamParams) -> Self {
        self.cfg.detection = detection;
        self
    }
    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.cfg.tuning = tuning;
        self
    }
    pub fn with_pause(mut self, pause: PauseCfg) -> Self {
        self.cfg.pause = pause;
        self
    }
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsCfg) -> Self {
        self.cfg.diagnostics = diagnostics;
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }
}

impl<C> MonitorBuilder<Missing, C> {
    pub fn with_control<C2: PrintControl>(self, control: C2) -> MonitorBuilder<Set, C2> {
        MonitorBuilder {
            control: Some(control),
            cfg: self.cfg,
            clock: self.clock,
            _k: PhantomData,
        }
    }
}

impl<C: PrintControl> MonitorBuilder<Set, C> {
    /// Validate and build. Only available once printer control is set.
    pub fn build(self) -> Result<FlowMonitor<C>> {
        self.try_build()
    }

    /// Erase the control type so monitors over different printers share a type.
    pub fn boxed(self) -> MonitorBuilder<Set, Box<dyn PrintControl>>
    where
        C: 'static,
    {
        MonitorBuilder {
            control: self.control.map(|c| Box::new(c) as Box<dyn PrintControl>),
            cfg: self.cfg,
            clock: self.clock,
            _k: PhantomData,
        }
    }
}

/// Build a statically-dispatched monitor without the builder.
///
/// Delegates to the shared `validate_and_build`.
pub fn build_monitor<C: PrintControl>(
    control: C,
    cfg: MonitorCfg,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
) -> Result<FlowMonitor<C>> {
    validate_and_build(control, cfg, clock)
}
