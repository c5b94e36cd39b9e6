//! Runtime configuration for the tracker, classifier and monitor.
//!
//! These are the structs the engine consumes. They are separate from the
//! TOML-deserialized config in `flowguard_config`; see `conversions`.

/// Accounting strategy for expected vs actual distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrackingMode {
    /// Totals since the last baseline. Calibration error accumulates.
    Cumulative,
    /// Sum of samples inside a trailing time window.
    #[default]
    Windowed,
    /// Exponentially weighted averages of expected and actual deltas.
    Ewma,
}

impl TrackingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cumulative => "cumulative",
            Self::Windowed => "windowed",
            Self::Ewma => "ewma",
        }
    }
}

/// Tracker strategy and its parameters.
#[derive(Debug, Clone, Copy)]
pub struct TrackingCfg {
    pub mode: TrackingMode,
    /// Trailing window for `Windowed` mode and for sample pruning in general.
    pub window_ms: u64,
    /// EWMA smoothing factor, clamped to [0.01, 1.0] when applied.
    pub ewma_alpha: f32,
}

impl Default for TrackingCfg {
    fn default() -> Self {
        Self {
            mode: TrackingMode::Windowed,
            window_ms: 5000,
            ewma_alpha: 0.3,
        }
    }
}

/// Per-check jam parameters. Zero times select the built-in defaults.
#[derive(Debug, Clone, Copy)]
pub struct JamParams {
    /// Passing flow ratio for the soft-jam streak, clamped to (0, 1].
    pub ratio_threshold: f32,
    /// Commanded distance a hard-jam streak must cover before it may fire.
    pub hard_jam_threshold_mm: f32,
    pub soft_jam_time_ms: u64,
    pub hard_jam_time_ms: u64,
    /// 0 disables evaluation entirely.
    pub check_interval_ms: u64,
    pub grace_period_ms: u64,
}

pub const DEFAULT_RATIO_THRESHOLD: f32 = 0.25;
pub const DEFAULT_SOFT_JAM_TIME_MS: u64 = 10_000;
pub const DEFAULT_HARD_JAM_TIME_MS: u64 = 5_000;

impl Default for JamParams {
    fn default() -> Self {
        Self {
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
            hard_jam_threshold_mm: 5.0,
            soft_jam_time_ms: DEFAULT_SOFT_JAM_TIME_MS,
            hard_jam_time_ms: DEFAULT_HARD_JAM_TIME_MS,
            check_interval_ms: 1000,
            grace_period_ms: 500,
        }
    }
}

impl JamParams {
    /// Ratio threshold with the default applied and the upper clamp enforced.
    pub fn effective_ratio_threshold(&self) -> f32 {
        if self.ratio_threshold.is_nan() || self.ratio_threshold <= 0.0 {
            DEFAULT_RATIO_THRESHOLD
        } else {
            self.ratio_threshold.min(1.0)
        }
    }

    pub fn effective_soft_jam_time_ms(&self) -> u64 {
        if self.soft_jam_time_ms == 0 {
            DEFAULT_SOFT_JAM_TIME_MS
        } else {
            self.soft_jam_time_ms
        }
    }

    pub fn effective_hard_jam_time_ms(&self) -> u64 {
        if self.hard_jam_time_ms == 0 {
            DEFAULT_HARD_JAM_TIME_MS
        } else {
            self.hard_jam_time_ms
        }
    }
}

/// Numeric floors shared by tracker and classifier.
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    /// Telemetry deltas at or below this are ignored (mm).
    pub noise_floor_mm: f32,
    /// Latest sample must command at least this much to be judged (mm).
    pub min_advance_mm: f32,
    /// Hard streak ratio below which filament counts as not moving.
    pub hard_pass_ratio: f32,
    /// Soft streak must owe more than this before it may fire (mm).
    pub soft_min_deficit_mm: f32,
    /// Silence longer than this followed by extrusion restarts the grace period.
    pub telemetry_gap_ms: u64,
    /// Samples older than this are no longer judged.
    pub sample_stale_ms: u64,
    /// Flow ratio reads 0 below this much expected distance (mm).
    pub min_ratio_expected_mm: f32,
    /// Telemetry older than this can no longer be trusted to judge flow.
    pub flow_telemetry_stale_ms: u64,
    /// Without fresh telemetry, this long without a sensor edge is a stall.
    /// 0 disables the fallback.
    pub movement_timeout_ms: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            noise_floor_mm: 0.01,
            min_advance_mm: 0.05,
            hard_pass_ratio: 0.10,
            soft_min_deficit_mm: 0.5,
            telemetry_gap_ms: 2000,
            sample_stale_ms: 2000,
            min_ratio_expected_mm: 1.0,
            flow_telemetry_stale_ms: 3000,
            movement_timeout_ms: 10_000,
        }
    }
}

/// When the monitor may act on a verdict.
#[derive(Debug, Clone, Copy)]
pub struct PauseCfg {
    pub enabled: bool,
    pub pause_on_runout: bool,
    pub start_print_timeout_ms: u64,
}

impl Default for PauseCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            pause_on_runout: true,
            start_print_timeout_ms: 10_000,
        }
    }
}

/// Optional log output from the monitor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticsCfg {
    pub verbose: bool,
    pub flow_summary: bool,
}

/// Everything a `FlowMonitor` needs besides its collaborators.
#[derive(Debug, Clone, Copy)]
pub struct MonitorCfg {
    pub mm_per_pulse: f32,
    pub tracking: TrackingCfg,
    pub detection: JamParams,
    pub tuning: Tuning,
    pub pause: PauseCfg,
    pub diagnostics: DiagnosticsCfg,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            mm_per_pulse: 2.88,
            tracking: TrackingCfg::default(),
            detection: JamParams::default(),
            tuning: Tuning::default(),
            pause: PauseCfg::default(),
            diagnostics: DiagnosticsCfg::default(),
        }
    }
}
