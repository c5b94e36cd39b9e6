//! `From` implementations bridging `flowguard_config` types to `flowguard_core` types.

use crate::config::{
    DiagnosticsCfg, JamParams, MonitorCfg, PauseCfg, TrackingCfg, TrackingMode, Tuning,
};
use crate::monitor::PrintState;

// ── TrackingMode ─────────────────────────────────────────────────────────────

impl From<flowguard_config::TrackingMode> for TrackingMode {
    fn from(m: flowguard_config::TrackingMode) -> Self {
        match m {
            flowguard_config::TrackingMode::Cumulative => Self::Cumulative,
            flowguard_config::TrackingMode::Windowed => Self::Windowed,
            flowguard_config::TrackingMode::Ewma => Self::Ewma,
        }
    }
}

// ── TrackingCfg ──────────────────────────────────────────────────────────────

impl From<&flowguard_config::TrackingCfg> for TrackingCfg {
    fn from(c: &flowguard_config::TrackingCfg) -> Self {
        Self {
            mode: c.mode.into(),
            window_ms: c.window_ms,
            ewma_alpha: c.ewma_alpha,
        }
    }
}

// ── JamParams ────────────────────────────────────────────────────────────────

impl From<&flowguard_config::DetectionCfg> for JamParams {
    fn from(c: &flowguard_config::DetectionCfg) -> Self {
        Self {
            ratio_threshold: c.ratio_threshold,
            hard_jam_threshold_mm: c.hard_jam_mm,
            soft_jam_time_ms: c.soft_jam_time_ms,
            hard_jam_time_ms: c.hard_jam_time_ms,
            check_interval_ms: c.check_interval_ms,
            grace_period_ms: c.grace_period_ms,
        }
    }
}

// ── Tuning ───────────────────────────────────────────────────────────────────

impl From<&flowguard_config::TuningCfg> for Tuning {
    fn from(c: &flowguard_config::TuningCfg) -> Self {
        Self {
            noise_floor_mm: c.noise_floor_mm,
            min_advance_mm: c.min_advance_mm,
            hard_pass_ratio: c.hard_pass_ratio,
            soft_min_deficit_mm: c.soft_min_deficit_mm,
            telemetry_gap_ms: c.telemetry_gap_ms,
            sample_stale_ms: c.sample_stale_ms,
            min_ratio_expected_mm: c.min_ratio_expected_mm,
            flow_telemetry_stale_ms: c.flow_telemetry_stale_ms,
            movement_timeout_ms: c.movement_timeout_ms,
        }
    }
}

// ── PauseCfg ─────────────────────────────────────────────────────────────────

impl From<&flowguard_config::PauseCfg> for PauseCfg {
    fn from(c: &flowguard_config::PauseCfg) -> Self {
        Self {
            enabled: c.enabled,
            pause_on_runout: c.pause_on_runout,
            start_print_timeout_ms: c.start_print_timeout_ms,
        }
    }
}

// ── DiagnosticsCfg ───────────────────────────────────────────────────────────

impl From<&flowguard_config::Logging> for DiagnosticsCfg {
    fn from(c: &flowguard_config::Logging) -> Self {
        Self {
            verbose: c.verbose,
            flow_summary: c.flow_summary,
        }
    }
}

// ── MonitorCfg ───────────────────────────────────────────────────────────────

impl From<&flowguard_config::Config> for MonitorCfg {
    fn from(c: &flowguard_config::Config) -> Self {
        Self {
            mm_per_pulse: c.sensor.movement_mm_per_pulse,
            tracking: (&c.tracking).into(),
            detection: (&c.detection).into(),
            tuning: (&c.tuning).into(),
            pause: (&c.pause).into(),
            diagnostics: (&c.logging).into(),
        }
    }
}

// ── PrintState ───────────────────────────────────────────────────────────────

impl From<flowguard_config::TraceStatus> for PrintState {
    fn from(s: flowguard_config::TraceStatus) -> Self {
        match s {
            flowguard_config::TraceStatus::Idle => Self::Idle,
            flowguard_config::TraceStatus::Printing => Self::Printing,
            flowguard_config::TraceStatus::Paused => Self::Paused,
            flowguard_config::TraceStatus::Complete => Self::Complete,
        }
    }
}
