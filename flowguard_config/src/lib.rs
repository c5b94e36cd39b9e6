#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and trace parsing for the filament monitor.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//!   Every section is optional and falls back to the firmware defaults.
//! - Trace CSV loader enforces headers and parses each row into a typed event
//!   for offline replay.
use serde::Deserialize;
use serde::de::Deserializer;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorCfg {
    /// Filament travel per sensor output toggle (mm).
    pub movement_mm_per_pulse: f32,
    /// BCM pin of the movement sensor (hardware builds only).
    pub pin: Option<u8>,
    /// BCM pin of the runout switch (hardware builds only).
    pub runout_pin: Option<u8>,
    /// Runout switch reads low when filament is missing.
    pub runout_active_low: bool,
    /// Edge sampling rate for the movement sensor.
    pub poll_hz: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            movement_mm_per_pulse: 2.88,
            pin: None,
            runout_pin: None,
            runout_active_low: true,
            poll_hz: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrackingMode {
    Cumulative,
    #[default]
    Windowed,
    Ewma,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TrackingCfg {
    /// "cumulative" | "windowed" | "ewma", or the numeric codes 0 | 1 | 2.
    #[serde(deserialize_with = "de_tracking_mode")]
    pub mode: TrackingMode,
    pub window_ms: u64,
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

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModeToml {
    Code(u8),
    Name(String),
}

fn de_tracking_mode<'de, D>(deserializer: D) -> Result<TrackingMode, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match ModeToml::deserialize(deserializer)? {
        ModeToml::Code(0) => Ok(TrackingMode::Cumulative),
        ModeToml::Code(1) => Ok(TrackingMode::Windowed),
        ModeToml::Code(2) => Ok(TrackingMode::Ewma),
        ModeToml::Code(n) => Err(D::Error::custom(format!(
            "unknown tracking mode code {n} (expected 0, 1 or 2)"
        ))),
        ModeToml::Name(s) => match s.to_ascii_lowercase().as_str() {
            "cumulative" => Ok(TrackingMode::Cumulative),
            "windowed" => Ok(TrackingMode::Windowed),
            "ewma" => Ok(TrackingMode::Ewma),
            other => Err(D::Error::custom(format!(
                "unknown tracking mode '{other}' (expected cumulative, windowed or ewma)"
            ))),
        },
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DetectionCfg {
    /// Passing flow ratio; a sustained ratio below it is a soft jam. 0 picks the default.
    pub ratio_threshold: f32,
    /// Minimum commanded distance (mm) a hard-jam streak must cover before it fires.
    pub hard_jam_mm: f32,
    /// 0 picks the default.
    pub soft_jam_time_ms: u64,
    /// 0 picks the default.
    pub hard_jam_time_ms: u64,
    pub check_interval_ms: u64,
    pub grace_period_ms: u64,
}

impl Default for DetectionCfg {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.25,
            hard_jam_mm: 5.0,
            soft_jam_time_ms: 10_000,
            hard_jam_time_ms: 5_000,
            check_interval_ms: 1_000,
            grace_period_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TuningCfg {
    pub noise_floor_mm: f32,
    pub min_advance_mm: f32,
    pub hard_pass_ratio: f32,
    pub soft_min_deficit_mm: f32,
    pub telemetry_gap_ms: u64,
    pub sample_stale_ms: u64,
    pub min_ratio_expected_mm: f32,
    /// Telemetry silent for longer than this hands detection to the
    /// movement timeout.
    pub flow_telemetry_stale_ms: u64,
    /// No sensor edge for this long while telemetry is stale counts as a
    /// stall. 0 disables the fallback.
    pub movement_timeout_ms: u64,
}

impl Default for TuningCfg {
    fn default() -> Self {
        Self {
            noise_floor_mm: 0.01,
            min_advance_mm: 0.05,
            hard_pass_ratio: 0.10,
            soft_min_deficit_mm: 0.5,
            telemetry_gap_ms: 2_000,
            sample_stale_ms: 2_000,
            min_ratio_expected_mm: 1.0,
            flow_telemetry_stale_ms: 3_000,
            movement_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PauseCfg {
    pub enabled: bool,
    pub pause_on_runout: bool,
    /// No pause is issued during the first N ms of a print.
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

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
    /// Per-check debug lines from the monitor.
    pub verbose: bool,
    /// One info line per check with expected/actual/deficit/ratio.
    pub flow_summary: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorCfg,
    pub tracking: TrackingCfg,
    pub detection: DetectionCfg,
    pub tuning: TuningCfg,
    pub pause: PauseCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read and parse a TOML config file (validation is left to the caller).
pub fn load_toml_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))
}

const MAX_WINDOW_MS: u64 = 10 * 60 * 1000;

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sensor
        let mm = self.sensor.movement_mm_per_pulse;
        if !(mm.is_finite() && mm > 0.0) {
            eyre::bail!("sensor.movement_mm_per_pulse must be > 0");
        }
        if mm > 100.0 {
            eyre::bail!("sensor.movement_mm_per_pulse is unreasonably large (>100mm)");
        }
        if self.sensor.poll_hz == 0 || self.sensor.poll_hz > 20_000 {
            eyre::bail!("sensor.poll_hz must be in [1, 20000]");
        }
        if let (Some(a), Some(b)) = (self.sensor.pin, self.sensor.runout_pin)
            && a == b
        {
            eyre::bail!("sensor.pin and sensor.runout_pin must differ");
        }

        // Tracking
        if self.tracking.window_ms == 0 {
            eyre::bail!("tracking.window_ms must be >= 1");
        }
        if self.tracking.window_ms > MAX_WINDOW_MS {
            eyre::bail!("tracking.window_ms is unreasonably large (>10min)");
        }
        let alpha = self.tracking.ewma_alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            eyre::bail!("tracking.ewma_alpha must be in (0.0, 1.0]");
        }

        // Detection
        let thr = self.detection.ratio_threshold;
        if !(0.0..=1.0).contains(&thr) {
            eyre::bail!("detection.ratio_threshold must be in [0.0, 1.0]");
        }
        if !(self.detection.hard_jam_mm.is_finite() && self.detection.hard_jam_mm >= 0.0) {
            eyre::bail!("detection.hard_jam_mm must be >= 0");
        }
        if self.detection.check_interval_ms == 0 {
            eyre::bail!("detection.check_interval_ms must be >= 1");
        }
        if self.detection.soft_jam_time_ms > MAX_WINDOW_MS
            || self.detection.hard_jam_time_ms > MAX_WINDOW_MS
        {
            eyre::bail!("detection jam times are unreasonably large (>10min)");
        }
        if self.detection.grace_period_ms > 60_000 {
            eyre::bail!("detection.grace_period_ms is unreasonably large (>60s)");
        }

        // Tuning
        let t = &self.tuning;
        for (name, v) in [
            ("tuning.noise_floor_mm", t.noise_floor_mm),
            ("tuning.min_advance_mm", t.min_advance_mm),
            ("tuning.soft_min_deficit_mm", t.soft_min_deficit_mm),
            ("tuning.min_ratio_expected_mm", t.min_ratio_expected_mm),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                eyre::bail!("{name} must be >= 0");
            }
        }
        if !(0.0..=1.0).contains(&t.hard_pass_ratio) {
            eyre::bail!("tuning.hard_pass_ratio must be in [0.0, 1.0]");
        }
        if t.telemetry_gap_ms == 0 {
            eyre::bail!("tuning.telemetry_gap_ms must be >= 1");
        }
        if t.sample_stale_ms == 0 {
            eyre::bail!("tuning.sample_stale_ms must be >= 1");
        }
        if t.flow_telemetry_stale_ms == 0 {
            eyre::bail!("tuning.flow_telemetry_stale_ms must be >= 1");
        }
        if t.movement_timeout_ms > MAX_WINDOW_MS {
            eyre::bail!("tuning.movement_timeout_ms is unreasonably large (>10min)");
        }

        // Pause
        if self.pause.start_print_timeout_ms > MAX_WINDOW_MS {
            eyre::bail!("pause.start_print_timeout_ms is unreasonably large (>10min)");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }
        if let Some(l) = self.logging.level.as_deref()
            && !matches!(
                l.to_ascii_lowercase().as_str(),
                "error" | "warn" | "info" | "debug" | "trace"
            )
        {
            eyre::bail!("logging.level must be one of error|warn|info|debug|trace");
        }

        Ok(())
    }
}

/// Printer status values accepted in trace files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceStatus {
    Idle,
    Printing,
    Paused,
    Complete,
}

/// One replayable event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TraceEvent {
    Status(TraceStatus),
    /// Absolute commanded extrusion (mm).
    Total(f32),
    /// Number of sensor edges observed.
    Pulse(u32),
    /// Runout switch state: `true` means filament missing.
    Runout(bool),
    /// Explicit check request.
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceEntry {
    pub t_ms: u64,
    pub event: TraceEvent,
}

/// Raw trace CSV schema.
///
/// Expected headers:
/// t_ms,event,value
///
/// Example:
/// t_ms,event,value
/// 0,status,printing
/// 0,total,0.0
/// 1000,total,20.0
/// 1200,pulse,7
/// 1800,poll,
#[derive(Debug, Deserialize)]
struct TraceRow {
    t_ms: u64,
    event: String,
    #[serde(default)]
    value: Option<String>,
}

/// Parse one `event`/`value` pair, as found in trace rows and live input.
pub fn parse_event(event: &str, value: &str) -> Result<TraceEvent, String> {
    let value = value.trim();
    match event.trim().to_ascii_lowercase().as_str() {
        "status" => match value.to_ascii_lowercase().as_str() {
            "idle" => Ok(TraceEvent::Status(TraceStatus::Idle)),
            "printing" => Ok(TraceEvent::Status(TraceStatus::Printing)),
            "paused" => Ok(TraceEvent::Status(TraceStatus::Paused)),
            "complete" => Ok(TraceEvent::Status(TraceStatus::Complete)),
            other => Err(format!("unknown status '{other}'")),
        },
        "total" => value
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .map(TraceEvent::Total)
            .ok_or_else(|| format!("total needs a finite number, got '{value}'")),
        "pulse" => {
            if value.is_empty() {
                return Ok(TraceEvent::Pulse(1));
            }
            value
                .parse::<u32>()
                .map(TraceEvent::Pulse)
                .map_err(|_| format!("pulse needs a count, got '{value}'"))
        }
        "runout" => match value {
            "1" | "true" => Ok(TraceEvent::Runout(true)),
            "0" | "false" => Ok(TraceEvent::Runout(false)),
            other => Err(format!("runout needs 0 or 1, got '{other}'")),
        },
        "poll" => Ok(TraceEvent::Poll),
        other => Err(format!("unknown event '{other}'")),
    }
}

/// Parse a trace from any reader. Rows must be in non-decreasing time order.
pub fn read_trace<R: std::io::Read>(reader: R) -> eyre::Result<Vec<TraceEntry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read trace CSV headers: {}", e))?
        .clone();
    let expected = ["t_ms", "event", "value"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "trace CSV must have headers 't_ms,event,value', got: {}",
            actual.join(",")
        );
    }

    let mut out = Vec::new();
    let mut last_t = 0u64;
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        let row = match rec {
            Ok(row) => row,
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        };
        if row.t_ms < last_t {
            eyre::bail!(
                "invalid CSV row {}: t_ms {} goes backwards (previous {})",
                idx + 2,
                row.t_ms,
                last_t
            );
        }
        last_t = row.t_ms;
        let event = parse_event(&row.event, row.value.as_deref().unwrap_or(""))
            .map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        out.push(TraceEntry {
            t_ms: row.t_ms,
            event,
        });
    }
    Ok(out)
}

pub fn load_trace_csv(path: &Path) -> eyre::Result<Vec<TraceEntry>> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;
    read_trace(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_firmware_defaults() {
        let cfg = load_toml("").unwrap();
        assert_eq!(cfg.tracking.mode, TrackingMode::Windowed);
        assert_eq!(cfg.tracking.window_ms, 5000);
        assert!((cfg.sensor.movement_mm_per_pulse - 2.88).abs() < f32::EPSILON);
        assert_eq!(cfg.detection.grace_period_ms, 500);
        assert!(cfg.pause.enabled);
        cfg.validate().unwrap();
    }

    #[test]
    fn tracking_mode_accepts_codes() {
        let cfg = load_toml("[tracking]\nmode = 2\n").unwrap();
        assert_eq!(cfg.tracking.mode, TrackingMode::Ewma);
        assert!(load_toml("[tracking]\nmode = 7\n").is_err());
    }
}
