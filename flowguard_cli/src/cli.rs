//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use flowguard_core::Scenario;
use flowguard_core::config::TrackingMode;
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "flowguard", version, about = "Filament flow jam detector")]
pub struct Cli {
    /// Path to config TOML (firmware defaults are used when omitted)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit results and logs as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Tracking mode override for a single run.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ModeArg {
    /// Totals since the last reset
    Cumulative,
    /// Sliding time window
    Windowed,
    /// Exponentially weighted rates
    Ewma,
}

impl From<ModeArg> for TrackingMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Cumulative => Self::Cumulative,
            ModeArg::Windowed => Self::Windowed,
            ModeArg::Ewma => Self::Ewma,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a recorded trace CSV (t_ms,event,value) through the detector
    Simulate {
        /// Trace file to replay
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,
        /// Override the configured tracking mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Print every check, not just the summary
        #[arg(long, action = ArgAction::SetTrue)]
        polls: bool,
    },
    /// Run a built-in printing scenario through the detector
    Scenario {
        /// healthy, hard_jam, soft_jam, sparse_infill, retraction, spike, slow or drift
        name: Scenario,
        /// Override the configured tracking mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Print every check, not just the summary
        #[arg(long, action = ArgAction::SetTrue)]
        polls: bool,
    },
    /// Compare deficit growth across tracking modes under calibration drift
    Drift {
        /// Percent the real distance per pulse is off from the configured value
        #[arg(long, value_name = "PCT", default_value_t = 10.0)]
        error_pct: f32,
        /// Commanded length to extrude
        #[arg(long, value_name = "MM", default_value_t = 2000.0)]
        length_mm: f32,
    },
    /// Watch a live print: telemetry lines on stdin, pulses from the sensor
    #[command(
        long_about = "Watch a live print.\n\nReads one event per line from stdin, in the same vocabulary as trace files: `status printing`, `total 123.4`, `runout 1`, `pulse 3`. Pulses come from the movement sensor (GPIO in hardware builds, otherwise a simulated sensor fed by the commanded extrusion). Stops on EOF, Ctrl-C or after --max-secs."
    )]
    Watch {
        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        max_secs: Option<u64>,
        /// Fraction of commanded extrusion the simulated sensor sees (0 simulates a jam)
        #[arg(long, value_name = "FRACTION", default_value_t = 1.0)]
        sim_flow: f32,
    },
    /// Quick health check (config, sensors, detector sanity)
    SelfCheck,
}
