//! Verdicts and monitor status returned from each check.

use crate::error::MonitorError;

/// Which streak fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JamKind {
    /// Commanded extrusion with essentially no filament movement.
    Hard,
    /// Sustained flow below the passing ratio with a real deficit.
    Soft,
    /// Telemetry went quiet and the sensor stopped reporting movement.
    Stalled,
}

impl JamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
            Self::Stalled => "stalled",
        }
    }
}

/// Classifier output for one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JamVerdict {
    /// Tracker uninitialized or checking disabled.
    Inactive,
    /// Inside the grace period after a resynchronisation point.
    Grace,
    /// Latest sample missing, stale, or commanding too little to judge.
    NotAdvancing,
    /// Filament is moving as expected.
    Flowing,
    /// A streak is running but has not met its dwell time yet.
    Suspect { kind: JamKind, elapsed_ms: u64 },
    /// Latched until the classifier is reset. `Stalled` is not latched; it
    /// clears once an edge or telemetry arrives.
    Jammed(JamKind),
}

impl JamVerdict {
    #[inline]
    pub fn is_jammed(&self) -> bool {
        matches!(self, Self::Jammed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Grace => "grace",
            Self::NotAdvancing => "not_advancing",
            Self::Flowing => "flowing",
            Self::Suspect { .. } => "suspect",
            Self::Jammed(_) => "jammed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Jam(JamKind),
    Runout,
}

impl PauseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jam(JamKind::Hard) => "hard_jam",
            Self::Jam(JamKind::Soft) => "soft_jam",
            Self::Jam(JamKind::Stalled) => "movement_timeout",
            Self::Runout => "runout",
        }
    }
}

/// Public status of a single monitor poll.
#[derive(Debug, Clone)]
pub enum MonitorStatus {
    /// Printer is not printing; nothing was evaluated.
    Idle,
    /// Printing; carries the verdict of the most recent check.
    Watching(JamVerdict),
    /// A pause was sent to the printer during this poll.
    Paused(PauseReason),
    /// The pause request failed; it is retried on the next check.
    Faulted(MonitorError),
}
