//! Offline replay of recorded or generated event traces.
//!
//! A trace is applied to a monitor running on a `ManualClock`. Between events
//! the clock is stepped at `check_interval_ms` so checks happen at the same
//! cadence they would live; events sharing a timestamp are all applied before
//! the check at that time.

use std::sync::Arc;

use flowguard_config::{TraceEntry, TraceEvent};
use flowguard_traits::PrintControl;
use flowguard_traits::clock::{Clock, ManualClock};

use crate::builder::build_monitor;
use crate::config::{MonitorCfg, TrackingMode};
use crate::error::Result;
use crate::mocks::RecordingControl;
use crate::monitor::FlowMonitor;
use crate::status::{JamKind, JamVerdict, MonitorStatus, PauseReason};
use crate::tracker::TrackerSnapshot;

/// What one poll saw.
#[derive(Debug, Clone)]
pub struct PollRecord {
    pub t_ms: u64,
    pub status: MonitorStatus,
    pub snapshot: TrackerSnapshot,
}

impl PollRecord {
    pub fn verdict(&self) -> Option<JamVerdict> {
        match self.status {
            MonitorStatus::Watching(v) => Some(v),
            MonitorStatus::Paused(PauseReason::Jam(kind)) => Some(JamVerdict::Jammed(kind)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub mode: TrackingMode,
    pub polls: Vec<PollRecord>,
    /// First check that reported a latched jam.
    pub first_jam: Option<(u64, JamKind)>,
    /// Pauses the monitor sent, with their time.
    pub pauses: Vec<(u64, PauseReason)>,
    pub faults: usize,
    pub pulses: u64,
    pub duration_ms: u64,
    pub final_snapshot: TrackerSnapshot,
}

impl ReplayReport {
    pub fn first_jam_ms(&self) -> Option<u64> {
        self.first_jam.map(|(t, _)| t)
    }

    /// Largest deficit seen at any poll.
    pub fn peak_deficit_mm(&self) -> f32 {
        self.polls
            .iter()
            .map(|p| p.snapshot.deficit_mm)
            .fold(0.0, f32::max)
    }
}

struct Replayer<C: PrintControl> {
    clock: ManualClock,
    monitor: FlowMonitor<C>,
    step_ms: u64,
    next_poll_ms: u64,
    polls: Vec<PollRecord>,
    first_jam: Option<(u64, JamKind)>,
    pauses: Vec<(u64, PauseReason)>,
    faults: usize,
}

impl<C: PrintControl> Replayer<C> {
    fn poll_at(&mut self, t_ms: u64) {
        self.clock.set_ms(t_ms);
        let status = self.monitor.poll();
        match &status {
            MonitorStatus::Paused(reason) => self.pauses.push((t_ms, *reason)),
            MonitorStatus::Faulted(_) => self.faults += 1,
            _ => {}
        }
        if let (None, JamVerdict::Jammed(kind)) = (self.first_jam, self.monitor.last_verdict()) {
            self.first_jam = Some((t_ms, kind));
        }
        self.polls.push(PollRecord {
            t_ms,
            status,
            snapshot: self.monitor.snapshot(),
        });
    }

    /// Run every scheduled check strictly before `t_ms`.
    fn catch_up(&mut self, t_ms: u64) {
        while self.next_poll_ms < t_ms {
            let t = self.next_poll_ms;
            self.poll_at(t);
            self.next_poll_ms = t.saturating_add(self.step_ms);
        }
    }

    fn apply(&mut self, entry: &TraceEntry) {
        self.catch_up(entry.t_ms);
        self.clock.set_ms(entry.t_ms);
        match entry.event {
            TraceEvent::Status(s) => self.monitor.set_print_state(s.into()),
            TraceEvent::Total(mm) => self.monitor.on_telemetry(mm),
            TraceEvent::Pulse(n) => self.monitor.on_pulses(n),
            TraceEvent::Runout(missing) => self.monitor.set_runout(missing),
            TraceEvent::Poll => self.poll_at(entry.t_ms),
        }
    }
}

/// Replay `trace` against a fresh monitor built from `cfg`.
pub fn replay(trace: &[TraceEntry], cfg: MonitorCfg) -> Result<ReplayReport> {
    let clock = ManualClock::new();
    let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
    let monitor = build_monitor(RecordingControl::new(), cfg, Some(shared))?;

    let mut r = Replayer {
        clock,
        monitor,
        step_ms: cfg.detection.check_interval_ms.max(1),
        next_poll_ms: 0,
        polls: Vec::new(),
        first_jam: None,
        pauses: Vec::new(),
        faults: 0,
    };
    for entry in trace {
        r.apply(entry);
    }
    let end_ms = trace.last().map_or(0, |e| e.t_ms);
    r.catch_up(end_ms.saturating_add(1));

    tracing::debug!(
        events = trace.len(),
        polls = r.polls.len(),
        pauses = r.pauses.len(),
        "replay finished"
    );

    Ok(ReplayReport {
        mode: cfg.tracking.mode,
        first_jam: r.first_jam,
        pauses: r.pauses,
        faults: r.faults,
        pulses: r.monitor.pulses_seen(),
        duration_ms: end_ms,
        final_snapshot: r.monitor.snapshot(),
        polls: r.polls,
    })
}

/// Replay the same trace once per tracking mode.
pub fn compare_modes(trace: &[TraceEntry], cfg: MonitorCfg) -> Result<Vec<ReplayReport>> {
    [
        TrackingMode::Cumulative,
        TrackingMode::Windowed,
        TrackingMode::Ewma,
    ]
    .into_iter()
    .map(|mode| {
        let mut c = cfg;
        c.tracking.mode = mode;
        replay(trace, c)
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowguard_config::TraceStatus;

    fn e(t_ms: u64, event: TraceEvent) -> TraceEntry {
        TraceEntry { t_ms, event }
    }

    #[test]
    fn polls_follow_check_interval() {
        let trace = vec![
            e(0, TraceEvent::Status(TraceStatus::Printing)),
            e(0, TraceEvent::Total(0.0)),
            e(3000, TraceEvent::Total(30.0)),
        ];
        let report = replay(&trace, MonitorCfg::default()).unwrap();
        let times: Vec<u64> = report.polls.iter().map(|p| p.t_ms).collect();
        assert_eq!(times, vec![0, 1000, 2000, 3000]);
        assert!((report.final_snapshot.expected_mm - 30.0).abs() < 1e-4);
    }

    #[test]
    fn events_at_poll_time_apply_first() {
        let trace = vec![
            e(0, TraceEvent::Status(TraceStatus::Printing)),
            e(0, TraceEvent::Total(0.0)),
            e(1000, TraceEvent::Total(10.0)),
            e(1000, TraceEvent::Pulse(3)),
        ];
        let report = replay(&trace, MonitorCfg::default()).unwrap();
        let last = report.polls.last().unwrap();
        assert_eq!(last.t_ms, 1000);
        assert!((last.snapshot.actual_mm - 3.0 * 2.88).abs() < 1e-4);
        assert_eq!(report.pulses, 3);
    }

    #[test]
    fn idle_trace_never_checks() {
        let trace = vec![e(0, TraceEvent::Total(0.0)), e(5000, TraceEvent::Total(50.0))];
        let report = replay(&trace, MonitorCfg::default()).unwrap();
        assert!(report.polls.iter().all(|p| matches!(p.status, MonitorStatus::Idle)));
        assert!(report.first_jam.is_none());
    }

    #[test]
    fn telemetry_loss_falls_back_to_movement_timeout() {
        let mut trace = vec![
            e(0, TraceEvent::Status(TraceStatus::Printing)),
            e(0, TraceEvent::Total(0.0)),
        ];
        for s in 1..=5u64 {
            trace.push(e(s * 1000, TraceEvent::Total(s as f32 * 20.0)));
            trace.push(e(s * 1000, TraceEvent::Pulse(7)));
        }
        trace.push(e(20_000, TraceEvent::Poll));
        let report = replay(&trace, MonitorCfg::default()).unwrap();
        assert_eq!(report.first_jam, Some((15_000, JamKind::Stalled)));
        assert_eq!(report.pauses, vec![(15_000, PauseReason::Jam(JamKind::Stalled))]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = MonitorCfg::default();
        cfg.mm_per_pulse = 0.0;
        assert!(replay(&[], cfg).is_err());
    }
}
