//! Pause orchestration around the tracker and classifier.
//!
//! `FlowMonitor` owns one tracker/classifier pair for the active print. The
//! caller feeds it printer status, telemetry, pulses and the runout switch,
//! and calls `poll()` from its loop; checks run at most once per
//! `check_interval_ms` and a pause is sent at most once per printing segment.
//!
//! Without fresh telemetry the classifier has nothing to compare against. Once
//! telemetry has been silent for `flow_telemetry_stale_ms`, a printing segment
//! with no sensor edge for `movement_timeout_ms` is reported as
//! `JamKind::Stalled`.

use flowguard_traits::PrintControl;

use crate::builder::{DynMonitor, Missing, MonitorBuilder};
use crate::classifier::JamClassifier;
use crate::config::MonitorCfg;
use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::status::{JamKind, JamVerdict, MonitorStatus, PauseReason};
use crate::tracker::{FlowTracker, TrackerSnapshot};

/// Printer job state as reported by the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintState {
    #[default]
    Idle,
    Printing,
    Paused,
    Complete,
}

pub struct FlowMonitor<C: PrintControl> {
    pub(crate) control: C,
    pub(crate) cfg: MonitorCfg,
    pub(crate) tracker: FlowTracker,
    pub(crate) classifier: JamClassifier,
    pub(crate) state: PrintState,
    pub(crate) print_started_ms: u64,
    pub(crate) last_check_ms: Option<u64>,
    pub(crate) last_verdict: JamVerdict,
    pub(crate) runout: bool,
    pub(crate) pause_issued: bool,
    pub(crate) pauses: u32,
    pub(crate) pulses: u64,
    /// Last telemetry update, or the start of the tracking segment.
    pub(crate) telemetry_seen_ms: u64,
    /// Last sensor edge, or the start of the tracking segment.
    pub(crate) last_edge_ms: u64,
}

impl<C: PrintControl> core::fmt::Debug for FlowMonitor<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlowMonitor")
            .field("state", &self.state)
            .field("tracker", &self.tracker)
            .field("last_verdict", &self.last_verdict)
            .field("runout", &self.runout)
            .field("pause_issued", &self.pause_issued)
            .finish()
    }
}

impl DynMonitor {
    /// Start building a monitor. `with_control` fixes the control type.
    pub fn builder() -> MonitorBuilder<Missing> {
        MonitorBuilder::default()
    }
}

impl<C: PrintControl> FlowMonitor<C> {
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.tracker.now_ms()
    }

    pub fn print_state(&self) -> PrintState {
        self.state
    }

    pub fn config(&self) -> &MonitorCfg {
        &self.cfg
    }

    pub fn tracker(&self) -> &FlowTracker {
        &self.tracker
    }

    pub fn classifier(&self) -> &JamClassifier {
        &self.classifier
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.tracker.snapshot()
    }

    pub fn last_verdict(&self) -> JamVerdict {
        self.last_verdict
    }

    pub fn runout(&self) -> bool {
        self.runout
    }

    /// Pauses sent since construction.
    pub fn pauses_issued(&self) -> u32 {
        self.pauses
    }

    pub fn pulses_seen(&self) -> u64 {
        self.pulses
    }

    fn reset_tracking(&mut self) {
        let now = self.now_ms();
        self.telemetry_seen_ms = now;
        self.last_edge_ms = now;
        self.tracker.reset();
        self.classifier.reset();
        self.last_check_ms = None;
        self.last_verdict = JamVerdict::Inactive;
        self.pause_issued = false;
    }

    /// Apply a printer status report. Entering or leaving `Printing` starts a
    /// fresh tracking segment.
    pub fn set_print_state(&mut self, next: PrintState) {
        if next == self.state {
            return;
        }
        let prev = self.state;
        self.state = next;
        if next == PrintState::Printing {
            self.print_started_ms = self.now_ms();
            self.reset_tracking();
            tracing::info!(from = ?prev, "printing, flow tracking reset");
        } else if prev == PrintState::Printing {
            self.reset_tracking();
            tracing::info!(to = ?next, "left printing state, flow tracking reset");
        } else {
            tracing::debug!(from = ?prev, to = ?next, "print state changed");
        }
    }

    /// Absolute commanded extrusion from telemetry. Ignored unless printing.
    pub fn on_telemetry(&mut self, total_extrusion_mm: f32) {
        if self.state != PrintState::Printing {
            return;
        }
        self.telemetry_seen_ms = self.now_ms();
        self.tracker.update_expected_position(total_extrusion_mm);
    }

    /// Sensor edges observed since the last call. Ignored unless printing.
    pub fn on_pulses(&mut self, edges: u32) {
        if self.state != PrintState::Printing || edges == 0 {
            return;
        }
        self.pulses = self.pulses.saturating_add(u64::from(edges));
        self.last_edge_ms = self.now_ms();
        for _ in 0..edges {
            self.tracker.add_sensor_pulse(self.cfg.mm_per_pulse);
        }
    }

    /// Runout switch state: `true` when filament is missing.
    pub fn set_runout(&mut self, runout: bool) {
        if runout != self.runout {
            if runout {
                tracing::warn!("filament has run out");
            } else {
                tracing::info!("filament detected");
            }
        }
        self.runout = runout;
    }

    /// Ask the printer to resume and start a fresh tracking segment.
    pub fn resume(&mut self) -> Result<()> {
        self.control
            .resume()
            .map_err(|e| eyre::Report::new(map_hw_error(e.as_ref())))?;
        self.reset_tracking();
        tracing::info!("resume sent, flow tracking reset");
        Ok(())
    }

    /// `(idle_ms, telemetry_age_ms)` when telemetry is stale and the sensor
    /// has been quiet for the movement timeout.
    fn stall(&self, now: u64) -> Option<(u64, u64)> {
        let t = &self.cfg.tuning;
        if t.movement_timeout_ms == 0 {
            return None;
        }
        let telemetry_age_ms = now.saturating_sub(self.telemetry_seen_ms);
        if telemetry_age_ms <= t.flow_telemetry_stale_ms {
            return None;
        }
        let idle_ms = now.saturating_sub(self.last_edge_ms);
        (idle_ms >= t.movement_timeout_ms).then_some((idle_ms, telemetry_age_ms))
    }

    fn check(&mut self, now: u64) -> JamVerdict {
        let snap = self.tracker.snapshot();
        let mut verdict = self.classifier.evaluate(&snap, &self.cfg.detection);
        let prev = self.last_verdict;

        if !verdict.is_jammed()
            && let Some((idle_ms, telemetry_age_ms)) = self.stall(now)
        {
            if prev != JamVerdict::Jammed(JamKind::Stalled) {
                tracing::warn!(
                    idle_ms,
                    telemetry_age_ms,
                    "filament movement stopped while telemetry is stale"
                );
            }
            verdict = JamVerdict::Jammed(JamKind::Stalled);
        }

        match (prev, verdict) {
            (_, JamVerdict::Jammed(JamKind::Stalled)) => {}
            (JamVerdict::Jammed(JamKind::Stalled), v) if !v.is_jammed() => {
                tracing::info!(verdict = v.label(), "filament movement or telemetry resumed");
            }
            (p, JamVerdict::Jammed(kind)) if !p.is_jammed() => tracing::warn!(
                kind = kind.as_str(),
                expected_mm = snap.expected_mm,
                actual_mm = snap.actual_mm,
                deficit_mm = snap.deficit_mm,
                ratio = snap.flow_ratio,
                "filament jam detected"
            ),
            (JamVerdict::Suspect { kind, .. }, JamVerdict::Flowing) => {
                tracing::info!(kind = kind.as_str(), "filament movement recovered");
            }
            _ => {}
        }

        if self.cfg.diagnostics.flow_summary {
            tracing::info!(
                mode = snap.mode.as_str(),
                expected_mm = snap.expected_mm,
                actual_mm = snap.actual_mm,
                deficit_mm = snap.deficit_mm,
                ratio = snap.flow_ratio,
                verdict = verdict.label(),
                "flow summary"
            );
        }
        if self.cfg.diagnostics.verbose {
            tracing::debug!(
                now_ms = now,
                ?verdict,
                samples = self.tracker.sample_count(),
                hard_expected_mm = self.classifier.hard_streak().expected_mm(),
                soft_expected_mm = self.classifier.soft_streak().expected_mm(),
                "flow check"
            );
        }

        self.last_verdict = verdict;
        verdict
    }

    fn pause_reason(&self, verdict: JamVerdict) -> Option<PauseReason> {
        if !self.cfg.pause.enabled {
            return None;
        }
        if self.runout && !self.cfg.pause.pause_on_runout {
            // printer handles its own runout; stay out of the way entirely
            return None;
        }
        if self.runout {
            return Some(PauseReason::Runout);
        }
        match verdict {
            JamVerdict::Jammed(kind) => Some(PauseReason::Jam(kind)),
            _ => None,
        }
    }

    /// Run the periodic check and pause the printer if warranted.
    pub fn poll(&mut self) -> MonitorStatus {
        if self.state != PrintState::Printing {
            return MonitorStatus::Idle;
        }
        let now = self.now_ms();
        let due = self
            .last_check_ms
            .is_none_or(|last| now.saturating_sub(last) >= self.cfg.detection.check_interval_ms);
        if !due {
            return MonitorStatus::Watching(self.last_verdict);
        }
        self.last_check_ms = Some(now);
        let verdict = self.check(now);

        let Some(reason) = self.pause_reason(verdict) else {
            return MonitorStatus::Watching(verdict);
        };
        if self.pause_issued {
            return MonitorStatus::Watching(verdict);
        }
        let printing_ms = now.saturating_sub(self.print_started_ms);
        if printing_ms < self.cfg.pause.start_print_timeout_ms {
            tracing::debug!(
                reason = reason.as_str(),
                printing_ms,
                "pause held back during print start"
            );
            return MonitorStatus::Watching(verdict);
        }

        tracing::info!(
            reason = reason.as_str(),
            runout = self.runout,
            printing_ms,
            "pausing print"
        );
        match self.control.pause() {
            Ok(()) => {
                self.pause_issued = true;
                self.pauses = self.pauses.saturating_add(1);
                MonitorStatus::Paused(reason)
            }
            Err(e) => {
                let err = map_hw_error(e.as_ref());
                tracing::error!(error = %err, "pause request failed");
                MonitorStatus::Faulted(err)
            }
        }
    }
}
