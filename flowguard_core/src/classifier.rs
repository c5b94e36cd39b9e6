//! Dual-streak jam classifier.
//!
//! Two independent streaks judge the tracker's samples on every check:
//!
//! - **hard**: near-zero movement (ratio below `hard_pass_ratio`) while at
//!   least `hard_jam_threshold_mm` has been commanded, sustained for
//!   `hard_jam_time_ms`;
//! - **soft**: ratio below `ratio_threshold` with more than
//!   `soft_min_deficit_mm` owed, sustained for `soft_jam_time_ms`.
//!
//! Each streak accumulates the expected/actual distance of every sample it
//! consumes, so a single bad interval surrounded by good ones is averaged
//! away instead of firing. Each check folds in every sample newer than the
//! last one consumed, so telemetry arriving faster than the check cadence is
//! not skipped. A sample already consumed on an earlier check only
//! contributes pulses that arrived since, even after a newer sample has
//! replaced it as the tracker's latest. Once a streak fires the verdict is
//! latched until `reset()`.

use crate::config::{JamParams, Tuning};
use crate::sample::{Sample, SampleRing};
use crate::status::{JamKind, JamVerdict};
use crate::tracker::{FlowTracker, TrackerSnapshot};

/// Lifecycle of one streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreakPhase {
    #[default]
    Idle,
    Accumulating {
        since_ms: u64,
    },
    Triggered {
        since_ms: u64,
        at_ms: u64,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Streak {
    phase: StreakPhase,
    expected_mm: f32,
    actual_mm: f32,
    last_seq: Option<u64>,
    last_actual_mm: f32,
}

impl Streak {
    pub fn phase(&self) -> StreakPhase {
        self.phase
    }

    pub fn expected_mm(&self) -> f32 {
        self.expected_mm
    }

    pub fn actual_mm(&self) -> f32 {
        self.actual_mm
    }

    /// Fold in every buffered sample newer than the last consumed one, plus
    /// pulses the last consumed sample gained since it was read. Each
    /// sample's expected distance counts once.
    fn consume(&mut self, samples: &SampleRing) {
        let from = self.last_seq;
        for s in samples.iter().filter(|s| from.is_none_or(|seq| s.seq >= seq)) {
            if self.last_seq == Some(s.seq) {
                let late = s.actual_mm - self.last_actual_mm;
                if late > 0.0 {
                    self.actual_mm += late;
                }
            } else {
                self.expected_mm += s.expected_mm;
                self.actual_mm += s.actual_mm;
                self.last_seq = Some(s.seq);
            }
            self.last_actual_mm = s.actual_mm;
        }
    }

    /// Treat everything up to `s` as consumed without counting it.
    fn skip_to(&mut self, s: Option<Sample>) {
        if let Some(s) = s {
            self.last_seq = Some(s.seq);
            self.last_actual_mm = s.actual_mm;
        }
    }

    fn ratio(&self) -> f32 {
        if self.expected_mm <= 0.0 {
            1.0
        } else {
            self.actual_mm / self.expected_mm
        }
    }

    fn deficit(&self) -> f32 {
        (self.expected_mm - self.actual_mm).max(0.0)
    }

    /// Start the timer if idle; returns how long the streak has been bad.
    fn arm(&mut self, now_ms: u64) -> u64 {
        match self.phase {
            StreakPhase::Idle => {
                self.phase = StreakPhase::Accumulating { since_ms: now_ms };
                0
            }
            StreakPhase::Accumulating { since_ms } | StreakPhase::Triggered { since_ms, .. } => {
                now_ms.saturating_sub(since_ms)
            }
        }
    }

    fn trigger(&mut self, now_ms: u64) {
        let since_ms = match self.phase {
            StreakPhase::Accumulating { since_ms } | StreakPhase::Triggered { since_ms, .. } => {
                since_ms
            }
            StreakPhase::Idle => now_ms,
        };
        self.phase = StreakPhase::Triggered {
            since_ms,
            at_ms: now_ms,
        };
    }

    /// Back to idle. The consumed-sample marker survives so a recovered
    /// streak does not count the same sample twice.
    fn clear(&mut self) {
        self.phase = StreakPhase::Idle;
        self.expected_mm = 0.0;
        self.actual_mm = 0.0;
    }

    fn elapsed(&self, now_ms: u64) -> Option<u64> {
        match self.phase {
            StreakPhase::Idle => None,
            StreakPhase::Accumulating { since_ms } | StreakPhase::Triggered { since_ms, .. } => {
                Some(now_ms.saturating_sub(since_ms))
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JamClassifier {
    tuning: Tuning,
    hard: Streak,
    soft: Streak,
    latched: Option<JamKind>,
}

impl JamClassifier {
    pub fn new(tuning: Tuning) -> Self {
        Self {
            tuning,
            hard: Streak::default(),
            soft: Streak::default(),
            latched: None,
        }
    }

    pub fn hard_streak(&self) -> &Streak {
        &self.hard
    }

    pub fn soft_streak(&self) -> &Streak {
        &self.soft
    }

    pub fn latched(&self) -> Option<JamKind> {
        self.latched
    }

    /// Drop every streak and the latch.
    pub fn reset(&mut self) {
        self.hard = Streak::default();
        self.soft = Streak::default();
        self.latched = None;
    }

    /// Clear both streaks and mark the snapshot's samples as seen, so they
    /// are not judged once checking resumes.
    fn clear_streaks(&mut self, snap: &TrackerSnapshot) {
        let latest = snap.latest();
        for streak in [&mut self.hard, &mut self.soft] {
            streak.clear();
            streak.skip_to(latest);
        }
    }

    /// Convenience wrapper reading the tracker directly.
    pub fn is_jammed(&mut self, tracker: &FlowTracker, params: &JamParams) -> bool {
        self.evaluate(&tracker.snapshot(), params).is_jammed()
    }

    /// Run one check against `snap`. Call at `check_interval_ms` cadence.
    pub fn evaluate(&mut self, snap: &TrackerSnapshot, params: &JamParams) -> JamVerdict {
        if !snap.initialized || params.check_interval_ms == 0 {
            self.reset();
            return JamVerdict::Inactive;
        }
        if let Some(kind) = self.latched {
            return JamVerdict::Jammed(kind);
        }

        let now = snap.now_ms;
        if params.grace_period_ms > 0
            && now.saturating_sub(snap.grace_anchor_ms) < params.grace_period_ms
        {
            self.clear_streaks(snap);
            return JamVerdict::Grace;
        }

        let judged = snap.latest().is_some_and(|s| {
            now.saturating_sub(s.timestamp_ms) <= self.tuning.sample_stale_ms
                && s.expected_mm >= self.tuning.min_advance_mm
        });
        if !judged {
            self.clear_streaks(snap);
            return JamVerdict::NotAdvancing;
        }

        self.hard.consume(&snap.samples);
        if self.hard.ratio() < self.tuning.hard_pass_ratio {
            let elapsed = self.hard.arm(now);
            if elapsed >= params.effective_hard_jam_time_ms()
                && self.hard.expected_mm >= params.hard_jam_threshold_mm
            {
                self.hard.trigger(now);
                self.latched = Some(JamKind::Hard);
                tracing::debug!(
                    elapsed_ms = elapsed,
                    expected_mm = self.hard.expected_mm,
                    actual_mm = self.hard.actual_mm,
                    "hard jam streak fired"
                );
                return JamVerdict::Jammed(JamKind::Hard);
            }
        } else {
            self.hard.clear();
        }

        self.soft.consume(&snap.samples);
        if self.soft.ratio() < params.effective_ratio_threshold() {
            let elapsed = self.soft.arm(now);
            if self.soft.deficit() > self.tuning.soft_min_deficit_mm
                && elapsed >= params.effective_soft_jam_time_ms()
            {
                self.soft.trigger(now);
                self.latched = Some(JamKind::Soft);
                tracing::debug!(
                    elapsed_ms = elapsed,
                    expected_mm = self.soft.expected_mm,
                    actual_mm = self.soft.actual_mm,
                    "soft jam streak fired"
                );
                return JamVerdict::Jammed(JamKind::Soft);
            }
        } else {
            self.soft.clear();
        }

        if let Some(elapsed_ms) = self.hard.elapsed(now) {
            JamVerdict::Suspect {
                kind: JamKind::Hard,
                elapsed_ms,
            }
        } else if let Some(elapsed_ms) = self.soft.elapsed(now) {
            JamVerdict::Suspect {
                kind: JamKind::Soft,
                elapsed_ms,
            }
        } else {
            JamVerdict::Flowing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingMode;

    fn snap(now_ms: u64, samples: &[Sample]) -> TrackerSnapshot {
        TrackerSnapshot {
            now_ms,
            initialized: true,
            mode: TrackingMode::Windowed,
            expected_mm: 0.0,
            actual_mm: 0.0,
            deficit_mm: 0.0,
            flow_ratio: 0.0,
            grace_anchor_ms: 0,
            samples: samples.iter().copied().collect(),
        }
    }

    fn sample(seq: u64, t: u64, e: f32, a: f32) -> Sample {
        Sample {
            seq,
            timestamp_ms: t,
            expected_mm: e,
            actual_mm: a,
        }
    }

    fn params() -> JamParams {
        JamParams {
            ratio_threshold: 0.7,
            hard_jam_threshold_mm: 5.0,
            soft_jam_time_ms: 3000,
            hard_jam_time_ms: 2000,
            check_interval_ms: 1000,
            grace_period_ms: 500,
        }
    }

    #[test]
    fn same_sample_is_not_double_counted() {
        let mut c = JamClassifier::new(Tuning::default());
        let p = params();
        c.evaluate(&snap(1000, &[sample(1, 900, 20.0, 0.0)]), &p);
        c.evaluate(&snap(1500, &[sample(1, 900, 20.0, 0.0)]), &p);
        assert_eq!(c.hard_streak().expected_mm(), 20.0);
        assert_eq!(
            c.hard_streak().phase(),
            StreakPhase::Accumulating { since_ms: 1000 }
        );
    }

    #[test]
    fn late_pulses_on_consumed_sample_are_added_once() {
        let mut c = JamClassifier::new(Tuning::default());
        let p = params();
        c.evaluate(&snap(1000, &[sample(1, 900, 20.0, 2.0)]), &p);
        c.evaluate(&snap(1500, &[sample(1, 900, 20.0, 5.0)]), &p);
        c.evaluate(&snap(1900, &[sample(1, 900, 20.0, 5.0)]), &p);
        assert_eq!(c.soft_streak().actual_mm(), 5.0);
        assert_eq!(c.soft_streak().expected_mm(), 20.0);
    }

    #[test]
    fn pulses_landing_after_newer_sample_still_count() {
        let mut c = JamClassifier::new(Tuning::default());
        let p = params();
        // each sample receives its 20 mm of pulses only after the check that
        // first read it, by which time the next one is usually already queued
        let mut ring: Vec<Sample> = Vec::new();
        for i in 0..10u64 {
            if let Some(prev) = ring.last_mut() {
                prev.actual_mm = 20.0;
            }
            ring.push(sample(i, i * 1000, 20.0, 0.0));
            let v = c.evaluate(&snap(i * 1000 + 10, &ring), &p);
            assert!(!v.is_jammed(), "check {i}: {v:?}");
        }
        assert_eq!(c.latched(), None);
    }

    #[test]
    fn samples_between_checks_are_all_counted() {
        let mut c = JamClassifier::new(Tuning::default());
        let p = params();
        let ring = [
            sample(1, 700, 20.0, 0.0),
            sample(2, 800, 20.0, 0.0),
            sample(3, 900, 20.0, 0.0),
        ];
        c.evaluate(&snap(1000, &ring), &p);
        assert_eq!(c.hard_streak().expected_mm(), 60.0);
        // already-consumed samples are not counted twice
        c.evaluate(&snap(1500, &ring[1..]), &p);
        assert_eq!(c.hard_streak().expected_mm(), 60.0);
    }

    #[test]
    fn grace_samples_are_not_judged_afterwards() {
        let mut c = JamClassifier::new(Tuning::default());
        let p = params();
        let mut s = snap(300, &[sample(1, 200, 20.0, 0.0)]);
        assert_eq!(c.evaluate(&s, &p), JamVerdict::Grace);
        s = snap(1000, &[sample(1, 200, 20.0, 0.0), sample(2, 900, 20.0, 20.0)]);
        assert_eq!(c.evaluate(&s, &p), JamVerdict::Flowing);
        assert_eq!(c.soft_streak().phase(), StreakPhase::Idle);
    }

    #[test]
    fn zero_check_interval_clears_latch() {
        let mut c = JamClassifier::new(Tuning::default());
        let mut p = params();
        for (i, t) in [1000u64, 2000, 3000].iter().enumerate() {
            c.evaluate(&snap(*t, &[sample(i as u64, *t - 100, 20.0, 0.0)]), &p);
        }
        assert_eq!(c.latched(), Some(JamKind::Hard));
        p.check_interval_ms = 0;
        assert_eq!(c.evaluate(&snap(4000, &[]), &p), JamVerdict::Inactive);
        assert_eq!(c.latched(), None);
    }

    #[test]
    fn grace_does_not_clear_latch() {
        let mut c = JamClassifier::new(Tuning::default());
        let p = params();
        for (i, t) in [1000u64, 2000, 3000].iter().enumerate() {
            c.evaluate(&snap(*t, &[sample(i as u64, *t - 100, 20.0, 0.0)]), &p);
        }
        let mut s = snap(3100, &[]);
        s.grace_anchor_ms = 3050;
        assert_eq!(c.evaluate(&s, &p), JamVerdict::Jammed(JamKind::Hard));
    }

    #[test]
    fn stale_sample_is_not_judged() {
        let mut c = JamClassifier::new(Tuning::default());
        let p = params();
        let v = c.evaluate(&snap(5000, &[sample(1, 2000, 20.0, 0.0)]), &p);
        assert_eq!(v, JamVerdict::NotAdvancing);
    }

    #[test]
    fn tiny_advance_clears_streaks() {
        let mut c = JamClassifier::new(Tuning::default());
        let p = params();
        c.evaluate(&snap(1000, &[sample(1, 900, 20.0, 0.0)]), &p);
        let v = c.evaluate(&snap(2000, &[sample(2, 1900, 0.02, 0.0)]), &p);
        assert_eq!(v, JamVerdict::NotAdvancing);
        assert_eq!(c.hard_streak().phase(), StreakPhase::Idle);
        assert_eq!(c.soft_streak().phase(), StreakPhase::Idle);
    }

    #[test]
    fn uninitialized_tracker_is_inactive() {
        let mut c = JamClassifier::new(Tuning::default());
        let mut s = snap(1000, &[]);
        s.initialized = false;
        assert_eq!(c.evaluate(&s, &params()), JamVerdict::Inactive);
    }
}
