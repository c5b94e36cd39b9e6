//! Expected vs actual filament distance accounting.
//!
//! The tracker fuses two asynchronous feeds: absolute commanded extrusion from
//! printer telemetry and discrete movement pulses from the sensor. It reports
//! distances according to the selected `TrackingMode` and keeps a short ring of
//! per-update samples that the jam classifier judges in sequence order.
//!
//! Resynchronisation points (first update, retraction, resume after a
//! telemetry gap) move the grace anchor so the classifier can hold off while
//! the physical filament catches up with look-ahead telemetry.

use std::sync::Arc;
use std::time::Instant;

use flowguard_traits::clock::Clock;

use crate::config::{TrackingCfg, TrackingMode, Tuning};
use crate::sample::{Sample, SampleRing};

const MIN_EWMA_ALPHA: f32 = 0.01;
const MAX_FLOW_RATIO: f32 = 1.5;

/// Point-in-time view of the tracker handed to the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSnapshot {
    pub now_ms: u64,
    pub initialized: bool,
    pub mode: TrackingMode,
    pub expected_mm: f32,
    pub actual_mm: f32,
    pub deficit_mm: f32,
    pub flow_ratio: f32,
    pub grace_anchor_ms: u64,
    /// Buffered samples, oldest first. Pulses keep landing on the newest one
    /// after it was judged, so the classifier re-reads the whole ring.
    pub samples: SampleRing,
}

impl TrackerSnapshot {
    pub fn latest(&self) -> Option<Sample> {
        self.samples.latest().copied()
    }
}

pub struct FlowTracker {
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    mode: TrackingMode,
    window_ms: u64,
    alpha: f32,
    tuning: Tuning,

    initialized: bool,
    baseline_mm: f32,
    expected_position_mm: f32,
    sensor_distance_mm: f32,
    ewma_anchor_mm: f32,
    ewma_expected_mm: f32,
    ewma_actual_mm: f32,
    samples: SampleRing,
    next_seq: u64,
    grace_anchor_ms: u64,
    last_telemetry_ms: u64,
}

impl core::fmt::Debug for FlowTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlowTracker")
            .field("mode", &self.mode)
            .field("initialized", &self.initialized)
            .field("expected_mm", &self.expected_distance())
            .field("actual_mm", &self.sensor_distance())
            .field("samples", &self.samples.len())
            .finish()
    }
}

fn clamp_alpha(alpha: f32) -> f32 {
    if alpha.is_nan() {
        return MIN_EWMA_ALPHA;
    }
    alpha.clamp(MIN_EWMA_ALPHA, 1.0)
}

impl FlowTracker {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>, cfg: TrackingCfg, tuning: Tuning) -> Self {
        let epoch = clock.now();
        Self {
            clock,
            epoch,
            mode: cfg.mode,
            window_ms: cfg.window_ms,
            alpha: clamp_alpha(cfg.ewma_alpha),
            tuning,
            initialized: false,
            baseline_mm: 0.0,
            expected_position_mm: 0.0,
            sensor_distance_mm: 0.0,
            ewma_anchor_mm: 0.0,
            ewma_expected_mm: 0.0,
            ewma_actual_mm: 0.0,
            samples: SampleRing::new(),
            next_seq: 0,
            grace_anchor_ms: 0,
            last_telemetry_ms: 0,
        }
    }

    /// Milliseconds on this tracker's timeline.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    /// Switch strategy. Counters are kept; call `reset()` for a clean start.
    pub fn set_tracking_mode(&mut self, mode: TrackingMode, window_ms: u64, ewma_alpha: f32) {
        self.mode = mode;
        self.window_ms = window_ms;
        self.alpha = clamp_alpha(ewma_alpha);
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn ewma_alpha(&self) -> f32 {
        self.alpha
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn grace_anchor_ms(&self) -> u64 {
        self.grace_anchor_ms
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn latest_sample(&self) -> Option<&Sample> {
        self.samples.latest()
    }

    /// Feed the absolute commanded extrusion reported by the printer.
    pub fn update_expected_position(&mut self, total_mm: f32) {
        if !total_mm.is_finite() {
            tracing::warn!(total_mm, "ignoring non-finite extrusion telemetry");
            return;
        }
        let now = self.now_ms();

        if !self.initialized {
            self.initialized = true;
            self.baseline_mm = total_mm;
            self.expected_position_mm = total_mm;
            self.sensor_distance_mm = 0.0;
            self.ewma_anchor_mm = total_mm;
            self.ewma_expected_mm = 0.0;
            self.ewma_actual_mm = 0.0;
            self.grace_anchor_ms = now;
            self.last_telemetry_ms = now;
            tracing::debug!(baseline_mm = total_mm, "flow tracking baseline set");
            return;
        }

        if total_mm < self.expected_position_mm {
            // the wheel cannot tell direction; retraction pulses would read as flow
            tracing::debug!(
                from_mm = self.expected_position_mm,
                to_mm = total_mm,
                "retraction, resyncing baseline"
            );
            self.grace_anchor_ms = now;
            self.baseline_mm = total_mm;
            self.sensor_distance_mm = 0.0;
            self.samples.clear();
            self.ewma_anchor_mm = total_mm;
            self.ewma_expected_mm = 0.0;
            self.ewma_actual_mm = 0.0;
        }

        let delta = total_mm - self.expected_position_mm;
        let advancing = delta > self.tuning.noise_floor_mm;
        let silent_ms = now.saturating_sub(self.last_telemetry_ms);
        if advancing && silent_ms > self.tuning.telemetry_gap_ms {
            tracing::debug!(silent_ms, "extrusion resumed after telemetry gap");
            self.grace_anchor_ms = now;
        }
        self.last_telemetry_ms = now;

        if advancing {
            let cutoff = now.saturating_sub(self.window_ms);
            let dropped = self.samples.retain_since(cutoff);
            if dropped > 0 {
                tracing::trace!(dropped, "pruned expired samples");
            }
            let seq = self.next_seq;
            self.next_seq = self.next_seq.wrapping_add(1);
            self.samples.push(Sample {
                seq,
                timestamp_ms: now,
                expected_mm: delta,
                actual_mm: 0.0,
            });

            if self.mode == TrackingMode::Ewma {
                let advance = total_mm - self.ewma_anchor_mm;
                self.ewma_expected_mm =
                    self.alpha * advance + (1.0 - self.alpha) * self.ewma_expected_mm;
            }
            self.ewma_anchor_mm = total_mm;
        }

        self.expected_position_mm = total_mm;
    }

    /// Record one sensor edge worth `mm_per_pulse` of filament.
    pub fn add_sensor_pulse(&mut self, mm_per_pulse: f32) {
        if !self.initialized || !mm_per_pulse.is_finite() || mm_per_pulse <= 0.0 {
            return;
        }
        self.sensor_distance_mm += mm_per_pulse;
        if let Some(latest) = self.samples.latest_mut() {
            latest.actual_mm += mm_per_pulse;
        }
        if self.mode == TrackingMode::Ewma {
            self.ewma_actual_mm =
                self.alpha * mm_per_pulse + (1.0 - self.alpha) * self.ewma_actual_mm;
        }
    }

    /// Commanded distance under the current mode.
    ///
    /// In `Ewma` mode this and `sensor_distance` are averages of different
    /// things: the expected side averages per-telemetry-update advances while
    /// the actual side averages per-pulse distances. Their ratio therefore
    /// depends on update rate and pulse size and is not comparable with the
    /// `Windowed` or `Cumulative` ratio. The classifier judges samples, not
    /// these figures, so detection is unaffected.
    pub fn expected_distance(&self) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        match self.mode {
            TrackingMode::Cumulative => self.expected_position_mm - self.baseline_mm,
            TrackingMode::Windowed => self.samples.sums().0,
            TrackingMode::Ewma => self.ewma_expected_mm,
        }
    }

    /// Measured distance under the current mode. See `expected_distance` for
    /// why `Ewma` figures are not comparable with the other modes.
    pub fn sensor_distance(&self) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        match self.mode {
            TrackingMode::Cumulative => self.sensor_distance_mm,
            TrackingMode::Windowed => self.samples.sums().1,
            TrackingMode::Ewma => self.ewma_actual_mm,
        }
    }

    pub fn deficit(&self) -> f32 {
        (self.expected_distance() - self.sensor_distance()).max(0.0)
    }

    /// Fraction of expected movement observed, in [0, 1.5]. Reads 0 until
    /// enough distance is expected for the ratio to mean anything.
    pub fn flow_ratio(&self) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        let expected = self.expected_distance();
        if expected <= 0.0 || expected < self.tuning.min_ratio_expected_mm {
            return 0.0;
        }
        let ratio = self.sensor_distance() / expected;
        if ratio.is_nan() {
            return 0.0;
        }
        ratio.clamp(0.0, MAX_FLOW_RATIO)
    }

    /// Forget everything; the next telemetry update sets a new baseline.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.baseline_mm = 0.0;
        self.expected_position_mm = 0.0;
        self.sensor_distance_mm = 0.0;
        self.ewma_anchor_mm = 0.0;
        self.ewma_expected_mm = 0.0;
        self.ewma_actual_mm = 0.0;
        self.samples.clear();
        self.grace_anchor_ms = 0;
        self.last_telemetry_ms = 0;
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let expected_mm = self.expected_distance();
        let actual_mm = self.sensor_distance();
        TrackerSnapshot {
            now_ms: self.now_ms(),
            initialized: self.initialized,
            mode: self.mode,
            expected_mm,
            actual_mm,
            deficit_mm: (expected_mm - actual_mm).max(0.0),
            flow_ratio: self.flow_ratio(),
            grace_anchor_ms: self.grace_anchor_ms,
            samples: self.samples,
        }
    }
}
