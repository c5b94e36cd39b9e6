//! Fixed-capacity ring of extrusion samples.
//!
//! Slots are stored oldest-first starting at `head`. Insertion is O(1) and
//! evicts the oldest sample once full. `retain_since` drops expired samples
//! and compacts the survivors to the front so that `latest()` keeps pointing at
//! the newest one.

/// Default ring capacity.
pub const SAMPLE_CAPACITY: usize = 20;

/// One slice of commanded extrusion and the pulses attributed to it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    /// Monotonic sequence number assigned by the tracker.
    pub seq: u64,
    pub timestamp_ms: u64,
    pub expected_mm: f32,
    pub actual_mm: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct SampleRing<const N: usize = SAMPLE_CAPACITY> {
    slots: [Sample; N],
    head: usize,
    len: usize,
}

impl<const N: usize> Default for SampleRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Rings are equal when they hold the same samples in the same order.
impl<const N: usize> PartialEq for SampleRing<N> {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl<const N: usize> FromIterator<Sample> for SampleRing<N> {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        let mut ring = Self::new();
        for s in iter {
            ring.push(s);
        }
        ring
    }
}

impl<const N: usize> SampleRing<N> {
    pub const fn new() -> Self {
        const { assert!(N > 0, "sample ring needs at least one slot") };
        Self {
            slots: [Sample {
                seq: 0,
                timestamp_ms: 0,
                expected_mm: 0.0,
                actual_mm: 0.0,
            }; N],
            head: 0,
            len: 0,
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn slot(&self, i: usize) -> usize {
        (self.head + i) % N
    }

    /// Append a sample, evicting the oldest when full. Returns the evicted one.
    pub fn push(&mut self, sample: Sample) -> Option<Sample> {
        if self.len == N {
            let evicted = self.slots[self.head];
            self.slots[self.head] = sample;
            self.head = (self.head + 1) % N;
            Some(evicted)
        } else {
            let idx = self.slot(self.len);
            self.slots[idx] = sample;
            self.len += 1;
            None
        }
    }

    pub fn latest(&self) -> Option<&Sample> {
        if self.len == 0 {
            return None;
        }
        Some(&self.slots[self.slot(self.len - 1)])
    }

    pub fn latest_mut(&mut self) -> Option<&mut Sample> {
        if self.len == 0 {
            return None;
        }
        let idx = self.slot(self.len - 1);
        Some(&mut self.slots[idx])
    }

    /// Keep samples with `timestamp_ms >= cutoff_ms`, compacted to the front
    /// in their original order. Returns how many were dropped.
    pub fn retain_since(&mut self, cutoff_ms: u64) -> usize {
        let mut kept = 0;
        for i in 0..self.len {
            let s = self.slots[self.slot(i)];
            if s.timestamp_ms >= cutoff_ms {
                // kept <= i, so this never overwrites an unread slot
                let dst = self.slot(kept);
                self.slots[dst] = s;
                kept += 1;
            }
        }
        let dropped = self.len - kept;
        self.slots.rotate_left(self.head);
        self.head = 0;
        self.len = kept;
        dropped
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        (0..self.len).map(move |i| &self.slots[self.slot(i)])
    }

    /// Summed (expected, actual) over every buffered sample.
    pub fn sums(&self) -> (f32, f32) {
        self.iter()
            .fold((0.0, 0.0), |(e, a), s| (e + s.expected_mm, a + s.actual_mm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(seq: u64, t: u64, e: f32) -> Sample {
        Sample {
            seq,
            timestamp_ms: t,
            expected_mm: e,
            actual_mm: 0.0,
        }
    }

    #[test]
    fn push_evicts_oldest_when_full() {
        let mut r: SampleRing<3> = SampleRing::new();
        for i in 0..3 {
            assert!(r.push(s(i, i * 10, 1.0)).is_none());
        }
        let evicted = r.push(s(3, 30, 1.0)).unwrap();
        assert_eq!(evicted.seq, 0);
        assert_eq!(r.len(), 3);
        let seqs: Vec<u64> = r.iter().map(|x| x.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(r.latest().unwrap().seq, 3);
    }

    #[test]
    fn retain_compacts_after_wraparound() {
        let mut r: SampleRing<4> = SampleRing::new();
        for i in 0..6 {
            r.push(s(i, i * 100, i as f32));
        }
        // buffered: seq 2..=5 at t 200..=500, head wrapped
        let dropped = r.retain_since(350);
        assert_eq!(dropped, 2);
        let seqs: Vec<u64> = r.iter().map(|x| x.seq).collect();
        assert_eq!(seqs, vec![4, 5]);
        assert_eq!(r.latest().unwrap().seq, 5);

        r.push(s(6, 600, 6.0));
        let seqs: Vec<u64> = r.iter().map(|x| x.seq).collect();
        assert_eq!(seqs, vec![4, 5, 6]);
        assert_eq!(r.sums().0, 15.0);
    }

    #[test]
    fn retain_keeps_boundary_sample() {
        let mut r: SampleRing = SampleRing::new();
        r.push(s(0, 1000, 1.0));
        assert_eq!(r.retain_since(1000), 0);
        assert_eq!(r.retain_since(1001), 1);
        assert!(r.is_empty());
        assert!(r.latest().is_none());
    }

    #[test]
    fn latest_mut_accumulates_actual() {
        let mut r: SampleRing = SampleRing::new();
        r.push(s(0, 0, 5.0));
        r.push(s(1, 10, 5.0));
        r.latest_mut().unwrap().actual_mm += 2.0;
        assert_eq!(r.sums(), (10.0, 2.0));
    }

    #[test]
    fn equality_ignores_stale_slots() {
        let mut a: SampleRing<3> = (0..5).map(|i| s(i, i * 10, 1.0)).collect();
        let b: SampleRing<3> = (2..5).map(|i| s(i, i * 10, 1.0)).collect();
        assert_eq!(a, b);
        a.retain_since(40);
        assert_ne!(a, b);
        assert_eq!(a.latest().unwrap().seq, 4);
    }
}
