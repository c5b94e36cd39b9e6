//! Period helpers for sampling loops.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Period in microseconds for a polling rate in Hz; `hz` is clamped to at
/// least 1 and the result to at least 1 µs.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Period in milliseconds for a polling rate in Hz, at least 1 ms.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periods_clamp() {
        assert_eq!(period_us(0), 1_000_000);
        assert_eq!(period_us(1000), 1000);
        assert_eq!(period_us(5_000_000), 1);
        assert_eq!(period_ms(2000), 1);
        assert_eq!(period_ms(4), 250);
    }
}
