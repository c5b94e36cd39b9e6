//! Pulse sampler thread lifecycle and edge counting.
//!
//! Verifies that:
//! - Threads are cleaned up when the sampler is dropped
//! - Level toggles arrive as pulse counts
//! - A stuck input reports no edges and a growing stall

use flowguard_core::mocks::StuckLevel;
use flowguard_core::sampler::PulseSampler;
use flowguard_hardware::{SimFilament, SimulatedPulseSensor};
use flowguard_traits::clock::MonotonicClock;
use std::time::{Duration, Instant};

fn drain_until(sampler: &PulseSampler, want: u32, within: Duration) -> u32 {
    let deadline = Instant::now() + within;
    let mut total = 0;
    while Instant::now() < deadline {
        total += sampler.drain();
        if total >= want {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    total
}

#[test]
fn sampler_thread_exits_on_drop() {
    let sampler = PulseSampler::spawn(StuckLevel(false), 100, MonotonicClock::new());
    std::thread::sleep(Duration::from_millis(20));
    drop(sampler);
}

#[test]
fn multiple_samplers_dont_leak_threads() {
    let clock = MonotonicClock::new();
    for _ in 0..10 {
        let sampler = PulseSampler::spawn(StuckLevel(true), 200, clock);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(sampler.drain(), 0);
        drop(sampler);
    }
}

#[test]
fn toggles_arrive_as_pulses() {
    let filament = SimFilament::new(1.0);
    let sensor = SimulatedPulseSensor::new(filament.clone());
    let sampler = PulseSampler::spawn(sensor, 2000, MonotonicClock::new());

    // let the first read establish the baseline level
    std::thread::sleep(Duration::from_millis(20));
    filament.feed_mm(10.0);

    let total = drain_until(&sampler, 10, Duration::from_secs(3));
    assert_eq!(total, 10);
    assert_eq!(sampler.read_errors(), 0);
}

#[test]
fn stuck_input_reports_stall() {
    let sampler = PulseSampler::spawn(StuckLevel(false), 500, MonotonicClock::new());
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(sampler.drain(), 0);
    assert!(sampler.stalled_for_now() >= 50);
    assert_eq!(sampler.stalled_for(1000), 1000);
}
