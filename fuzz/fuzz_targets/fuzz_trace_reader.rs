#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Accepted traces must come out in time order.
    if let Ok(trace) = flowguard_config::read_trace(data) {
        assert!(trace.windows(2).all(|w| w[0].t_ms <= w[1].t_ms));
    }
});
