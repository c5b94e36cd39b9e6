//! Pause orchestration: start timeout, runout rules, failures, resume and the
//! movement timeout used while telemetry is stale.

use flowguard_core::mocks::{FailingControl, RecordingControl};
use flowguard_core::{
    FlowMonitor, JamKind, JamParams, JamVerdict, MonitorError, MonitorStatus, PauseCfg,
    PauseReason, PrintState, Tuning,
};
use flowguard_traits::{ManualClock, PrintControl};

fn detection() -> JamParams {
    JamParams {
        hard_jam_time_ms: 2000,
        ..JamParams::default()
    }
}

fn monitor_with<C: PrintControl>(control: C, pause: PauseCfg) -> (ManualClock, FlowMonitor<C>) {
    let clock = ManualClock::new();
    let monitor = FlowMonitor::builder()
        .with_control(control)
        .with_clock(clock.clone())
        .with_detection(detection())
        .with_pause(pause)
        .build()
        .unwrap();
    (clock, monitor)
}

fn start<C: PrintControl>(m: &mut FlowMonitor<C>) {
    m.set_print_state(PrintState::Printing);
    m.on_telemetry(0.0);
}

/// One second of commanded extrusion with `pulses` edges, then a poll.
fn tick<C: PrintControl>(
    clock: &ManualClock,
    m: &mut FlowMonitor<C>,
    sec: u64,
    pulses: u32,
) -> MonitorStatus {
    clock.set_ms(sec * 1000);
    m.on_telemetry(sec as f32 * 20.0);
    m.on_pulses(pulses);
    m.poll()
}

#[test]
fn jam_pause_waits_for_print_start_timeout() {
    let control = RecordingControl::new();
    let (clock, mut m) = monitor_with(control.clone(), PauseCfg::default());
    start(&mut m);
    let statuses: Vec<MonitorStatus> = (1..=10).map(|s| tick(&clock, &mut m, s, 0)).collect();

    assert!(matches!(
        statuses[2],
        MonitorStatus::Watching(JamVerdict::Jammed(JamKind::Hard))
    ));
    assert!(
        statuses[..9]
            .iter()
            .all(|s| matches!(s, MonitorStatus::Watching(_)))
    );
    assert!(matches!(
        statuses[9],
        MonitorStatus::Paused(PauseReason::Jam(JamKind::Hard))
    ));
    assert_eq!(control.pauses(), 1);
}

#[test]
fn pause_is_sent_once_per_segment() {
    let control = RecordingControl::new();
    let pause = PauseCfg {
        start_print_timeout_ms: 0,
        ..PauseCfg::default()
    };
    let (clock, mut m) = monitor_with(control.clone(), pause);
    start(&mut m);
    for s in 1..=8 {
        tick(&clock, &mut m, s, 0);
    }
    assert_eq!(control.pauses(), 1);
    assert_eq!(m.pauses_issued(), 1);
    assert!(m.last_verdict().is_jammed());
}

#[test]
fn runout_pauses_without_flow_problem() {
    let control = RecordingControl::new();
    let pause = PauseCfg {
        start_print_timeout_ms: 0,
        ..PauseCfg::default()
    };
    let (clock, mut m) = monitor_with(control.clone(), pause);
    start(&mut m);
    tick(&clock, &mut m, 1, 7);
    m.set_runout(true);
    let status = tick(&clock, &mut m, 2, 7);
    assert!(matches!(status, MonitorStatus::Paused(PauseReason::Runout)));
    assert_eq!(control.pauses(), 1);
}

#[test]
fn runout_without_pause_on_runout_suppresses_jam_pause() {
    let control = RecordingControl::new();
    let pause = PauseCfg {
        pause_on_runout: false,
        start_print_timeout_ms: 0,
        ..PauseCfg::default()
    };
    let (clock, mut m) = monitor_with(control.clone(), pause);
    start(&mut m);
    m.set_runout(true);
    for s in 1..=6 {
        tick(&clock, &mut m, s, 0);
    }
    assert!(m.last_verdict().is_jammed());
    assert_eq!(control.pauses(), 0);

    // switch reports filament again: the latched jam now pauses
    m.set_runout(false);
    clock.set_ms(7000);
    assert!(matches!(m.poll(), MonitorStatus::Paused(PauseReason::Jam(_))));
}

#[test]
fn disabled_pausing_still_classifies() {
    let control = RecordingControl::new();
    let pause = PauseCfg {
        enabled: false,
        start_print_timeout_ms: 0,
        ..PauseCfg::default()
    };
    let (clock, mut m) = monitor_with(control.clone(), pause);
    start(&mut m);
    m.set_runout(true);
    for s in 1..=6 {
        tick(&clock, &mut m, s, 0);
    }
    assert!(m.last_verdict().is_jammed());
    assert_eq!(control.pauses(), 0);
}

#[test]
fn failed_pause_is_retried_on_next_check() {
    let pause = PauseCfg {
        start_print_timeout_ms: 0,
        ..PauseCfg::default()
    };
    let (clock, mut m) = monitor_with(FailingControl::new("printer refused", 1), pause);
    start(&mut m);
    tick(&clock, &mut m, 1, 0);
    tick(&clock, &mut m, 2, 0);
    let failed = tick(&clock, &mut m, 3, 0);
    assert!(matches!(failed, MonitorStatus::Faulted(MonitorError::Control(_))));
    let retried = tick(&clock, &mut m, 4, 0);
    assert!(matches!(retried, MonitorStatus::Paused(_)));
    assert_eq!(m.control().attempts(), 2);
}

#[test]
fn checks_are_rate_limited() {
    let (clock, mut m) = monitor_with(RecordingControl::new(), PauseCfg::default());
    start(&mut m);
    tick(&clock, &mut m, 1, 0);
    let armed = m.classifier().hard_streak().phase();
    clock.set_ms(1500);
    let status = m.poll();
    assert!(matches!(
        status,
        MonitorStatus::Watching(JamVerdict::Suspect { kind: JamKind::Hard, elapsed_ms: 0 })
    ));
    assert_eq!(m.classifier().hard_streak().phase(), armed);
}

#[test]
fn telemetry_and_pulses_ignored_unless_printing() {
    let (clock, mut m) = monitor_with(RecordingControl::new(), PauseCfg::default());
    m.on_telemetry(10.0);
    m.on_pulses(3);
    assert!(!m.tracker().is_initialized());
    assert_eq!(m.pulses_seen(), 0);
    clock.set_ms(1000);
    assert!(matches!(m.poll(), MonitorStatus::Idle));
}

#[test]
fn leaving_printing_resets_tracking() {
    let control = RecordingControl::new();
    let pause = PauseCfg {
        start_print_timeout_ms: 0,
        ..PauseCfg::default()
    };
    let (clock, mut m) = monitor_with(control.clone(), pause);
    start(&mut m);
    for s in 1..=3 {
        tick(&clock, &mut m, s, 0);
    }
    assert_eq!(control.pauses(), 1);
    m.set_print_state(PrintState::Paused);
    assert!(!m.tracker().is_initialized());
    assert_eq!(m.classifier().latched(), None);
    assert_eq!(m.last_verdict(), JamVerdict::Inactive);

    // a new printing segment can pause again
    m.set_print_state(PrintState::Printing);
    m.on_telemetry(60.0);
    for s in 4..=6 {
        clock.set_ms(s * 1000);
        m.on_telemetry(60.0 + (s - 3) as f32 * 20.0);
        m.poll();
    }
    assert_eq!(control.pauses(), 2);
}

#[test]
fn resume_clears_state_and_notifies_printer() {
    let control = RecordingControl::new();
    let pause = PauseCfg {
        start_print_timeout_ms: 0,
        ..PauseCfg::default()
    };
    let (clock, mut m) = monitor_with(control.clone(), pause);
    start(&mut m);
    for s in 1..=3 {
        tick(&clock, &mut m, s, 0);
    }
    m.resume().unwrap();
    assert_eq!(control.resumes(), 1);
    assert!(!m.tracker().is_initialized());
    assert_eq!(m.last_verdict(), JamVerdict::Inactive);
}

#[test]
fn resume_failure_is_typed() {
    let (_clock, mut m) =
        monitor_with(FailingControl::new("link disconnected", 1), PauseCfg::default());
    let err = m.resume().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MonitorError>(),
        Some(MonitorError::LinkFault(_))
    ));
}

#[test]
fn pulses_arriving_after_each_check_do_not_pause() {
    // live ordering: telemetry, poll, then the sampler's edges for that span
    let control = RecordingControl::new();
    let pause = PauseCfg {
        start_print_timeout_ms: 0,
        ..PauseCfg::default()
    };
    let (clock, mut m) = monitor_with(control.clone(), pause);
    start(&mut m);
    for s in 1..=30u64 {
        clock.set_ms(s * 1000);
        m.on_telemetry(s as f32 * 20.0);
        let status = m.poll();
        assert!(
            matches!(status, MonitorStatus::Watching(v) if !v.is_jammed()),
            "second {s}: {status:?}"
        );
        clock.set_ms(s * 1000 + 500);
        m.on_pulses(7);
    }
    assert_eq!(control.pauses(), 0);
}

// ── Movement timeout ─────────────────────────────────────────────────────────

fn no_start_delay() -> PauseCfg {
    PauseCfg {
        start_print_timeout_ms: 0,
        ..PauseCfg::default()
    }
}

fn stall_monitor(
    tuning: Tuning,
    pause: PauseCfg,
) -> (ManualClock, FlowMonitor<RecordingControl>) {
    let clock = ManualClock::new();
    let monitor = FlowMonitor::builder()
        .with_control(RecordingControl::new())
        .with_clock(clock.clone())
        .with_detection(detection())
        .with_tuning(tuning)
        .with_pause(pause)
        .build()
        .unwrap();
    (clock, monitor)
}

/// Poll once a second from `from` through `to` without any new input.
fn poll_quiet<C: PrintControl>(
    clock: &ManualClock,
    m: &mut FlowMonitor<C>,
    from: u64,
    to: u64,
) -> Vec<MonitorStatus> {
    (from..=to)
        .map(|s| {
            clock.set_ms(s * 1000);
            m.poll()
        })
        .collect()
}

#[test]
fn lost_telemetry_and_quiet_sensor_pause_after_timeout() {
    let (clock, mut m) = stall_monitor(Tuning::default(), no_start_delay());
    start(&mut m);
    for s in 1..=3 {
        tick(&clock, &mut m, s, 7);
    }
    // telemetry and pulses both stop at 3 s
    let statuses = poll_quiet(&clock, &mut m, 4, 13);
    assert!(
        statuses[..9]
            .iter()
            .all(|s| matches!(s, MonitorStatus::Watching(v) if !v.is_jammed())),
        "{statuses:?}"
    );
    assert!(matches!(
        statuses[9],
        MonitorStatus::Paused(PauseReason::Jam(JamKind::Stalled))
    ));
    assert_eq!(m.last_verdict(), JamVerdict::Jammed(JamKind::Stalled));
    assert_eq!(m.control().pauses(), 1);
    assert_eq!(PauseReason::Jam(JamKind::Stalled).as_str(), "movement_timeout");
}

#[test]
fn edges_without_telemetry_are_not_a_stall() {
    let (clock, mut m) = stall_monitor(Tuning::default(), no_start_delay());
    start(&mut m);
    for s in 1..=30 {
        clock.set_ms(s * 1000);
        m.on_pulses(7);
        let status = m.poll();
        assert!(
            matches!(status, MonitorStatus::Watching(v) if !v.is_jammed()),
            "{s} s: {status:?}"
        );
    }
    assert_eq!(m.control().pauses(), 0);
}

#[test]
fn travel_with_fresh_telemetry_is_not_a_stall() {
    // unchanged totals keep arriving while the head travels
    let (clock, mut m) = stall_monitor(Tuning::default(), no_start_delay());
    start(&mut m);
    tick(&clock, &mut m, 1, 7);
    for s in 2..=20 {
        clock.set_ms(s * 1000);
        m.on_telemetry(20.0);
        let status = m.poll();
        assert!(
            matches!(status, MonitorStatus::Watching(v) if !v.is_jammed()),
            "{s} s: {status:?}"
        );
    }
    assert_eq!(m.control().pauses(), 0);
}

#[test]
fn zero_movement_timeout_disables_fallback() {
    let tuning = Tuning {
        movement_timeout_ms: 0,
        ..Tuning::default()
    };
    let (clock, mut m) = stall_monitor(tuning, no_start_delay());
    start(&mut m);
    let statuses = poll_quiet(&clock, &mut m, 1, 60);
    assert!(statuses.iter().all(|s| matches!(s, MonitorStatus::Watching(_))));
    assert_eq!(m.control().pauses(), 0);
}

#[test]
fn stall_clears_when_sensor_moves_again() {
    let pause = PauseCfg {
        enabled: false,
        ..PauseCfg::default()
    };
    let (clock, mut m) = stall_monitor(Tuning::default(), pause);
    start(&mut m);
    poll_quiet(&clock, &mut m, 1, 10);
    assert_eq!(m.last_verdict(), JamVerdict::Jammed(JamKind::Stalled));

    clock.set_ms(10_500);
    m.on_pulses(1);
    clock.set_ms(11_000);
    assert!(matches!(m.poll(), MonitorStatus::Watching(v) if !v.is_jammed()));
}

#[test]
fn resume_restarts_the_movement_timer() {
    let (clock, mut m) = stall_monitor(Tuning::default(), no_start_delay());
    start(&mut m);
    let statuses = poll_quiet(&clock, &mut m, 1, 10);
    assert!(matches!(statuses[9], MonitorStatus::Paused(_)));

    m.resume().unwrap();
    let statuses = poll_quiet(&clock, &mut m, 11, 19);
    assert!(
        statuses
            .iter()
            .all(|s| matches!(s, MonitorStatus::Watching(v) if !v.is_jammed()))
    );
    clock.set_ms(20_000);
    assert!(matches!(
        m.poll(),
        MonitorStatus::Paused(PauseReason::Jam(JamKind::Stalled))
    ));
}
