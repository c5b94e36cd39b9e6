//! Result rendering: one JSON object per line with `--json`, short text lines otherwise.

use flowguard_core::{MonitorStatus, PollRecord, ReplayReport, TrackerSnapshot};
use serde_json::{Value, json};

pub fn unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

pub fn status_name(status: &MonitorStatus) -> &'static str {
    match status {
        MonitorStatus::Idle => "idle",
        MonitorStatus::Watching(_) => "watching",
        MonitorStatus::Paused(_) => "paused",
        MonitorStatus::Faulted(_) => "faulted",
    }
}

pub fn snapshot_json(s: &TrackerSnapshot) -> Value {
    json!({
        "expected_mm": s.expected_mm,
        "actual_mm": s.actual_mm,
        "deficit_mm": s.deficit_mm,
        "ratio": s.flow_ratio,
    })
}

pub fn poll_json(p: &PollRecord) -> Value {
    let detail = match &p.status {
        MonitorStatus::Paused(reason) => Some(reason.as_str().to_string()),
        MonitorStatus::Faulted(e) => Some(e.to_string()),
        _ => None,
    };
    json!({
        "t_ms": p.t_ms,
        "status": status_name(&p.status),
        "verdict": p.verdict().map(|v| v.label()),
        "detail": detail,
        "flow": snapshot_json(&p.snapshot),
    })
}

/// Summary object shared by `simulate` and `scenario`; callers add their own keys.
pub fn report_json(command: &str, events: usize, r: &ReplayReport) -> Value {
    let pauses: Vec<Value> = r
        .pauses
        .iter()
        .map(|(t, reason)| json!({ "t_ms": t, "reason": reason.as_str() }))
        .collect();
    json!({
        "timestamp": unix_ms(),
        "command": command,
        "mode": r.mode.as_str(),
        "events": events,
        "checks": r.polls.len(),
        "pulses": r.pulses,
        "duration_ms": r.duration_ms,
        "first_jam_ms": r.first_jam_ms(),
        "jam_kind": r.first_jam.map(|(_, k)| k.as_str()),
        "pauses": pauses,
        "faults": r.faults,
        "peak_deficit_mm": r.peak_deficit_mm(),
        "final": snapshot_json(&r.final_snapshot),
    })
}

pub fn print_polls(r: &ReplayReport, json: bool) {
    for p in &r.polls {
        if json {
            println!("{}", poll_json(p));
        } else {
            let s = &p.snapshot;
            println!(
                "{:>8} ms  {:<8} {:<13} expected {:>8.2}  actual {:>8.2}  deficit {:>7.2}  ratio {:.2}",
                p.t_ms,
                status_name(&p.status),
                p.verdict().map_or("-", |v| v.label()),
                s.expected_mm,
                s.actual_mm,
                s.deficit_mm,
                s.flow_ratio,
            );
        }
    }
}

pub fn print_report_text(r: &ReplayReport) {
    println!(
        "mode {}: {} checks, {} pulses over {} ms",
        r.mode.as_str(),
        r.polls.len(),
        r.pulses,
        r.duration_ms
    );
    match r.first_jam {
        Some((t, kind)) => println!("jam detected: {} at {t} ms", kind.as_str()),
        None => println!("no jam detected"),
    }
    for (t, reason) in &r.pauses {
        println!("pause sent at {t} ms ({})", reason.as_str());
    }
    if r.faults > 0 {
        println!("pause requests failed: {}", r.faults);
    }
    let s = &r.final_snapshot;
    println!(
        "final: expected {:.2} mm, actual {:.2} mm, deficit {:.2} mm, ratio {:.2}",
        s.expected_mm, s.actual_mm, s.deficit_mm, s.flow_ratio
    );
}
