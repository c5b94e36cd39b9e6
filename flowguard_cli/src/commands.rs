//! Command implementations.

use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use eyre::WrapErr;
use flowguard_config::{Config, TraceEvent, load_trace_csv, parse_event};
use flowguard_core::hw_error::map_hw_error;
use flowguard_core::scenario::{drift_trace, generate};
use flowguard_core::util::period_ms;
use flowguard_core::{
    FlowMonitor, MonitorCfg, MonitorError, MonitorStatus, PulseSampler, Scenario, ScenarioParams,
    TrackingMode, compare_modes, replay,
};
use flowguard_hardware::{SimFilament, SimulatedPrinter, SimulatedPulseSensor, SimulatedRunout};
use flowguard_traits::{MonotonicClock, RunoutSensor};
use serde_json::json;

use crate::output::{
    print_polls, print_report_text, report_json, snapshot_json, status_name, unix_ms,
};

/// Main loop period while watching.
const TICK: Duration = Duration::from_millis(50);

fn monitor_cfg(cfg: &Config, mode: Option<TrackingMode>) -> MonitorCfg {
    let mut m = MonitorCfg::from(cfg);
    if let Some(mode) = mode {
        m.tracking.mode = mode;
    }
    m
}

fn scenario_params(cfg: &Config) -> ScenarioParams {
    ScenarioParams {
        real_mm_per_pulse: cfg.sensor.movement_mm_per_pulse,
        ..ScenarioParams::default()
    }
}

// ── simulate ─────────────────────────────────────────────────────────────────

pub fn simulate(
    cfg: &Config,
    trace_path: &Path,
    mode: Option<TrackingMode>,
    polls: bool,
    json: bool,
) -> eyre::Result<()> {
    let trace = load_trace_csv(trace_path)?;
    let report = replay(&trace, monitor_cfg(cfg, mode))?;
    tracing::info!(
        trace = %trace_path.display(),
        events = trace.len(),
        first_jam_ms = ?report.first_jam_ms(),
        "trace replayed"
    );
    if polls {
        print_polls(&report, json);
    }
    if json {
        println!("{}", report_json("simulate", trace.len(), &report));
    } else {
        print_report_text(&report);
    }
    Ok(())
}

// ── scenario ─────────────────────────────────────────────────────────────────

pub fn scenario(
    cfg: &Config,
    sc: Scenario,
    mode: Option<TrackingMode>,
    polls: bool,
    json: bool,
) -> eyre::Result<()> {
    let trace = generate(sc, &scenario_params(cfg));
    let report = replay(&trace, monitor_cfg(cfg, mode))?;
    let detected = report.first_jam.is_some();
    let as_expected = detected == sc.expects_jam();
    if !as_expected {
        tracing::warn!(
            scenario = sc.name(),
            detected,
            "detector outcome differs from what the scenario models"
        );
    }

    if polls {
        print_polls(&report, json);
    }
    if json {
        let mut v = report_json("scenario", trace.len(), &report);
        v["scenario"] = json!(sc.name());
        v["expects_jam"] = json!(sc.expects_jam());
        v["as_expected"] = json!(as_expected);
        println!("{v}");
    } else {
        println!(
            "scenario {sc} ({})",
            if sc.expects_jam() {
                "jam expected"
            } else {
                "no jam expected"
            }
        );
        print_report_text(&report);
        println!(
            "outcome: {}",
            if as_expected { "as expected" } else { "UNEXPECTED" }
        );
    }
    Ok(())
}

// ── drift ────────────────────────────────────────────────────────────────────

pub fn drift(cfg: &Config, error_pct: f32, length_mm: f32, json: bool) -> eyre::Result<()> {
    if !(error_pct.is_finite() && error_pct > -100.0) {
        eyre::bail!("drift --error-pct must be a finite number above -100");
    }
    if !(length_mm.is_finite() && length_mm > 0.0) {
        eyre::bail!("drift --length-mm must be > 0");
    }
    let trace = drift_trace(error_pct, length_mm, &scenario_params(cfg));
    let reports = compare_modes(&trace, MonitorCfg::from(cfg))?;

    if !json {
        println!("calibration drift {error_pct:+.1}% over {length_mm:.0} mm");
        println!(
            "{:<11} {:>10} {:>10} {:>10} {:>10}  first jam",
            "mode", "expected", "actual", "deficit", "peak"
        );
    }
    for r in &reports {
        let s = &r.final_snapshot;
        if json {
            println!(
                "{}",
                json!({
                    "timestamp": unix_ms(),
                    "command": "drift",
                    "mode": r.mode.as_str(),
                    "error_pct": error_pct,
                    "length_mm": length_mm,
                    "expected_mm": s.expected_mm,
                    "actual_mm": s.actual_mm,
                    "deficit_mm": s.deficit_mm,
                    "peak_deficit_mm": r.peak_deficit_mm(),
                    "first_jam_ms": r.first_jam_ms(),
                })
            );
        } else {
            let first = r
                .first_jam
                .map_or_else(|| "-".to_string(), |(t, k)| format!("{} at {t} ms", k.as_str()));
            println!(
                "{:<11} {:>10.2} {:>10.2} {:>10.2} {:>10.2}  {first}",
                r.mode.as_str(),
                s.expected_mm,
                s.actual_mm,
                s.deficit_mm,
                r.peak_deficit_mm()
            );
        }
    }
    Ok(())
}

// ── sensor inputs ────────────────────────────────────────────────────────────

struct Inputs {
    sampler: PulseSampler,
    runout: Box<dyn RunoutSensor>,
    /// Set when the movement sensor is simulated and fed from commanded extrusion.
    filament: Option<SimFilament>,
    /// Set when the runout switch is simulated and driven by `runout` input lines.
    sim_runout: Option<SimulatedRunout>,
    sensor: &'static str,
}

fn open_inputs(cfg: &Config) -> eyre::Result<Inputs> {
    let hz = cfg.sensor.poll_hz;

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        use flowguard_hardware::gpio::{GpioPulseInput, GpioRunoutSwitch};

        let hw = |e: flowguard_hardware::error::HwError| eyre::Report::new(map_hw_error(&e));
        if let Some(pin) = cfg.sensor.pin {
            let input = GpioPulseInput::new(pin).map_err(hw)?;
            let sampler = PulseSampler::spawn(input, hz, MonotonicClock::new());
            let (runout, sim_runout) = match cfg.sensor.runout_pin {
                Some(rp) => {
                    let switch =
                        GpioRunoutSwitch::new(rp, cfg.sensor.runout_active_low).map_err(hw)?;
                    (Box::new(switch) as Box<dyn RunoutSensor>, None)
                }
                None => {
                    let r = SimulatedRunout::new();
                    (Box::new(r.clone()) as Box<dyn RunoutSensor>, Some(r))
                }
            };
            tracing::info!(
                pin,
                runout_pin = ?cfg.sensor.runout_pin,
                poll_hz = hz,
                "GPIO movement sensor opened"
            );
            return Ok(Inputs {
                sampler,
                runout,
                filament: None,
                sim_runout,
                sensor: "gpio",
            });
        }
        tracing::warn!("sensor.pin not set; falling back to the simulated sensor");
    }

    let filament = SimFilament::new(cfg.sensor.movement_mm_per_pulse);
    let sampler = PulseSampler::spawn(
        SimulatedPulseSensor::new(filament.clone()),
        hz,
        MonotonicClock::new(),
    );
    let runout = SimulatedRunout::new();
    Ok(Inputs {
        sampler,
        runout: Box::new(runout.clone()),
        filament: Some(filament),
        sim_runout: Some(runout),
        sensor: "simulated",
    })
}

fn read_runout(inputs: &mut Inputs) -> eyre::Result<bool> {
    inputs
        .runout
        .filament_present()
        .map_err(|e| eyre::Report::new(map_hw_error(e.as_ref())))
}

// ── watch ────────────────────────────────────────────────────────────────────

/// Forward stdin lines over a channel; disconnects on EOF.
fn spawn_line_reader() -> xch::Receiver<String> {
    let (tx, rx) = xch::bounded(256);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(l) => {
                    if tx.send(l).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}

struct Live {
    monitor: FlowMonitor<SimulatedPrinter>,
    inputs: Inputs,
    sim_flow: f32,
    last_total: Option<f32>,
    bad_lines: u64,
    json: bool,
    started: Instant,
}

impl Live {
    fn apply_line(&mut self, line: &str) -> Result<(), String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        let mut parts = line.split_whitespace();
        let event = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        match parse_event(event, value)? {
            TraceEvent::Status(s) => self.monitor.set_print_state(s.into()),
            TraceEvent::Total(mm) => {
                if let (Some(filament), Some(prev)) = (&self.inputs.filament, self.last_total) {
                    filament.feed_mm((mm - prev) * self.sim_flow);
                }
                self.last_total = Some(mm);
                self.monitor.on_telemetry(mm);
            }
            TraceEvent::Pulse(n) => self.monitor.on_pulses(n),
            TraceEvent::Runout(missing) => match &self.inputs.sim_runout {
                Some(r) => r.set_present(!missing),
                None => tracing::debug!("runout line ignored, the switch is wired"),
            },
            TraceEvent::Poll => {}
        }
        Ok(())
    }

    fn step(&mut self) {
        self.monitor.on_pulses(self.inputs.sampler.drain());
        match read_runout(&mut self.inputs) {
            Ok(present) => self.monitor.set_runout(!present),
            Err(e) => tracing::warn!(error = %e, "runout switch read failed"),
        }
        let status = self.monitor.poll();
        if matches!(status, MonitorStatus::Paused(_) | MonitorStatus::Faulted(_)) {
            self.report(&status);
        }
    }

    fn uptime_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn report(&self, status: &MonitorStatus) {
        let detail = match status {
            MonitorStatus::Paused(reason) => reason.as_str().to_string(),
            MonitorStatus::Faulted(e) => e.to_string(),
            _ => String::new(),
        };
        let snap = self.monitor.snapshot();
        if self.json {
            println!(
                "{}",
                json!({
                    "timestamp": unix_ms(),
                    "event": status_name(status),
                    "detail": detail,
                    "uptime_ms": self.uptime_ms(),
                    "flow": snapshot_json(&snap),
                })
            );
        } else {
            println!(
                "{} ({detail}) at {:.1} s: expected {:.2} mm, actual {:.2} mm, deficit {:.2} mm",
                status_name(status),
                Duration::from_millis(self.uptime_ms()).as_secs_f32(),
                snap.expected_mm,
                snap.actual_mm,
                snap.deficit_mm
            );
        }
    }

    fn summary(&self) {
        let snap = self.monitor.snapshot();
        let verdict = self.monitor.last_verdict();
        if self.json {
            println!(
                "{}",
                json!({
                    "timestamp": unix_ms(),
                    "command": "watch",
                    "sensor": self.inputs.sensor,
                    "mode": snap.mode.as_str(),
                    "uptime_ms": self.uptime_ms(),
                    "pulses": self.monitor.pulses_seen(),
                    "pauses": self.monitor.pauses_issued(),
                    "read_errors": self.inputs.sampler.read_errors(),
                    "bad_lines": self.bad_lines,
                    "verdict": verdict.label(),
                    "final": snapshot_json(&snap),
                })
            );
        } else {
            println!(
                "watched {:.1} s with the {} sensor: {} pulses, {} pauses, verdict {}",
                Duration::from_millis(self.uptime_ms()).as_secs_f32(),
                self.inputs.sensor,
                self.monitor.pulses_seen(),
                self.monitor.pauses_issued(),
                verdict.label()
            );
        }
    }
}

pub fn watch(
    cfg: &Config,
    max_secs: Option<u64>,
    sim_flow: f32,
    json: bool,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    if !(0.0..=1.0).contains(&sim_flow) {
        eyre::bail!("watch --sim-flow must be in [0, 1]");
    }
    let monitor = FlowMonitor::builder()
        .with_config(MonitorCfg::from(cfg))
        .with_control(SimulatedPrinter::new())
        .build()?;
    let inputs = open_inputs(cfg)?;
    let lines = spawn_line_reader();
    let limit = max_secs.map(Duration::from_secs);

    tracing::info!(
        sensor = inputs.sensor,
        mode = monitor.config().tracking.mode.as_str(),
        max_secs = ?max_secs,
        "watching"
    );
    let mut live = Live {
        monitor,
        inputs,
        sim_flow,
        last_total: None,
        bad_lines: 0,
        json,
        started: Instant::now(),
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            tracing::info!("interrupted, stopping");
            break;
        }
        if limit.is_some_and(|l| live.started.elapsed() >= l) {
            tracing::info!("time limit reached, stopping");
            break;
        }
        let open = match lines.recv_timeout(TICK) {
            Ok(line) => {
                if let Err(e) = live.apply_line(&line) {
                    live.bad_lines += 1;
                    tracing::warn!(line = %line, error = %e, "ignoring input line");
                }
                true
            }
            Err(xch::RecvTimeoutError::Timeout) => true,
            Err(xch::RecvTimeoutError::Disconnected) => false,
        };
        live.step();
        if !open {
            tracing::info!("input closed, stopping");
            break;
        }
    }

    live.summary();
    Ok(())
}

// ── self-check ───────────────────────────────────────────────────────────────

fn check_failed(msg: String) -> eyre::Report {
    eyre::Report::new(MonitorError::Config(msg))
}

/// Feed a few pulses worth of filament through the simulated sensor and wait
/// for the sampler to report them.
fn check_sampler(cfg: &Config, inputs: &Inputs) -> eyre::Result<Option<u32>> {
    const WANT: u32 = 3;
    let Some(filament) = &inputs.filament else {
        return Ok(None);
    };
    // let the sampler take its baseline reading first
    std::thread::sleep(Duration::from_millis(period_ms(cfg.sensor.poll_hz).max(2) * 10));
    filament.feed_mm(cfg.sensor.movement_mm_per_pulse * 3.5);

    let deadline = Instant::now() + Duration::from_secs(1);
    let mut seen = 0u32;
    while seen < WANT && Instant::now() < deadline {
        seen = seen.saturating_add(inputs.sampler.drain());
        std::thread::sleep(Duration::from_millis(5));
    }
    if seen < WANT {
        return Err(eyre::Report::new(MonitorError::Sensor(format!(
            "pulse sampler reported {seen} of {WANT} pulses"
        ))));
    }
    Ok(Some(seen))
}

pub fn self_check(cfg: &Config, json: bool) -> eyre::Result<()> {
    let mcfg = MonitorCfg::from(cfg);
    FlowMonitor::builder()
        .with_config(mcfg)
        .with_control(SimulatedPrinter::new())
        .build()
        .wrap_err("monitor rejected the configuration")?;

    let mut inputs = open_inputs(cfg)?;
    let sampler_pulses = check_sampler(cfg, &inputs)?;
    let filament_present = read_runout(&mut inputs)?;
    if !filament_present {
        tracing::warn!("runout switch reports no filament");
    }

    let p = scenario_params(cfg);
    let healthy = replay(&generate(Scenario::Healthy, &p), mcfg)?;
    if let Some((t, kind)) = healthy.first_jam {
        return Err(check_failed(format!(
            "a healthy print was reported as a {} jam at {t} ms",
            kind.as_str()
        )));
    }

    // long enough for the slowest streak to fire after the fault
    let dwell = mcfg
        .detection
        .effective_hard_jam_time_ms()
        .max(mcfg.detection.effective_soft_jam_time_ms());
    let jam_params = ScenarioParams {
        duration_ms: p.fault_at_ms
            + 2 * dwell
            + 3 * mcfg.detection.check_interval_ms
            + mcfg.tracking.window_ms,
        ..p
    };
    let jammed = replay(&generate(Scenario::HardJam, &jam_params), mcfg)?;
    let Some((jam_ms, kind)) = jammed.first_jam else {
        return Err(check_failed(
            "a stalled sensor was never reported as jammed".to_string(),
        ));
    };

    if json {
        println!(
            "{}",
            json!({
                "timestamp": unix_ms(),
                "command": "self_check",
                "ok": true,
                "mode": mcfg.tracking.mode.as_str(),
                "sensor": inputs.sensor,
                "sampler_pulses": sampler_pulses,
                "filament_present": filament_present,
                "jam_detected_ms": jam_ms,
                "jam_kind": kind.as_str(),
            })
        );
    } else {
        println!("config: ok");
        println!(
            "monitor: ok ({} mode, check every {} ms)",
            mcfg.tracking.mode.as_str(),
            mcfg.detection.check_interval_ms
        );
        match sampler_pulses {
            Some(n) => println!("sensor: {} ({n} test pulses seen)", inputs.sensor),
            None => println!("sensor: {}", inputs.sensor),
        }
        println!(
            "runout: {}",
            if filament_present {
                "filament present"
            } else {
                "no filament"
            }
        );
        println!(
            "detector: healthy print clean, {} jam detected {} ms after the fault",
            kind.as_str(),
            jam_ms.saturating_sub(p.fault_at_ms)
        );
        println!("self-check: ok");
    }
    Ok(())
}
