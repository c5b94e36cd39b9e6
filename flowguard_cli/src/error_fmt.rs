//! Human-readable error descriptions and structured JSON error formatting.

use flowguard_core::error::{BuildError, MonitorError};

/// First error of type `E` anywhere in the report's chain.
fn find<E: std::error::Error + 'static>(err: &eyre::Report) -> Option<&E> {
    err.chain().find_map(|e| e.downcast_ref::<E>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = find::<BuildError>(err) {
        return match be {
            BuildError::MissingControl => {
                "What happened: No printer control was provided to the flow monitor.\nLikely causes: The printer link failed to initialize or was not wired into the builder.\nHow to fix: Ensure the printer control is created successfully and passed via with_control(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid monitor configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. `flowguard self-check` validates it."
            ),
        };
    }

    if let Some(me) = find::<MonitorError>(err) {
        return match me {
            MonitorError::Sensor(msg) => format!(
                "What happened: The filament sensor could not be used ({msg}).\nLikely causes: Wrong pin number, wiring fault, or no permission to access GPIO.\nHow to fix: Check sensor.pin and sensor.runout_pin in the config and make sure the process can open the GPIO device."
            ),
            MonitorError::LinkFault(msg) => format!(
                "What happened: The printer link dropped ({msg}).\nLikely causes: Printer powered off, cable unplugged, or host service restarted.\nHow to fix: Reconnect the printer and start the watch again."
            ),
            MonitorError::Timeout => {
                "What happened: The printer did not acknowledge in time.\nLikely causes: Printer busy or the link is congested.\nHow to fix: Check the printer is responsive, then retry.".to_string()
            }
            MonitorError::Config(msg) => format!(
                "What happened: Self-check failed: {msg}.\nLikely causes: Detection thresholds that do not fit this sensor (detection.* or tuning.* in the config).\nHow to fix: Compare against the defaults, try `flowguard scenario hard_jam --polls` to see what the detector sees, and adjust."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(te) = find::<toml::de::Error>(err) {
        let what = te.message();
        return format!(
            "What happened: The config file is not valid ({what}).\nLikely causes: A typo, a value of the wrong type, or an unknown tracking mode.\nHow to fix: Fix the TOML at the reported location; every section is optional, so delete a key to fall back to its default."
        );
    }

    // String-based heuristics for errors coming from files and arguments
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    let detail = err
        .chain()
        .skip(1)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");

    if lower.starts_with("read config") {
        return format!(
            "What happened: The config file could not be read ({detail}).\nLikely causes: Wrong path or missing permissions.\nHow to fix: Check the --config path, or omit it to run with the defaults."
        );
    }

    if lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid ({detail}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file and try again."
        );
    }

    // Trace CSV header special-case
    if lower.contains("trace csv must have headers") {
        return "Invalid headers in trace CSV. Expected 't_ms,event,value'.".to_string();
    }

    if lower.starts_with("open trace csv") {
        return format!(
            "What happened: The trace file could not be opened.\nLikely causes: Wrong path or missing permissions.\nHow to fix: Check the --trace path. Original: {msg}"
        );
    }

    if lower.starts_with("invalid csv row") {
        return format!(
            "What happened: The trace file has a bad row ({msg}).\nLikely causes: Unknown event name, unparsable value, or timestamps out of order.\nHow to fix: Events are status, total, pulse, runout and poll; rows must be sorted by t_ms."
        );
    }

    if lower.starts_with("drift --") || lower.starts_with("watch --") {
        return format!("What happened: {msg}.\nHow to fix: See --help for accepted values.");
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable reason names for JSON output.
pub fn error_reason_name(err: &eyre::Report) -> &'static str {
    if find::<BuildError>(err).is_some() || find::<toml::de::Error>(err).is_some() {
        return "config";
    }
    match find::<MonitorError>(err) {
        Some(MonitorError::LinkFault(_)) => "link_fault",
        Some(MonitorError::Timeout) => "timeout",
        Some(MonitorError::Sensor(_)) => "sensor",
        Some(MonitorError::Config(_)) => "self_check",
        Some(MonitorError::Control(_)) => "control",
        Some(MonitorError::State(_)) => "state",
        None => {
            let lower = err.to_string().to_ascii_lowercase();
            if lower.contains("config") {
                "config"
            } else if lower.contains("trace csv") || lower.contains("csv row") {
                "trace"
            } else {
                "error"
            }
        }
    }
}

/// Map monitor errors to stable exit codes; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match find::<MonitorError>(err) {
        Some(MonitorError::LinkFault(_) | MonitorError::Timeout) => 3,
        Some(MonitorError::Sensor(_)) => 4,
        Some(MonitorError::Config(_)) => 5,
        Some(MonitorError::Control(_)) => 6,
        Some(MonitorError::State(_)) | None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    json!({ "reason": error_reason_name(err), "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;
    use rstest::rstest;

    #[rstest]
    #[case(MonitorError::LinkFault("gone".into()), 3, "link_fault")]
    #[case(MonitorError::Timeout, 3, "timeout")]
    #[case(MonitorError::Sensor("pin 4".into()), 4, "sensor")]
    #[case(MonitorError::Config("too tight".into()), 5, "self_check")]
    #[case(MonitorError::Control("refused".into()), 6, "control")]
    fn monitor_errors_map_to_codes(
        #[case] e: MonitorError,
        #[case] code: i32,
        #[case] reason: &str,
    ) {
        let report = eyre::Report::new(e);
        assert_eq!(exit_code_for_error(&report), code);
        assert_eq!(error_reason_name(&report), reason);
    }

    #[test]
    fn wrapped_errors_are_still_recognised() {
        let inner: Result<(), MonitorError> = Err(MonitorError::Sensor("busy".into()));
        let report = inner.wrap_err("open inputs").unwrap_err();
        assert_eq!(exit_code_for_error(&report), 4);
        assert!(humanize(&report).contains("sensor.pin"));
    }

    #[test]
    fn invalid_config_explains_message() {
        let report = eyre::Report::new(BuildError::InvalidConfig("window_ms must be >= 1"));
        let text = humanize(&report);
        assert!(text.contains("window_ms must be >= 1"));
        assert_eq!(exit_code_for_error(&report), 1);
    }

    #[test]
    fn trace_header_hint() {
        let report = eyre::eyre!("trace CSV must have headers 't_ms,event,value', got: a,b");
        assert_eq!(
            humanize(&report),
            "Invalid headers in trace CSV. Expected 't_ms,event,value'."
        );
        assert_eq!(error_reason_name(&report), "trace");
    }

    #[test]
    fn json_error_has_reason_and_message() {
        let report = eyre::eyre!("something odd");
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&report)).unwrap();
        assert_eq!(v["reason"], "error");
        assert!(v["message"].as_str().unwrap().contains("something odd"));
    }
}
