//! Maps `Box<dyn Error>` from trait boundaries to typed `MonitorError`.
//!
//! The traits in `flowguard_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `flowguard_hardware::HwError` downcasting.

use crate::error::MonitorError;

/// Map a trait-boundary error to a typed `MonitorError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> MonitorError {
    #[cfg(feature = "hardware-errors")]
    {
        use flowguard_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => MonitorError::Timeout,
                HwError::Disconnected => MonitorError::LinkFault(hw.to_string()),
                HwError::Gpio(msg) => MonitorError::Sensor(msg.clone()),
                HwError::Io(_) => MonitorError::LinkFault(hw.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        MonitorError::Timeout
    } else if lower.contains("disconnect") {
        MonitorError::LinkFault(s)
    } else {
        MonitorError::Control(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_fallback_detects_timeouts() {
        let e = std::io::Error::other("ack timed out");
        assert!(matches!(map_hw_error(&e), MonitorError::Timeout));
        let e = std::io::Error::other("printer refused");
        assert!(matches!(map_hw_error(&e), MonitorError::Control(_)));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_errors_map_precisely() {
        use flowguard_hardware::error::HwError;
        assert!(matches!(
            map_hw_error(&HwError::Disconnected),
            MonitorError::LinkFault(_)
        ));
        assert!(matches!(
            map_hw_error(&HwError::Gpio("pin 4 busy".into())),
            MonitorError::Sensor(_)
        ));
    }
}
