use chrono::Local;
use serde::Serialize;

/// Outbound operator commands. A closed vocabulary, sent verbatim to
/// whichever transport is active; there is no acknowledgment contract,
/// sends are fire-and-forget (the device may publish a status notice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartPump,
    StopPump,
    AlarmOff,
    ResetUseCount,
    /// Escape hatch for raw strings, mainly for bench testing against
    /// firmware variants.
    Raw(String),
}

impl Command {
    /// Name used on the MQTT control topic.
    pub fn control_name(&self) -> &str {
        match self {
            Command::StartPump => "START_PUMP",
            Command::StopPump => "STOP_PUMP",
            Command::AlarmOff => "ALARM_OFF",
            Command::ResetUseCount => "RESET_USE_COUNT",
            Command::Raw(s) => s,
        }
    }

    /// Token written on the serial line. The serial firmware only
    /// understands `1`/`stop`; anything else it logs and ignores,
    /// which is also what the original operator console caused.
    pub fn serial_token(&self) -> &str {
        match self {
            Command::StartPump => "1",
            Command::StopPump => "stop",
            other => other.control_name(),
        }
    }

    /// JSON document published to the control topic.
    pub fn control_payload(&self) -> String {
        #[derive(Serialize)]
        struct Envelope<'a> {
            command: &'a str,
            timestamp: String,
        }
        let env = Envelope {
            command: self.control_name(),
            timestamp: Local::now().to_rfc3339(),
        };
        // Two strings cannot fail to serialize.
        serde_json::to_string(&env).unwrap()
    }

    /// Parse an operator-facing name (as accepted by the CLI).
    pub fn from_name(name: &str) -> Command {
        match name.trim().to_ascii_uppercase().as_str() {
            "START_PUMP" | "START" => Command::StartPump,
            "STOP_PUMP" | "STOP" => Command::StopPump,
            "ALARM_OFF" => Command::AlarmOff,
            "RESET_USE_COUNT" | "RESET" => Command::ResetUseCount,
            _ => Command::Raw(name.trim().to_string()),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.control_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_vocabulary() {
        assert_eq!(Command::StartPump.serial_token(), "1");
        assert_eq!(Command::StopPump.serial_token(), "stop");
        assert_eq!(Command::AlarmOff.serial_token(), "ALARM_OFF");
    }

    #[test]
    fn control_payload_wraps_name() {
        let payload = Command::ResetUseCount.control_payload();
        let doc: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(doc["command"], "RESET_USE_COUNT");
        assert!(doc["timestamp"].is_string());
    }

    #[test]
    fn names_round_trip() {
        assert_eq!(Command::from_name("start_pump"), Command::StartPump);
        assert_eq!(Command::from_name("STOP"), Command::StopPump);
        assert_eq!(
            Command::from_name("CUSTOM"),
            Command::Raw("CUSTOM".to_string())
        );
    }
}
