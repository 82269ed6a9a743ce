use super::reading::{Reading, WaterLevel};
use chrono::Local;
use regex::Regex;
use serde::Deserialize;

/// Field grammar for the serial DATA line:
///
/// `DATA: Jarak:7 | TDS:320 | EC:640.0 | Suhu:27.3 | Pompa:0 | Alarm:0 | Level Air:SEDANG`
///
/// Labels are matched case-insensitively and gaps between fields are
/// lazy, so extra separators or noise between fields are tolerated.
/// Field order and label renames are a protocol break by design.
static DATA_LINE: &str = concat!(
    r"(?i)DATA:.*?Jarak: *([0-9.]+)",
    r".*?TDS: *([0-9.]+)",
    r".*?EC: *([0-9.]+)",
    r".*?Suhu: *([0-9.]+)",
    r".*?Pompa: *([01])",
    r".*?Alarm: *([01])",
    r".*?Level Air: *([A-Za-z]+)",
);

/// Parser for the serial line protocol.
///
/// Parsing is all-or-nothing: either every field matches and converts,
/// producing a `Reading` stamped with the local receipt time, or the
/// whole line is rejected with `None`. A rejected line must never
/// partially update anything downstream.
pub struct LineParser {
    re: Regex,
}

impl LineParser {
    pub fn new() -> LineParser {
        LineParser {
            // The pattern is a compile-time constant; if it were
            // invalid no line could ever parse, so construction
            // asserts it.
            re: Regex::new(DATA_LINE).unwrap(),
        }
    }

    pub fn parse(&self, line: &str) -> Option<Reading> {
        let caps = self.re.captures(line)?;
        let num = |i: usize| caps.get(i)?.as_str().parse::<f64>().ok();
        let flag = |i: usize| match caps.get(i).map(|m| m.as_str()) {
            Some("1") => Some(true),
            Some("0") => Some(false),
            _ => None,
        };
        Some(Reading {
            timestamp: Local::now(),
            distance_cm: num(1)?,
            tds_ppm: num(2)?,
            ec_us_cm: num(3)?,
            temperature_c: num(4)?,
            pump_on: flag(5)?,
            alarm_active: flag(6)?,
            water_level: WaterLevel::from_label(caps.get(7)?.as_str())?,
        })
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

fn default_level_label() -> String {
    WaterLevel::Medium.label().to_string()
}

/// Telemetry document published by the device on the data topic.
///
/// Decoded once at the transport boundary. Unlike the serial grammar
/// this is a trusted structured channel, so every field is optional
/// with a stated default instead of failing the record.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryPayload {
    #[serde(default)]
    pub jarak_cm: f64,
    #[serde(default)]
    pub tds_input: f64,
    #[serde(default)]
    pub tds_output: f64,
    #[serde(default)]
    pub ec_input: f64,
    #[serde(default)]
    pub ec_output: f64,
    #[serde(default)]
    pub suhu_input: f64,
    #[serde(default)]
    pub suhu_output: f64,
    #[serde(default)]
    pub use_count: u32,
    #[serde(default)]
    pub filter_efficiency: f64,
    #[serde(default = "default_level_label")]
    pub water_level: String,
    #[serde(default)]
    pub pump_on: bool,
    #[serde(default)]
    pub alarm_active: bool,
    #[serde(default)]
    pub probe_input_in_water: bool,
    #[serde(default)]
    pub probe_output_in_water: bool,
    #[serde(default)]
    pub low_water: bool,
    #[serde(default)]
    pub tds_high_input: bool,
    #[serde(default)]
    pub tds_high_output: bool,
    /// Device uptime millis, not a wall clock.
    #[serde(default)]
    pub timestamp: u64,
}

impl TelemetryPayload {
    /// Level category, falling back to Medium for unknown labels.
    pub fn level(&self) -> WaterLevel {
        WaterLevel::from_label(&self.water_level).unwrap_or(WaterLevel::Medium)
    }

    /// Project the input-side sensors into a `Reading`.
    pub fn into_reading(self) -> Reading {
        let water_level = self.level();
        Reading {
            timestamp: Local::now(),
            distance_cm: self.jarak_cm,
            tds_ppm: self.tds_input,
            ec_us_cm: self.ec_input,
            temperature_c: self.suhu_input,
            pump_on: self.pump_on,
            alarm_active: self.alarm_active,
            water_level,
        }
    }
}

/// Notice published by the device on the status topic, e.g.
/// `{"status": "SUCCESS", "message": "Pompa diaktifkan"}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusNotice {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_line() {
        let p = LineParser::new();
        let r = p
            .parse("DATA: Jarak:7 | TDS:320 | EC:640.0 | Suhu:27.3 | Pompa:0 | Alarm:0 | Level Air:SEDANG")
            .unwrap();
        assert_eq!(r.distance_cm, 7.0);
        assert_eq!(r.tds_ppm, 320.0);
        assert_eq!(r.ec_us_cm, 640.0);
        assert_eq!(r.temperature_c, 27.3);
        assert!(!r.pump_on);
        assert!(!r.alarm_active);
        assert_eq!(r.water_level, WaterLevel::Medium);
    }

    #[test]
    fn labels_are_case_insensitive() {
        let p = LineParser::new();
        let r = p
            .parse("data: jarak:2 | tds:600 | ec:1200 | suhu:26.0 | pompa:1 | alarm:1 | level air:penuh")
            .unwrap();
        assert!(r.pump_on);
        assert!(r.alarm_active);
        assert_eq!(r.water_level, WaterLevel::Full);
    }

    #[test]
    fn tolerates_noise_between_fields() {
        let p = LineParser::new();
        let r = p
            .parse("log[3] DATA: x Jarak: 12.5 ,, TDS: 210 -- EC: 420.0 Suhu: 24.9 Pompa: 0 Alarm: 0 Level Air: RENDAH trailing")
            .unwrap();
        assert_eq!(r.distance_cm, 12.5);
        assert_eq!(r.water_level, WaterLevel::Low);
    }

    #[test]
    fn missing_field_rejects_whole_line() {
        let p = LineParser::new();
        // No Alarm field.
        assert!(p
            .parse("DATA: Jarak:7 | TDS:320 | EC:640.0 | Suhu:27.3 | Pompa:0 | Level Air:SEDANG")
            .is_none());
        assert!(p.parse("garbage").is_none());
        assert!(p.parse("").is_none());
    }

    #[test]
    fn bad_numeric_rejects_whole_line() {
        let p = LineParser::new();
        // "1.2.3" matches the char class but fails float conversion.
        assert!(p
            .parse("DATA: Jarak:1.2.3 | TDS:320 | EC:640 | Suhu:27 | Pompa:0 | Alarm:0 | Level Air:SEDANG")
            .is_none());
    }

    #[test]
    fn unknown_level_rejects_whole_line() {
        let p = LineParser::new();
        assert!(p
            .parse("DATA: Jarak:7 | TDS:320 | EC:640 | Suhu:27 | Pompa:0 | Alarm:0 | Level Air:BANJIR")
            .is_none());
    }

    #[test]
    fn payload_defaults_missing_fields() {
        let payload: TelemetryPayload =
            serde_json::from_str(r#"{"tds_input": 180.0, "ec_input": 360.0}"#).unwrap();
        assert_eq!(payload.use_count, 0);
        assert_eq!(payload.jarak_cm, 0.0);
        assert!(!payload.pump_on);
        assert_eq!(payload.level(), WaterLevel::Medium);
        let r = payload.into_reading();
        assert_eq!(r.tds_ppm, 180.0);
        assert_eq!(r.ec_us_cm, 360.0);
    }

    #[test]
    fn payload_unknown_level_falls_back_to_medium() {
        let payload: TelemetryPayload =
            serde_json::from_str(r#"{"water_level": "OVERFLOW"}"#).unwrap();
        assert_eq!(payload.level(), WaterLevel::Medium);
    }

    #[test]
    fn payload_full_document() {
        let payload: TelemetryPayload = serde_json::from_str(
            r#"{
                "jarak_cm": 4.0, "tds_input": 250.0, "tds_output": 90.0,
                "ec_input": 500.0, "ec_output": 180.0,
                "suhu_input": 26.5, "suhu_output": 26.1,
                "use_count": 12, "filter_efficiency": 64.0,
                "water_level": "PENUH", "pump_on": true, "alarm_active": false,
                "timestamp": 123456
            }"#,
        )
        .unwrap();
        assert_eq!(payload.use_count, 12);
        assert_eq!(payload.level(), WaterLevel::Full);
        let r = payload.into_reading();
        assert!(r.pump_on);
        assert_eq!(r.distance_cm, 4.0);
    }
}
