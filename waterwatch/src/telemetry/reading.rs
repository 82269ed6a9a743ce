use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Tank level category reported by the device.
///
/// The firmware emits localized labels (RENDAH/SEDANG/PENUH); those are
/// a wire detail, not display text, so they are mapped to an enum at
/// the parse boundary and rendered back only when talking to the
/// device's formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaterLevel {
    Low,
    Medium,
    Full,
}

impl WaterLevel {
    /// Parse a device label. Case-insensitive; unknown labels are None.
    pub fn from_label(label: &str) -> Option<WaterLevel> {
        match label.trim().to_ascii_uppercase().as_str() {
            "RENDAH" => Some(WaterLevel::Low),
            "SEDANG" => Some(WaterLevel::Medium),
            "PENUH" => Some(WaterLevel::Full),
            _ => None,
        }
    }

    /// The label the device uses for this level.
    pub fn label(&self) -> &'static str {
        match self {
            WaterLevel::Low => "RENDAH",
            WaterLevel::Medium => "SEDANG",
            WaterLevel::Full => "PENUH",
        }
    }
}

impl std::fmt::Display for WaterLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One normalized telemetry sample.
///
/// A `Reading` only comes out of a successful parse: every field was
/// present and converted, or the whole record was rejected. The
/// timestamp is the local receipt time, not a device clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Local>,
    pub distance_cm: f64,
    pub tds_ppm: f64,
    pub ec_us_cm: f64,
    pub temperature_c: f64,
    pub pump_on: bool,
    pub alarm_active: bool,
    pub water_level: WaterLevel,
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} jarak:{:.1}cm tds:{:.1}ppm ec:{:.1}uS/cm suhu:{:.1}C pompa:{} alarm:{} level:{}",
            self.timestamp.format("%H:%M:%S"),
            self.distance_cm,
            self.tds_ppm,
            self.ec_us_cm,
            self.temperature_c,
            if self.pump_on { "ON" } else { "OFF" },
            if self.alarm_active { "YES" } else { "NO" },
            self.water_level,
        )
    }
}
