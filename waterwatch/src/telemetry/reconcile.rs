use super::reading::Reading;
use serde::{Deserialize, Serialize};

/// Blend the sensor-reported TDS with the TDS implied by the EC
/// reading under conversion factor `k`.
///
/// EC is ground truth and is never altered; the displayed TDS is the
/// arithmetic mean of the reported value and `ec * k`. Pure and
/// deterministic in `(tds, ec, k)`. Not idempotent against its own
/// output: always reconcile from the untouched raw reading.
pub fn reconcile_tds(tds_ppm: f64, ec_us_cm: f64, k: f64) -> f64 {
    (tds_ppm + ec_us_cm * k) / 2.0
}

impl Reading {
    /// A copy of this reading with the displayed TDS reconciled under
    /// `k`. The receiver stays raw so it can be re-reconciled later
    /// with a different factor.
    pub fn reconciled(&self, k: ConversionFactor) -> Reading {
        Reading {
            tds_ppm: reconcile_tds(self.tds_ppm, self.ec_us_cm, k.get()),
            ..self.clone()
        }
    }
}

/// User-editable TDS↔EC conversion factor.
///
/// Operator input is untrusted: a value that does not parse, or is not
/// a positive finite number, keeps the last-known-good factor instead
/// of aborting. Deserialization goes through the same validation, so a
/// settings file cannot smuggle in a non-positive or non-finite k.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ConversionFactor(f64);

pub const DEFAULT_EC_K: f64 = 0.5;

impl ConversionFactor {
    /// Accepts only positive finite factors.
    pub fn new(k: f64) -> Option<ConversionFactor> {
        if k.is_finite() && k > 0.0 {
            Some(ConversionFactor(k))
        } else {
            None
        }
    }

    pub fn get(&self) -> f64 {
        self.0
    }

    /// Parse operator input, falling back to `self` when invalid.
    pub fn updated(self, input: &str) -> ConversionFactor {
        match input.trim().parse::<f64>().ok().and_then(ConversionFactor::new) {
            Some(k) => k,
            None => {
                tracing::warn!(input, "invalid conversion factor, keeping {}", self.0);
                self
            }
        }
    }
}

impl TryFrom<f64> for ConversionFactor {
    type Error = String;

    fn try_from(k: f64) -> Result<Self, Self::Error> {
        ConversionFactor::new(k)
            .ok_or_else(|| format!("conversion factor must be positive and finite, got {}", k))
    }
}

impl From<ConversionFactor> for f64 {
    fn from(k: ConversionFactor) -> f64 {
        k.0
    }
}

impl Default for ConversionFactor {
    fn default() -> Self {
        ConversionFactor(DEFAULT_EC_K)
    }
}

impl std::fmt::Display for ConversionFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::WaterLevel;
    use chrono::Local;

    #[test]
    fn blend_is_mean_of_reported_and_derived() {
        // With the default factor the canonical example is a fixed
        // point: (320 + 640*0.5)/2 == 320.
        assert_eq!(reconcile_tds(320.0, 640.0, 0.5), 320.0);
        assert_eq!(reconcile_tds(300.0, 640.0, 0.5), 310.0);
        assert_eq!(reconcile_tds(0.0, 1000.0, 0.7), 350.0);
    }

    #[test]
    fn blend_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(reconcile_tds(123.4, 567.8, 0.42), reconcile_tds(123.4, 567.8, 0.42));
        }
    }

    #[test]
    fn reconciled_leaves_raw_reading_untouched() {
        let raw = Reading {
            timestamp: Local::now(),
            distance_cm: 7.0,
            tds_ppm: 300.0,
            ec_us_cm: 640.0,
            temperature_c: 27.0,
            pump_on: false,
            alarm_active: false,
            water_level: WaterLevel::Medium,
        };
        let k = ConversionFactor::default();
        let shown = raw.reconciled(k);
        assert_eq!(shown.tds_ppm, 310.0);
        assert_eq!(shown.ec_us_cm, 640.0);
        assert_eq!(raw.tds_ppm, 300.0);
        // Re-running from the raw reading gives the same answer.
        assert_eq!(raw.reconciled(k), shown);
    }

    #[test]
    fn deserialization_rejects_invalid_factors() {
        assert!(serde_yaml::from_str::<ConversionFactor>("-2.0").is_err());
        assert!(serde_yaml::from_str::<ConversionFactor>("0").is_err());
        assert!(serde_yaml::from_str::<ConversionFactor>(".nan").is_err());
        assert!(serde_yaml::from_str::<ConversionFactor>(".inf").is_err());
        let k: ConversionFactor = serde_yaml::from_str("0.7").unwrap();
        assert_eq!(k.get(), 0.7);
    }

    #[test]
    fn factor_update_keeps_last_known_good() {
        let k = ConversionFactor::default();
        assert_eq!(k.updated("0.7").get(), 0.7);
        assert_eq!(k.updated("nonsense"), k);
        assert_eq!(k.updated("-1"), k);
        assert_eq!(k.updated("0"), k);
        assert_eq!(k.updated(""), k);
    }
}
