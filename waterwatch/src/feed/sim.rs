//! Simulated device
//!
//! Emits serial-grammar lines on a fixed interval with no hardware
//! attached, so the rest of the pipeline can be exercised end to end.
//! The generated values obey the same coupling rules as the firmware:
//! alarm tracks high TDS or a nearly full tank, the reported water
//! level is derived from the distance reading, and pump state follows
//! the last operator command when one has been given.

use super::{FeedError, RawRecord, Source};
use crate::command::Command;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

/// TDS above this trips the alarm.
const TDS_ALARM_PPM: f64 = 550.0;
/// Distance at or below this means the tank is full (and alarms).
const DISTANCE_FULL_CM: u32 = 2;
/// Distance at or above this means the level is low.
const DISTANCE_LOW_CM: u32 = 10;

pub struct Simulator {
    rng: StdRng,
    interval: Duration,
    next_emit: Instant,
    /// Pump override from the operator; None means the simulated
    /// device toggles it on its own.
    pump_cmd: Option<bool>,
    pump_on: bool,
}

impl Simulator {
    pub fn new(interval: Duration) -> Simulator {
        Simulator::with_rng(interval, StdRng::from_entropy())
    }

    /// Deterministic variant for tests.
    pub fn with_rng(interval: Duration, rng: StdRng) -> Simulator {
        Simulator {
            rng,
            interval,
            next_emit: Instant::now(),
            pump_cmd: None,
            pump_on: false,
        }
    }

    /// Produce the next line immediately, without pacing.
    pub fn next_line(&mut self) -> String {
        let jarak: u32 = self.rng.gen_range(1..=40);
        let tds = 200.0 + self.rng.gen_range(-25.0..25.0);
        let ec = tds * 2.0;
        let suhu = 25.0 + self.rng.gen_range(-2.0..2.0);

        self.pump_on = match self.pump_cmd {
            Some(forced) => forced,
            // Firmware only runs the pump with enough headroom in the
            // tank.
            None => jarak >= 20 && self.rng.gen_bool(0.5),
        };
        let alarm = tds > TDS_ALARM_PPM || jarak <= DISTANCE_FULL_CM;
        let level = if jarak <= DISTANCE_FULL_CM {
            "PENUH"
        } else if jarak >= DISTANCE_LOW_CM {
            "RENDAH"
        } else {
            "SEDANG"
        };

        format!(
            "DATA: Jarak: {} | TDS: {:.1} | EC: {:.1} | Suhu: {:.1} | Pompa: {} | Alarm: {} | Level Air: {}",
            jarak,
            tds,
            ec,
            suhu,
            self.pump_on as u8,
            alarm as u8,
            level
        )
    }
}

impl Source for Simulator {
    fn poll(&mut self) -> Result<Option<RawRecord>, FeedError> {
        let now = Instant::now();
        if now < self.next_emit {
            std::thread::sleep(self.next_emit - now);
        }
        self.next_emit = Instant::now() + self.interval;
        Ok(Some(RawRecord::Line(self.next_line())))
    }

    fn send(&mut self, cmd: &Command) -> Result<(), FeedError> {
        match cmd.serial_token() {
            "1" => self.pump_cmd = Some(true),
            "stop" => self.pump_cmd = Some(false),
            other => tracing::debug!(token = other, "simulator ignoring command"),
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("simulator ({}ms)", self.interval.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{LineParser, WaterLevel};

    fn sim(seed: u64) -> Simulator {
        Simulator::with_rng(Duration::from_millis(1), StdRng::seed_from_u64(seed))
    }

    #[test]
    fn lines_parse_and_obey_coupling_rules() {
        let parser = LineParser::new();
        let mut s = sim(42);
        for _ in 0..200 {
            let line = s.next_line();
            let r = parser.parse(&line).expect("simulator line must parse");
            assert!((1.0..=40.0).contains(&r.distance_cm));
            assert_eq!(
                r.alarm_active,
                r.tds_ppm > TDS_ALARM_PPM || r.distance_cm <= DISTANCE_FULL_CM as f64
            );
            let expected = if r.distance_cm <= DISTANCE_FULL_CM as f64 {
                WaterLevel::Full
            } else if r.distance_cm >= DISTANCE_LOW_CM as f64 {
                WaterLevel::Low
            } else {
                WaterLevel::Medium
            };
            assert_eq!(r.water_level, expected);
        }
    }

    #[test]
    fn command_overrides_pump_state() {
        let parser = LineParser::new();
        let mut s = sim(7);
        s.send(&Command::StartPump).unwrap();
        for _ in 0..20 {
            let r = parser.parse(&s.next_line()).unwrap();
            assert!(r.pump_on);
        }
        s.send(&Command::StopPump).unwrap();
        for _ in 0..20 {
            let r = parser.parse(&s.next_line()).unwrap();
            assert!(!r.pump_on);
        }
    }

    #[test]
    fn unrelated_commands_leave_override_alone() {
        let mut s = sim(3);
        s.send(&Command::StartPump).unwrap();
        s.send(&Command::AlarmOff).unwrap();
        assert_eq!(s.pump_cmd, Some(true));
    }
}
