use super::history::History;
use std::io::Write;
use std::path::Path;

/// Fixed CSV header for history dumps. Column names are part of the
/// external contract; downstream tooling keys on them.
pub const CSV_HEADER: [&str; 8] = [
    "time",
    "tds_ppm",
    "ec_uS_cm",
    "suhu_C",
    "jarak_cm",
    "pompa",
    "alarm",
    "level",
];

/// Dump the buffered history as CSV. One row per buffered index, in
/// arrival order; the buffer itself is not mutated.
pub fn write_csv<W: Write>(history: &History, out: W) -> csv::Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(CSV_HEADER)?;
    for row in history.rows() {
        w.write_record([
            row.time.as_str(),
            &format!("{:.1}", row.tds_ppm),
            &format!("{:.1}", row.ec_us_cm),
            &format!("{:.1}", row.temperature_c),
            &format!("{:.1}", row.distance_cm),
            if row.pump_on { "1" } else { "0" },
            if row.alarm_active { "1" } else { "0" },
            row.water_level.label(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_csv_path<P: AsRef<Path>>(history: &History, path: P) -> csv::Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(history, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Reading, WaterLevel};
    use chrono::Local;

    fn reading(tds: f64, pump: bool) -> Reading {
        Reading {
            timestamp: Local::now(),
            distance_cm: 7.0,
            tds_ppm: tds,
            ec_us_cm: tds * 2.0,
            temperature_c: 27.3,
            pump_on: pump,
            alarm_active: false,
            water_level: WaterLevel::Medium,
        }
    }

    #[test]
    fn header_then_one_row_per_buffered_index() {
        let mut history = History::new(3);
        for i in 0..5 {
            history.append(&reading(100.0 + i as f64, i % 2 == 0));
        }
        let mut out = Vec::new();
        write_csv(&history, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        // Capacity is 3: header plus exactly 3 rows, never more.
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "time,tds_ppm,ec_uS_cm,suhu_C,jarak_cm,pompa,alarm,level");
        assert!(lines[1].contains("102.0"));
        assert!(lines[3].contains("104.0"));
        assert!(lines[1].ends_with("1,0,SEDANG"));
    }

    #[test]
    fn empty_history_writes_header_only() {
        let history = History::new(4);
        let mut out = Vec::new();
        write_csv(&history, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
