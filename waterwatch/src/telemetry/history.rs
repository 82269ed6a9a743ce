use super::reading::{Reading, WaterLevel};
use std::collections::VecDeque;

/// Fixed-capacity rolling buffer. Appending at capacity evicts the
/// oldest element; the buffer never grows past `capacity`.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> RingBuffer<T> {
        assert!(capacity > 0, "ring buffer capacity must be nonzero");
        RingBuffer {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, value: T) {
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn back(&self) -> Option<&T> {
        self.data.back()
    }

    /// Current contents in arrival order, without mutating the buffer.
    pub fn snapshot(&self) -> Vec<T> {
        self.data.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}

/// One exported/displayed row of buffered history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub time: String,
    pub tds_ppm: f64,
    pub ec_us_cm: f64,
    pub temperature_c: f64,
    pub distance_cm: f64,
    pub pump_on: bool,
    pub alarm_active: bool,
    pub water_level: WaterLevel,
}

/// Index-aligned per-metric history of recent readings.
///
/// Every buffer is appended from the same `Reading`, so the Nth element
/// of each series belongs to the same ingestion event and an exported
/// row is internally consistent. `clear` empties all series together
/// along with the last-reading display state; nothing clears them
/// implicitly.
pub struct History {
    times: RingBuffer<String>,
    tds: RingBuffer<f64>,
    ec: RingBuffer<f64>,
    temperature: RingBuffer<f64>,
    distance: RingBuffer<f64>,
    pump: RingBuffer<bool>,
    alarm: RingBuffer<bool>,
    level: RingBuffer<WaterLevel>,
    last: Option<Reading>,
}

/// Default number of live telemetry samples kept for display/export.
pub const DEFAULT_CAPACITY: usize = 300;

impl History {
    pub fn new(capacity: usize) -> History {
        History {
            times: RingBuffer::new(capacity),
            tds: RingBuffer::new(capacity),
            ec: RingBuffer::new(capacity),
            temperature: RingBuffer::new(capacity),
            distance: RingBuffer::new(capacity),
            pump: RingBuffer::new(capacity),
            alarm: RingBuffer::new(capacity),
            level: RingBuffer::new(capacity),
            last: None,
        }
    }

    /// Append one (already reconciled) reading to every series.
    pub fn append(&mut self, reading: &Reading) {
        self.times
            .append(reading.timestamp.format("%H:%M:%S").to_string());
        self.tds.append(reading.tds_ppm);
        self.ec.append(reading.ec_us_cm);
        self.temperature.append(reading.temperature_c);
        self.distance.append(reading.distance_cm);
        self.pump.append(reading.pump_on);
        self.alarm.append(reading.alarm_active);
        self.level.append(reading.water_level);
        self.last = Some(reading.clone());
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.times.capacity()
    }

    /// Most recent reading, for the numeric display panel.
    pub fn last(&self) -> Option<&Reading> {
        self.last.as_ref()
    }

    /// Chart series accessors. All are index aligned with each other.
    pub fn tds_series(&self) -> Vec<f64> {
        self.tds.snapshot()
    }

    pub fn ec_series(&self) -> Vec<f64> {
        self.ec.snapshot()
    }

    pub fn temperature_series(&self) -> Vec<f64> {
        self.temperature.snapshot()
    }

    /// Empty all series and the display state together.
    pub fn clear(&mut self) {
        self.times.clear();
        self.tds.clear();
        self.ec.clear();
        self.temperature.clear();
        self.distance.clear();
        self.pump.clear();
        self.alarm.clear();
        self.level.clear();
        self.last = None;
    }

    /// Ordered rows for export. Never yields more rows than are
    /// currently buffered.
    pub fn rows(&self) -> Vec<HistoryRow> {
        self.times
            .iter()
            .zip(self.tds.iter())
            .zip(self.ec.iter())
            .zip(self.temperature.iter())
            .zip(self.distance.iter())
            .zip(self.pump.iter())
            .zip(self.alarm.iter())
            .zip(self.level.iter())
            .map(
                |(((((((time, tds), ec), temp), dist), pump), alarm), level)| HistoryRow {
                    time: time.clone(),
                    tds_ppm: *tds,
                    ec_us_cm: *ec,
                    temperature_c: *temp,
                    distance_cm: *dist,
                    pump_on: *pump,
                    alarm_active: *alarm,
                    water_level: *level,
                },
            )
            .collect()
    }
}

impl Default for History {
    fn default() -> Self {
        History::new(DEFAULT_CAPACITY)
    }
}

/// Filter usage-count trend, kept separately from the live telemetry
/// series: it is fed only by the structured payload channel and has a
/// much shorter window.
pub struct UsageHistory {
    counts: RingBuffer<u32>,
}

/// Default number of usage-trend samples.
pub const DEFAULT_USAGE_CAPACITY: usize = 20;

impl UsageHistory {
    pub fn new(capacity: usize) -> UsageHistory {
        UsageHistory {
            counts: RingBuffer::new(capacity),
        }
    }

    pub fn append(&mut self, use_count: u32) {
        self.counts.append(use_count);
    }

    pub fn current(&self) -> Option<u32> {
        self.counts.back().copied()
    }

    pub fn snapshot(&self) -> Vec<u32> {
        self.counts.snapshot()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }
}

impl Default for UsageHistory {
    fn default() -> Self {
        UsageHistory::new(DEFAULT_USAGE_CAPACITY)
    }
}
