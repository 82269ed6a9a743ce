use clap::Parser;
use std::path::PathBuf;
use waterwatch::feed::sim::Simulator;
use waterwatch::feed::{Feed, FeedError, FeedEvent, RawRecord};
use waterwatch::feed::{mqtt::MqttSource, serial::SerialSource};
use waterwatch::telemetry::{History, LineParser, StatusNotice, TelemetryPayload, UsageHistory};
use waterwatch::{Command, Settings};

#[derive(Parser, Debug, Clone)]
pub struct SourceOpts {
    /// Run against the built-in simulator instead of hardware
    #[arg(long = "sim", help = "Use the built-in simulated device")]
    pub sim: bool,

    /// Serial device path (e.g. /dev/ttyUSB0, COM3)
    #[arg(short = 'p', long = "port", help = "Serial device path")]
    pub port: Option<String>,

    /// Subscribe to the device over MQTT instead of serial
    #[arg(long = "mqtt", help = "Use the MQTT bridge")]
    pub mqtt: bool,

    #[arg(short = 'b', long = "baud", help = "Serial baud rate override")]
    pub baud: Option<u32>,

    /// YAML settings file; missing flag means built-in defaults
    #[arg(short = 'c', long = "config", help = "Settings file path")]
    pub config: Option<PathBuf>,
}

impl SourceOpts {
    pub fn settings(&self) -> Result<Settings, waterwatch::settings::SettingsError> {
        let mut settings = Settings::load_or_default(self.config.as_deref())?;
        if let Some(port) = &self.port {
            settings.serial.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            settings.serial.baud = baud;
        }
        Ok(settings)
    }

    /// Spawn the feed this invocation asked for. Serial when a port is
    /// known, MQTT with --mqtt, simulator with --sim or when nothing
    /// else is configured.
    pub fn spawn_feed(&self, settings: &Settings) -> Result<Feed, FeedError> {
        if self.mqtt {
            return Ok(Feed::spawn_with_channel_size(
                MqttSource::connect(&settings.mqtt),
                settings.channel_size,
            ));
        }
        if !self.sim {
            if let Some(path) = &settings.serial.port {
                let source = SerialSource::open(path, settings.serial.baud)?;
                return Ok(Feed::spawn_with_channel_size(source, settings.channel_size));
            }
        }
        Ok(Feed::spawn_with_channel_size(
            Simulator::new(settings.sim_interval()),
            settings.channel_size,
        ))
    }
}

/// Install the diagnostic subscriber for a tool process. `RUST_LOG`
/// overrides the default level.
pub fn init_logging(default: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Consumer half of the pipeline: owns the feed plus all parse,
/// reconcile, and history state. Every tool drains it on its own tick;
/// nothing here blocks longer than the channel drain itself.
pub struct Session {
    feed: Feed,
    parser: LineParser,
    settings: Settings,
    pub history: History,
    pub usage: UsageHistory,
    pub last_status: Option<StatusNotice>,
    /// Most recent full structured payload, for the fields a `Reading`
    /// does not carry (filter efficiency, probe and system flags).
    pub last_payload: Option<TelemetryPayload>,
    pub readings_total: u64,
    pub parse_drops: u64,
    /// Most recent feed error; cleared again once readings resume.
    pub last_error: Option<String>,
    pub ended: bool,
}

impl Session {
    pub fn start(opts: &SourceOpts) -> Result<Session, Box<dyn std::error::Error>> {
        let settings = opts.settings()?;
        let feed = opts.spawn_feed(&settings)?;
        Ok(Session::with_feed(feed, settings))
    }

    pub fn with_feed(feed: Feed, settings: Settings) -> Session {
        Session {
            feed,
            parser: LineParser::new(),
            history: History::new(settings.history_capacity),
            usage: UsageHistory::new(settings.usage_capacity),
            settings,
            last_status: None,
            last_payload: None,
            readings_total: 0,
            parse_drops: 0,
            last_error: None,
            ended: false,
        }
    }

    pub fn describe(&self) -> &str {
        self.feed.describe()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Drain everything currently queued. Returns how many new
    /// readings landed in history.
    pub fn drain(&mut self) -> usize {
        let mut appended = 0;
        while let Ok(event) = self.feed.events().try_recv() {
            match event {
                FeedEvent::Record(RawRecord::Line(line)) => {
                    match self.parser.parse(&line) {
                        Some(reading) => {
                            let reading = reading.reconciled(self.settings.conversion_factor);
                            self.history.append(&reading);
                            self.readings_total += 1;
                            self.last_error = None;
                            appended += 1;
                        }
                        None => {
                            self.parse_drops += 1;
                            tracing::debug!(%line, "unparseable line dropped");
                        }
                    }
                }
                FeedEvent::Record(RawRecord::Payload(payload)) => {
                    self.usage.append(payload.use_count);
                    let reading = payload
                        .clone()
                        .into_reading()
                        .reconciled(self.settings.conversion_factor);
                    self.last_payload = Some(payload);
                    self.history.append(&reading);
                    self.readings_total += 1;
                    self.last_error = None;
                    appended += 1;
                }
                FeedEvent::Record(RawRecord::Status(notice)) => {
                    tracing::info!(status = %notice.status, message = %notice.message, "device status");
                    self.last_status = Some(notice);
                }
                FeedEvent::Error(e) => {
                    if e.is_fatal() {
                        self.ended = true;
                    }
                    self.last_error = Some(e.to_string());
                    tracing::warn!(error = %e, "feed error");
                }
            }
        }
        if !self.feed.is_alive() {
            self.ended = true;
        }
        appended
    }

    pub fn send(&mut self, cmd: Command) {
        self.feed.send(cmd);
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.usage.clear();
        self.last_payload = None;
    }

    pub fn stop(self) {
        self.feed.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use waterwatch::feed::Source;

    struct Scripted {
        queue: Vec<Result<RawRecord, FeedError>>,
    }

    impl Source for Scripted {
        fn poll(&mut self) -> Result<Option<RawRecord>, FeedError> {
            if self.queue.is_empty() {
                std::thread::sleep(Duration::from_millis(1));
                Ok(None)
            } else {
                self.queue.remove(0).map(Some)
            }
        }

        fn send(&mut self, _cmd: &Command) -> Result<(), FeedError> {
            Ok(())
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn payload() -> TelemetryPayload {
        TelemetryPayload {
            jarak_cm: 5.0,
            tds_input: 200.0,
            tds_output: 80.0,
            ec_input: 400.0,
            ec_output: 150.0,
            suhu_input: 26.0,
            suhu_output: 25.5,
            use_count: 9,
            filter_efficiency: 60.0,
            water_level: "SEDANG".to_string(),
            pump_on: true,
            alarm_active: false,
            probe_input_in_water: true,
            probe_output_in_water: true,
            low_water: false,
            tds_high_input: false,
            tds_high_output: false,
            timestamp: 1000,
        }
    }

    fn drain_until_one_reading(session: &mut Session) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while session.readings_total < 1 && Instant::now() < deadline {
            session.drain();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(session.readings_total, 1);
    }

    #[test]
    fn payload_extras_are_kept_for_display() {
        let feed = Feed::spawn(Scripted {
            queue: vec![Ok(RawRecord::Payload(payload()))],
        });
        let mut session = Session::with_feed(feed, Settings::default());
        drain_until_one_reading(&mut session);
        let p = session.last_payload.as_ref().unwrap();
        assert_eq!(p.filter_efficiency, 60.0);
        assert!(p.probe_input_in_water);
        assert!(!p.low_water);
        assert_eq!(session.usage.current(), Some(9));
        assert_eq!(session.history.len(), 1);
        session.clear();
        assert!(session.last_payload.is_none());
        session.stop();
    }

    #[test]
    fn transient_error_clears_once_readings_resume() {
        let feed = Feed::spawn(Scripted {
            queue: vec![
                Err(FeedError::Mqtt("connection reset".to_string())),
                Ok(RawRecord::Payload(payload())),
            ],
        });
        let mut session = Session::with_feed(feed, Settings::default());
        drain_until_one_reading(&mut session);
        assert!(session.last_error.is_none());
        assert!(!session.ended);
        session.stop();
    }
}
