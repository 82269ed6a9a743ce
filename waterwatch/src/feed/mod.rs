//! Ingestion feeds
//!
//! A feed runs one background thread around a `Source` strategy
//! (simulator, serial port, MQTT subscription) and bridges it to the
//! consumer over a bounded crossbeam channel of tagged events. The
//! producer side never touches consumer state: all parsing,
//! reconciliation, and history mutation happen on whichever single
//! thread drains the channel.
//!
//! Stopping is cooperative. `Feed::stop` raises a flag that the thread
//! observes at its next polling point; in-flight reads are not
//! cancelled, the loop just does not start another one.

pub mod mqtt;
pub mod serial;
pub mod sim;

use crate::command::Command;
use crate::telemetry::{StatusNotice, TelemetryPayload};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Possible failures inside a feed.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    /// Low level I/O failure on an open transport.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Broker connection failed; the feed keeps retrying until the
    /// attempt budget runs out.
    #[error("mqtt connection error: {0}")]
    Mqtt(String),
    /// A structured payload did not decode. The record is dropped,
    /// the feed keeps running.
    #[error("payload decode error: {0}")]
    Decode(#[from] serde_json::Error),
    /// Bounded reconnect budget exhausted; operator must reconnect.
    #[error("gave up after {0} failed connection attempts")]
    MaxRetries(usize),
}

impl FeedError {
    /// Whether the background loop should end after surfacing this.
    /// Parse/decode drops and transient connection errors are not
    /// fatal; everything else requires an operator-initiated restart.
    pub fn is_fatal(&self) -> bool {
        match self {
            FeedError::Decode(_) | FeedError::Mqtt(_) => false,
            FeedError::Serial(_) | FeedError::Io(_) | FeedError::MaxRetries(_) => true,
        }
    }
}

/// One raw record produced by a source, before any parsing on the
/// consumer side. Structured payloads are decoded exactly once, at the
/// transport boundary.
#[derive(Debug, Clone)]
pub enum RawRecord {
    /// A text line from the serial grammar (or the simulator).
    Line(String),
    /// A decoded telemetry document from the data topic.
    Payload(TelemetryPayload),
    /// A decoded notice from the status topic.
    Status(StatusNotice),
}

/// Tagged message on the feed channel.
#[derive(Debug)]
pub enum FeedEvent {
    Record(RawRecord),
    Error(FeedError),
}

/// A strategy that produces raw records until told to stop.
///
/// `poll` returns at most one record and must come back within roughly
/// a polling interval so the loop can observe stop requests and
/// drain queued commands; blocking reads use their timeout as the
/// polling point. `Ok(None)` means nothing arrived this tick.
pub trait Source: Send {
    fn poll(&mut self) -> Result<Option<RawRecord>, FeedError>;

    /// Write an operator command to the transport. Fire-and-forget.
    fn send(&mut self, cmd: &Command) -> Result<(), FeedError>;

    /// Human-readable description for log lines.
    fn describe(&self) -> String;
}

/// Bounded reconnect policy: a fixed delay between attempts and a hard
/// attempt budget, after which the transport gives up for good.
#[derive(Debug, Clone)]
pub struct Backoff {
    max_attempts: usize,
    delay: Duration,
    failures: usize,
}

impl Backoff {
    pub fn new(max_attempts: usize, delay: Duration) -> Backoff {
        Backoff {
            max_attempts,
            delay,
            failures: 0,
        }
    }

    /// Record a failed attempt. Returns the delay to wait before the
    /// next attempt, or None once the budget is exhausted.
    pub fn failure(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.max_attempts {
            None
        } else {
            Some(self.delay)
        }
    }

    /// Any successful exchange resets the budget.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn attempts(&self) -> usize {
        self.failures
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

/// Default size of the event channel between feed and consumer.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Handle to a running ingestion feed.
///
/// At most one feed is active per pipeline: connecting creates it,
/// disconnecting stops it. Events are drained with `events()` on the
/// consumer's own schedule; commands go the other way through a small
/// bounded queue serviced by the feed thread.
pub struct Feed {
    events: Receiver<FeedEvent>,
    commands: Sender<Command>,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    description: String,
}

impl Feed {
    /// Spawn the background thread for `source`.
    pub fn spawn<S: Source + 'static>(source: S) -> Feed {
        Feed::spawn_with_channel_size(source, DEFAULT_CHANNEL_SIZE)
    }

    pub fn spawn_with_channel_size<S: Source + 'static>(source: S, size: usize) -> Feed {
        let (event_tx, event_rx) = channel::bounded::<FeedEvent>(size);
        let (cmd_tx, cmd_rx) = channel::bounded::<Command>(8);
        let stop = Arc::new(AtomicBool::new(false));
        let description = source.describe();
        let thread_stop = stop.clone();
        let thread = thread::spawn(move || {
            feed_loop(source, event_tx, cmd_rx, thread_stop);
        });
        Feed {
            events: event_rx,
            commands: cmd_tx,
            stop,
            thread: Some(thread),
            description,
        }
    }

    pub fn events(&self) -> &Receiver<FeedEvent> {
        &self.events
    }

    /// Queue a command for the feed thread to write out. Returns false
    /// when the queue is full or the feed has already ended.
    pub fn send(&self, cmd: Command) -> bool {
        match self.commands.try_send(cmd) {
            Ok(()) => true,
            Err(TrySendError::Full(cmd)) | Err(TrySendError::Disconnected(cmd)) => {
                tracing::warn!(%cmd, feed = %self.description, "command not sent");
                false
            }
        }
    }

    /// Whether the background thread is still running.
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    pub fn describe(&self) -> &str {
        &self.description
    }

    /// Request a stop and wait for the thread to observe it.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        // Signal only; a consumer that wants to wait calls stop().
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn feed_loop<S: Source>(
    mut source: S,
    events: Sender<FeedEvent>,
    commands: Receiver<Command>,
    stop: Arc<AtomicBool>,
) {
    let push = |event: FeedEvent| -> bool {
        match events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(ev)) => {
                // Consumer stopped draining; drop like the serial
                // hardware would.
                tracing::debug!(?ev, "feed channel full, dropping event");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    };

    tracing::info!(source = %source.describe(), "feed started");
    'feed: while !stop.load(Ordering::Relaxed) {
        loop {
            match commands.try_recv() {
                Ok(cmd) => {
                    if let Err(e) = source.send(&cmd) {
                        tracing::warn!(%cmd, error = %e, "command send failed");
                        if !push(FeedEvent::Error(e)) {
                            break 'feed;
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'feed,
            }
        }

        match source.poll() {
            Ok(Some(record)) => {
                if !push(FeedEvent::Record(record)) {
                    break 'feed;
                }
            }
            Ok(None) => {}
            Err(e) => {
                let fatal = e.is_fatal();
                if !push(FeedEvent::Error(e)) || fatal {
                    break 'feed;
                }
            }
        }
    }
    tracing::info!(source = %source.describe(), "feed stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_gives_up_after_exactly_max_attempts() {
        let mut backoff = Backoff::new(5, Duration::from_secs(5));
        for _ in 0..4 {
            assert_eq!(backoff.failure(), Some(Duration::from_secs(5)));
        }
        // Fifth failed attempt is terminal, not the first.
        assert_eq!(backoff.failure(), None);
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn backoff_resets_on_success() {
        let mut backoff = Backoff::new(2, Duration::from_millis(1));
        assert!(backoff.failure().is_some());
        backoff.reset();
        assert!(backoff.failure().is_some());
        assert_eq!(backoff.failure(), None);
    }

    struct ScriptedSource {
        records: Vec<RawRecord>,
    }

    impl Source for ScriptedSource {
        fn poll(&mut self) -> Result<Option<RawRecord>, FeedError> {
            if self.records.is_empty() {
                std::thread::sleep(Duration::from_millis(1));
                Ok(None)
            } else {
                Ok(Some(self.records.remove(0)))
            }
        }

        fn send(&mut self, _cmd: &Command) -> Result<(), FeedError> {
            Ok(())
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    #[test]
    fn feed_forwards_records_and_stops_cooperatively() {
        let source = ScriptedSource {
            records: vec![
                RawRecord::Line("one".into()),
                RawRecord::Line("two".into()),
            ],
        };
        let feed = Feed::spawn(source);
        let mut lines = vec![];
        while lines.len() < 2 {
            match feed.events().recv_timeout(Duration::from_secs(1)).unwrap() {
                FeedEvent::Record(RawRecord::Line(l)) => lines.push(l),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(lines, vec!["one", "two"]);
        assert!(feed.send(Command::StartPump));
        feed.stop();
    }

    struct FailingSource;

    impl Source for FailingSource {
        fn poll(&mut self) -> Result<Option<RawRecord>, FeedError> {
            Err(FeedError::MaxRetries(5))
        }

        fn send(&mut self, _cmd: &Command) -> Result<(), FeedError> {
            Ok(())
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    #[test]
    fn fatal_error_surfaces_once_then_ends_feed() {
        let feed = Feed::spawn(FailingSource);
        match feed.events().recv_timeout(Duration::from_secs(1)).unwrap() {
            FeedEvent::Error(FeedError::MaxRetries(5)) => {}
            other => panic!("unexpected event: {:?}", other),
        }
        // Thread ends after the fatal event; no further events arrive.
        assert!(feed
            .events()
            .recv_timeout(Duration::from_millis(100))
            .is_err());
        assert!(!feed.is_alive());
        feed.stop();
    }
}
