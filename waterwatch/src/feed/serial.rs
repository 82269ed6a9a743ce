//! Serial-attached device
//!
//! Reads newline-terminated telemetry from a USB serial port and
//! writes operator command tokens back. Reads use a short timeout so
//! the feed loop stays responsive; a timeout with no bytes simply
//! means nothing arrived this tick.

use super::{FeedError, RawRecord, Source};
use crate::command::Command;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_millis(250);

pub struct SerialSource {
    port: Box<dyn serialport::SerialPort>,
    path: String,
    buf: Vec<u8>,
    pending: VecDeque<String>,
}

impl SerialSource {
    pub fn open(path: &str, baud: u32) -> Result<SerialSource, FeedError> {
        let port = serialport::new(path, baud)
            .timeout(READ_TIMEOUT)
            .open()?;
        tracing::info!(path, baud, "serial port open");
        Ok(SerialSource {
            port,
            path: path.to_string(),
            buf: Vec::new(),
            pending: VecDeque::new(),
        })
    }

}

/// Split complete newline-terminated lines out of `buf`, leaving any
/// partial tail in place. Blank lines are dropped.
fn split_lines(buf: &mut Vec<u8>, pending: &mut VecDeque<String>) {
    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buf.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if !line.is_empty() {
            pending.push_back(line);
        }
    }
}

impl Source for SerialSource {
    fn poll(&mut self) -> Result<Option<RawRecord>, FeedError> {
        if let Some(line) = self.pending.pop_front() {
            return Ok(Some(RawRecord::Line(line)));
        }
        let mut chunk = [0u8; 512];
        match self.port.read(&mut chunk) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                split_lines(&mut self.buf, &mut self.pending);
                Ok(self.pending.pop_front().map(RawRecord::Line))
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn send(&mut self, cmd: &Command) -> Result<(), FeedError> {
        let token = cmd.serial_token();
        self.port.write_all(token.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        tracing::debug!(token, "serial command written");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("serial {}", self.path)
    }
}
