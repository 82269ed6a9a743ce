//! MQTT-bridged device
//!
//! Subscribes to the device's data and status topics on a public
//! broker and publishes operator commands on the control topic.
//! Payloads are decoded at this boundary so the consumer only ever
//! sees typed records. The broker link is retried with a fixed delay
//! up to a hard attempt budget; once that runs out the feed ends and
//! the operator must reconnect explicitly.

use super::{Backoff, FeedError, RawRecord, Source};
use crate::command::Command;
use crate::settings::MqttSettings;
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, Publish, QoS};
use std::time::Duration;

const POLL_TIMEOUT: Duration = Duration::from_millis(250);

pub struct MqttSource {
    client: Client,
    connection: Connection,
    settings: MqttSettings,
    backoff: Backoff,
}

impl MqttSource {
    pub fn connect(settings: &MqttSettings) -> MqttSource {
        let client_id = format!("waterwatch-{}", std::process::id());
        let mut options = MqttOptions::new(client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
        let (client, connection) = Client::new(options, 16);
        tracing::info!(host = %settings.host, port = settings.port, "mqtt connecting");
        MqttSource {
            client,
            connection,
            settings: settings.clone(),
            backoff: Backoff::new(settings.max_retries, settings.retry_delay()),
        }
    }

    /// The broker does not replay subscriptions across reconnects, so
    /// every ConnAck gets a fresh subscribe.
    fn subscribe(&mut self) -> Result<(), FeedError> {
        self.client
            .subscribe(&self.settings.topic_data, QoS::AtMostOnce)
            .map_err(|e| FeedError::Mqtt(e.to_string()))?;
        self.client
            .subscribe(&self.settings.topic_status, QoS::AtMostOnce)
            .map_err(|e| FeedError::Mqtt(e.to_string()))?;
        tracing::info!(
            data = %self.settings.topic_data,
            status = %self.settings.topic_status,
            "mqtt subscribed"
        );
        Ok(())
    }

    fn decode(&self, publish: &Publish) -> Result<Option<RawRecord>, FeedError> {
        if publish.topic == self.settings.topic_data {
            let payload = serde_json::from_slice(&publish.payload)?;
            Ok(Some(RawRecord::Payload(payload)))
        } else if publish.topic == self.settings.topic_status {
            let notice = serde_json::from_slice(&publish.payload)?;
            Ok(Some(RawRecord::Status(notice)))
        } else {
            tracing::debug!(topic = %publish.topic, "ignoring unexpected topic");
            Ok(None)
        }
    }
}

impl Source for MqttSource {
    fn poll(&mut self) -> Result<Option<RawRecord>, FeedError> {
        match self.connection.recv_timeout(POLL_TIMEOUT) {
            Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                self.backoff.reset();
                self.subscribe()?;
                Ok(None)
            }
            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                self.backoff.reset();
                self.decode(&publish)
            }
            Ok(Ok(_)) => Ok(None),
            Ok(Err(e)) => {
                match self.backoff.failure() {
                    Some(delay) => {
                        tracing::warn!(
                            error = %e,
                            attempt = self.backoff.attempts(),
                            max = self.backoff.max_attempts(),
                            "mqtt connection error, retrying"
                        );
                        std::thread::sleep(delay);
                        Err(FeedError::Mqtt(e.to_string()))
                    }
                    None => Err(FeedError::MaxRetries(self.backoff.max_attempts())),
                }
            }
            // recv_timeout lapsed with the event loop still alive.
            Err(_) => Ok(None),
        }
    }

    fn send(&mut self, cmd: &Command) -> Result<(), FeedError> {
        self.client
            .publish(
                &self.settings.topic_control,
                QoS::AtMostOnce,
                false,
                cmd.control_payload(),
            )
            .map_err(|e| FeedError::Mqtt(e.to_string()))?;
        tracing::debug!(%cmd, topic = %self.settings.topic_control, "command published");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("mqtt {}:{}", self.settings.host, self.settings.port)
    }
}

impl Drop for MqttSource {
    fn drop(&mut self) {
        let _ = self.client.disconnect();
    }
}
