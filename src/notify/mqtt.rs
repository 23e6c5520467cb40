//! MQTT alert publishing.
//!
//! Each alert opens a fresh client, publishes one JSON payload with QoS 1,
//! waits for the broker's PUBACK, and disconnects.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, Event, MqttOptions};
use rumqttc::Transport;
use serde::Serialize;
use std::time::{Duration, Instant, UNIX_EPOCH};

use super::NotificationSink;
use crate::alert::AlertEvent;
use crate::config::MqttSettings;

const ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MqttEndpoint {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) use_tls: bool,
}

/// Alert payload published to the broker.
#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    label: &'a str,
    confidence: f32,
    source: String,
    frame_index: u64,
    /// Frame capture time, seconds since the Unix epoch.
    timestamp: u64,
}

pub struct MqttSink {
    settings: MqttSettings,
    endpoint: MqttEndpoint,
}

impl MqttSink {
    pub fn new(settings: MqttSettings) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&settings.broker)?;
        if settings.topic.trim().is_empty() {
            return Err(anyhow!("MQTT topic must not be empty"));
        }
        Ok(Self { settings, endpoint })
    }

    fn publish(&self, payload: Vec<u8>) -> Result<()> {
        let mut options = MqttOptions::new(
            &self.settings.client_id,
            &self.endpoint.host,
            self.endpoint.port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_start(true);
        if let Some(user) = &self.settings.username {
            let password = self
                .settings
                .password
                .as_ref()
                .map(|password| password.as_str())
                .unwrap_or_default();
            options.set_credentials(user, password);
        }
        options.set_transport(if self.endpoint.use_tls {
            Transport::tls_with_default_config()
        } else {
            Transport::tcp()
        });

        let (client, mut connection) = Client::new(options, 10);
        client
            .publish(&self.settings.topic, QoS::AtLeastOnce, false, payload)
            .context("queue MQTT publish")?;

        let deadline = Instant::now() + ACK_TIMEOUT;
        let acked = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break false;
            }
            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::PubAck(_)))) => break true,
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    return Err(anyhow::Error::new(err).context(format!(
                        "MQTT connection to {}:{} failed",
                        self.endpoint.host, self.endpoint.port
                    )))
                }
                Err(_) => break false,
            }
        };

        if let Err(err) = client.disconnect() {
            log::debug!("MQTT disconnect failed: {}", err);
        }
        if !acked {
            return Err(anyhow!(
                "MQTT broker {}:{} did not acknowledge within {:?}",
                self.endpoint.host,
                self.endpoint.port,
                ACK_TIMEOUT
            ));
        }
        Ok(())
    }
}

impl NotificationSink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn notify(&mut self, event: &AlertEvent) -> Result<()> {
        let payload = serde_json::to_vec(&alert_payload(event))?;
        self.publish(payload)
    }
}

fn alert_payload(event: &AlertEvent) -> AlertPayload<'_> {
    AlertPayload {
        label: &event.label,
        confidence: event.confidence,
        source: event.source.to_string(),
        frame_index: event.frame_index,
        timestamp: event
            .frame_timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    }
}

pub(crate) fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}
