//! Alert delivery.
//!
//! Each transport implements `NotificationSink`. The `AlertDispatcher` fans an
//! alert out to every configured sink in order; a failing sink is logged and
//! counted as a `PipelineError::NotificationFailure` and never stops delivery
//! to the remaining sinks or the frame loop.

#[cfg(feature = "notify-email")]
pub mod email;
pub mod mqtt;
pub mod sound;

#[cfg(feature = "notify-email")]
pub use email::EmailSink;
pub use mqtt::MqttSink;
pub use sound::AudibleSink;

use anyhow::Result;

use crate::alert::AlertEvent;
use crate::config::NotifySettings;
use crate::error::PipelineError;

/// An outbound alert transport.
pub trait NotificationSink: Send {
    /// Transport identifier used in logs and failure reports.
    fn name(&self) -> &'static str;

    /// Deliver one alert. Connections are acquired inside the call and
    /// released before it returns.
    fn notify(&mut self, event: &AlertEvent) -> Result<()>;
}

/// Logs every alert at warn level.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&mut self, event: &AlertEvent) -> Result<()> {
        log::warn!(
            "ALERT: {} detected ({}%) on {} frame {}",
            event.label,
            event.percent(),
            event.source,
            event.frame_index
        );
        Ok(())
    }
}

/// Outcome of dispatching one alert.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failures: Vec<PipelineError>,
}

/// Ordered set of sinks an alert is delivered to.
#[derive(Default)]
pub struct AlertDispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with only the log sink installed.
    pub fn logging() -> Self {
        Self::new().with_sink(Box::new(LogSink))
    }

    /// Log sink plus every transport `settings` enables.
    pub fn from_settings(settings: &NotifySettings) -> Result<Self> {
        let mut dispatcher = Self::logging();
        if let Some(email) = &settings.email {
            dispatcher.push(email_sink(email)?);
        }
        if let Some(sound) = &settings.sound {
            dispatcher.push(Box::new(AudibleSink::new(sound.clone())));
        }
        if let Some(mqtt) = &settings.mqtt {
            dispatcher.push(Box::new(MqttSink::new(mqtt.clone())?));
        }
        Ok(dispatcher)
    }

    pub fn with_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.push(sink);
        self
    }

    pub fn push(&mut self, sink: Box<dyn NotificationSink>) {
        log::debug!("alert sink '{}' installed", sink.name());
        self.sinks.push(sink);
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Deliver `event` to every sink. Failures are logged and returned, never
    /// raised.
    pub fn dispatch(&mut self, event: &AlertEvent) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for sink in &mut self.sinks {
            match sink.notify(event) {
                Ok(()) => outcome.delivered += 1,
                Err(err) => {
                    let failure = PipelineError::NotificationFailure {
                        sink: sink.name(),
                        reason: format!("{err:#}"),
                    };
                    log::warn!("{} (alert '{}')", failure, event.label);
                    outcome.failures.push(failure);
                }
            }
        }
        outcome
    }
}

#[cfg(feature = "notify-email")]
fn email_sink(settings: &crate::config::EmailSettings) -> Result<Box<dyn NotificationSink>> {
    Ok(Box::new(EmailSink::new(settings.clone())?))
}

#[cfg(not(feature = "notify-email"))]
fn email_sink(_settings: &crate::config::EmailSettings) -> Result<Box<dyn NotificationSink>> {
    Err(anyhow::anyhow!(
        "email alerts require the notify-email feature"
    ))
}

/// `"{Label} Detected Alert!"` with the label's first letter capitalized.
pub fn alert_subject(label: &str) -> String {
    let mut chars = label.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    format!("{} Detected Alert!", capitalized)
}

/// Plain-text alert body naming the label, source, and confidence.
pub fn alert_body(event: &AlertEvent) -> String {
    format!(
        "A {} has been detected on the {} feed (frame {}) with {}% confidence.",
        event.label,
        event.source,
        event.frame_index,
        event.percent()
    )
}
