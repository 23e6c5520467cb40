//! SMTP email alerts.

use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::{alert_body, alert_subject, NotificationSink};
use crate::alert::AlertEvent;
use crate::config::EmailSettings;

/// Sends one message per alert over a STARTTLS relay. The SMTP connection is
/// opened inside `notify` and dropped when the send completes.
pub struct EmailSink {
    settings: EmailSettings,
    from: Mailbox,
    to: Mailbox,
}

impl EmailSink {
    pub fn new(settings: EmailSettings) -> Result<Self> {
        let from = settings
            .user
            .parse()
            .with_context(|| format!("invalid sender address '{}'", settings.user))?;
        let to = settings
            .recipient
            .parse()
            .with_context(|| format!("invalid alert recipient '{}'", settings.recipient))?;
        Ok(Self { settings, from, to })
    }

    fn message(&self, event: &AlertEvent) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(alert_subject(&event.label))
            .header(ContentType::TEXT_PLAIN)
            .body(alert_body(event))
            .context("build alert email")
    }
}

impl NotificationSink for EmailSink {
    fn name(&self) -> &'static str {
        "email"
    }

    fn notify(&mut self, event: &AlertEvent) -> Result<()> {
        let message = self.message(event)?;
        let credentials = Credentials::new(
            self.settings.user.clone(),
            self.settings.password.as_str().to_string(),
        );
        let mailer = SmtpTransport::starttls_relay(&self.settings.smtp_server)
            .with_context(|| format!("resolve SMTP relay {}", self.settings.smtp_server))?
            .port(self.settings.smtp_port)
            .credentials(credentials)
            .build();
        mailer.send(&message).with_context(|| {
            format!(
                "send alert to {} via {}:{}",
                self.settings.recipient, self.settings.smtp_server, self.settings.smtp_port
            )
        })?;
        log::info!("alert email for '{}' sent to {}", event.label, self.settings.recipient);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SourceKind;
    use std::time::SystemTime;
    use zeroize::Zeroizing;

    fn settings() -> EmailSettings {
        EmailSettings {
            user: "watch@example.com".into(),
            password: Zeroizing::new("app-password".to_string()),
            recipient: "owner@example.com".into(),
            ..EmailSettings::default()
        }
    }

    #[test]
    fn builds_alert_message() -> Result<()> {
        let sink = EmailSink::new(settings())?;
        let event = AlertEvent {
            label: "fire".into(),
            frame_timestamp: SystemTime::now(),
            frame_index: 4,
            source: SourceKind::Video,
            confidence: 0.77,
        };
        let formatted = String::from_utf8(sink.message(&event)?.formatted())?;
        assert!(formatted.contains("Subject: Fire Detected Alert!"));
        assert!(formatted.contains("To: owner@example.com"));
        Ok(())
    }

    #[test]
    fn rejects_malformed_addresses() {
        let bad = EmailSettings {
            recipient: "not an address".into(),
            ..settings()
        };
        assert!(EmailSink::new(bad).is_err());
    }
}
