//! SMTP report delivery
//!
//! This module sends the report as a plain text email to every configured
//! recipient through an authenticated STARTTLS relay.

use super::{Notifier, NotifyError};
use crate::settings::EmailSettings;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::{info, warn};
use std::time::Duration;

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| NotifyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Notifier sending the report by email
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    recipients: Vec<Mailbox>,
    subject: String,
    intro: String,
}

impl SmtpNotifier {
    /// Creates a notifier from the email settings
    ///
    /// All addresses are parsed up front, so a typo in the settings is
    /// reported at startup rather than after a whole scan.
    pub fn new(settings: &EmailSettings, timeout: Duration) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&settings.username)?;
        let recipients = settings
            .recipients
            .iter()
            .map(|r| parse_mailbox(r))
            .collect::<Result<Vec<_>, _>>()?;

        let transport = SmtpTransport::starttls_relay(&settings.smtp_host)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .port(settings.smtp_port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(timeout))
            .build();

        Ok(Self {
            transport,
            from,
            recipients,
            subject: settings.subject.clone(),
            intro: settings.intro.clone(),
        })
    }

    fn compose(&self, to: &Mailbox, report: &str) -> Result<Message, NotifyError> {
        let body = format!("{}\r\n\r\n{}", self.intro, report);

        Message::builder()
            .from(self.from.clone())
            .to(to.clone())
            .subject(self.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| NotifyError::Message(e.to_string()))
    }
}

impl Notifier for SmtpNotifier {
    fn send(&self, report: &str) -> Result<(), NotifyError> {
        let mut failed = 0;
        let mut last_reason = String::new();

        for to in &self.recipients {
            let result = self
                .compose(to, report)
                .and_then(|message| {
                    self.transport
                        .send(&message)
                        .map_err(|e| NotifyError::Transport(e.to_string()))
                });

            match result {
                Ok(_) => info!("Report sent to {}", to),
                Err(error) => {
                    warn!("Couldn't send report to {}: {}", to, error);
                    failed += 1;
                    last_reason = error.to_string();
                }
            }
        }

        if failed > 0 {
            return Err(NotifyError::Delivery {
                failed,
                total: self.recipients.len(),
                reason: last_reason,
            });
        }

        Ok(())
    }
}
