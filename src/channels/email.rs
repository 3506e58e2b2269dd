//! Email channel — SMTP via lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::channels::{
    ChannelAdapter, ChannelKind, CommunicationRequest, DeliveryErrorKind, DeliveryResult,
};
use crate::config::SmtpConfig;

/// Email adapter backed by SMTP.
pub struct EmailAdapter {
    config: SmtpConfig,
}

impl EmailAdapter {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Build and send one email. Blocking SMTP I/O, run on the blocking
    /// pool by `attempt`.
    fn send_email(
        config: &SmtpConfig,
        to: &str,
        subject: &str,
        body: &str,
        message_id: &str,
    ) -> Result<(), DeliveryErrorKind> {
        let from = config.from_address.parse().map_err(|e| {
            tracing::warn!("Invalid from address {}: {e}", config.from_address);
            DeliveryErrorKind::Unknown
        })?;
        let to = to.parse().map_err(|e| {
            tracing::warn!("Invalid recipient address: {e}");
            DeliveryErrorKind::InvalidContact
        })?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .message_id(Some(message_id.to_string()))
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| {
                tracing::warn!("Failed to build email: {e}");
                DeliveryErrorKind::Unknown
            })?;

        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| {
                tracing::warn!("SMTP relay error: {e}");
                DeliveryErrorKind::ProviderRejected
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        transport.send(&email).map_err(|e| {
            tracing::warn!("SMTP send failed: {e}");
            DeliveryErrorKind::ProviderRejected
        })?;

        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn attempt(&self, request: &CommunicationRequest) -> DeliveryResult {
        let Some(subject) = request.subject.as_deref().filter(|s| !s.trim().is_empty()) else {
            tracing::warn!(tenant_id = %request.tenant_id, "Email skipped: no subject");
            return DeliveryResult::failed(ChannelKind::Email, DeliveryErrorKind::MissingSubject);
        };
        let to = request.email.as_deref().unwrap_or_default().to_string();

        let config = self.config.clone();
        let subject = subject.to_string();
        let body = request.message.clone();
        let message_id = format!("<{}@tenantline>", Uuid::new_v4());
        let id_for_task = message_id.clone();

        let sent = tokio::task::spawn_blocking(move || {
            Self::send_email(&config, &to, &subject, &body, &id_for_task)
        })
        .await;

        match sent {
            Ok(Ok(())) => {
                tracing::info!(to = %request.email.as_deref().unwrap_or("?"), "Email sent");
                DeliveryResult::delivered(ChannelKind::Email, Some(message_id))
            }
            Ok(Err(kind)) => DeliveryResult::failed(ChannelKind::Email, kind),
            Err(e) => {
                tracing::warn!("Email send task failed: {e}");
                DeliveryResult::failed(ChannelKind::Email, DeliveryErrorKind::Unknown)
            }
        }
    }
}
