//! Channel adapter contract — the uniform capability each transport
//! (SMS, voice, email) implements for the router.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery transport. Closed set: new channels are a deliberate code
/// change, not runtime-registered plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Sms,
    Voice,
    Email,
}

impl ChannelKind {
    /// Stable lowercase name used in logs and the delivery log table.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Sms => "sms",
            ChannelKind::Voice => "voice",
            ChannelKind::Email => "email",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound communication intent.
///
/// Constructed per API call, immutable, consumed once by the router. Only
/// its outcome is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationRequest {
    pub tenant_id: String,
    pub tenant_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub message: String,
    /// Used by the email channel only.
    pub subject: Option<String>,
}

impl CommunicationRequest {
    /// Whether the request carries the contact field this channel needs.
    /// SMS and voice require a phone number; email requires an address.
    pub fn has_contact_for(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Sms | ChannelKind::Voice => {
                self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
            }
            ChannelKind::Email => {
                self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
            }
        }
    }

    /// True if at least one contact method is present.
    pub fn has_any_contact(&self) -> bool {
        self.has_contact_for(ChannelKind::Sms) || self.has_contact_for(ChannelKind::Email)
    }
}

/// Closed set of channel-level failure kinds. Raw provider errors never
/// leak past the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryErrorKind {
    InvalidContact,
    MissingSubject,
    ProviderTimeout,
    ProviderRejected,
    Unknown,
}

impl DeliveryErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryErrorKind::InvalidContact => "invalid_contact",
            DeliveryErrorKind::MissingSubject => "missing_subject",
            DeliveryErrorKind::ProviderTimeout => "provider_timeout",
            DeliveryErrorKind::ProviderRejected => "provider_rejected",
            DeliveryErrorKind::Unknown => "unknown",
        }
    }
}

/// Outcome of one channel attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub channel: ChannelKind,
    pub success: bool,
    /// Opaque external id (Twilio message/call SID, SMTP message id).
    pub provider_ref: Option<String>,
    pub error_kind: Option<DeliveryErrorKind>,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryResult {
    /// A successful attempt, with the provider's reference id if it gave one.
    pub fn delivered(channel: ChannelKind, provider_ref: Option<String>) -> Self {
        Self {
            channel,
            success: true,
            provider_ref,
            error_kind: None,
            timestamp: Utc::now(),
        }
    }

    /// A failed attempt. The router treats this as "fall through to the
    /// next channel", never as a hard error.
    pub fn failed(channel: ChannelKind, kind: DeliveryErrorKind) -> Self {
        Self {
            channel,
            success: false,
            provider_ref: None,
            error_kind: Some(kind),
            timestamp: Utc::now(),
        }
    }
}

/// Capability contract each transport implements.
///
/// `attempt` is infallible at the type level: transient provider errors are
/// mapped into a failed [`DeliveryResult`] so the router can fall through.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Which transport this adapter drives.
    fn kind(&self) -> ChannelKind;

    /// Make exactly one delivery attempt for this request.
    async fn attempt(&self, request: &CommunicationRequest) -> DeliveryResult;
}
