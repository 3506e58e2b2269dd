//! Inbound normalizer — parses asynchronous provider callbacks (email
//! replies, call digit events) into a canonical event and resolves the
//! originating tenant.

use std::sync::Arc;

use lettre::Address;
use serde::Deserialize;
use uuid::Uuid;

use crate::channels::ChannelKind;
use crate::error::WebhookError;
use crate::store::CommsStore;

/// Canonical form of an asynchronous provider callback. Transient; its
/// only persistent trace is the delivery-log row it produces.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub source_channel: ChannelKind,
    /// Call SID or message id.
    pub external_ref: String,
    pub raw_from: Option<String>,
    pub digits: Option<String>,
    pub body: Option<String>,
    /// `None` when the sender could not be correlated to a tenant; the
    /// event is still logged as unattributed.
    pub resolved_tenant_id: Option<String>,
}

/// Inbound email webhook body. Unrecognized extra fields are ignored so
/// provider schema additions don't break us.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailInboundPayload {
    pub from: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub message_id: Option<String>,
}

/// Normalizes raw webhook payloads into [`InboundEvent`]s.
pub struct InboundNormalizer {
    store: Arc<dyn CommsStore>,
}

impl InboundNormalizer {
    pub fn new(store: Arc<dyn CommsStore>) -> Self {
        Self { store }
    }

    /// Normalize an inbound email payload.
    ///
    /// Requires a syntactically valid `from` address and a non-empty
    /// `subject`; anything else is a `MalformedPayload` (surfaced as a 400,
    /// never a silent drop). Tenant resolution is exact-match on the sender
    /// address; a miss yields an unattributed event, not an error.
    pub async fn normalize_email(
        &self,
        payload: &EmailInboundPayload,
    ) -> Result<InboundEvent, WebhookError> {
        let from = payload
            .from
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| WebhookError::MalformedPayload {
                reason: "missing from address".into(),
            })?;

        if from.parse::<Address>().is_err() {
            return Err(WebhookError::MalformedPayload {
                reason: format!("invalid from address: {from}"),
            });
        }

        if payload
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .is_none()
        {
            return Err(WebhookError::MalformedPayload {
                reason: "missing subject".into(),
            });
        }

        let body = payload
            .text
            .clone()
            .or_else(|| payload.html.clone())
            .unwrap_or_default();

        let resolved_tenant_id = self
            .store
            .find_tenant_by_email(from)
            .await?
            .map(|tenant| tenant.id);

        if resolved_tenant_id.is_none() {
            tracing::info!(from = from, "Inbound email from unknown sender; logging unattributed");
        }

        let external_ref = payload
            .message_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(InboundEvent {
            source_channel: ChannelKind::Email,
            external_ref,
            raw_from: Some(from.to_string()),
            digits: None,
            body: Some(body),
            resolved_tenant_id,
        })
    }

    /// Canonical event for a voice digit-gather callback. State advancement
    /// itself belongs to the call session machine; this only records what
    /// arrived and who it resolved to.
    pub fn voice_event(
        &self,
        call_sid: &str,
        digits: &str,
        tenant_id: Option<String>,
    ) -> InboundEvent {
        InboundEvent {
            source_channel: ChannelKind::Voice,
            external_ref: call_sid.to_string(),
            raw_from: None,
            digits: Some(digits.to_string()),
            body: None,
            resolved_tenant_id: tenant_id,
        }
    }
}
