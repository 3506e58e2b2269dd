//! SMS channel — sends message text through the Twilio Messages API.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use crate::channels::{
    ChannelAdapter, ChannelKind, CommunicationRequest, DeliveryErrorKind, DeliveryResult,
};
use crate::config::TwilioConfig;

/// SMS adapter backed by Twilio's REST API.
pub struct SmsAdapter {
    config: TwilioConfig,
    client: reqwest::Client,
}

impl SmsAdapter {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.config.account_sid
        )
    }

    /// Submit one message. Provider-level failures are mapped into the
    /// closed error-kind set so the router can fall through.
    async fn send_sms(&self, to: &str, body: &str) -> DeliveryResult {
        let mut form: HashMap<&str, &str> = HashMap::new();
        form.insert("To", to);
        form.insert("From", &self.config.from_number);
        form.insert("Body", body);

        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&form)
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                tracing::warn!("SMS send timed out: {e}");
                return DeliveryResult::failed(ChannelKind::Sms, DeliveryErrorKind::ProviderTimeout);
            }
            Err(e) => {
                tracing::warn!("SMS send failed: {e}");
                return DeliveryResult::failed(ChannelKind::Sms, DeliveryErrorKind::Unknown);
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let err_body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Twilio rejected SMS: {err_body}");
            return DeliveryResult::failed(ChannelKind::Sms, DeliveryErrorKind::ProviderRejected);
        }

        let sid = resp
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("sid").and_then(|s| s.as_str()).map(String::from));

        tracing::info!(to = to, sid = sid.as_deref().unwrap_or("?"), "SMS dispatched");
        DeliveryResult::delivered(ChannelKind::Sms, sid)
    }
}

#[async_trait]
impl ChannelAdapter for SmsAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn attempt(&self, request: &CommunicationRequest) -> DeliveryResult {
        let raw = request.phone.as_deref().unwrap_or_default();
        let Some(to) = normalize_phone(raw) else {
            tracing::warn!(tenant_id = %request.tenant_id, "SMS skipped: phone not E.164-normalizable");
            return DeliveryResult::failed(ChannelKind::Sms, DeliveryErrorKind::InvalidContact);
        };

        self.send_sms(&to, &request.message).await
    }
}

// ── Phone normalization ─────────────────────────────────────────────

/// Normalize a phone number to E.164.
///
/// Accepts already-prefixed international numbers, bare 10-digit national
/// numbers (assumed US/Canada), and 11-digit numbers with a leading 1.
/// Separators (spaces, dashes, dots, parentheses) are stripped.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let has_plus = raw.trim_start().starts_with('+');
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        return None;
    }
    // Reject input with characters that are neither digits nor separators.
    if raw
        .chars()
        .any(|c| !c.is_ascii_digit() && !"+-. ()".contains(c))
    {
        return None;
    }

    if has_plus {
        // E.164 allows up to 15 digits; require at least 8 to rule out junk.
        if (8..=15).contains(&digits.len()) {
            return Some(format!("+{digits}"));
        }
        return None;
    }

    match digits.len() {
        10 => Some(format!("+1{digits}")),
        11 if digits.starts_with('1') => Some(format!("+{digits}")),
        _ => None,
    }
}
