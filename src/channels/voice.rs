//! Voice channel — places a call through the Twilio Calls API that reads
//! the message aloud and gathers a single keypad digit.
//!
//! "Success" for this adapter means the call was *placed*, not answered:
//! the human response arrives later through the digit-gather webhook and is
//! handled by the call session state machine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use crate::calls::{SessionRegistry, xml_escape};
use crate::channels::sms::normalize_phone;
use crate::channels::{
    ChannelAdapter, ChannelKind, CommunicationRequest, DeliveryErrorKind, DeliveryResult,
};
use crate::config::TwilioConfig;

/// Voice adapter backed by Twilio's REST API.
pub struct VoiceAdapter {
    config: TwilioConfig,
    client: reqwest::Client,
    sessions: Arc<SessionRegistry>,
}

impl VoiceAdapter {
    pub fn new(config: TwilioConfig, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            sessions,
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Calls.json",
            self.config.account_sid
        )
    }

    fn gather_action_url(&self) -> String {
        format!(
            "{}/webhooks/voice/gather",
            self.config.public_base_url.trim_end_matches('/')
        )
    }

    /// TwiML for the outbound leg: read the message, then gather one digit.
    fn call_twiml(&self, message: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <Response>\
             <Say>{}</Say>\
             <Gather action=\"{}\" method=\"POST\" numDigits=\"1\">\
             <Say>Press 1 to confirm you received this message. \
             Press 2 to speak with property management.</Say>\
             </Gather>\
             </Response>",
            xml_escape(message),
            self.gather_action_url(),
        )
    }
}

#[async_trait]
impl ChannelAdapter for VoiceAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Voice
    }

    async fn attempt(&self, request: &CommunicationRequest) -> DeliveryResult {
        let raw = request.phone.as_deref().unwrap_or_default();
        let Some(to) = normalize_phone(raw) else {
            tracing::warn!(tenant_id = %request.tenant_id, "Call skipped: phone not E.164-normalizable");
            return DeliveryResult::failed(ChannelKind::Voice, DeliveryErrorKind::InvalidContact);
        };

        let twiml = self.call_twiml(&request.message);
        let mut form: HashMap<&str, &str> = HashMap::new();
        form.insert("To", &to);
        form.insert("From", &self.config.from_number);
        form.insert("Twiml", &twiml);

        let resp = self
            .client
            .post(self.calls_url())
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
                tracing::warn!("Call creation timed out: {e}");
                return DeliveryResult::failed(
                    ChannelKind::Voice,
                    DeliveryErrorKind::ProviderTimeout,
                );
            }
            Err(e) => {
                tracing::warn!("Call creation failed: {e}");
                return DeliveryResult::failed(ChannelKind::Voice, DeliveryErrorKind::Unknown);
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let err_body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Twilio rejected call: {err_body}");
            return DeliveryResult::failed(ChannelKind::Voice, DeliveryErrorKind::ProviderRejected);
        }

        let sid = resp
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("sid").and_then(|s| s.as_str()).map(String::from));

        let Some(call_sid) = sid else {
            tracing::warn!("Twilio call response missing sid");
            return DeliveryResult::failed(ChannelKind::Voice, DeliveryErrorKind::Unknown);
        };

        // Register the session before reporting success so the gather
        // webhook can never observe a placed call with no session.
        self.sessions.create(&call_sid, &request.tenant_id).await;

        tracing::info!(to = %to, call_sid = %call_sid, "Call placed");
        DeliveryResult::delivered(ChannelKind::Voice, Some(call_sid))
    }
}
