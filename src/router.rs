//! Channel router — ordered, at-most-one-attempt-per-channel fallback
//! across the configured adapters for a single outbound request.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::channels::{
    ChannelAdapter, ChannelKind, CommunicationRequest, DeliveryErrorKind, DeliveryResult,
};
use crate::config::CommsConfig;
use crate::error::RouteError;
use crate::store::{CommsStore, CommunicationLog};

/// Aggregate result of one `route` call: every attempt in order, plus
/// whether (and via which channel) delivery ultimately succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationOutcome {
    pub attempts: Vec<DeliveryResult>,
    pub success: bool,
    pub delivered_via: Option<ChannelKind>,
}

/// Orchestrates ordered fallback across channel adapters.
///
/// Adapters are explicit constructor dependencies (never ambient globals)
/// so tests can substitute deterministic fakes per channel.
pub struct ChannelRouter {
    adapters: Vec<Arc<dyn ChannelAdapter>>,
    store: Arc<dyn CommsStore>,
    priority: Vec<ChannelKind>,
    attempt_timeout: Duration,
}

impl ChannelRouter {
    pub fn new(
        adapters: Vec<Arc<dyn ChannelAdapter>>,
        store: Arc<dyn CommsStore>,
        config: &CommsConfig,
    ) -> Self {
        Self {
            adapters,
            store,
            priority: config.channel_priority.clone(),
            attempt_timeout: config.attempt_timeout,
        }
    }

    fn adapter_for(&self, kind: ChannelKind) -> Option<&Arc<dyn ChannelAdapter>> {
        self.adapters.iter().find(|a| a.kind() == kind)
    }

    /// Deliver one request with first-success-wins fallback.
    ///
    /// Channels whose required contact field is absent are filtered out and
    /// produce no result entry; channels with no configured adapter are
    /// skipped the same way. Each eligible channel is attempted exactly
    /// once, in priority order, and every attempt (success or failure) is
    /// appended to the delivery log before this returns. All-channels-failed
    /// is reported in the outcome, never swallowed; only request-level
    /// problems (no contact method, empty message) are errors.
    pub async fn route(
        &self,
        request: &CommunicationRequest,
    ) -> Result<CommunicationOutcome, RouteError> {
        if request.message.trim().is_empty() {
            return Err(RouteError::EmptyMessage);
        }
        if !request.has_any_contact() {
            tracing::warn!(tenant_id = %request.tenant_id, "Request has no contact method");
            return Err(RouteError::NoContactMethod {
                tenant_id: request.tenant_id.clone(),
            });
        }

        let mut attempts: Vec<DeliveryResult> = Vec::new();
        let mut delivered_via: Option<ChannelKind> = None;

        for &kind in &self.priority {
            if !request.has_contact_for(kind) {
                continue;
            }
            let Some(adapter) = self.adapter_for(kind) else {
                tracing::debug!(channel = %kind, "Channel not configured; skipping");
                continue;
            };

            // A hung provider must not block the whole fan-out.
            let result = match timeout(self.attempt_timeout, adapter.attempt(request)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(channel = %kind, "Channel attempt timed out");
                    DeliveryResult::failed(kind, DeliveryErrorKind::ProviderTimeout)
                }
            };

            // Durability before acknowledgment: the attempt record must be
            // on disk before the caller can observe the outcome.
            self.store
                .append_log(&CommunicationLog::outbound(request, &result))
                .await?;

            let success = result.success;
            attempts.push(result);

            if success {
                delivered_via = Some(kind);
                tracing::info!(tenant_id = %request.tenant_id, channel = %kind, "Delivered");
                break;
            }
        }

        if delivered_via.is_none() {
            tracing::warn!(
                tenant_id = %request.tenant_id,
                attempted = attempts.len(),
                "All eligible channels failed"
            );
        }

        Ok(CommunicationOutcome {
            success: delivered_via.is_some(),
            delivered_via,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::store::libsql_backend::LibSqlBackend;

    /// Deterministic fake adapter: returns a scripted result and counts
    /// invocations.
    struct ScriptedAdapter {
        kind: ChannelKind,
        succeed: bool,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn new(kind: ChannelKind, succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                succeed,
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(kind: ChannelKind, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                kind,
                succeed: true,
                delay: Some(delay),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChannelAdapter for ScriptedAdapter {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn attempt(&self, _request: &CommunicationRequest) -> DeliveryResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.succeed {
                DeliveryResult::delivered(self.kind, Some("ref-1".into()))
            } else {
                DeliveryResult::failed(self.kind, DeliveryErrorKind::ProviderRejected)
            }
        }
    }

    async fn store() -> Arc<LibSqlBackend> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    fn request(phone: Option<&str>, email: Option<&str>) -> CommunicationRequest {
        CommunicationRequest {
            tenant_id: "t1".into(),
            tenant_name: "Alice".into(),
            phone: phone.map(String::from),
            email: email.map(String::from),
            message: "Rent due".into(),
            subject: Some("Rent notice".into()),
        }
    }

    fn router(
        adapters: Vec<Arc<dyn ChannelAdapter>>,
        store: Arc<LibSqlBackend>,
    ) -> ChannelRouter {
        ChannelRouter::new(adapters, store, &CommsConfig::default())
    }

    #[tokio::test]
    async fn email_only_request_never_touches_phone_channels() {
        let sms = ScriptedAdapter::new(ChannelKind::Sms, true);
        let voice = ScriptedAdapter::new(ChannelKind::Voice, true);
        let email = ScriptedAdapter::new(ChannelKind::Email, true);
        let r = router(
            vec![sms.clone(), voice.clone(), email.clone()],
            store().await,
        );

        let outcome = r.route(&request(None, Some("t@x.com"))).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.delivered_via, Some(ChannelKind::Email));
        assert_eq!(sms.calls(), 0);
        assert_eq!(voice.calls(), 0);
        assert_eq!(email.calls(), 1);
    }

    #[tokio::test]
    async fn first_success_stops_fallback() {
        let sms = ScriptedAdapter::new(ChannelKind::Sms, true);
        let voice = ScriptedAdapter::new(ChannelKind::Voice, true);
        let r = router(vec![sms.clone(), voice.clone()], store().await);

        let outcome = r
            .route(&request(Some("+15551234567"), Some("t@x.com")))
            .await
            .unwrap();

        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.delivered_via, Some(ChannelKind::Sms));
        assert_eq!(voice.calls(), 0);
    }

    #[tokio::test]
    async fn all_channels_failing_is_reported_not_swallowed() {
        let sms = ScriptedAdapter::new(ChannelKind::Sms, false);
        let voice = ScriptedAdapter::new(ChannelKind::Voice, false);
        let email = ScriptedAdapter::new(ChannelKind::Email, false);
        let r = router(vec![sms, voice, email], store().await);

        let outcome = r
            .route(&request(Some("+15551234567"), Some("t@x.com")))
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(outcome.delivered_via.is_none());
        // One recorded attempt per eligible channel.
        assert_eq!(outcome.attempts.len(), 3);
    }

    #[tokio::test]
    async fn sms_failure_falls_through_to_email() {
        // Voice unconfigured: fallback goes straight from SMS to email.
        let sms = ScriptedAdapter::new(ChannelKind::Sms, false);
        let email = ScriptedAdapter::new(ChannelKind::Email, true);
        let store = store().await;
        let r = router(vec![sms, email], Arc::clone(&store));

        let outcome = r
            .route(&request(Some("+15551234567"), Some("t@x.com")))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.delivered_via, Some(ChannelKind::Email));
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].success);
        assert_eq!(outcome.attempts[0].channel, ChannelKind::Sms);
        assert!(outcome.attempts[1].success);

        // Both attempts were logged before route returned.
        let logs = store.logs_for_tenant("t1", 10).await.unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[tokio::test]
    async fn no_contact_method_fails_fast() {
        let r = router(vec![], store().await);
        let err = r.route(&request(None, None)).await.unwrap_err();
        assert!(matches!(err, RouteError::NoContactMethod { .. }));
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let r = router(vec![], store().await);
        let mut req = request(Some("+15551234567"), None);
        req.message = "   ".into();
        let err = r.route(&req).await.unwrap_err();
        assert!(matches!(err, RouteError::EmptyMessage));
    }

    #[tokio::test]
    async fn hung_adapter_records_timeout_and_moves_on() {
        let sms = ScriptedAdapter::slow(ChannelKind::Sms, Duration::from_secs(60));
        let email = ScriptedAdapter::new(ChannelKind::Email, true);
        let store = store().await;
        let config = CommsConfig {
            attempt_timeout: Duration::from_millis(20),
            ..CommsConfig::default()
        };
        let r = ChannelRouter::new(vec![sms, email], Arc::clone(&store) as Arc<dyn CommsStore>, &config);

        let outcome = r
            .route(&request(Some("+15551234567"), Some("t@x.com")))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(
            outcome.attempts[0].error_kind,
            Some(DeliveryErrorKind::ProviderTimeout)
        );
        assert_eq!(outcome.delivered_via, Some(ChannelKind::Email));
    }

    #[tokio::test]
    async fn unconfigured_channels_produce_no_attempt_entry() {
        // Phone present but neither SMS nor voice adapter configured.
        let email = ScriptedAdapter::new(ChannelKind::Email, true);
        let r = router(vec![email], store().await);

        let outcome = r
            .route(&request(Some("+15551234567"), Some("t@x.com")))
            .await
            .unwrap();

        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.attempts[0].channel, ChannelKind::Email);
    }
}
