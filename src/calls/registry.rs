//! Session registry — key-addressed call sessions with serialized,
//! idempotent transitions per CallSid.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tokio::sync::Mutex;

use crate::calls::session::{CallSession, GatherResult};
use crate::error::WebhookError;

/// A digit-gather callback matched to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherResolution {
    pub tenant_id: String,
    pub result: GatherResult,
}

/// In-memory registry of call sessions keyed by CallSid.
///
/// Transitions run under the registry lock, so concurrent provider retries
/// for the same CallSid are serialized; the loser observes the completed
/// session and takes the idempotent replay path.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, CallSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly placed call in the `Initiated` state.
    pub async fn create(&self, call_sid: &str, tenant_id: &str) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(call_sid.to_string(), CallSession::new(call_sid, tenant_id));
        tracing::debug!(call_sid = call_sid, tenant_id = tenant_id, "Call session created");
    }

    /// Apply a digit-gather callback to the session for `call_sid`.
    ///
    /// An unknown CallSid leaves a `Failed` tombstone behind so repeated
    /// bad callbacks stay observable, and never enters digit processing.
    pub async fn apply_gather(
        &self,
        call_sid: &str,
        digits: &str,
    ) -> Result<GatherResolution, WebhookError> {
        let mut sessions = self.sessions.lock().await;

        let session = match sessions.entry(call_sid.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                tracing::warn!(call_sid = call_sid, "Gather callback for unknown call");
                entry.insert(CallSession::failed(call_sid));
                return Err(WebhookError::UnknownCallSession {
                    call_sid: call_sid.to_string(),
                });
            }
        };

        match session.apply_digits(digits) {
            Some(result) => {
                tracing::info!(
                    call_sid = call_sid,
                    disposition = result.disposition.as_str(),
                    replayed = result.replayed,
                    "Gather resolved"
                );
                Ok(GatherResolution {
                    tenant_id: session.tenant_id.clone(),
                    result,
                })
            }
            None => Err(WebhookError::UnknownCallSession {
                call_sid: call_sid.to_string(),
            }),
        }
    }

    /// Snapshot a session's current state (for diagnostics and tests).
    pub async fn get(&self, call_sid: &str) -> Option<CallSession> {
        self.sessions.lock().await.get(call_sid).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::calls::session::{CallState, Disposition};

    #[tokio::test]
    async fn create_then_gather_resolves_with_tenant() {
        let registry = SessionRegistry::new();
        registry.create("CA1", "t42").await;

        let resolution = registry.apply_gather("CA1", "1").await.unwrap();
        assert_eq!(resolution.tenant_id, "t42");
        assert_eq!(resolution.result.disposition, Disposition::Confirmed);
        assert!(!resolution.result.replayed);
    }

    #[tokio::test]
    async fn unknown_call_leaves_failed_tombstone() {
        let registry = SessionRegistry::new();
        let err = registry.apply_gather("CA404", "1").await.unwrap_err();
        assert!(matches!(
            err,
            WebhookError::UnknownCallSession { ref call_sid } if call_sid == "CA404"
        ));

        let session = registry.get("CA404").await.unwrap();
        assert_eq!(session.state, CallState::Failed);

        // Retried bad callback stays unknown, never processes digits.
        let err = registry.apply_gather("CA404", "1").await.unwrap_err();
        assert!(matches!(err, WebhookError::UnknownCallSession { .. }));
    }

    #[tokio::test]
    async fn duplicate_gather_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.create("CA1", "t1").await;

        let first = registry.apply_gather("CA1", "2").await.unwrap();
        let second = registry.apply_gather("CA1", "2").await.unwrap();

        assert_eq!(first.result.disposition, Disposition::Escalated);
        assert_eq!(second.result.disposition, Disposition::Escalated);
        assert!(!first.result.replayed);
        assert!(second.result.replayed);
    }

    #[tokio::test]
    async fn concurrent_duplicate_gathers_agree_on_one_terminal_state() {
        let registry = Arc::new(SessionRegistry::new());
        registry.create("CA1", "t1").await;

        // Provider retry racing the original delivery, with conflicting
        // digits. Exactly one transition wins; the other replays it.
        let a = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.apply_gather("CA1", "1").await }
        });
        let b = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.apply_gather("CA1", "2").await }
        });

        let ra = a.await.unwrap().unwrap().result;
        let rb = b.await.unwrap().unwrap().result;
        assert_eq!(ra.disposition, rb.disposition);
        assert_ne!(ra.replayed, rb.replayed);

        let session = registry.get("CA1").await.unwrap();
        assert_eq!(session.state, CallState::Completed);
        assert_eq!(session.disposition, Some(ra.disposition));
    }

    #[tokio::test]
    async fn sessions_without_gather_stay_initiated() {
        let registry = SessionRegistry::new();
        registry.create("CA1", "t1").await;
        let session = registry.get("CA1").await.unwrap();
        assert_eq!(session.state, CallState::Initiated);
    }
}
