//! HTTP surface: provider webhooks and the outbound send endpoint.

use std::sync::Arc;

use axum::Form;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::calls::{GatherResolution, SessionRegistry, error_twiml};
use crate::channels::CommunicationRequest;
use crate::error::{RouteError, WebhookError};
use crate::inbound::normalizer::{EmailInboundPayload, InboundNormalizer};
use crate::router::ChannelRouter;
use crate::store::{CommsStore, CommunicationLog};

/// Shared state for the communication routes.
#[derive(Clone)]
pub struct CommsRouteState {
    pub router: Arc<ChannelRouter>,
    pub sessions: Arc<SessionRegistry>,
    pub normalizer: Arc<InboundNormalizer>,
    pub store: Arc<dyn CommsStore>,
}

/// Build the communication REST + webhook routes.
pub fn comms_routes(state: CommsRouteState) -> Router {
    Router::new()
        .route("/api/communications/send", post(send_communication))
        .route("/api/communications/log/{tenant_id}", get(get_tenant_log))
        .route("/webhooks/voice/gather", post(voice_gather))
        .route("/webhooks/email/inbound", post(email_inbound))
        .with_state(state)
}

// ── Outbound ────────────────────────────────────────────────────────

/// POST /api/communications/send
///
/// Runs the ordered channel fallback for one request. Always answers with
/// a structured body: 200 with the outcome (even when every channel
/// failed), 422 for request-level problems no retry could fix.
async fn send_communication(
    State(state): State<CommsRouteState>,
    Json(request): Json<CommunicationRequest>,
) -> Response {
    match state.router.route(&request).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err @ (RouteError::NoContactMethod { .. } | RouteError::EmptyMessage)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            // Same shape as the 200 outcome so callers can always read
            // `attempts` and `success`.
            Json(serde_json::json!({
                "error": err.to_string(),
                "attempts": [],
                "success": false,
            })),
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Send failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "internal error"})),
            )
                .into_response()
        }
    }
}

/// GET /api/communications/log/{tenant_id}
///
/// Recent delivery-log rows for one tenant, newest first.
async fn get_tenant_log(
    State(state): State<CommsRouteState>,
    Path(tenant_id): Path<String>,
) -> Response {
    match state.store.logs_for_tenant(&tenant_id, 100).await {
        Ok(logs) => Json(logs).into_response(),
        Err(err) => {
            tracing::error!("Log read failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "internal error"})),
            )
                .into_response()
        }
    }
}

// ── Voice webhook ───────────────────────────────────────────────────

/// Digit-gather callback form body. Twilio posts more fields than these;
/// the rest are ignored.
#[derive(Debug, Deserialize)]
pub struct GatherCallback {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "Digits")]
    pub digits: Option<String>,
}

/// POST /webhooks/voice/gather
///
/// Advances the call session for `CallSid` with the gathered digits and
/// answers with the TwiML for the resulting terminal state. A missing
/// `CallSid` gets the generic error response without touching any session;
/// an unknown one gets the same response after being tombstoned.
async fn voice_gather(
    State(state): State<CommsRouteState>,
    Form(callback): Form<GatherCallback>,
) -> Response {
    let Some(call_sid) = callback.call_sid.as_deref().filter(|s| !s.is_empty()) else {
        tracing::warn!("Gather callback without CallSid");
        return twiml_response(error_twiml());
    };
    let digits = callback.digits.as_deref().unwrap_or_default();

    match state.sessions.apply_gather(call_sid, digits).await {
        Ok(GatherResolution { tenant_id, result }) => {
            // First delivery of this outcome gets logged; a provider retry
            // only replays the stored response. The session is already in
            // its terminal state here, so a failed log write must not
            // change the reply — a retry would deliver the disposition
            // TwiML and the two responses have to match.
            if !result.replayed {
                let event = state
                    .normalizer
                    .voice_event(call_sid, digits, Some(tenant_id));
                if let Err(err) = state
                    .store
                    .append_log(&CommunicationLog::inbound(&event, result.disposition.as_str()))
                    .await
                {
                    tracing::error!(call_sid = call_sid, "Failed to log gather event: {err}");
                }
            }
            twiml_response(result.disposition.reply_twiml())
        }
        Err(err) => {
            tracing::warn!("Gather callback rejected: {err}");
            let event = state.normalizer.voice_event(call_sid, digits, None);
            if let Err(err) = state
                .store
                .append_log(&CommunicationLog::inbound(&event, "unknown_call"))
                .await
            {
                tracing::error!("Failed to log unknown-call event: {err}");
            }
            twiml_response(error_twiml())
        }
    }
}

fn twiml_response(twiml: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], twiml).into_response()
}

// ── Email webhook ───────────────────────────────────────────────────

/// POST /webhooks/email/inbound
///
/// Normalizes an inbound email callback and appends it to the delivery
/// log. Responds 200 even when tenant resolution fails (the event is
/// logged unattributed); 400 only for malformed payloads.
async fn email_inbound(
    State(state): State<CommsRouteState>,
    Json(raw): Json<serde_json::Value>,
) -> Response {
    // Deserialize by hand so a wrong-shaped body is a 400, not a generic
    // extractor rejection.
    let payload: EmailInboundPayload = match serde_json::from_value(raw) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!("Rejected inbound email: {err}");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("malformed payload: {err}")})),
            )
                .into_response();
        }
    };

    let event = match state.normalizer.normalize_email(&payload).await {
        Ok(event) => event,
        Err(err @ WebhookError::MalformedPayload { .. }) => {
            tracing::warn!("Rejected inbound email: {err}");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": err.to_string()})),
            )
                .into_response();
        }
        Err(err) => {
            tracing::error!("Inbound email normalization failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "internal error"})),
            )
                .into_response();
        }
    };

    if let Err(err) = state
        .store
        .append_log(&CommunicationLog::inbound(&event, "received"))
        .await
    {
        tracing::error!("Failed to log inbound email: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "internal error"})),
        )
            .into_response();
    }

    Json(serde_json::json!({
        "status": "ok",
        "tenant_id": event.resolved_tenant_id,
    }))
    .into_response()
}
