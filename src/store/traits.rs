//! `CommsStore` trait — async persistence interface for the delivery log
//! and tenant contact lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channels::{ChannelKind, CommunicationRequest, DeliveryResult};
use crate::error::DatabaseError;
use crate::inbound::normalizer::InboundEvent;

/// Direction of a logged communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Inbound => "inbound",
        }
    }
}

/// A tenant contact record. Owned by the host application; this subsystem
/// only reads it to resolve inbound email senders (upsert exists for
/// bootstrap and tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// One append-only delivery-log row, inbound or outbound. Never updated
/// in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationLog {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub channel: ChannelKind,
    pub direction: Direction,
    pub status: String,
    pub content: String,
    pub provider_ref: Option<String>,
    pub error_kind: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CommunicationLog {
    /// Log entry for one outbound channel attempt, success or failure.
    pub fn outbound(request: &CommunicationRequest, result: &DeliveryResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: Some(request.tenant_id.clone()),
            channel: result.channel,
            direction: Direction::Outbound,
            status: if result.success { "delivered" } else { "failed" }.to_string(),
            content: request.message.clone(),
            provider_ref: result.provider_ref.clone(),
            error_kind: result.error_kind.map(|k| k.as_str().to_string()),
            created_at: result.timestamp,
        }
    }

    /// Log entry for a normalized inbound event. Unresolved senders are
    /// logged unattributed rather than dropped.
    pub fn inbound(event: &InboundEvent, status: &str) -> Self {
        let content = match (&event.digits, &event.body) {
            (Some(digits), _) => format!("digits: {digits}"),
            (None, Some(body)) => body.clone(),
            (None, None) => String::new(),
        };
        Self {
            id: Uuid::new_v4(),
            tenant_id: event.resolved_tenant_id.clone(),
            channel: event.source_channel,
            direction: Direction::Inbound,
            status: status.to_string(),
            content,
            provider_ref: Some(event.external_ref.clone()),
            error_kind: None,
            created_at: Utc::now(),
        }
    }
}

/// Backend-agnostic persistence trait for the communication subsystem.
#[async_trait]
pub trait CommsStore: Send + Sync {
    /// Append one delivery-log row.
    async fn append_log(&self, entry: &CommunicationLog) -> Result<(), DatabaseError>;

    /// Recent log rows for a tenant, newest first.
    async fn logs_for_tenant(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<CommunicationLog>, DatabaseError>;

    /// Recent log rows across all tenants, newest first. Unlike
    /// `logs_for_tenant` this includes unattributed rows (no tenant id),
    /// which is the only way to audit inbound events from unknown senders.
    async fn recent_logs(&self, limit: usize) -> Result<Vec<CommunicationLog>, DatabaseError>;

    /// Exact-match tenant lookup by email address.
    async fn find_tenant_by_email(&self, email: &str)
    -> Result<Option<Tenant>, DatabaseError>;

    /// Insert or replace a tenant contact record.
    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), DatabaseError>;
}
