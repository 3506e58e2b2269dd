//! libSQL backend — async `CommsStore` implementation.
//!
//! Supports local file and in-memory databases; the in-memory constructor
//! is what unit and integration tests use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::channels::ChannelKind;
use crate::error::DatabaseError;
use crate::store::traits::{CommsStore, CommunicationLog, Direction, Tenant};

/// Columns selected for communication_log reads; order matters for
/// `row_to_log`.
const LOG_COLUMNS: &str =
    "id, tenant_id, channel, direction, status, content, provider_ref, error_kind, created_at";

/// libSQL database backend.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run schema init.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT,
                email TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_tenants_email ON tenants(email)",
            "CREATE TABLE IF NOT EXISTS communication_log (
                id TEXT PRIMARY KEY,
                tenant_id TEXT,
                channel TEXT NOT NULL,
                direction TEXT NOT NULL,
                status TEXT NOT NULL,
                content TEXT NOT NULL,
                provider_ref TEXT,
                error_kind TEXT,
                created_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_comm_log_tenant
                ON communication_log(tenant_id, created_at)",
        ];
        for sql in statements {
            self.conn
                .execute(sql, ())
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        }
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 string into DateTime<Utc>, falling back to the epoch
/// minimum on unexpected input.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn str_to_channel(s: &str) -> ChannelKind {
    match s {
        "voice" => ChannelKind::Voice,
        "email" => ChannelKind::Email,
        _ => ChannelKind::Sms,
    }
}

fn str_to_direction(s: &str) -> Direction {
    match s {
        "inbound" => Direction::Inbound,
        _ => Direction::Outbound,
    }
}

/// Map a libsql row to a CommunicationLog. Column order matches
/// `LOG_COLUMNS`.
fn row_to_log(row: &libsql::Row) -> Result<CommunicationLog, libsql::Error> {
    let id_str: String = row.get(0)?;
    let tenant_id: Option<String> = row.get(1).ok();
    let channel_str: String = row.get(2)?;
    let direction_str: String = row.get(3)?;
    let status: String = row.get(4)?;
    let content: String = row.get(5)?;
    let provider_ref: Option<String> = row.get(6).ok();
    let error_kind: Option<String> = row.get(7).ok();
    let created_str: String = row.get(8)?;

    Ok(CommunicationLog {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        tenant_id,
        channel: str_to_channel(&channel_str),
        direction: str_to_direction(&direction_str),
        status,
        content,
        provider_ref,
        error_kind,
        created_at: parse_datetime(&created_str),
    })
}

// ── CommsStore implementation ───────────────────────────────────────

#[async_trait]
impl CommsStore for LibSqlBackend {
    async fn append_log(&self, entry: &CommunicationLog) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO communication_log
                    (id, tenant_id, channel, direction, status, content,
                     provider_ref, error_kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.id.to_string(),
                    entry.tenant_id.clone(),
                    entry.channel.as_str(),
                    entry.direction.as_str(),
                    entry.status.clone(),
                    entry.content.clone(),
                    entry.provider_ref.clone(),
                    entry.error_kind.clone(),
                    entry.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        debug!(id = %entry.id, direction = entry.direction.as_str(), "Log entry appended");
        Ok(())
    }

    async fn logs_for_tenant(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<CommunicationLog>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM communication_log
                     WHERE tenant_id = ?1
                     ORDER BY created_at DESC LIMIT ?2"
                ),
                params![tenant_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut logs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            logs.push(row_to_log(&row).map_err(|e| DatabaseError::Query(e.to_string()))?);
        }
        Ok(logs)
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<CommunicationLog>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM communication_log
                     ORDER BY created_at DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut logs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            logs.push(row_to_log(&row).map_err(|e| DatabaseError::Query(e.to_string()))?);
        }
        Ok(logs)
    }

    async fn find_tenant_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Tenant>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, phone, email FROM tenants WHERE email = ?1 LIMIT 1",
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let id: String = row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?;
                let name: String =
                    row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?;
                let phone: Option<String> = row.get(2).ok();
                let email: Option<String> = row.get(3).ok();
                Ok(Some(Tenant {
                    id,
                    name,
                    phone,
                    email,
                }))
            }
            None => Ok(None),
        }
    }

    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO tenants (id, name, phone, email)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    tenant.id.clone(),
                    tenant.name.clone(),
                    tenant.phone.clone(),
                    tenant.email.clone(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{CommunicationRequest, DeliveryErrorKind, DeliveryResult};

    fn request() -> CommunicationRequest {
        CommunicationRequest {
            tenant_id: "t1".into(),
            tenant_name: "Alice".into(),
            phone: Some("+15551234567".into()),
            email: Some("alice@example.com".into()),
            message: "Rent due".into(),
            subject: None,
        }
    }

    #[tokio::test]
    async fn append_and_read_back_log() {
        let store = LibSqlBackend::new_memory().await.unwrap();

        let ok = DeliveryResult::delivered(ChannelKind::Sms, Some("SM1".into()));
        let fail = DeliveryResult::failed(ChannelKind::Email, DeliveryErrorKind::MissingSubject);
        store
            .append_log(&CommunicationLog::outbound(&request(), &ok))
            .await
            .unwrap();
        store
            .append_log(&CommunicationLog::outbound(&request(), &fail))
            .await
            .unwrap();

        let logs = store.logs_for_tenant("t1", 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().any(|l| l.status == "delivered"
            && l.channel == ChannelKind::Sms
            && l.provider_ref.as_deref() == Some("SM1")));
        assert!(logs.iter().any(|l| l.status == "failed"
            && l.error_kind.as_deref() == Some("missing_subject")));
    }

    #[tokio::test]
    async fn logs_for_other_tenant_are_not_returned() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let ok = DeliveryResult::delivered(ChannelKind::Sms, None);
        store
            .append_log(&CommunicationLog::outbound(&request(), &ok))
            .await
            .unwrap();

        let logs = store.logs_for_tenant("other", 10).await.unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn recent_logs_include_unattributed_rows() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let ok = DeliveryResult::delivered(ChannelKind::Sms, None);
        store
            .append_log(&CommunicationLog::outbound(&request(), &ok))
            .await
            .unwrap();
        store
            .append_log(&CommunicationLog {
                id: Uuid::new_v4(),
                tenant_id: None,
                channel: ChannelKind::Email,
                direction: Direction::Inbound,
                status: "received".into(),
                content: "who is this".into(),
                provider_ref: Some("msg-1".into()),
                error_kind: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        // The tenant-scoped query cannot see the unattributed row.
        assert_eq!(store.logs_for_tenant("t1", 10).await.unwrap().len(), 1);

        let all = store.recent_logs(10).await.unwrap();
        assert_eq!(all.len(), 2);
        let unattributed: Vec<_> = all.iter().filter(|l| l.tenant_id.is_none()).collect();
        assert_eq!(unattributed.len(), 1);
        assert_eq!(unattributed[0].direction, Direction::Inbound);
        assert_eq!(unattributed[0].status, "received");
    }

    #[tokio::test]
    async fn tenant_lookup_by_email_is_exact_match() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        store
            .upsert_tenant(&Tenant {
                id: "t1".into(),
                name: "Alice".into(),
                phone: None,
                email: Some("alice@example.com".into()),
            })
            .await
            .unwrap();

        let found = store.find_tenant_by_email("alice@example.com").await.unwrap();
        assert_eq!(found.unwrap().id, "t1");

        let miss = store.find_tenant_by_email("ALICE@example.com").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_existing_tenant() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let mut tenant = Tenant {
            id: "t1".into(),
            name: "Alice".into(),
            phone: None,
            email: Some("a@x.com".into()),
        };
        store.upsert_tenant(&tenant).await.unwrap();
        tenant.email = Some("a2@x.com".into());
        store.upsert_tenant(&tenant).await.unwrap();

        assert!(store.find_tenant_by_email("a@x.com").await.unwrap().is_none());
        assert!(store.find_tenant_by_email("a2@x.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn file_backed_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comms.db");
        let store = LibSqlBackend::new_local(&path).await.unwrap();

        let ok = DeliveryResult::delivered(ChannelKind::Voice, Some("CA1".into()));
        store
            .append_log(&CommunicationLog::outbound(&request(), &ok))
            .await
            .unwrap();

        let logs = store.logs_for_tenant("t1", 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].channel, ChannelKind::Voice);
    }
}
