//! Error types for the tenant communication subsystem.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Request-level routing errors.
///
/// Channel-level failures (invalid contact, provider timeout, provider
/// rejection) are not errors at this level — the router recovers from them
/// by falling through to the next channel and reports them inside the
/// returned outcome instead.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Request for tenant {tenant_id} has neither phone nor email")]
    NoContactMethod { tenant_id: String },

    #[error("Message body is empty")]
    EmptyMessage,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Inbound webhook errors.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Malformed webhook payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("No call session found for CallSid {call_sid}")]
    UnknownCallSession { call_sid: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
