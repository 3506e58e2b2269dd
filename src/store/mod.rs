//! Persistence layer — libSQL-backed delivery log and tenant lookup.

pub mod libsql_backend;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{CommsStore, CommunicationLog, Direction, Tenant};
