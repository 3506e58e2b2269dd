//! Tenantline — tenant communication subsystem: multi-channel outbound
//! delivery with ordered fallback, an inbound voice IVR state machine, and
//! webhook normalization back into the delivery log.

pub mod calls;
pub mod channels;
pub mod config;
pub mod error;
pub mod inbound;
pub mod router;
pub mod store;
