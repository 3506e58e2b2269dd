//! Inbound webhook normalization and HTTP routes.

pub mod normalizer;
pub mod routes;

pub use normalizer::{EmailInboundPayload, InboundEvent, InboundNormalizer};
pub use routes::{CommsRouteState, comms_routes};
