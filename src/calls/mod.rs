//! Outbound call session state machine.

pub mod registry;
pub mod session;

pub use registry::{GatherResolution, SessionRegistry};
pub use session::{CallSession, CallState, Disposition, GatherResult, error_twiml, xml_escape};
