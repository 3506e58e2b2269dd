//! Channel adapters for outbound delivery.

pub mod adapter;
pub mod email;
pub mod sms;
pub mod voice;

pub use adapter::{
    ChannelAdapter, ChannelKind, CommunicationRequest, DeliveryErrorKind, DeliveryResult,
};
pub use email::EmailAdapter;
pub use sms::SmsAdapter;
pub use voice::VoiceAdapter;
