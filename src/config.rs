//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::channels::ChannelKind;
use crate::error::ConfigError;

/// Communication subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    /// Channel attempt order. The router tries these in sequence and stops
    /// at the first success.
    pub channel_priority: Vec<ChannelKind>,
    /// Upper bound on a single channel attempt before it is recorded as a
    /// provider timeout and the router moves on.
    pub attempt_timeout: Duration,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            channel_priority: vec![ChannelKind::Sms, ChannelKind::Voice, ChannelKind::Email],
            attempt_timeout: Duration::from_secs(15),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl CommsConfig {
    /// Build config from environment variables, falling back to the
    /// defaults for anything unset. A set-but-unparseable value is an
    /// error rather than a silent fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("TENANTLINE_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(raw) = std::env::var("TENANTLINE_ATTEMPT_TIMEOUT_SECS") {
            config.attempt_timeout = parse_timeout_secs(&raw)?;
        }
        Ok(config)
    }
}

fn parse_timeout_secs(raw: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: "TENANTLINE_ATTEMPT_TIMEOUT_SECS".to_string(),
        message: format!("expected whole seconds, got {raw:?}"),
    })?;
    Ok(Duration::from_secs(secs))
}

/// Twilio credentials and numbers, shared by the SMS and voice adapters.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// E.164 number outbound SMS and calls originate from.
    pub from_number: String,
    /// Public base URL of this service; the voice adapter points Twilio's
    /// digit-gather action at `{public_base_url}/webhooks/voice/gather`.
    pub public_base_url: String,
}

impl TwilioConfig {
    /// Build config from environment variables.
    /// Returns `None` if `TWILIO_ACCOUNT_SID` is not set (SMS and voice
    /// channels disabled).
    pub fn from_env() -> Option<Self> {
        let account_sid = std::env::var("TWILIO_ACCOUNT_SID").ok()?;
        let auth_token = std::env::var("TWILIO_AUTH_TOKEN").unwrap_or_default();
        let from_number = std::env::var("TWILIO_FROM_NUMBER").unwrap_or_default();
        let public_base_url = std::env::var("TENANTLINE_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        Some(Self {
            account_sid,
            auth_token: SecretString::from(auth_token),
            from_number,
            public_base_url,
        })
    }
}

/// SMTP settings for the email adapter.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_HOST` is not set (email channel disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;

        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();
        let from_address =
            std::env::var("SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password: SecretString::from(password),
            from_address,
        })
    }
}
