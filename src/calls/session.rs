//! Call session model — tracks one outbound voice call from initiation
//! through digit capture to a terminal disposition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an outbound call.
///
/// `Initiated → Gathering → {Confirmed | Escalated | InvalidInput} →
/// Completed`. `Failed` is terminal and reached on unrecoverable webhook
/// errors (a gather callback referencing a call we never placed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Initiated,
    Gathering,
    Confirmed,
    Escalated,
    InvalidInput,
    Completed,
    Failed,
}

/// Terminal keypad outcome of a gather.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Confirmed,
    Escalated,
    InvalidInput,
}

impl Disposition {
    /// Classify a raw digit string: `"1"` confirms, `"2"` escalates,
    /// anything else (including empty) is invalid input.
    pub fn from_digits(digits: &str) -> Self {
        match digits.trim() {
            "1" => Disposition::Confirmed,
            "2" => Disposition::Escalated,
            _ => Disposition::InvalidInput,
        }
    }

    /// Stable name used in the delivery log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Confirmed => "confirmed",
            Disposition::Escalated => "escalated",
            Disposition::InvalidInput => "invalid_input",
        }
    }

    /// Caller-facing TwiML for this outcome. This mapping is the state
    /// machine's public output, returned to the telephony provider.
    pub fn reply_twiml(&self) -> String {
        let line = match self {
            Disposition::Confirmed => {
                "Thank you. Your confirmation has been recorded. Goodbye."
            }
            Disposition::Escalated => {
                "Understood. A member of the property management team \
                 will contact you shortly. Goodbye."
            }
            Disposition::InvalidInput => {
                "Sorry, we did not recognize that response. \
                 Please call the property office if you need assistance. Goodbye."
            }
        };
        say_twiml(line)
    }
}

/// One outbound voice call's lifecycle, keyed by the provider's CallSid.
///
/// Created when the voice adapter places the call; mutated only by
/// webhook-driven transitions; immutable once terminal.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_sid: String,
    pub tenant_id: String,
    pub state: CallState,
    pub disposition: Option<Disposition>,
    pub created_at: DateTime<Utc>,
    pub last_digits: Option<String>,
}

/// Result of applying a digit-gather event to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherResult {
    pub disposition: Disposition,
    /// True when this was a duplicate callback for an already-completed
    /// session and the stored outcome was replayed unchanged.
    pub replayed: bool,
}

impl CallSession {
    pub fn new(call_sid: &str, tenant_id: &str) -> Self {
        Self {
            call_sid: call_sid.to_string(),
            tenant_id: tenant_id.to_string(),
            state: CallState::Initiated,
            disposition: None,
            created_at: Utc::now(),
            last_digits: None,
        }
    }

    /// A tombstone for a gather callback referencing a call we never
    /// placed. Keeps duplicate bad callbacks observable without ever
    /// entering the digit-processing path.
    pub fn failed(call_sid: &str) -> Self {
        Self {
            call_sid: call_sid.to_string(),
            tenant_id: String::new(),
            state: CallState::Failed,
            disposition: None,
            created_at: Utc::now(),
            last_digits: None,
        }
    }

    /// Advance the session with gathered digits.
    ///
    /// Moves through `Gathering` and resolves immediately to a terminal
    /// disposition, then `Completed`. A second call on a completed session
    /// does not re-mutate state; the stored disposition is replayed so
    /// duplicate provider callbacks are harmless. Returns `None` for a
    /// failed session.
    pub fn apply_digits(&mut self, digits: &str) -> Option<GatherResult> {
        match self.state {
            CallState::Failed => None,
            CallState::Completed => {
                // Terminal state is immutable; recompute the reply from it.
                let disposition = self.disposition?;
                Some(GatherResult {
                    disposition,
                    replayed: true,
                })
            }
            _ => {
                self.state = CallState::Gathering;
                let disposition = Disposition::from_digits(digits);
                self.state = match disposition {
                    Disposition::Confirmed => CallState::Confirmed,
                    Disposition::Escalated => CallState::Escalated,
                    Disposition::InvalidInput => CallState::InvalidInput,
                };
                self.last_digits = Some(digits.to_string());
                self.disposition = Some(disposition);
                self.state = CallState::Completed;
                Some(GatherResult {
                    disposition,
                    replayed: false,
                })
            }
        }
    }
}

// ── TwiML helpers ───────────────────────────────────────────────────

/// Generic apology returned when a callback cannot be matched to a call.
pub fn error_twiml() -> String {
    say_twiml("We are sorry, an application error has occurred. Goodbye.")
}

fn say_twiml(line: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Say>{}</Say></Response>",
        xml_escape(line)
    )
}

/// Escape text for embedding in TwiML.
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_one_confirms() {
        assert_eq!(Disposition::from_digits("1"), Disposition::Confirmed);
    }

    #[test]
    fn digit_two_escalates() {
        assert_eq!(Disposition::from_digits("2"), Disposition::Escalated);
    }

    #[test]
    fn other_digits_are_invalid_input() {
        assert_eq!(Disposition::from_digits("3"), Disposition::InvalidInput);
        assert_eq!(Disposition::from_digits("12"), Disposition::InvalidInput);
        assert_eq!(Disposition::from_digits(""), Disposition::InvalidInput);
        assert_eq!(Disposition::from_digits("#"), Disposition::InvalidInput);
    }

    #[test]
    fn digits_are_trimmed_before_classification() {
        assert_eq!(Disposition::from_digits(" 1 "), Disposition::Confirmed);
    }

    #[test]
    fn new_session_starts_initiated() {
        let session = CallSession::new("CA123", "t1");
        assert_eq!(session.state, CallState::Initiated);
        assert!(session.disposition.is_none());
        assert!(session.last_digits.is_none());
    }

    #[test]
    fn apply_digits_completes_session() {
        let mut session = CallSession::new("CA123", "t1");
        let result = session.apply_digits("1").unwrap();
        assert_eq!(result.disposition, Disposition::Confirmed);
        assert!(!result.replayed);
        assert_eq!(session.state, CallState::Completed);
        assert_eq!(session.last_digits.as_deref(), Some("1"));
    }

    #[test]
    fn duplicate_gather_replays_stored_outcome() {
        let mut session = CallSession::new("CA123", "t1");
        session.apply_digits("2").unwrap();

        // Different digits on the retry must not re-mutate state.
        let replay = session.apply_digits("1").unwrap();
        assert_eq!(replay.disposition, Disposition::Escalated);
        assert!(replay.replayed);
        assert_eq!(session.last_digits.as_deref(), Some("2"));
    }

    #[test]
    fn failed_session_ignores_digits() {
        let mut session = CallSession::failed("CA404");
        assert!(session.apply_digits("1").is_none());
        assert_eq!(session.state, CallState::Failed);
    }

    #[test]
    fn each_disposition_has_distinct_reply() {
        let confirmed = Disposition::Confirmed.reply_twiml();
        let escalated = Disposition::Escalated.reply_twiml();
        let invalid = Disposition::InvalidInput.reply_twiml();
        assert_ne!(confirmed, escalated);
        assert_ne!(escalated, invalid);
        assert_ne!(confirmed, invalid);
        for twiml in [&confirmed, &escalated, &invalid] {
            assert!(twiml.starts_with("<?xml"));
            assert!(twiml.contains("<Say>"));
        }
    }

    #[test]
    fn error_twiml_is_valid_response() {
        let twiml = error_twiml();
        assert!(twiml.contains("<Response>"));
        assert!(twiml.contains("application error"));
    }

    #[test]
    fn xml_escape_handles_special_chars() {
        assert_eq!(xml_escape("a & b < c"), "a &amp; b &lt; c");
        assert_eq!(xml_escape("plain"), "plain");
    }
}
