use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Title used when a caller does not supply one.
pub const DEFAULT_TITLE: &str = "Alarm";

/// Body used when a caller does not supply one.
pub const DEFAULT_BODY: &str = "Time to wake up!";

/// The user-visible content threaded unchanged through every pipeline hop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlarmPayload {
    pub title: String,
    pub body: String,
}

impl AlarmPayload {
    /// Build a payload, substituting the fixed fallbacks for missing fields.
    pub fn new(title: Option<String>, body: Option<String>) -> Self {
        Self {
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
        }
    }
}

impl Default for AlarmPayload {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Identity of one OS-level wake registration.
///
/// Derived from the fire instant truncated to whole seconds, so scheduling
/// the same instant twice targets the same registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestCode(pub i32);

impl RequestCode {
    pub fn from_epoch_millis(epoch_millis: i64) -> Self {
        // Wrapping cast: the platform keys registrations by a 32-bit integer.
        Self((epoch_millis / 1000) as i32)
    }
}

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request to deliver one alarm, either now or at a fixed instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRequest {
    pub payload: AlarmPayload,
    /// Target instant in epoch milliseconds. `None` is only valid for
    /// immediate launches; scheduling rejects it.
    pub fire_at_epoch_millis: Option<i64>,
}

impl AlarmRequest {
    pub fn new(payload: AlarmPayload, fire_at_epoch_millis: i64) -> Self {
        Self {
            payload,
            fire_at_epoch_millis: Some(fire_at_epoch_millis),
        }
    }

    pub fn immediate(payload: AlarmPayload) -> Self {
        Self {
            payload,
            fire_at_epoch_millis: None,
        }
    }

    pub fn request_code(&self) -> Option<RequestCode> {
        self.fire_at_epoch_millis.map(RequestCode::from_epoch_millis)
    }

    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        self.fire_at_epoch_millis
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

/// Acknowledgment returned to the front-end once a request is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Registration the request landed in; `None` for immediate launches.
    pub request_code: Option<RequestCode>,
    pub fire_at_epoch_millis: Option<i64>,
}

impl Ack {
    pub fn immediate() -> Self {
        Self {
            request_code: None,
            fire_at_epoch_millis: None,
        }
    }
}
