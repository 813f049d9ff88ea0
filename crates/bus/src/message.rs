use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope layout produced by this build. Receivers drop anything newer.
pub const ENVELOPE_VERSION: u16 = 1;

/// One command on the delivery queue.
///
/// The body is MessagePack; `topic` names its type. `queued_at` lets the
/// consumer report how long the command waited, and `correlation_id` ties
/// the producer's and consumer's log lines together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,

    #[serde(with = "raw_bytes")]
    pub payload: Vec<u8>,

    pub queued_at: DateTime<Utc>,

    pub correlation_id: Uuid,

    #[serde(default = "first_version")]
    pub version: u16,
}

fn first_version() -> u16 {
    1
}

impl Message {
    pub fn new<T: Serialize>(
        topic: impl Into<String>,
        payload: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self {
            topic: topic.into(),
            payload: rmp_serde::to_vec(payload)?,
            queued_at: Utc::now(),
            correlation_id: Uuid::new_v4(),
            version: ENVELOPE_VERSION,
        })
    }

    /// Deserialize the body into the type its topic promises.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }

    /// Time spent between creation and now. Never negative.
    pub fn waited(&self) -> chrono::Duration {
        (Utc::now() - self.queued_at).max(chrono::Duration::zero())
    }

    /// Whether this build knows how to read the envelope.
    pub fn is_supported(&self) -> bool {
        (1..=ENVELOPE_VERSION).contains(&self.version)
    }

    pub fn to_wire(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Keeps the body a MessagePack bin instead of an array of integers.
mod raw_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        title: String,
        body: String,
    }

    #[test]
    fn envelope_survives_byte_transport() {
        let ping = Ping {
            title: "Wake up".into(),
            body: "Meeting at 9".into(),
        };
        let msg = Message::new("wakebell.test", &ping).unwrap();
        let decoded = Message::from_wire(&msg.to_wire().unwrap()).unwrap();

        assert_eq!(decoded.topic, "wakebell.test");
        assert_eq!(decoded.correlation_id, msg.correlation_id);
        assert_eq!(decoded.queued_at, msg.queued_at);
        assert!(decoded.is_supported());
        assert_eq!(decoded.decode::<Ping>().unwrap(), ping);
    }

    #[test]
    fn decode_into_wrong_type_fails() {
        let msg = Message::new("wakebell.test", &42u64).unwrap();
        assert!(msg.decode::<Ping>().is_err());
    }

    #[test]
    fn newer_or_zero_versions_are_unsupported() {
        let mut msg = Message::new("wakebell.test", &1u8).unwrap();
        msg.version = ENVELOPE_VERSION + 1;
        assert!(!msg.is_supported());
        msg.version = 0;
        assert!(!msg.is_supported());
    }

    #[test]
    fn wait_is_measured_from_creation() {
        let mut msg = Message::new("wakebell.test", &1u8).unwrap();
        msg.queued_at = Utc::now() - chrono::Duration::seconds(3);
        assert!(msg.waited() >= chrono::Duration::seconds(3));

        // A producer clock ahead of ours reads as no wait at all.
        msg.queued_at = Utc::now() + chrono::Duration::seconds(3);
        assert_eq!(msg.waited(), chrono::Duration::zero());
    }
}
