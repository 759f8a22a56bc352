//! Message record persisted by session queues.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Quality of Service levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QosLevel {
    /// At most once (fire and forget).
    AtMostOnce = 0,
    /// At least once (acknowledged delivery).
    AtLeastOnce = 1,
    /// Exactly once (reserved; the engine treats it as at-least-once).
    ExactlyOnce = 2,
}

impl From<u8> for QosLevel {
    fn from(level: u8) -> Self {
        match level {
            1 => QosLevel::AtLeastOnce,
            2 => QosLevel::ExactlyOnce,
            _ => QosLevel::AtMostOnce,
        }
    }
}

impl From<QosLevel> for u8 {
    fn from(qos: QosLevel) -> Self {
        qos as u8
    }
}

/// One routed publish, as stored in a session's bucket.
///
/// `offset` is 0 until the queue persists the message and stamps the
/// bucket-assigned value; after that it never changes. `timestamp` is the
/// producer's publish time in seconds since the epoch and drives expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub offset: u64,
    pub timestamp: u64,
    pub qos: QosLevel,
    /// Retain/dup bits, carried opaquely for the wire layer.
    pub flags: u8,
    pub topic: String,
    pub payload: Bytes,
}

impl Message {
    /// A QoS-1 message stamped with the current time.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Message {
            offset: 0,
            timestamp: current_timestamp(),
            qos: QosLevel::AtLeastOnce,
            flags: 0,
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    pub fn with_qos(mut self, qos: QosLevel) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Returns the current system time as a UNIX timestamp in seconds.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before Unix epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_round_trips_through_u8() {
        for level in [QosLevel::AtMostOnce, QosLevel::AtLeastOnce, QosLevel::ExactlyOnce] {
            assert_eq!(QosLevel::from(u8::from(level)), level);
        }
        assert_eq!(QosLevel::from(9u8), QosLevel::AtMostOnce);
    }

    #[test]
    fn builder_stamps_fields() {
        let msg = Message::new("t/1", "hi")
            .with_qos(QosLevel::AtMostOnce)
            .with_timestamp(42);
        assert_eq!(msg.offset, 0);
        assert_eq!(msg.timestamp, 42);
        assert_eq!(msg.qos, QosLevel::AtMostOnce);
        assert_eq!(msg.payload.as_ref(), b"hi");
    }
}
