//! Shared identifier and time types for the gate

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Stable user identifier assigned by the external messaging platform.
///
/// Never generated internally; it only ever enters the system through
/// platform events and is used verbatim as an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        UserId(id)
    }

    /// Key form used in the persisted documents.
    pub fn as_key(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

/// Opaque platform-assigned invite token.
///
/// Used as the correlation key between a minted credential and the join
/// event that redeems it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InviteToken(pub String);

impl InviteToken {
    pub fn new(token: impl Into<String>) -> Self {
        InviteToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a timestamp representing the current time
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_millis() as u64)
    }

    /// Create a timestamp from milliseconds since epoch
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Timestamp shifted forward by a duration
    pub fn saturating_add(&self, d: Duration) -> Self {
        Timestamp(self.0.saturating_add(d.as_millis() as u64))
    }

    /// Wall-clock distance from an earlier timestamp; zero if `earlier` is
    /// actually later.
    pub fn since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// True once the given instant has reached or passed this deadline.
    pub fn is_past(&self, now: Timestamp) -> bool {
        now.0 >= self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A required public channel the user must be subscribed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    /// Platform channel identifier ("@handle" or numeric id as string)
    pub id: String,

    /// Human-readable label used in reports and audit messages
    pub name: String,
}

impl ChannelRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        ChannelRef {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Label reported to users when the channel is missing; falls back to
    /// the raw id when no name was configured.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_key_round_trip() {
        let id = UserId::new(42);
        assert_eq!(id.as_key(), "42");
        assert_eq!(format!("{}", id), "42");
    }

    #[test]
    fn test_timestamp_deadline() {
        let base = Timestamp::from_millis(1_000);
        let deadline = base.saturating_add(Duration::from_secs(15));
        assert!(!deadline.is_past(Timestamp::from_millis(15_999)));
        assert!(deadline.is_past(Timestamp::from_millis(16_000)));
    }

    #[test]
    fn test_timestamp_since_is_saturating() {
        let earlier = Timestamp::from_millis(5_000);
        let later = Timestamp::from_millis(8_000);
        assert_eq!(later.since(earlier), Duration::from_millis(3_000));
        assert_eq!(earlier.since(later), Duration::ZERO);
    }

    #[test]
    fn test_channel_label_falls_back_to_id() {
        let named = ChannelRef::new("@news", "News");
        let unnamed = ChannelRef::new("@news", "");
        assert_eq!(named.label(), "News");
        assert_eq!(unnamed.label(), "@news");
    }
}
