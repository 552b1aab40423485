//! External platform collaborators
//!
//! The core never talks to the messaging platform directly; it consumes
//! these traits. Production adapters live outside this crate, the in-memory
//! fake used by tests and the simulator lives in `crate::test_utils`.

use super::types::{InviteToken, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Membership status of a user in a chat, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Member,
    Admin,
    Owner,
    Left,
    Kicked,
    Restricted,
}

impl MembershipStatus {
    /// Statuses that count as "subscribed" for verification purposes.
    pub fn is_subscribed(&self) -> bool {
        matches!(
            self,
            MembershipStatus::Member | MembershipStatus::Admin | MembershipStatus::Owner
        )
    }
}

/// Membership change in the private destination, delivered asynchronously
/// by the platform. May arrive in any order relative to the mint that
/// produced the token, or not at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivalEvent {
    /// Chat the membership change happened in
    pub destination: String,

    /// Who joined
    pub identity: UserId,

    /// Display handle at the time of joining, for audit messages
    pub display_handle: String,

    /// Invite token the platform attributed the join to, when it reports one
    pub used_token: Option<InviteToken>,

    /// New membership status
    pub new_status: MembershipStatus,
}

/// Failure talking to the platform. One variant per collaborator so the
/// caller can keep per-channel oracle failures isolated from invite or
/// expulsion failures.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("membership query failed for {chat}: {reason}")]
    OracleQuery { chat: String, reason: String },

    #[error("invite service error: {0}")]
    InviteService(String),

    #[error("membership mutation failed for {user}: {reason}")]
    Mutation { user: UserId, reason: String },

    #[error("notification delivery failed: {0}")]
    Notification(String),
}

/// Queries membership status of a user in a channel.
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    async fn membership_status(
        &self,
        channel_id: &str,
        user: UserId,
    ) -> Result<MembershipStatus, PlatformError>;
}

/// Allocates and revokes single-use invite artifacts for the destination.
#[async_trait]
pub trait InviteIssuer: Send + Sync {
    /// Create a single-use invite valid for `ttl`.
    async fn create_invite(
        &self,
        destination: &str,
        ttl: Duration,
    ) -> Result<InviteToken, PlatformError>;

    /// Invalidate an issued invite so it can no longer be redeemed.
    async fn revoke_invite(
        &self,
        destination: &str,
        token: &InviteToken,
    ) -> Result<(), PlatformError>;
}

/// Removes members and restores their ability to rejoin.
#[async_trait]
pub trait MemberGovernor: Send + Sync {
    async fn remove_member(&self, destination: &str, user: UserId) -> Result<(), PlatformError>;

    /// Lift the removal so the user may rejoin later (ban-then-unban, not a
    /// permanent ban).
    async fn restore_eligibility(
        &self,
        destination: &str,
        user: UserId,
    ) -> Result<(), PlatformError>;
}

/// Delivers operator-facing audit and support messages.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        chat: &str,
        thread: Option<i64>,
        text: &str,
    ) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribed_statuses() {
        assert!(MembershipStatus::Member.is_subscribed());
        assert!(MembershipStatus::Admin.is_subscribed());
        assert!(MembershipStatus::Owner.is_subscribed());
        assert!(!MembershipStatus::Left.is_subscribed());
        assert!(!MembershipStatus::Kicked.is_subscribed());
        assert!(!MembershipStatus::Restricted.is_subscribed());
    }

    #[test]
    fn test_arrival_event_round_trips_as_json() {
        let event = ArrivalEvent {
            destination: "-100444".to_string(),
            identity: UserId::new(7),
            display_handle: "penguin".to_string(),
            used_token: Some(InviteToken::new("t.me/+abc")),
            new_status: MembershipStatus::Member,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ArrivalEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.identity, event.identity);
        assert_eq!(back.new_status, MembershipStatus::Member);
    }
}
