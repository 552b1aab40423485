//! Persisted record models
//!
//! Two flat documents, each a mapping from identity (as string) to its
//! record. No schema versioning; the documents are small and rewritten
//! wholesale.

use crate::core_gate::types::{InviteToken, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Durable per-identity verification record.
///
/// Created on the first successful mint, updated on every later one and on
/// confirmed legitimate arrival. Never deleted: audit durability outweighs
/// storage cost at this scale, and the last-issued token doubles as the
/// historical legitimacy signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedRecord {
    pub user_id: UserId,

    /// Display handle at verification time, for the audit trail
    pub display_handle: String,

    /// Last successful verification
    pub verified_at: Timestamp,

    /// Last-issued invite token
    pub invite_token: Option<InviteToken>,

    /// Last confirmed legitimate join
    pub joined_at: Option<Timestamp>,
}

impl VerifiedRecord {
    pub fn new(user_id: UserId, display_handle: impl Into<String>, now: Timestamp) -> Self {
        Self {
            user_id,
            display_handle: display_handle.into(),
            verified_at: now,
            invite_token: None,
            joined_at: None,
        }
    }
}

/// Durable per-identity throttle state.
///
/// `expires_at` is `None` while the entry only carries a support-message
/// count and no active penalty; such entries are never swept, so the count
/// survives until a penalty is served and the entry is purged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleState {
    /// Number of penalties applied so far
    pub violations: u32,

    /// Penalty deadline; `None` means not currently blocked
    pub expires_at: Option<Timestamp>,

    /// Support messages sent in the current unblocked window
    pub support_count: u32,

    /// When the most recent penalty was applied
    pub last_penalty: Option<Timestamp>,
}

impl ThrottleState {
    /// True while an active penalty deadline lies in the future.
    pub fn is_blocked(&self, now: Timestamp) -> bool {
        self.expires_at.map(|at| !at.is_past(now)).unwrap_or(false)
    }

    /// True once the entry can be dropped by the sweep.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.map(|at| at.is_past(now)).unwrap_or(false)
    }
}
