//! Test utilities
//!
//! [`MemoryPlatform`] is an in-memory implementation of every platform
//! collaborator with inspectable call logs and failure injection. It backs
//! the unit tests, the integration suite and the CLI simulator.

use crate::core_gate::platform::{
    InviteIssuer, MemberGovernor, MembershipOracle, MembershipStatus, NotificationSink,
    PlatformError,
};
use crate::core_gate::types::{InviteToken, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One delivered notification, kept verbatim for assertions.
#[derive(Debug, Clone)]
pub struct Notice {
    pub chat: String,
    pub thread: Option<i64>,
    pub text: String,
}

/// In-memory platform fake.
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    memberships: Mutex<HashMap<(String, UserId), MembershipStatus>>,
    issued: Mutex<Vec<InviteToken>>,
    revoked: Mutex<Vec<InviteToken>>,
    removed: Mutex<Vec<UserId>>,
    restored: Mutex<Vec<UserId>>,
    notices: Mutex<Vec<Notice>>,
    failing_channels: Mutex<HashSet<String>>,
    invite_failure: AtomicBool,
    governor_failure: AtomicBool,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the membership status the oracle reports for a channel/user pair.
    /// Unseeded pairs report `Left`.
    pub fn set_membership(&self, channel: &str, user: UserId, status: MembershipStatus) {
        self.memberships
            .lock()
            .unwrap()
            .insert((channel.to_string(), user), status);
    }

    /// Make oracle queries against the given channel fail.
    pub fn fail_oracle_for(&self, channel: &str) {
        self.failing_channels
            .lock()
            .unwrap()
            .insert(channel.to_string());
    }

    /// Make invite creation and revocation fail.
    pub fn set_invite_failure(&self, failing: bool) {
        self.invite_failure.store(failing, Ordering::SeqCst);
    }

    /// Make member removal/restoration fail.
    pub fn set_governor_failure(&self, failing: bool) {
        self.governor_failure.store(failing, Ordering::SeqCst);
    }

    pub fn issued_invites(&self) -> Vec<InviteToken> {
        self.issued.lock().unwrap().clone()
    }

    pub fn revoked_invites(&self) -> Vec<InviteToken> {
        self.revoked.lock().unwrap().clone()
    }

    pub fn removed_members(&self) -> Vec<UserId> {
        self.removed.lock().unwrap().clone()
    }

    pub fn restored_members(&self) -> Vec<UserId> {
        self.restored.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    fn generate_token() -> InviteToken {
        use rand::Rng;
        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        const TOKEN_LEN: usize = 16;

        let mut rng = rand::rng();
        let suffix: String = (0..TOKEN_LEN)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect();
        InviteToken::new(format!("t.me/+{}", suffix))
    }
}

#[async_trait]
impl MembershipOracle for MemoryPlatform {
    async fn membership_status(
        &self,
        channel_id: &str,
        user: UserId,
    ) -> Result<MembershipStatus, PlatformError> {
        if self.failing_channels.lock().unwrap().contains(channel_id) {
            return Err(PlatformError::OracleQuery {
                chat: channel_id.to_string(),
                reason: "injected oracle failure".to_string(),
            });
        }
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .get(&(channel_id.to_string(), user))
            .copied()
            .unwrap_or(MembershipStatus::Left))
    }
}

#[async_trait]
impl InviteIssuer for MemoryPlatform {
    async fn create_invite(
        &self,
        _destination: &str,
        _ttl: Duration,
    ) -> Result<InviteToken, PlatformError> {
        if self.invite_failure.load(Ordering::SeqCst) {
            return Err(PlatformError::InviteService(
                "injected invite failure".to_string(),
            ));
        }
        let token = Self::generate_token();
        self.issued.lock().unwrap().push(token.clone());
        Ok(token)
    }

    async fn revoke_invite(
        &self,
        _destination: &str,
        token: &InviteToken,
    ) -> Result<(), PlatformError> {
        if self.invite_failure.load(Ordering::SeqCst) {
            return Err(PlatformError::InviteService(
                "injected revoke failure".to_string(),
            ));
        }
        self.revoked.lock().unwrap().push(token.clone());
        Ok(())
    }
}

#[async_trait]
impl MemberGovernor for MemoryPlatform {
    async fn remove_member(&self, _destination: &str, user: UserId) -> Result<(), PlatformError> {
        if self.governor_failure.load(Ordering::SeqCst) {
            return Err(PlatformError::Mutation {
                user,
                reason: "injected removal failure".to_string(),
            });
        }
        self.removed.lock().unwrap().push(user);
        Ok(())
    }

    async fn restore_eligibility(
        &self,
        _destination: &str,
        user: UserId,
    ) -> Result<(), PlatformError> {
        if self.governor_failure.load(Ordering::SeqCst) {
            return Err(PlatformError::Mutation {
                user,
                reason: "injected restore failure".to_string(),
            });
        }
        self.restored.lock().unwrap().push(user);
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for MemoryPlatform {
    async fn notify(
        &self,
        chat: &str,
        thread: Option<i64>,
        text: &str,
    ) -> Result<(), PlatformError> {
        self.notices.lock().unwrap().push(Notice {
            chat: chat.to_string(),
            thread,
            text: text.to_string(),
        });
        Ok(())
    }
}
