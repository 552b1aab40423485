//! Join arbiter
//!
//! Consumes arrival events and enforces the registry's decision. Each event
//! moves through `Received -> Authorizing -> {Admitted | Expelled}`; both
//! end states are terminal. Authorization itself is synchronous and runs
//! inside a single critical section, so the index consumption it performs
//! cannot interleave with another handler's. Only the enforcement half
//! (kick, revoke, notify) suspends.

use super::platform::{
    ArrivalEvent, InviteIssuer, MemberGovernor, MembershipStatus, NotificationSink, PlatformError,
};
use super::registry::Authorization;
use super::service::GateState;
use super::types::{Timestamp, UserId};
use crate::core_store::{DocumentStore, VerifiedRecord};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Terminal classification of one arrival event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Event was for another chat or not a join; nothing to arbitrate
    Ignored,
    Admitted {
        identity: UserId,
    },
    Expelled {
        identity: UserId,
        expected: Option<UserId>,
    },
}

pub struct JoinArbiter {
    state: Arc<RwLock<GateState>>,
    invites: Arc<dyn InviteIssuer>,
    governor: Arc<dyn MemberGovernor>,
    notifier: Arc<dyn NotificationSink>,
    user_store: DocumentStore<VerifiedRecord>,
    destination_chat: String,
    operator_chat: String,
    log_thread: Option<i64>,
}

impl JoinArbiter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<RwLock<GateState>>,
        invites: Arc<dyn InviteIssuer>,
        governor: Arc<dyn MemberGovernor>,
        notifier: Arc<dyn NotificationSink>,
        user_store: DocumentStore<VerifiedRecord>,
        destination_chat: String,
        operator_chat: String,
        log_thread: Option<i64>,
    ) -> Self {
        Self {
            state,
            invites,
            governor,
            notifier,
            user_store,
            destination_chat,
            operator_chat,
            log_thread,
        }
    }

    /// Arbitrate one arrival event.
    pub async fn handle_arrival(&self, event: ArrivalEvent) -> JoinOutcome {
        if event.destination != self.destination_chat
            || event.new_status != MembershipStatus::Member
        {
            return JoinOutcome::Ignored;
        }

        let identity = event.identity;
        let now = Timestamp::now();

        // Authorizing: consult and consume the indices atomically.
        let (auth, users_snapshot) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let auth =
                state
                    .registry
                    .authorize(event.used_token.as_ref(), identity, &state.users, now);

            let snapshot = if auth.legitimate {
                if let Some(record) = state.users.get_mut(&identity) {
                    record.joined_at = Some(now);
                }
                Some(state.users.clone())
            } else {
                None
            };
            (auth, snapshot)
        };

        if auth.legitimate {
            info!(%identity, path = ?auth.path, "legitimate join admitted");
            metrics::counter!("gate.joins.admitted").increment(1);
            if let Some(users) = users_snapshot {
                if let Err(e) = self.user_store.save(&users) {
                    error!(error = %e, "failed to persist user records after join");
                }
            }
            return JoinOutcome::Admitted { identity };
        }

        metrics::counter!("gate.joins.expelled").increment(1);
        if let Err(e) = self.expel(&event, &auth, now).await {
            // Retrying a stale kick decision is not safe; drop the event.
            error!(%identity, error = %e, "expulsion failed, dropping event");
        }
        JoinOutcome::Expelled {
            identity,
            expected: auth.expected,
        }
    }

    /// Remove the intruder, restore their future eligibility, invalidate the
    /// presented token and notify the operators.
    async fn expel(
        &self,
        event: &ArrivalEvent,
        auth: &Authorization,
        now: Timestamp,
    ) -> Result<(), PlatformError> {
        let identity = event.identity;
        warn!(%identity, expected = ?auth.expected, "illegitimate join, expelling");

        self.governor
            .remove_member(&self.destination_chat, identity)
            .await?;
        self.governor
            .restore_eligibility(&self.destination_chat, identity)
            .await?;

        // Invalidate the token so a legitimate holder racing the impostor
        // cannot redeem a binding that was already consumed.
        if let Some(token) = &event.used_token {
            if let Err(e) = self.invites.revoke_invite(&self.destination_chat, token).await {
                warn!(%identity, error = %e, "failed to revoke presented invite");
            }
        }

        let expected = auth
            .expected
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let text = format!(
            "Intruder expelled from the gate.\n\
             id: {identity}\n\
             handle: @{handle}\n\
             at: {now}\n\
             expected identity: {expected}",
            handle = event.display_handle,
        );
        self.notifier
            .notify(&self.operator_chat, self.log_thread, &text)
            .await?;

        Ok(())
    }
}
