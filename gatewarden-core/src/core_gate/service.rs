//! Gate service: orchestrates the verifier, registry, throttle and arbiter
//!
//! All shared state lives behind one `Arc<RwLock<GateState>>`. Handlers take
//! the write lock only for synchronous check-and-mutate sections and release
//! it before any platform I/O; the two-phase mint protocol in the registry
//! keeps check-then-record correct across the invite call.
//!
//! The service returns outcome enums; rendering user-facing text is the
//! caller's job.

use super::arbiter::{JoinArbiter, JoinOutcome};
use super::conversation::{ConversationState, Conversations};
use super::platform::{
    ArrivalEvent, InviteIssuer, MemberGovernor, MembershipOracle, NotificationSink,
};
use super::registry::{CredentialRegistry, RegistryPolicy};
use super::throttle::SpamThrottle;
use super::types::{InviteToken, Timestamp, UserId};
use super::verifier::SubscriptionVerifier;
use crate::config::GateConfig;
use crate::core_store::{DocumentStore, ThrottleState, VerifiedRecord};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Everything mutable the handlers share.
pub struct GateState {
    pub registry: CredentialRegistry,
    pub throttle: SpamThrottle,
    pub users: HashMap<UserId, VerifiedRecord>,
    pub conversations: Conversations,
}

/// The four platform collaborators, grouped so constructors stay readable.
#[derive(Clone)]
pub struct PlatformHandles {
    pub oracle: Arc<dyn MembershipOracle>,
    pub invites: Arc<dyn InviteIssuer>,
    pub governor: Arc<dyn MemberGovernor>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl PlatformHandles {
    /// Build the handles from one object implementing every collaborator
    /// trait (the usual case for a platform client or the in-memory fake).
    pub fn from_shared<P>(platform: Arc<P>) -> Self
    where
        P: MembershipOracle + InviteIssuer + MemberGovernor + NotificationSink + 'static,
    {
        Self {
            oracle: platform.clone(),
            invites: platform.clone(),
            governor: platform.clone(),
            notifier: platform,
        }
    }
}

/// Outcome of a verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Caller is serving a penalty; tell them how long is left
    Blocked { remaining_secs: u64 },
    /// A credential was already issued to this identity; penalty applied
    AlreadyIssued,
    /// Subscription proof failed; labels of the missing channels
    NotSubscribed { missing: Vec<String> },
    /// Credential minted and bound
    Granted { token: InviteToken, ttl: Duration },
    /// Platform failure; user informed generically
    Failed,
}

/// Outcome of a support interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupportOutcome {
    Blocked { remaining_secs: u64 },
    /// Support mode entered; prompt for the request text
    Prompted,
    /// Chat was not awaiting support text; nothing done
    NotAwaiting,
    /// Message quota exceeded; penalty applied and conversation cleared
    QuotaExceeded,
    /// Message forwarded to the operators
    Forwarded,
    /// Delivery failed; conversation left open so the user can retry
    Failed,
}

/// Outcome of a stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Blocked { remaining_secs: u64 },
    Stopped { was_active: bool },
}

pub struct GateService {
    config: Arc<GateConfig>,
    state: Arc<RwLock<GateState>>,
    verifier: SubscriptionVerifier,
    arbiter: JoinArbiter,
    invites: Arc<dyn InviteIssuer>,
    notifier: Arc<dyn NotificationSink>,
    user_store: DocumentStore<VerifiedRecord>,
    throttle_store: DocumentStore<ThrottleState>,
}

impl GateService {
    /// Build the service: load both documents and wire up the components.
    pub fn new(config: GateConfig, platform: PlatformHandles) -> Self {
        let config = Arc::new(config);
        let user_store: DocumentStore<VerifiedRecord> = DocumentStore::new(config.users_path());
        let throttle_store: DocumentStore<ThrottleState> =
            DocumentStore::new(config.throttle_path());

        let users = user_store.load();
        let throttle = SpamThrottle::from_entries(throttle_store.load());
        info!(
            users = users.len(),
            throttled = throttle.entries().len(),
            "loaded persisted state"
        );

        let registry = CredentialRegistry::new(RegistryPolicy {
            invite_ttl: config.policy.invite_ttl,
            pending_ttl: config.policy.pending_ttl,
            token_stale_bound: config.policy.token_stale_bound,
        });

        let state = Arc::new(RwLock::new(GateState {
            registry,
            throttle,
            users,
            conversations: Conversations::new(),
        }));

        let verifier =
            SubscriptionVerifier::new(platform.oracle.clone(), config.required_channels.clone());
        let arbiter = JoinArbiter::new(
            state.clone(),
            platform.invites.clone(),
            platform.governor.clone(),
            platform.notifier.clone(),
            user_store.clone(),
            config.destination_chat.clone(),
            config.operator_chat.clone(),
            config.log_thread,
        );

        Self {
            config,
            state,
            verifier,
            arbiter,
            invites: platform.invites,
            notifier: platform.notifier,
            user_store,
            throttle_store,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Shared state handle, used to wire up the janitor.
    pub fn state(&self) -> Arc<RwLock<GateState>> {
        self.state.clone()
    }

    pub fn throttle_store(&self) -> DocumentStore<ThrottleState> {
        self.throttle_store.clone()
    }

    /// Handle a verification request: throttle, subscription proof, then
    /// credential mint.
    pub async fn handle_verification_request(
        &self,
        user: UserId,
        display_handle: &str,
    ) -> VerificationOutcome {
        let now = Timestamp::now();

        // Throttle gate plus the anti-re-request check, one critical section.
        {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            let verdict = state.throttle.check(user, now);
            if verdict.blocked {
                return VerificationOutcome::Blocked {
                    remaining_secs: verdict.remaining_secs,
                };
            }

            if state
                .users
                .get(&user)
                .is_some_and(|record| record.invite_token.is_some())
            {
                warn!(%user, "repeat verification request after issuance, penalizing");
                state
                    .throttle
                    .penalize(user, self.config.policy.remint_penalty, now);
                let snapshot = state.throttle.entries().clone();
                drop(guard);
                self.persist_throttle(&snapshot);
                return VerificationOutcome::AlreadyIssued;
            }
        }

        let report = self.verifier.verify(user).await;
        if !report.all_subscribed {
            return VerificationOutcome::NotSubscribed {
                missing: report.missing,
            };
        }

        // Reserve before the platform call so a concurrent request for the
        // same identity cannot double-mint during the suspension.
        let now = Timestamp::now();
        if let Err(e) = self.state.write().await.registry.begin_mint(user, now) {
            warn!(%user, error = %e, "mint refused");
            return VerificationOutcome::AlreadyIssued;
        }

        let token = match self
            .invites
            .create_invite(&self.config.destination_chat, self.config.policy.invite_ttl)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                error!(%user, error = %e, "invite creation failed, aborting mint");
                self.state.write().await.registry.abort_mint(user);
                return VerificationOutcome::Failed;
            }
        };

        let users_snapshot = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            match state.registry.complete_mint(user, token.clone(), now) {
                Ok(_) => {}
                Err(e) => {
                    // Reservation vanished mid-mint (janitor swept a lapsed
                    // window); the invite stands, record it anyway.
                    warn!(%user, error = %e, "mint completion raced a sweep");
                }
            }

            let record = state
                .users
                .entry(user)
                .or_insert_with(|| VerifiedRecord::new(user, display_handle, now));
            record.display_handle = display_handle.to_string();
            record.verified_at = now;
            record.invite_token = Some(token.clone());
            state.users.clone()
        };
        self.persist_users(&users_snapshot);

        let text = format!(
            "Verification passed.\nid: {user}\nhandle: @{display_handle}\nat: {now}\ninvite: {token}"
        );
        if let Err(e) = self
            .notifier
            .notify(&self.config.operator_chat, self.config.log_thread, &text)
            .await
        {
            warn!(%user, error = %e, "failed to deliver verification notice");
        }

        info!(%user, "credential granted");
        VerificationOutcome::Granted {
            token,
            ttl: self.config.policy.invite_ttl,
        }
    }

    /// Enter support mode for the chat.
    pub async fn handle_support_request(&self, user: UserId) -> SupportOutcome {
        let now = Timestamp::now();
        let mut guard = self.state.write().await;

        let verdict = guard.throttle.check(user, now);
        if verdict.blocked {
            return SupportOutcome::Blocked {
                remaining_secs: verdict.remaining_secs,
            };
        }

        guard.conversations.await_support_text(user);
        SupportOutcome::Prompted
    }

    /// End the current interaction, whatever it was.
    pub async fn handle_stop(&self, user: UserId) -> StopOutcome {
        let now = Timestamp::now();
        let mut guard = self.state.write().await;

        let verdict = guard.throttle.check(user, now);
        if verdict.blocked {
            return StopOutcome::Blocked {
                remaining_secs: verdict.remaining_secs,
            };
        }

        StopOutcome::Stopped {
            was_active: guard.conversations.clear(user),
        }
    }

    /// Handle free text while the chat is awaiting a support message.
    pub async fn handle_support_text(
        &self,
        user: UserId,
        display_handle: &str,
        text: &str,
    ) -> SupportOutcome {
        let now = Timestamp::now();

        // Quota check and count happen before the forwarding suspension so
        // a burst of messages cannot all pass the same check.
        let outcome = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            let verdict = state.throttle.check(user, now);
            if verdict.blocked {
                return SupportOutcome::Blocked {
                    remaining_secs: verdict.remaining_secs,
                };
            }
            if state.conversations.state(user) != ConversationState::AwaitingSupportText {
                return SupportOutcome::NotAwaiting;
            }

            if state.throttle.support_count(user) + 1 > self.config.policy.support_quota {
                warn!(%user, "support quota exceeded, penalizing");
                state
                    .throttle
                    .penalize(user, self.config.policy.support_penalty, now);
                state.conversations.clear(user);
                Err(state.throttle.entries().clone())
            } else {
                state.throttle.bump_support_count(user);
                Ok(state.throttle.entries().clone())
            }
        };

        let throttle_snapshot = match outcome {
            Err(snapshot) => {
                self.persist_throttle(&snapshot);
                return SupportOutcome::QuotaExceeded;
            }
            Ok(snapshot) => snapshot,
        };

        let message = format!(
            "Support request\nid: {user}\nhandle: @{display_handle}\nmessage:\n{text}"
        );
        if let Err(e) = self
            .notifier
            .notify(
                &self.config.operator_chat,
                self.config.support_thread,
                &message,
            )
            .await
        {
            // Conversation stays open; the counted attempt is kept so
            // retries cannot stretch the quota.
            error!(%user, error = %e, "failed to forward support message");
            self.persist_throttle(&throttle_snapshot);
            return SupportOutcome::Failed;
        }

        self.persist_throttle(&throttle_snapshot);
        self.state.write().await.conversations.clear(user);
        SupportOutcome::Forwarded
    }

    /// React to a membership change in the destination chat.
    pub async fn handle_arrival(&self, event: ArrivalEvent) -> JoinOutcome {
        self.arbiter.handle_arrival(event).await
    }

    /// Fire-and-forget persistence: log and keep serving on failure.
    fn persist_users(&self, users: &HashMap<UserId, VerifiedRecord>) {
        if let Err(e) = self.user_store.save(users) {
            error!(error = %e, "failed to persist user records");
        }
    }

    fn persist_throttle(&self, entries: &HashMap<UserId, ThrottleState>) {
        if let Err(e) = self.throttle_store.save(entries) {
            error!(error = %e, "failed to persist throttle records");
        }
    }
}
