//! Credential registry: the anti-impersonation core
//!
//! Tracks expected-identity bindings across two complementary in-memory
//! indices with independent expiry horizons:
//!
//! - `tokens`: invite token -> [`Credential`], consumed on first arrival
//!   that presents the token, legitimate or not;
//! - `pending`: identity -> [`PendingWindow`], a token-independent fallback
//!   covering the gap between mint and the platform confirming delivery
//!   (the arrival event may omit the token, or the token index may already
//!   have been swept).
//!
//! All operations take an explicit `now` so expiry logic is testable
//! without a running clock.

use super::types::{InviteToken, Timestamp, UserId};
use crate::core_store::records::VerifiedRecord;
use std::collections::HashMap;
use std::time::Duration;

/// One minted invite artifact bound to exactly one expected identity.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: InviteToken,
    pub bound_identity: UserId,
    pub minted_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Credential {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_past(now)
    }
}

/// Identity-keyed fallback window opened at mint time.
///
/// Consumed by the first matching arrival or dropped on expiry, whichever
/// comes first. Between `begin_mint` and `complete_mint` the window doubles
/// as the mint reservation, so a concurrent mint for the same identity
/// cannot slip in while the invite platform call is in flight.
#[derive(Debug, Clone)]
pub struct PendingWindow {
    pub opened_at: Timestamp,
    pub expires_at: Timestamp,
    /// Token the window was stamped with once the platform allocated it.
    pub token: Option<InviteToken>,
}

impl PendingWindow {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_past(now)
    }
}

/// Which legitimacy tier matched an arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPath {
    /// Presented token was indexed and bound to the arriving identity
    Token,
    /// Arriving identity matched a live pending window
    PendingWindow,
    /// Arriving identity holds a verified record with a past issuance
    History,
}

/// Outcome of [`CredentialRegistry::authorize`].
#[derive(Debug, Clone)]
pub struct Authorization {
    pub legitimate: bool,
    /// Identity the consumed binding expected, when one was found. Kept even
    /// for illegitimate arrivals so the audit trail can name who was
    /// impersonated.
    pub expected: Option<UserId>,
    pub path: Option<AuthPath>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("identity {0} already holds an unexpired credential")]
    CredentialOutstanding(UserId),

    #[error("a mint for identity {0} is already in flight")]
    MintInFlight(UserId),

    #[error("no mint reservation found for identity {0}")]
    NoReservation(UserId),
}

/// Registry policy knobs; defaults mirror the reference policy.
#[derive(Debug, Clone, Copy)]
pub struct RegistryPolicy {
    /// Credential time-to-live (platform invite expiry)
    pub invite_ttl: Duration,
    /// Pending-window time-to-live, longer than the invite TTL to absorb
    /// platform delivery latency
    pub pending_ttl: Duration,
    /// Token entries whose bound identity verified longer ago than this are
    /// swept; deliberately longer than the invite TTL to tolerate clock skew
    /// and slow platform delivery
    pub token_stale_bound: Duration,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            invite_ttl: Duration::from_secs(15),
            pending_ttl: Duration::from_secs(20),
            token_stale_bound: Duration::from_secs(30),
        }
    }
}

/// Mints credentials and authorizes arrivals against them.
#[derive(Debug)]
pub struct CredentialRegistry {
    policy: RegistryPolicy,
    tokens: HashMap<InviteToken, Credential>,
    pending: HashMap<UserId, PendingWindow>,
}

impl CredentialRegistry {
    pub fn new(policy: RegistryPolicy) -> Self {
        Self {
            policy,
            tokens: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &RegistryPolicy {
        &self.policy
    }

    /// True if the identity is bound to any unexpired credential.
    pub fn has_active_credential(&self, user: UserId, now: Timestamp) -> bool {
        self.tokens
            .values()
            .any(|c| c.bound_identity == user && !c.is_expired(now))
    }

    /// First phase of minting: run the anti-re-mint check and reserve a
    /// pending window for the identity, all synchronously.
    ///
    /// The caller then performs the (suspending) platform invite call and
    /// finishes with [`complete_mint`] or [`abort_mint`]. Splitting the
    /// operation keeps the check-then-record sequence from straddling the
    /// I/O suspension point.
    ///
    /// [`complete_mint`]: CredentialRegistry::complete_mint
    /// [`abort_mint`]: CredentialRegistry::abort_mint
    pub fn begin_mint(&mut self, user: UserId, now: Timestamp) -> Result<(), RegistryError> {
        if self.has_active_credential(user, now) {
            return Err(RegistryError::CredentialOutstanding(user));
        }
        if let Some(window) = self.pending.get(&user) {
            if !window.is_expired(now) {
                return Err(RegistryError::MintInFlight(user));
            }
        }

        self.pending.insert(
            user,
            PendingWindow {
                opened_at: now,
                expires_at: now.saturating_add(self.policy.pending_ttl),
                token: None,
            },
        );
        Ok(())
    }

    /// Second phase: record the platform-allocated token and stamp the
    /// reserved pending window with it.
    pub fn complete_mint(
        &mut self,
        user: UserId,
        token: InviteToken,
        now: Timestamp,
    ) -> Result<Credential, RegistryError> {
        let window = self
            .pending
            .get_mut(&user)
            .ok_or(RegistryError::NoReservation(user))?;
        window.token = Some(token.clone());
        window.expires_at = now.saturating_add(self.policy.pending_ttl);

        let credential = Credential {
            token: token.clone(),
            bound_identity: user,
            minted_at: now,
            expires_at: now.saturating_add(self.policy.invite_ttl),
        };
        self.tokens.insert(token, credential.clone());
        metrics::counter!("gate.credentials.minted").increment(1);
        Ok(credential)
    }

    /// Release the reservation after a failed platform invite call.
    pub fn abort_mint(&mut self, user: UserId) {
        self.pending.remove(&user);
    }

    /// Decide whether an arrival is legitimate.
    ///
    /// Three independent checks, evaluated in a fixed precedence order and
    /// short-circuiting on first match:
    ///
    /// 1. token match — the binding is consumed regardless of outcome, so a
    ///    token is single-use even under a failed match;
    /// 2. pending-window match for the arriving identity, consumed on match;
    /// 3. historical fallback — the arriving identity has a verified record
    ///    with a previously issued token, even if both live indices were
    ///    already swept. Trades a narrow impersonation window for fewer
    ///    false expulsions when a sweep races a slow join confirmation.
    pub fn authorize(
        &mut self,
        token: Option<&InviteToken>,
        arriving: UserId,
        records: &HashMap<UserId, VerifiedRecord>,
        now: Timestamp,
    ) -> Authorization {
        // Tier 1: token match
        if let Some(token) = token {
            if let Some(credential) = self.tokens.remove(token) {
                let legitimate = credential.bound_identity == arriving;
                if legitimate {
                    // The paired window has served its purpose.
                    self.pending.remove(&arriving);
                }
                return Authorization {
                    legitimate,
                    expected: Some(credential.bound_identity),
                    path: Some(AuthPath::Token),
                };
            }
        }

        // Tier 2: pending-window match
        if let Some(window) = self.pending.get(&arriving) {
            if !window.is_expired(now) {
                self.pending.remove(&arriving);
                return Authorization {
                    legitimate: true,
                    expected: Some(arriving),
                    path: Some(AuthPath::PendingWindow),
                };
            }
        }

        // Tier 3: historical fallback
        if records
            .get(&arriving)
            .is_some_and(|record| record.invite_token.is_some())
        {
            return Authorization {
                legitimate: true,
                expected: Some(arriving),
                path: Some(AuthPath::History),
            };
        }

        Authorization {
            legitimate: false,
            expected: None,
            path: None,
        }
    }

    /// Eager eviction pass, run by the janitor.
    ///
    /// Drops expired pending windows, and token entries whose bound
    /// identity's last verification is older than the staleness bound. Token
    /// staleness is measured against the verified record rather than the
    /// credential itself so a slow platform join still finds the binding.
    pub fn sweep(&mut self, now: Timestamp, records: &HashMap<UserId, VerifiedRecord>) {
        self.pending.retain(|_, window| !window.is_expired(now));

        let stale_bound = self.policy.token_stale_bound;
        self.tokens.retain(|_, credential| {
            match records.get(&credential.bound_identity) {
                Some(record) => now.since(record.verified_at) <= stale_bound,
                None => true,
            }
        });
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CredentialRegistry {
        CredentialRegistry::new(RegistryPolicy::default())
    }

    fn mint(reg: &mut CredentialRegistry, user: UserId, token: &str, now: Timestamp) {
        reg.begin_mint(user, now).unwrap();
        reg.complete_mint(user, InviteToken::new(token), now).unwrap();
    }

    fn record_with_token(user: UserId, now: Timestamp) -> HashMap<UserId, VerifiedRecord> {
        let mut records = HashMap::new();
        let mut record = VerifiedRecord::new(user, "handle", now);
        record.invite_token = Some(InviteToken::new("t.me/+old"));
        records.insert(user, record);
        records
    }

    #[test]
    fn test_second_mint_within_ttl_fails() {
        let mut reg = registry();
        let now = Timestamp::from_millis(1_000);
        mint(&mut reg, UserId::new(1), "t.me/+a", now);

        let again = reg.begin_mint(UserId::new(1), Timestamp::from_millis(5_000));
        assert_eq!(again, Err(RegistryError::CredentialOutstanding(UserId::new(1))));
    }

    #[test]
    fn test_mint_allowed_after_credential_expiry() {
        let mut reg = registry();
        let now = Timestamp::from_millis(1_000);
        mint(&mut reg, UserId::new(1), "t.me/+a", now);

        // Credential (15s) and pending window (20s) both lapsed.
        let later = now.saturating_add(Duration::from_secs(21));
        assert!(reg.begin_mint(UserId::new(1), later).is_ok());
    }

    #[test]
    fn test_in_flight_reservation_blocks_concurrent_mint() {
        let mut reg = registry();
        let now = Timestamp::from_millis(1_000);
        reg.begin_mint(UserId::new(1), now).unwrap();

        assert_eq!(
            reg.begin_mint(UserId::new(1), now),
            Err(RegistryError::MintInFlight(UserId::new(1)))
        );

        reg.abort_mint(UserId::new(1));
        assert!(reg.begin_mint(UserId::new(1), now).is_ok());
    }

    #[test]
    fn test_token_binding_consumed_exactly_once() {
        let mut reg = registry();
        let now = Timestamp::from_millis(1_000);
        let token = InviteToken::new("t.me/+a");
        mint(&mut reg, UserId::new(1), "t.me/+a", now);

        let first = reg.authorize(Some(&token), UserId::new(1), &HashMap::new(), now);
        assert!(first.legitimate);
        assert_eq!(first.path, Some(AuthPath::Token));

        // Token path never re-matches; pending window was consumed alongside.
        let second = reg.authorize(Some(&token), UserId::new(1), &HashMap::new(), now);
        assert!(!second.legitimate);
        assert_eq!(second.path, None);
    }

    #[test]
    fn test_token_consumed_even_on_failed_match() {
        let mut reg = registry();
        let now = Timestamp::from_millis(1_000);
        let token = InviteToken::new("t.me/+a");
        mint(&mut reg, UserId::new(1), "t.me/+a", now);

        let impostor = reg.authorize(Some(&token), UserId::new(2), &HashMap::new(), now);
        assert!(!impostor.legitimate);
        assert_eq!(impostor.expected, Some(UserId::new(1)));
        assert_eq!(reg.token_count(), 0);

        // The legitimate holder racing behind the impostor cannot reuse the
        // token binding, but their own pending window still admits them.
        let holder = reg.authorize(Some(&token), UserId::new(1), &HashMap::new(), now);
        assert!(holder.legitimate);
        assert_eq!(holder.path, Some(AuthPath::PendingWindow));
    }

    #[test]
    fn test_stolen_token_beats_live_pending_window() {
        // Even while the victim's pending window is live, an arrival carrying
        // the victim's token under a different identity is illegitimate.
        let mut reg = registry();
        let now = Timestamp::from_millis(1_000);
        let token = InviteToken::new("t.me/+a");
        mint(&mut reg, UserId::new(1), "t.me/+a", now);
        assert_eq!(reg.pending_count(), 1);

        let auth = reg.authorize(Some(&token), UserId::new(2), &HashMap::new(), now);
        assert!(!auth.legitimate);
        assert_eq!(auth.path, Some(AuthPath::Token));
    }

    #[test]
    fn test_pending_window_matches_exactly_once() {
        let mut reg = registry();
        let now = Timestamp::from_millis(1_000);
        mint(&mut reg, UserId::new(1), "t.me/+a", now);

        // Tokenless arrival (platform quirk): window admits it once.
        let first = reg.authorize(None, UserId::new(1), &HashMap::new(), now);
        assert!(first.legitimate);
        assert_eq!(first.path, Some(AuthPath::PendingWindow));

        let second = reg.authorize(None, UserId::new(1), &HashMap::new(), now);
        assert!(!second.legitimate);
    }

    #[test]
    fn test_expired_pending_window_does_not_match() {
        let mut reg = registry();
        let now = Timestamp::from_millis(1_000);
        mint(&mut reg, UserId::new(1), "t.me/+a", now);

        let later = now.saturating_add(Duration::from_secs(25));
        let auth = reg.authorize(None, UserId::new(1), &HashMap::new(), later);
        assert!(!auth.legitimate);
    }

    #[test]
    fn test_historical_fallback_after_indices_purged() {
        let mut reg = registry();
        let now = Timestamp::from_millis(1_000);
        let records = record_with_token(UserId::new(1), now);

        // Both indices empty; the verified record alone vouches.
        let auth = reg.authorize(None, UserId::new(1), &records, now);
        assert!(auth.legitimate);
        assert_eq!(auth.path, Some(AuthPath::History));

        // And it keeps vouching: the fallback is not consumed.
        let again = reg.authorize(None, UserId::new(1), &records, now);
        assert!(again.legitimate);
    }

    #[test]
    fn test_unknown_arrival_is_illegitimate() {
        let mut reg = registry();
        let auth = reg.authorize(None, UserId::new(99), &HashMap::new(), Timestamp::from_millis(1));
        assert!(!auth.legitimate);
        assert_eq!(auth.expected, None);
    }

    #[test]
    fn test_sweep_expires_pending_windows() {
        let mut reg = registry();
        let now = Timestamp::from_millis(1_000);
        mint(&mut reg, UserId::new(1), "t.me/+a", now);
        assert_eq!(reg.pending_count(), 1);

        reg.sweep(now.saturating_add(Duration::from_secs(19)), &HashMap::new());
        assert_eq!(reg.pending_count(), 1);

        reg.sweep(now.saturating_add(Duration::from_secs(21)), &HashMap::new());
        assert_eq!(reg.pending_count(), 0);
    }

    #[test]
    fn test_sweep_drops_stale_token_entries() {
        let mut reg = registry();
        let now = Timestamp::from_millis(1_000);
        mint(&mut reg, UserId::new(1), "t.me/+a", now);

        let mut records = HashMap::new();
        records.insert(UserId::new(1), VerifiedRecord::new(UserId::new(1), "u", now));

        reg.sweep(now.saturating_add(Duration::from_secs(29)), &records);
        assert_eq!(reg.token_count(), 1);

        reg.sweep(now.saturating_add(Duration::from_secs(31)), &records);
        assert_eq!(reg.token_count(), 0);
    }

    #[test]
    fn test_sweep_keeps_tokens_without_record() {
        let mut reg = registry();
        let now = Timestamp::from_millis(1_000);
        mint(&mut reg, UserId::new(1), "t.me/+a", now);

        // No verified record to measure staleness against: entry survives
        // until one exists.
        reg.sweep(now.saturating_add(Duration::from_secs(120)), &HashMap::new());
        assert_eq!(reg.token_count(), 1);
    }
}
