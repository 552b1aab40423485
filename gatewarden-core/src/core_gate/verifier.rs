//! Subscription verifier
//!
//! Queries the membership oracle for every required channel and aggregates
//! the result. Fail closed everywhere: a per-channel query error counts as
//! not subscribed for that channel only, and a missing or malformed channel
//! list reports every configured channel missing.

use super::platform::MembershipOracle;
use super::types::{ChannelRef, UserId};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, warn};

/// Aggregated verification outcome for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionReport {
    pub all_subscribed: bool,
    /// Labels of channels the user is not subscribed to
    pub missing: Vec<String>,
}

pub struct SubscriptionVerifier {
    oracle: Arc<dyn MembershipOracle>,
    channels: Vec<ChannelRef>,
}

impl SubscriptionVerifier {
    pub fn new(oracle: Arc<dyn MembershipOracle>, channels: Vec<ChannelRef>) -> Self {
        Self { oracle, channels }
    }

    pub fn channels(&self) -> &[ChannelRef] {
        &self.channels
    }

    /// Check the user against every required channel.
    ///
    /// Queries run independently and are joined; one failing channel does
    /// not abort the rest.
    pub async fn verify(&self, user: UserId) -> SubscriptionReport {
        if self.channels.is_empty() {
            error!("required channel list is empty, failing closed");
            return SubscriptionReport {
                all_subscribed: false,
                missing: vec![],
            };
        }

        let usable: Vec<&ChannelRef> =
            self.channels.iter().filter(|c| !c.id.is_empty()).collect();
        if usable.len() != self.channels.len() {
            error!("required channel list is malformed, failing closed");
            return SubscriptionReport {
                all_subscribed: false,
                missing: self.channels.iter().map(|c| c.label().to_string()).collect(),
            };
        }

        let queries = usable.iter().map(|channel| async {
            let subscribed = match self.oracle.membership_status(&channel.id, user).await {
                Ok(status) => status.is_subscribed(),
                Err(e) => {
                    warn!(channel = %channel.id, %user, error = %e, "membership query failed, treating as not subscribed");
                    false
                }
            };
            (subscribed, *channel)
        });
        let results = join_all(queries).await;

        let missing: Vec<String> = results
            .iter()
            .filter(|(subscribed, _)| !subscribed)
            .map(|(_, channel)| channel.label().to_string())
            .collect();

        SubscriptionReport {
            all_subscribed: missing.is_empty(),
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_gate::platform::MembershipStatus;
    use crate::test_utils::MemoryPlatform;

    fn channels() -> Vec<ChannelRef> {
        vec![
            ChannelRef::new("@alpha", "Alpha"),
            ChannelRef::new("@beta", "Beta"),
        ]
    }

    #[tokio::test]
    async fn test_all_subscribed() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.set_membership("@alpha", UserId::new(1), MembershipStatus::Member);
        platform.set_membership("@beta", UserId::new(1), MembershipStatus::Admin);

        let verifier = SubscriptionVerifier::new(platform, channels());
        let report = verifier.verify(UserId::new(1)).await;
        assert!(report.all_subscribed);
        assert!(report.missing.is_empty());
    }

    #[tokio::test]
    async fn test_left_channel_reported_missing() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.set_membership("@alpha", UserId::new(1), MembershipStatus::Member);
        platform.set_membership("@beta", UserId::new(1), MembershipStatus::Left);

        let verifier = SubscriptionVerifier::new(platform, channels());
        let report = verifier.verify(UserId::new(1)).await;
        assert!(!report.all_subscribed);
        assert_eq!(report.missing, vec!["Beta".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_membership_fails_closed() {
        // No membership seeded at all: every channel is missing.
        let platform = Arc::new(MemoryPlatform::new());
        let verifier = SubscriptionVerifier::new(platform, channels());
        let report = verifier.verify(UserId::new(1)).await;
        assert_eq!(report.missing.len(), 2);
    }

    #[tokio::test]
    async fn test_oracle_error_isolated_to_one_channel() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.set_membership("@alpha", UserId::new(1), MembershipStatus::Member);
        platform.set_membership("@beta", UserId::new(1), MembershipStatus::Member);
        platform.fail_oracle_for("@beta");

        let verifier = SubscriptionVerifier::new(platform, channels());
        let report = verifier.verify(UserId::new(1)).await;
        assert!(!report.all_subscribed);
        assert_eq!(report.missing, vec!["Beta".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_channel_list_fails_closed() {
        let platform = Arc::new(MemoryPlatform::new());
        let verifier = SubscriptionVerifier::new(platform, vec![]);
        let report = verifier.verify(UserId::new(1)).await;
        assert!(!report.all_subscribed);
    }

    #[tokio::test]
    async fn test_malformed_channel_entry_fails_closed_for_all() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.set_membership("@alpha", UserId::new(1), MembershipStatus::Member);

        let mut list = channels();
        list.push(ChannelRef::new("", "Ghost"));
        let verifier = SubscriptionVerifier::new(platform, list);

        let report = verifier.verify(UserId::new(1)).await;
        assert!(!report.all_subscribed);
        assert_eq!(report.missing.len(), 3);
    }
}
