//! Membership gate core
//!
//! The invite-credential lifecycle and anti-impersonation verification
//! engine: subscription verifier, credential registry, spam throttle, join
//! arbiter and the background janitor, orchestrated by [`GateService`].

pub mod arbiter;
pub mod conversation;
pub mod janitor;
pub mod platform;
pub mod registry;
pub mod service;
pub mod throttle;
pub mod types;
pub mod verifier;

pub use arbiter::{JoinArbiter, JoinOutcome};
pub use conversation::{ConversationState, Conversations};
pub use janitor::Janitor;
pub use platform::{
    ArrivalEvent, InviteIssuer, MemberGovernor, MembershipOracle, MembershipStatus,
    NotificationSink, PlatformError,
};
pub use registry::{
    AuthPath, Authorization, Credential, CredentialRegistry, PendingWindow, RegistryError,
    RegistryPolicy,
};
pub use service::{
    GateService, GateState, PlatformHandles, StopOutcome, SupportOutcome, VerificationOutcome,
};
pub use throttle::{SpamThrottle, ThrottleVerdict};
pub use types::{ChannelRef, InviteToken, Timestamp, UserId};
pub use verifier::{SubscriptionReport, SubscriptionVerifier};
