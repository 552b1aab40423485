//! Durable store: two independent JSON documents (verified user records and
//! throttle records), loaded at startup and rewritten wholesale on each
//! mutation.

mod document;
pub mod records;

pub use document::{DocumentStore, StoreError, StoreResult};
pub use records::{ThrottleState, VerifiedRecord};
