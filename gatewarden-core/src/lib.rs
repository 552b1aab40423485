//! Gatewarden core
//!
//! Gates membership in a private chat behind a two-step verification
//! protocol: prove subscription to a set of public channels, then redeem a
//! single-use, short-lived invite credential bound to exactly one identity.
//! Illegitimate joins are detected and reversed.

pub mod config;
pub mod core_gate;
pub mod core_store;
pub mod logging;
pub mod metrics;
pub mod shutdown;
pub mod test_utils;

pub use config::GateConfig;
pub use core_gate::{GateService, PlatformHandles};
pub use logging::init_logging;
