//! Configuration for the gate
//!
//! Defaults, then an optional TOML file, then `GATEWARDEN_*` environment
//! overrides, then validation.

use crate::core_gate::types::ChannelRef;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Private destination chat the gate protects
    pub destination_chat: String,

    /// Operator chat that receives audit and support notifications
    pub operator_chat: String,

    /// Thread in the operator chat for support messages
    pub support_thread: Option<i64>,

    /// Thread in the operator chat for audit/log messages
    pub log_thread: Option<i64>,

    /// Channels a user must be subscribed to before a credential is minted
    pub required_channels: Vec<ChannelRef>,

    /// Directory holding the persisted documents
    pub data_dir: PathBuf,

    /// Timing and quota policy
    pub policy: GatePolicy,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Timing and quota policy. Defaults are the reference policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatePolicy {
    /// Invite credential time-to-live
    #[serde(with = "humantime_serde")]
    pub invite_ttl: Duration,

    /// Pending-window time-to-live (longer than the invite TTL to absorb
    /// platform delivery latency)
    #[serde(with = "humantime_serde")]
    pub pending_ttl: Duration,

    /// Staleness bound for swept token entries
    #[serde(with = "humantime_serde")]
    pub token_stale_bound: Duration,

    /// Interval of the throttle sweep
    #[serde(with = "humantime_serde")]
    pub throttle_sweep_interval: Duration,

    /// Interval of the join-state sweep
    #[serde(with = "humantime_serde")]
    pub join_sweep_interval: Duration,

    /// Penalty for repeat verification requests after a credential was issued
    #[serde(with = "humantime_serde")]
    pub remint_penalty: Duration,

    /// Penalty for exceeding the support-message quota
    #[serde(with = "humantime_serde")]
    pub support_penalty: Duration,

    /// Support messages allowed before the penalty fires
    pub support_quota: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            destination_chat: String::new(),
            operator_chat: String::new(),
            support_thread: None,
            log_thread: None,
            required_channels: vec![],
            data_dir: PathBuf::from("./data"),
            policy: GatePolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            invite_ttl: Duration::from_secs(15),
            pending_ttl: Duration::from_secs(20),
            token_stale_bound: Duration::from_secs(30),
            throttle_sweep_interval: Duration::from_secs(60),
            join_sweep_interval: Duration::from_secs(10),
            remint_penalty: Duration::from_secs(2 * 60),
            support_penalty: Duration::from_secs(10 * 60),
            support_quota: 3,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

impl GateConfig {
    /// Load configuration from a TOML file, then apply environment
    /// overrides.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;
        let mut config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only.
    ///
    /// Variables follow the pattern `GATEWARDEN_<SECTION>_<KEY>`, e.g.
    /// `GATEWARDEN_GATE_DESTINATION_CHAT=-1001234`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(chat) = env::var("GATEWARDEN_GATE_DESTINATION_CHAT") {
            self.destination_chat = chat;
        }
        if let Ok(chat) = env::var("GATEWARDEN_GATE_OPERATOR_CHAT") {
            self.operator_chat = chat;
        }
        if let Ok(thread) = env::var("GATEWARDEN_GATE_SUPPORT_THREAD") {
            self.support_thread = Some(thread.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid support thread: {}", e))
            })?);
        }
        if let Ok(thread) = env::var("GATEWARDEN_GATE_LOG_THREAD") {
            self.log_thread = Some(
                thread
                    .parse()
                    .map_err(|e| ConfigError::InvalidValue(format!("Invalid log thread: {}", e)))?,
            );
        }
        if let Ok(dir) = env::var("GATEWARDEN_STORE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(level) = env::var("GATEWARDEN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = env::var("GATEWARDEN_LOG_JSON") {
            self.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }
        Ok(())
    }

    /// Validate configuration.
    ///
    /// The required-channel list is deliberately not rejected when empty:
    /// the verifier fails closed on it at request time instead of keeping
    /// the whole process from starting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destination_chat.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "destination_chat must be set".to_string(),
            ));
        }
        if self.operator_chat.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "operator_chat must be set".to_string(),
            ));
        }
        if self.policy.invite_ttl.is_zero() || self.policy.pending_ttl.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "invite_ttl and pending_ttl must be greater than 0".to_string(),
            ));
        }
        if self.policy.pending_ttl < self.policy.invite_ttl {
            return Err(ConfigError::ValidationFailed(
                "pending_ttl must not be shorter than invite_ttl".to_string(),
            ));
        }
        if self.policy.support_quota == 0 {
            return Err(ConfigError::ValidationFailed(
                "support_quota must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Path of the verified-user document.
    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    /// Path of the throttle document.
    pub fn throttle_path(&self) -> PathBuf {
        self.data_dir.join("spam_protection.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> GateConfig {
        GateConfig {
            destination_chat: "-1009".to_string(),
            operator_chat: "-1008".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_needs_chats() {
        assert!(GateConfig::default().validate().is_err());
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn test_pending_ttl_must_cover_invite_ttl() {
        let mut config = minimal();
        config.policy.pending_ttl = Duration::from_secs(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = minimal();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_with_durations() {
        let mut config = minimal();
        config.required_channels = vec![ChannelRef::new("@a", "A")];
        let text = toml::to_string_pretty(&config).unwrap();
        let back: GateConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.policy.invite_ttl, Duration::from_secs(15));
        assert_eq!(back.required_channels.len(), 1);
    }

    #[test]
    fn test_document_paths_under_data_dir() {
        let config = minimal();
        assert!(config.users_path().ends_with("users.json"));
        assert!(config.throttle_path().ends_with("spam_protection.json"));
    }
}
