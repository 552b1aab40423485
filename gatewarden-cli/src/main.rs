//! Gatewarden command line
//!
//! `validate` checks a configuration file; `simulate` replays a JSON-lines
//! event script through the gate service against the in-memory platform,
//! printing every decision. The simulator is the offline stand-in for a
//! real platform adapter.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gatewarden_core::config::GateConfig;
use gatewarden_core::core_gate::{
    ArrivalEvent, ChannelRef, InviteToken, Janitor, MembershipStatus, UserId,
};
use gatewarden_core::shutdown::ShutdownCoordinator;
use gatewarden_core::test_utils::MemoryPlatform;
use gatewarden_core::{init_logging, GateService, PlatformHandles};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "gatewarden", about = "Private-group membership gate")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a configuration file
    Validate {
        /// Path to the TOML configuration
        #[arg(long)]
        config: PathBuf,
    },
    /// Replay a JSON-lines event script through the gate
    Simulate {
        /// Path to the TOML configuration; a demo config is used if omitted
        #[arg(long)]
        config: Option<PathBuf>,
        /// Path to the event script, one JSON event per line
        #[arg(long)]
        events: PathBuf,
    },
}

/// One scripted event. `arrive` can reference the token granted to a user
/// earlier in the script via `token_of`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SimEvent {
    Subscribe {
        user: i64,
        channel: String,
        status: MembershipStatus,
    },
    Verify {
        user: i64,
        handle: String,
    },
    Arrive {
        user: i64,
        handle: String,
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        token_of: Option<i64>,
    },
    Support {
        user: i64,
    },
    Text {
        user: i64,
        handle: String,
        text: String,
    },
    Stop {
        user: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            let config = GateConfig::from_file(&config)
                .with_context(|| format!("invalid configuration: {}", config.display()))?;
            init_logging(&config.logging).ok();
            println!(
                "configuration ok: destination {}, {} required channel(s)",
                config.destination_chat,
                config.required_channels.len()
            );
            Ok(())
        }
        Commands::Simulate { config, events } => {
            let config = match config {
                Some(path) => GateConfig::from_file(&path)
                    .with_context(|| format!("invalid configuration: {}", path.display()))?,
                None => demo_config(),
            };
            init_logging(&config.logging).ok();
            gatewarden_core::metrics::init_metrics();
            simulate(config, &events).await
        }
    }
}

/// Built-in configuration for script runs without a config file.
fn demo_config() -> GateConfig {
    GateConfig {
        destination_chat: "-100500".to_string(),
        operator_chat: "-100900".to_string(),
        support_thread: Some(1),
        log_thread: Some(2),
        required_channels: vec![
            ChannelRef::new("@alpha", "Alpha"),
            ChannelRef::new("@beta", "Beta"),
        ],
        data_dir: std::env::temp_dir().join("gatewarden-sim"),
        ..Default::default()
    }
}

async fn simulate(config: GateConfig, events: &PathBuf) -> Result<()> {
    let script = std::fs::read_to_string(events)
        .with_context(|| format!("cannot read event script: {}", events.display()))?;

    let platform = Arc::new(MemoryPlatform::new());
    let destination = config.destination_chat.clone();
    let policy = config.policy.clone();
    let service = GateService::new(config, PlatformHandles::from_shared(platform.clone()));

    let shutdown = Arc::new(ShutdownCoordinator::new(Duration::from_millis(100)));
    let janitor = Janitor::new(
        service.state(),
        service.throttle_store(),
        policy.throttle_sweep_interval,
        policy.join_sweep_interval,
    );
    let janitor_handle = janitor.spawn(shutdown.clone());

    // Last token granted per user, for `token_of` references.
    let mut granted: HashMap<i64, InviteToken> = HashMap::new();

    for (lineno, line) in script.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: SimEvent = serde_json::from_str(line)
            .with_context(|| format!("bad event on line {}", lineno + 1))?;

        match event {
            SimEvent::Subscribe {
                user,
                channel,
                status,
            } => {
                platform.set_membership(&channel, UserId::new(user), status);
                println!("[{lineno}] subscribe user={user} channel={channel}");
            }
            SimEvent::Verify { user, handle } => {
                let outcome = service
                    .handle_verification_request(UserId::new(user), &handle)
                    .await;
                if let gatewarden_core::core_gate::VerificationOutcome::Granted { token, .. } =
                    &outcome
                {
                    granted.insert(user, token.clone());
                }
                println!("[{lineno}] verify user={user} -> {outcome:?}");
            }
            SimEvent::Arrive {
                user,
                handle,
                token,
                token_of,
            } => {
                let used_token = token
                    .map(InviteToken::new)
                    .or_else(|| token_of.and_then(|u| granted.get(&u).cloned()));
                let outcome = service
                    .handle_arrival(ArrivalEvent {
                        destination: destination.clone(),
                        identity: UserId::new(user),
                        display_handle: handle,
                        used_token,
                        new_status: MembershipStatus::Member,
                    })
                    .await;
                println!("[{lineno}] arrive user={user} -> {outcome:?}");
            }
            SimEvent::Support { user } => {
                let outcome = service.handle_support_request(UserId::new(user)).await;
                println!("[{lineno}] support user={user} -> {outcome:?}");
            }
            SimEvent::Text { user, handle, text } => {
                let outcome = service
                    .handle_support_text(UserId::new(user), &handle, &text)
                    .await;
                println!("[{lineno}] text user={user} -> {outcome:?}");
            }
            SimEvent::Stop { user } => {
                let outcome = service.handle_stop(UserId::new(user)).await;
                println!("[{lineno}] stop user={user} -> {outcome:?}");
            }
        }
    }

    shutdown.trigger();
    janitor_handle.await.ok();

    info!("simulation finished");
    println!(
        "platform calls: {} invites issued, {} revoked, {} members removed, {} notices",
        platform.issued_invites().len(),
        platform.revoked_invites().len(),
        platform.removed_members().len(),
        platform.notices().len(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_script_parses() {
        let lines = [
            r#"{"type":"subscribe","user":1,"channel":"@alpha","status":"member"}"#,
            r#"{"type":"verify","user":1,"handle":"alice"}"#,
            r#"{"type":"arrive","user":2,"handle":"mallory","token_of":1}"#,
            r#"{"type":"stop","user":1}"#,
        ];
        for line in lines {
            serde_json::from_str::<SimEvent>(line).unwrap();
        }
    }

    #[test]
    fn test_demo_config_is_valid() {
        demo_config().validate().unwrap();
    }
}
