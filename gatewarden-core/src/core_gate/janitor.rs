//! Background janitor
//!
//! Two independent fixed-interval sweeps in one task: a slow one for
//! expired throttle entries (persisting only when something was removed)
//! and a fast one for the credential registry's indices. Stops on the
//! shutdown signal.

use super::service::GateState;
use super::types::Timestamp;
use crate::core_store::{DocumentStore, ThrottleState};
use crate::shutdown::ShutdownCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub struct Janitor {
    state: Arc<RwLock<GateState>>,
    throttle_store: DocumentStore<ThrottleState>,
    throttle_sweep_interval: Duration,
    join_sweep_interval: Duration,
}

impl Janitor {
    pub fn new(
        state: Arc<RwLock<GateState>>,
        throttle_store: DocumentStore<ThrottleState>,
        throttle_sweep_interval: Duration,
        join_sweep_interval: Duration,
    ) -> Self {
        Self {
            state,
            throttle_store,
            throttle_sweep_interval,
            join_sweep_interval,
        }
    }

    /// Spawn the sweep loop; it runs until `shutdown` fires.
    pub fn spawn(self, shutdown: Arc<ShutdownCoordinator>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            let mut throttle_tick = tokio::time::interval(self.throttle_sweep_interval);
            let mut join_tick = tokio::time::interval(self.join_sweep_interval);
            // Skip the immediate first tick of both intervals.
            throttle_tick.tick().await;
            join_tick.tick().await;

            info!("janitor started");
            loop {
                tokio::select! {
                    _ = throttle_tick.tick() => self.sweep_throttle().await,
                    _ = join_tick.tick() => self.sweep_join_state().await,
                    _ = shutdown_rx.recv() => {
                        info!("janitor stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Drop expired throttle entries; rewrite the document only on change.
    async fn sweep_throttle(&self) {
        let now = Timestamp::now();
        let snapshot = {
            let mut guard = self.state.write().await;
            if guard.throttle.sweep(now) {
                Some(guard.throttle.entries().clone())
            } else {
                None
            }
        };

        if let Some(entries) = snapshot {
            debug!(remaining = entries.len(), "throttle sweep removed entries");
            if let Err(e) = self.throttle_store.save(&entries) {
                error!(error = %e, "failed to persist throttle records after sweep");
            }
        }
    }

    /// Drop expired pending windows and stale token bindings.
    async fn sweep_join_state(&self) {
        let now = Timestamp::now();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.registry.sweep(now, &state.users);
    }
}
