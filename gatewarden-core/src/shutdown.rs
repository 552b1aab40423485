//! Graceful shutdown coordinator

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub enum ShutdownSignal {
    Graceful,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
}

/// Broadcasts the shutdown signal to background tasks and gives them a
/// bounded window to finish.
pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            shutdown_tx,
            timeout,
        }
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }

    /// Fire the shutdown signal without waiting.
    pub fn trigger(&self) {
        if self.shutdown_tx.send(ShutdownSignal::Graceful).is_err() {
            warn!("no shutdown subscribers");
        }
    }

    /// Initiate graceful shutdown and wait out the drain window.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write().await;
            if *state != ShutdownState::Running {
                warn!("shutdown already in progress");
                return;
            }
            *state = ShutdownState::ShuttingDown;
        }

        info!("initiating graceful shutdown");
        self.trigger();
        tokio::time::sleep(self.timeout).await;
        info!("shutdown complete");
    }

    pub async fn is_running(&self) -> bool {
        *self.state.read().await == ShutdownState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_signal() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(1));
        let mut rx = coordinator.subscribe();
        coordinator.trigger();
        assert!(matches!(rx.recv().await, Ok(ShutdownSignal::Graceful)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flips_state() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        let _rx = coordinator.subscribe();
        assert!(coordinator.is_running().await);
        coordinator.shutdown().await;
        assert!(!coordinator.is_running().await);
    }
}
