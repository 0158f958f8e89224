//! Reconnection supervisor.
//!
//! Watches a connection's transport status. A `Disconnected` transport gets
//! one probation window: if the transport starts signalling, connecting or
//! is ready again before the deadline we go back to watching and leave the
//! actual reconnect to the transport. Otherwise the connection is destroyed.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use crate::connection::{TransportStatus, VoiceConnection};

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// How long a disconnected transport has to show signs of recovery.
    pub probe_timeout: Duration,
}

impl ReconnectPolicy {
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorState {
    Watching,
    Probation { deadline: Instant },
}

/// Why a supervisor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// Someone else destroyed the connection.
    Released,
    /// Probation expired; the supervisor destroyed the connection.
    GaveUp,
}

pub fn spawn_supervisor(
    connection: Arc<VoiceConnection>,
    policy: ReconnectPolicy,
) -> JoinHandle<SupervisorOutcome> {
    tokio::spawn(supervise(connection, policy))
}

async fn supervise(connection: Arc<VoiceConnection>, policy: ReconnectPolicy) -> SupervisorOutcome {
    let mut status = connection.subscribe();
    let mut state = SupervisorState::Watching;

    loop {
        let current = *status.borrow_and_update();
        state = match (state, current) {
            (_, TransportStatus::Destroyed) => return SupervisorOutcome::Released,
            (SupervisorState::Watching, TransportStatus::Disconnected) => {
                warn!(
                    "⚠️  Voice transport for guild {} disconnected, waiting {:?} for recovery",
                    connection.guild(),
                    policy.probe_timeout
                );
                SupervisorState::Probation {
                    deadline: Instant::now() + policy.probe_timeout,
                }
            }
            (
                SupervisorState::Probation { .. },
                TransportStatus::Signalling | TransportStatus::Connecting | TransportStatus::Ready,
            ) => {
                info!(
                    "Voice transport for guild {} is {}, leaving reconnect to it",
                    connection.guild(),
                    current
                );
                SupervisorState::Watching
            }
            (state, _) => state,
        };

        match state {
            SupervisorState::Watching => {
                if status.changed().await.is_err() {
                    return SupervisorOutcome::Released;
                }
            }
            SupervisorState::Probation { deadline } => {
                tokio::select! {
                    changed = status.changed() => {
                        if changed.is_err() {
                            return SupervisorOutcome::Released;
                        }
                    }
                    _ = sleep_until(deadline) => {
                        warn!(
                            "Voice transport for guild {} did not recover, destroying connection",
                            connection.guild()
                        );
                        connection.destroy().await;
                        return SupervisorOutcome::GaveUp;
                    }
                }
            }
        }
    }
}
