//! Liveness sweeper
//!
//! Agents prove liveness by polling. A session whose agent has not been
//! seen for the heartbeat timeout is unregistered, which resolves any
//! command still waiting on it as lost instead of letting it run into its
//! own timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tether_core::time::{current_time_millis, liveness_cutoff, silence};

use super::{SessionHandle, SessionRegistry};

/// Run the liveness sweep until cancelled.
///
/// # Arguments
///
/// * `registry` - The session registry to sweep
/// * `heartbeat_timeout` - How long an agent may stay silent
/// * `interval` - Time between sweeps
/// * `cancel` - Cancellation token for graceful shutdown
pub async fn run_liveness_sweep(
    registry: Arc<SessionRegistry>,
    heartbeat_timeout: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);

    tracing::info!(
        "Starting liveness sweeper (heartbeat timeout: {:?}, check interval: {:?})",
        heartbeat_timeout,
        interval
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep_stale_sessions(&registry, current_time_millis(), heartbeat_timeout).await;
            }
            _ = cancel.cancelled() => {
                tracing::info!("Liveness sweeper shutting down");
                break;
            }
        }
    }
}

/// Unregister sessions not seen since `now - heartbeat_timeout`.
///
/// Returns how many sessions this sweep tore down.
pub async fn sweep_stale_sessions(
    registry: &SessionRegistry,
    now: u64,
    heartbeat_timeout: Duration,
) -> usize {
    let cutoff = liveness_cutoff(now, heartbeat_timeout);
    let mut reaped = 0;

    for session in registry.stale_sessions(cutoff) {
        if reap_if_silent(registry, &session, now, cutoff).await {
            reaped += 1;
        }
    }

    if reaped > 0 {
        tracing::info!("Reaped {} silent sessions", reaped);
    }
    reaped
}

async fn reap_if_silent(
    registry: &SessionRegistry,
    session: &Arc<SessionHandle>,
    now: u64,
    cutoff: u64,
) -> bool {
    // The agent may have polled since the snapshot was taken
    if session.last_seen_at() >= cutoff {
        return false;
    }

    tracing::info!(
        "Reaping silent session {} (last seen {:?} ago)",
        session.id,
        silence(now, session.last_seen_at())
    );
    // False means a disconnect handler won the race
    registry.evict(session).await
}
