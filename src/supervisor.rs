/// Runs connection sessions and decides what happens when one ends
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::watch;

use crate::bluetooth::{ConnectionSession, Transport};
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::database::RecordSink;
use crate::error::SessionError;
use crate::pipeline::{NotificationPipeline, PipelineStats, ThrottleGate};
use crate::utils::format_datetime;

const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Reconnects after a lost link. `max_attempts == 0` ends the process on the
/// first link loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            max_attempts: 0,
            initial_backoff: Duration::from_secs(5),
            max_backoff: MAX_BACKOFF,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect number `attempt` (zero based), doubling each time
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Run sessions until one ends cleanly or fails in a way the policy does not retry.
///
/// Only `LinkLost` is retried. The consecutive-failure count resets after a
/// session that received at least one notification. Every session gets a
/// fresh throttle gate.
pub async fn supervise<T, S, C>(
    config: &SessionConfig,
    transport: &T,
    sink: &S,
    clock: &C,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SessionError>
where
    T: Transport,
    S: RecordSink,
    C: Clock,
{
    let policy = config.reconnect;
    let mut reconnects = 0u32;

    loop {
        let mut session = ConnectionSession::new(config.address);
        let mut pipeline =
            NotificationPipeline::new(sink, ThrottleGate::from_secs(config.send_interval_secs));

        let result = session
            .run(transport, &mut pipeline, clock, &mut shutdown)
            .await;
        debug!("Session ended in state {:?}", session.state());
        log_summary(&pipeline);

        match result {
            Ok(report) => {
                if report.identity.is_none() {
                    info!("Session cancelled before the device was identified");
                }
                return Ok(());
            }
            Err(SessionError::LinkLost { address }) => {
                if pipeline.stats().received > 0 {
                    reconnects = 0;
                }
                if reconnects >= policy.max_attempts {
                    return Err(SessionError::LinkLost { address });
                }

                let delay = policy.backoff(reconnects);
                reconnects += 1;
                warn!(
                    "Link to {} lost, reconnecting in {}s (attempt {}/{})",
                    address,
                    delay.as_secs(),
                    reconnects,
                    policy.max_attempts
                );

                tokio::select! {
                    biased;
                    Ok(_) = shutdown.wait_for(|stop| *stop) => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

fn log_summary<S: RecordSink>(pipeline: &NotificationPipeline<'_, S>) {
    let stats: PipelineStats = pipeline.stats();
    info!(
        "Session summary: {} notifications, {} malformed, {} throttled, {} stored, {} failed writes, {} discarded",
        stats.received,
        stats.malformed,
        stats.throttled,
        stats.forwarded,
        stats.write_failures,
        stats.discarded
    );
    if let Some(last) = pipeline.gate().last_forwarded_at() {
        info!("Last stored reading from {}", format_datetime(&last));
    }
}
