//! Exponential backoff for change-feed resubscription.
//!
//! When the feed subscription drops, the push listener calls
//! [`resubscribe_loop`] to keep retrying with increasing delays until
//! either a subscription is established or the job's
//! [`CancellationToken`] fires. The [`Backoff`] outlives a single call,
//! so a feed that accepts a subscription and drops it at once keeps
//! backing off instead of reconnecting in a tight loop.

use std::time::Duration;

use radar_core::ports::{ChangeFeed, FeedSubscription};
use radar_core::types::ProjectId;
use tokio_util::sync::CancellationToken;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// A subscription that lived at least this long resets the backoff.
    pub stable_after: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            stable_after: Duration::from_secs(10),
        }
    }
}

/// Calculate the next backoff delay, clamped to
/// [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Backoff state carried across subscriptions of one listener.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    delay: Duration,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            config: config.clone(),
            delay: config.initial_delay,
        }
    }

    /// Delay the next wait will use.
    pub fn current(&self) -> Duration {
        self.delay
    }

    /// Return the delay to wait now and grow it for the next failure.
    pub fn advance(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = next_delay(delay, &self.config);
        delay
    }

    pub fn reset(&mut self) {
        self.delay = self.config.initial_delay;
    }

    /// Whether a subscription that lived `lifetime` counts as healthy.
    pub fn is_stable(&self, lifetime: Duration) -> bool {
        lifetime >= self.config.stable_after
    }
}

/// Subscribe to the feed, retrying with exponential backoff.
///
/// The first attempt is immediate. Returns `None` once `cancel` fires.
pub async fn resubscribe_loop(
    feed: &dyn ChangeFeed,
    project_id: ProjectId,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> Option<FeedSubscription> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        tokio::select! {
            _ = cancel.cancelled() => return None,
            result = feed.subscribe(project_id) => {
                match result {
                    Ok(subscription) => {
                        if attempt > 1 {
                            tracing::info!(%project_id, attempt, "Resubscribed to change feed");
                        }
                        return Some(subscription);
                    }
                    Err(e) => {
                        tracing::warn!(
                            %project_id,
                            error = %e,
                            delay_ms = backoff.current().as_millis() as u64,
                            "Feed subscription attempt {attempt} failed",
                        );
                    }
                }
            }
        }

        if !wait(backoff.advance(), cancel).await {
            return None;
        }
    }
}

/// Sleep for `delay`. Returns `false` if `cancel` fired first.
pub async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
