use super::BackendError;
use core::{future::Future, time::Duration};
use serde::Deserialize;
use tracing::{trace, warn};

/// How long and how often to poll the settlement backend for a
/// confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay before the second probe.
    pub initial_delay_ms: u64,
    /// Upper bound for the delay between two probes.
    pub max_delay_ms: u64,
    /// Factor by which the delay grows after every unsuccessful probe.
    pub backoff_factor: u32,
    /// Total time after which polling gives up.
    pub max_wait_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 5_000,
            max_delay_ms: 60_000,
            backoff_factor: 2,
            max_wait_ms: 10 * 60_000,
        }
    }
}

impl PollConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    #[error("condition not met after {0:?}")]
    TimedOut(Duration),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Probe until it yields a value.
///
/// The first probe runs immediately. `Ok(None)` and transient backend errors
/// are retried with exponential backoff, any other error ends polling. The
/// whole loop is bounded by [PollConfig::max_wait]; dropping the returned
/// future cancels it.
pub async fn poll_until<T, F, Fut>(config: &PollConfig, mut probe: F) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, BackendError>>,
{
    let max_wait = config.max_wait();
    let attempts = async {
        let mut delay = config.initial_delay();
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            match probe().await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => trace!(attempt, ?delay, "not there yet"),
                Err(BackendError::Transient(reason)) => {
                    warn!(attempt, %reason, "transient backend error, retrying")
                }
                Err(err) => return Err(PollError::Backend(err)),
            }
            tokio::time::sleep(delay).await;
            delay = delay
                .saturating_mul(config.backoff_factor)
                .min(config.max_delay());
        }
    };

    match tokio::time::timeout(max_wait, attempts).await {
        Ok(result) => result,
        Err(_) => Err(PollError::TimedOut(max_wait)),
    }
}
