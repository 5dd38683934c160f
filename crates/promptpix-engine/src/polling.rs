use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use promptpix_contracts::GenerationError;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Outcome of a single poll iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep<T> {
    Pending,
    Succeeded(T),
    Failed(GenerationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollError {
    Exhausted { attempts: u32 },
    Failed(GenerationError),
}

impl PollError {
    /// Maps exhaustion through `on_exhausted`; failures pass through.
    pub fn into_generation_error(
        self,
        on_exhausted: impl FnOnce(u32) -> GenerationError,
    ) -> GenerationError {
        match self {
            PollError::Exhausted { attempts } => on_exhausted(attempts),
            PollError::Failed(err) => err,
        }
    }
}

/// Runs `step` up to `policy.max_attempts` times, sleeping `policy.interval`
/// before each attempt. Cancellation interrupts the sleep and is reported as
/// [`GenerationError::Cancelled`].
pub async fn poll_until<T, F, Fut>(
    policy: PollPolicy,
    clock: &dyn Clock,
    cancel: &CancellationToken,
    mut step: F,
) -> Result<T, PollError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollStep<T>>,
{
    for attempt in 1..=policy.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Failed(GenerationError::Cancelled)),
            _ = clock.sleep(policy.interval) => {}
        }
        match step(attempt).await {
            PollStep::Pending => continue,
            PollStep::Succeeded(value) => return Ok(value),
            PollStep::Failed(err) => return Err(PollError::Failed(err)),
        }
    }
    Err(PollError::Exhausted {
        attempts: policy.max_attempts,
    })
}
