use std::thread;
use std::time::Duration;

use crate::engine::RecognitionEngine;
use crate::error::EngineError;

const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Delay before the attempt after one that waited `current`: doubled,
/// capped at five seconds.
fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(MAX_BACKOFF)
}

/// Warms the engine up, retrying up to `policy.max_attempts` times with a
/// backoff that starts at `policy.backoff` and doubles per retry up to five
/// seconds. Returns the number of attempts that were needed.
pub fn warm_up_with_retry(
    engine: &dyn RecognitionEngine,
    policy: RetryPolicy,
) -> Result<u32, EngineError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.backoff;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match engine.warm_up() {
            Ok(()) => {
                log::debug!("engine={} warmed up attempt={attempt}", engine.name());
                return Ok(attempt);
            }
            Err(err) if attempt < max_attempts => {
                log::warn!(
                    "engine={} warm-up failed attempt={attempt}/{max_attempts}: {err}",
                    engine.name()
                );
                if !backoff.is_zero() {
                    thread::sleep(backoff);
                }
                backoff = next_backoff(backoff);
            }
            Err(err) => return Err(err),
        }
    }
}
