use std::time::Duration;

use sightline_graph::{Backoff, RetryBackoff};

/// Delay before the retry that follows failed attempt number `attempt` (1-based).
///
/// Constant waits `initial`, linear `initial * attempt`, exponential
/// `initial * 2^(attempt - 1)`. Every delay is capped at `max`.
pub fn delay_for(backoff: &Backoff, attempt: u32) -> Duration {
  let attempt = attempt.max(1);
  let delay = match backoff.kind {
    RetryBackoff::Constant => backoff.initial,
    RetryBackoff::Linear => backoff.initial.saturating_mul(attempt),
    RetryBackoff::Exponential => {
      let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
      backoff.initial.saturating_mul(factor)
    }
  };
  delay.min(backoff.max)
}
