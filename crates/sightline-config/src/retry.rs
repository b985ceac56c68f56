use serde::{Deserialize, Serialize};

use crate::enums::RetryBackoff;

/// Retry policy for a node.
///
/// `max_attempts` is mandatory: there is no "retry forever" setting. Long waits
/// are expressed with a large explicit bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryDef {
  pub max_attempts: u32,
  #[serde(default)]
  pub backoff: RetryBackoff,
  #[serde(default = "default_initial_delay_ms")]
  pub initial_delay_ms: u64,
  #[serde(default = "default_max_delay_ms")]
  pub max_delay_ms: u64,
}

impl Default for RetryDef {
  fn default() -> Self {
    Self {
      max_attempts: 30,
      backoff: RetryBackoff::Constant,
      initial_delay_ms: default_initial_delay_ms(),
      max_delay_ms: default_max_delay_ms(),
    }
  }
}

fn default_initial_delay_ms() -> u64 {
  500
}

fn default_max_delay_ms() -> u64 {
  5_000
}
