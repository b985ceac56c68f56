use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where a run is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
  Running(String),
  WaitingRetry {
    node: String,
    attempt: u32,
    delay: Duration,
  },
  Interrupted(String),
  Succeeded(String),
  Failed(FailureReason),
}

impl RunState {
  /// Whether the run has stopped for good.
  pub fn is_finished(&self) -> bool {
    matches!(
      self,
      RunState::Interrupted(_) | RunState::Succeeded(_) | RunState::Failed(_)
    )
  }

  /// The node the run is in, for states that have one.
  pub fn node(&self) -> Option<&str> {
    match self {
      RunState::Running(node) | RunState::Succeeded(node) => Some(node),
      RunState::WaitingRetry { node, .. } => Some(node),
      RunState::Interrupted(_) | RunState::Failed(_) => None,
    }
  }
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
  #[error("frame acquisition exhausted at '{node_id}' after {attempts} attempts: {message}")]
  FrameAcquisitionExhausted {
    node_id: String,
    attempts: u32,
    message: String,
  },

  #[error("predicate at '{node_id}' unsatisfied after {attempts} attempts")]
  RetriesExhausted { node_id: String, attempts: u32 },

  #[error("dispatch at '{node_id}' rejected {attempts} times: {message}")]
  DispatchExhausted {
    node_id: String,
    attempts: u32,
    message: String,
  },

  #[error("node '{node_id}' timed out after {timeout_ms}ms")]
  NodeTimeout { node_id: String, timeout_ms: u64 },

  #[error("recognizer unavailable at '{node_id}': {message}")]
  RecognizerUnavailable { node_id: String, message: String },

  #[error("configuration error at '{node_id}': {message}")]
  Configuration { node_id: String, message: String },

  #[error("node '{node_id}' entered more than {max_visits} times")]
  VisitLimit { node_id: String, max_visits: u32 },
}
