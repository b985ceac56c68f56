use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use sightline_device::Gesture;
use sightline_vision::MatchCandidate;
use tokio::time::Instant;

use crate::state::{FailureReason, RunState};

/// Outcome of a node's predicate for one trace entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PredicateResult {
  NotEvaluated,
  Satisfied {
    #[serde(skip_serializing_if = "Option::is_none")]
    best: Option<MatchCandidate>,
  },
  Unsatisfied,
  Unavailable {
    message: String,
  },
  Error {
    message: String,
  },
}

/// Transient fault behind a retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum RetryCause {
  FrameUnavailable { message: String },
  Unsatisfied,
  DispatchRejected { message: String },
}

/// Decision recorded in a trace entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
  Retry {
    #[serde(flatten)]
    cause: RetryCause,
    delay_ms: u64,
  },
  /// The action went out and a transition was selected.
  Completed { next: String },
  TimedOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<String>,
  },
  Succeeded,
  Failed { reason: FailureReason },
  Interrupted { reason: String },
}

/// One decision of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
  pub at: DateTime<Utc>,
  pub node_id: String,
  /// 1-based evaluation number within the current visit of the node.
  pub attempt: u32,
  pub predicate: PredicateResult,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub action: Option<Gesture>,
  pub event: TraceEvent,
}

/// Mutable state of one run. Owned by exactly one driver.
#[derive(Debug)]
pub struct ExecutionContext {
  run_id: String,
  state: RunState,
  node: String,
  attempts: HashMap<String, u32>,
  visits: HashMap<String, u32>,
  started_at: Instant,
  node_entered_at: Instant,
  trace: Vec<TraceEntry>,
  rng: StdRng,
}

impl ExecutionContext {
  /// A fresh run positioned at `start`.
  ///
  /// With a seed the jitter sequence is reproducible across runs.
  pub fn new(start: &str, jitter_seed: Option<u64>) -> Self {
    let now = Instant::now();
    Self {
      run_id: uuid::Uuid::new_v4().to_string(),
      state: RunState::Running(start.to_string()),
      node: start.to_string(),
      attempts: HashMap::new(),
      visits: HashMap::from([(start.to_string(), 1)]),
      started_at: now,
      node_entered_at: now,
      trace: Vec::new(),
      rng: match jitter_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
      },
    }
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn state(&self) -> &RunState {
    &self.state
  }

  /// The node the run is in, or was in when it stopped.
  pub fn current_node(&self) -> &str {
    &self.node
  }

  /// Failed attempts in the current visit of `node_id`.
  pub fn attempts(&self, node_id: &str) -> u32 {
    self.attempts.get(node_id).copied().unwrap_or(0)
  }

  pub fn visits(&self, node_id: &str) -> u32 {
    self.visits.get(node_id).copied().unwrap_or(0)
  }

  pub fn trace(&self) -> &[TraceEntry] {
    &self.trace
  }

  pub fn elapsed(&self) -> Duration {
    self.started_at.elapsed()
  }

  pub fn time_in_node(&self) -> Duration {
    self.node_entered_at.elapsed()
  }

  pub(crate) fn set_state(&mut self, state: RunState) {
    self.state = state;
  }

  /// Enter `node_id` fresh: attempts reset, entry time reset, visit counted.
  /// Returns the visit count including this one.
  pub(crate) fn enter(&mut self, node_id: &str) -> u32 {
    self.node = node_id.to_string();
    self.attempts.remove(node_id);
    self.node_entered_at = Instant::now();
    self.state = RunState::Running(node_id.to_string());

    let visits = self.visits.entry(node_id.to_string()).or_insert(0);
    *visits += 1;
    *visits
  }

  /// Count a failed attempt at the current node and return the new total.
  pub(crate) fn bump_attempt(&mut self) -> u32 {
    let attempts = self.attempts.entry(self.node.clone()).or_insert(0);
    *attempts += 1;
    *attempts
  }

  pub(crate) fn record(
    &mut self,
    attempt: u32,
    predicate: PredicateResult,
    action: Option<Gesture>,
    event: TraceEvent,
  ) {
    self.trace.push(TraceEntry {
      at: Utc::now(),
      node_id: self.node.clone(),
      attempt,
      predicate,
      action,
      event,
    });
  }

  pub(crate) fn rng(&mut self) -> &mut StdRng {
    &mut self.rng
  }

  pub(crate) fn into_parts(self) -> (String, RunState, Vec<TraceEntry>) {
    (self.run_id, self.state, self.trace)
  }
}
