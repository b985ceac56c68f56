use thiserror::Error;

/// Reasons a graph document is rejected at load time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
  #[error("duplicate node id: {node_id}")]
  DuplicateNodeId { node_id: String },

  #[error("node '{node_id}' references unknown node '{target}'")]
  UnknownTarget { node_id: String, target: String },

  #[error("start node '{start}' does not exist")]
  StartNotFound { start: String },

  #[error("node '{node_id}' has no transitions and no default")]
  NoOutgoing { node_id: String },

  #[error("no terminal target is reachable from start node '{start}'")]
  NoReachableTerminal { start: String },

  #[error("node '{node_id}' references unknown template '{template}'")]
  UnknownTemplate { node_id: String, template: String },

  #[error("node '{node_id}' has an invalid region: {message}")]
  InvalidRegion { node_id: String, message: String },

  #[error("node '{node_id}' has an invalid point: {message}")]
  InvalidPoint { node_id: String, message: String },

  #[error("node '{node_id}' has threshold {threshold} outside [0, 1]")]
  InvalidThreshold { node_id: String, threshold: f32 },

  #[error("node '{node_id}' has an invalid text filter: {message}")]
  InvalidFilter { node_id: String, message: String },

  #[error("node '{node_id}' has an invalid predicate: {message}")]
  InvalidPredicate { node_id: String, message: String },

  #[error("node '{node_id}' taps the matched location but has no recognition predicate")]
  MatchedTapWithoutPredicate { node_id: String },

  #[error("node '{node_id}' has an invalid retry policy: {message}")]
  InvalidRetryPolicy { node_id: String, message: String },

  #[error("node '{node_id}' has a zero timeout")]
  InvalidTimeout { node_id: String },

  #[error("node '{node_id}' has max_visits of zero")]
  InvalidVisitLimit { node_id: String },
}
