use serde::{Deserialize, Serialize};

use crate::action::ActionDef;
use crate::predicate::PredicateDef;
use crate::retry::RetryDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub node_id: String,
  #[serde(default)]
  pub predicate: PredicateDef,
  #[serde(default)]
  pub action: ActionDef,
  /// Evaluated top-down after the action; the first satisfied condition wins.
  #[serde(default)]
  pub transitions: Vec<TransitionDef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<TargetDef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry: Option<RetryDef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  /// Node entered when `timeout_ms` elapses before the predicate is satisfied.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub on_timeout: Option<String>,
  /// Wait on entry before the first frame is acquired.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pre_delay_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub post_delay_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_visits: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDef {
  #[serde(default)]
  pub when: PredicateDef,
  pub next: TargetDef,
}

/// Where control goes after a node completes.
///
/// Serialized as `{"goto": "node"}`, `"stay"` or `"terminal"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetDef {
  Goto(String),
  Stay,
  Terminal,
}
