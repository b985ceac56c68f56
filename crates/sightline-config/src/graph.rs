use serde::{Deserialize, Serialize};

use crate::geometry::ResolutionDef;
use crate::node::NodeDef;
use crate::retry::RetryDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDef {
  pub graph_id: String,
  pub name: String,
  pub start: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reference_resolution: Option<ResolutionDef>,
  #[serde(default)]
  pub defaults: DefaultsDef,
  pub nodes: Vec<NodeDef>,
}

/// Graph-wide fallbacks for nodes that leave retry or timeout unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultsDef {
  #[serde(default)]
  pub retry: RetryDef,
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
}

impl Default for DefaultsDef {
  fn default() -> Self {
    Self {
      retry: RetryDef::default(),
      timeout_ms: default_timeout_ms(),
    }
  }
}

fn default_timeout_ms() -> u64 {
  30_000
}
