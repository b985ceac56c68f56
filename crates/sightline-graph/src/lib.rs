//! Sightline Graph
//!
//! The validated form of a task graph document. A [`TaskGraph`] is built once
//! from a `sightline-config` [`GraphDef`](sightline_config::GraphDef) and the
//! loaded templates, and is immutable afterwards so any number of runs can
//! share it behind an `Arc`.
//!
//! Differences from the configuration types:
//! - every node reference points at an existing node
//! - a terminal target is reachable from the start node
//! - referenced templates exist and regions, thresholds and filters are well formed
//! - graph defaults have been folded into each node's retry policy and timeout

mod error;
mod graph;
mod node;
mod task_graph;
mod validate;

pub use error::GraphError;
pub use graph::Graph;
pub use node::{
  Action, Backoff, Check, Point, Predicate, RetryPolicy, Target, TapTarget, TaskNode, Transition,
};
pub use sightline_config::RetryBackoff;
pub use task_graph::TaskGraph;
