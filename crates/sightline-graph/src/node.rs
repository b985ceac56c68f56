use std::time::Duration;

use sightline_config::RetryBackoff;
use sightline_vision::{Recognizer, Region};

/// A validated task node.
#[derive(Debug, Clone)]
pub struct TaskNode {
  pub node_id: String,
  pub predicate: Predicate,
  pub action: Action,
  /// Evaluated top-down; the first satisfied condition selects the next target.
  pub transitions: Vec<Transition>,
  /// Taken when no transition matches. `Stay` when the document leaves it out.
  pub default: Target,
  pub retry: RetryPolicy,
  /// Maximum time in the node before its predicate is satisfied.
  pub timeout: Duration,
  pub on_timeout: Option<String>,
  /// Wait after entering the node, before its first frame.
  pub pre_delay: Duration,
  /// Settle time between the action and the transition checks.
  pub post_delay: Duration,
  pub max_visits: Option<u32>,
}

/// A recognition condition.
#[derive(Debug, Clone)]
pub enum Predicate {
  Always,
  Check(Check),
  All(Vec<Predicate>),
  Any(Vec<Predicate>),
}

impl Predicate {
  /// Whether evaluating this predicate needs a frame.
  pub fn has_checks(&self) -> bool {
    match self {
      Predicate::Always => false,
      Predicate::Check(_) => true,
      Predicate::All(branches) | Predicate::Any(branches) => {
        branches.iter().any(Predicate::has_checks)
      }
    }
  }

  /// Every recognizer invocation in the predicate, depth first.
  pub fn checks(&self) -> Vec<&Check> {
    let mut out = Vec::new();
    self.collect_checks(&mut out);
    out
  }

  fn collect_checks<'a>(&'a self, out: &mut Vec<&'a Check>) {
    match self {
      Predicate::Always => {}
      Predicate::Check(check) => out.push(check),
      Predicate::All(branches) | Predicate::Any(branches) => {
        for branch in branches {
          branch.collect_checks(out);
        }
      }
    }
  }
}

/// One recognizer invocation with its own threshold.
#[derive(Debug, Clone)]
pub struct Check {
  pub recognizer: Recognizer,
  /// Region in graph coordinates. The whole frame when absent.
  pub region: Option<Region>,
  pub threshold: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
  pub x: u32,
  pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapTarget {
  Point(Point),
  Region(Region),
  /// Centre of the best candidate from the node's predicate.
  Matched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Noop,
  Tap { target: TapTarget, jitter: u32 },
  Swipe { from: Point, to: Point, duration: Duration },
  Wait { duration: Duration },
}

#[derive(Debug, Clone)]
pub struct Transition {
  pub when: Predicate,
  pub next: Target,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
  Node(String),
  /// Re-enter the current node.
  Stay,
  /// End the run successfully.
  Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Evaluations allowed before the node fails. Always at least one.
  pub max_attempts: u32,
  pub backoff: Backoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
  pub kind: RetryBackoff,
  pub initial: Duration,
  pub max: Duration,
}
