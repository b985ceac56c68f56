//! Execution events and notifiers for observability.
//!
//! Events are emitted as a run progresses so consumers can stream them to a
//! UI, persist them, or ignore them. The trace in the context remains the
//! authoritative record; events are a live view of it.

use serde::{Deserialize, Serialize};
use sightline_device::Gesture;
use tokio::sync::mpsc;

use crate::state::FailureReason;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// A run has started at the graph's start node.
  RunStarted { run_id: String, graph_id: String },

  /// A node has been entered, including re-entry through `stay`.
  NodeEntered {
    run_id: String,
    node_id: String,
    visit: u32,
  },

  /// A transient fault was absorbed and the node will be retried.
  RetryScheduled {
    run_id: String,
    node_id: String,
    attempt: u32,
    delay_ms: u64,
  },

  /// A gesture was accepted by the input sink.
  ActionDispatched {
    run_id: String,
    node_id: String,
    gesture: Gesture,
  },

  /// A node finished and selected its next target.
  NodeCompleted {
    run_id: String,
    node_id: String,
    next: String,
  },

  /// A node ran out of time before its predicate was satisfied.
  NodeTimedOut { run_id: String, node_id: String },

  /// The run reached a terminal target.
  RunSucceeded { run_id: String, node_id: String },

  /// The run failed.
  RunFailed {
    run_id: String,
    reason: FailureReason,
  },

  /// The run was stopped by an interrupt.
  RunInterrupted { run_id: String, reason: String },
}

/// Trait for receiving execution events.
///
/// The executor calls `notify` for each event; implementations decide what
/// to do with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a run; volume is a handful of
  // events per node visit.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // The receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
