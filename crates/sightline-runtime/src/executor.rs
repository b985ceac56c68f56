//! The run loop.
//!
//! [`Executor`] owns the shared, read-only parts of a run (graph, recognizers,
//! frame source, input sink) and advances an [`ExecutionContext`] one step at
//! a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sightline_device::{FrameSource, Gesture, InputSink};
use sightline_graph::{Predicate, Target, TaskGraph, TaskNode};
use sightline_vision::{Frame, RecognizerSet};
use tracing::{debug, error, info, instrument, warn};

use crate::action;
use crate::backoff::delay_for;
use crate::context::{ExecutionContext, PredicateResult, RetryCause, TraceEntry, TraceEvent};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::interrupt::Interrupt;
use crate::predicate::{EvalError, Evaluator, Outcome};
use crate::state::{FailureReason, RunState};

/// Frames older than this are treated as an acquisition failure.
pub const DEFAULT_MAX_FRAME_AGE: Duration = Duration::from_secs(5);

/// Knobs that belong to the executor rather than the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
  /// Staleness bound for acquired frames. `None` accepts frames of any age.
  pub max_frame_age: Option<Duration>,
  /// Seed for tap jitter. `None` seeds from the OS.
  pub jitter_seed: Option<u64>,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      max_frame_age: Some(DEFAULT_MAX_FRAME_AGE),
      jitter_seed: None,
    }
  }
}

/// How a run ended, with its full trace.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub run_id: String,
  pub graph_id: String,
  pub state: RunState,
  pub trace: Vec<TraceEntry>,
}

impl RunReport {
  pub fn succeeded(&self) -> bool {
    matches!(self.state, RunState::Succeeded(_))
  }
}

pub struct Executor {
  graph: Arc<TaskGraph>,
  recognizers: Arc<RecognizerSet>,
  frames: Arc<dyn FrameSource>,
  input: Arc<dyn InputSink>,
  config: ExecutorConfig,
  notifier: Arc<dyn ExecutionNotifier>,
}

impl Executor {
  pub fn new(
    graph: Arc<TaskGraph>,
    recognizers: Arc<RecognizerSet>,
    frames: Arc<dyn FrameSource>,
    input: Arc<dyn InputSink>,
  ) -> Self {
    Self {
      graph,
      recognizers,
      frames,
      input,
      config: ExecutorConfig::default(),
      notifier: Arc::new(NoopNotifier),
    }
  }

  pub fn with_config(mut self, config: ExecutorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn graph(&self) -> &TaskGraph {
    &self.graph
  }

  /// A fresh context positioned at the graph's start node.
  pub fn context(&self) -> ExecutionContext {
    ExecutionContext::new(self.graph.start(), self.config.jitter_seed)
  }

  /// Drive a fresh run until it succeeds, fails or is interrupted.
  #[instrument(
    name = "executor_run",
    skip(self, interrupt),
    fields(graph_id = %self.graph.graph_id)
  )]
  pub async fn run(&self, interrupt: &Interrupt) -> RunReport {
    let mut ctx = self.context();
    let start = self.graph.start().to_string();

    info!(run_id = %ctx.run_id(), graph_id = %self.graph.graph_id, start = %start, "run_started");
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: ctx.run_id().to_string(),
      graph_id: self.graph.graph_id.clone(),
    });
    self.notifier.notify(ExecutionEvent::NodeEntered {
      run_id: ctx.run_id().to_string(),
      node_id: start.clone(),
      visit: ctx.visits(&start),
    });

    while !ctx.state().is_finished() {
      self.step(&mut ctx, interrupt).await;
      // Nodes that only stay and never sleep would otherwise starve the runtime.
      tokio::task::yield_now().await;
    }

    let (run_id, state, trace) = ctx.into_parts();
    RunReport {
      run_id,
      graph_id: self.graph.graph_id.clone(),
      state,
      trace,
    }
  }

  /// Perform one iteration of the state machine.
  ///
  /// The interrupt is checked first and wins over everything else. A run in
  /// backoff sleeps here, waking early if interrupted.
  #[instrument(
    name = "executor_step",
    skip_all,
    fields(run_id = %ctx.run_id(), node_id = %ctx.current_node())
  )]
  pub async fn step(&self, ctx: &mut ExecutionContext, interrupt: &Interrupt) {
    if ctx.state().is_finished() {
      return;
    }
    if interrupt.is_triggered() {
      self.interrupted(ctx, interrupt.reason(), PredicateResult::NotEvaluated, None);
      return;
    }

    match ctx.state().clone() {
      RunState::WaitingRetry { node, delay, .. } => {
        let woken = tokio::select! {
          _ = tokio::time::sleep(delay) => false,
          _ = interrupt.triggered() => true,
        };
        if woken {
          self.interrupted(ctx, interrupt.reason(), PredicateResult::NotEvaluated, None);
        } else {
          ctx.set_state(RunState::Running(node));
        }
      }
      RunState::Running(node_id) => self.run_node(ctx, &node_id, interrupt).await,
      RunState::Interrupted(_) | RunState::Succeeded(_) | RunState::Failed(_) => {}
    }
  }

  async fn run_node(&self, ctx: &mut ExecutionContext, node_id: &str, interrupt: &Interrupt) {
    let Some(node) = self.graph.node(node_id) else {
      self.fail(
        ctx,
        1,
        PredicateResult::NotEvaluated,
        None,
        FailureReason::Configuration {
          node_id: node_id.to_string(),
          message: "node is not part of the graph".to_string(),
        },
      );
      return;
    };
    let attempt = ctx.attempts(node_id) + 1;

    if ctx.time_in_node() >= node.timeout {
      self.timed_out(ctx, node, attempt);
      return;
    }

    if attempt == 1 && !node.pre_delay.is_zero() {
      let woken = tokio::select! {
        _ = tokio::time::sleep(node.pre_delay) => false,
        _ = interrupt.triggered() => true,
      };
      if woken {
        self.interrupted(ctx, interrupt.reason(), PredicateResult::NotEvaluated, None);
        return;
      }
    }

    let frame = match self.acquire().await {
      Ok(frame) => Arc::new(frame),
      Err(message) => {
        warn!(node_id, attempt, error = %message, "frame_unavailable");
        self.retry(
          ctx,
          node,
          PredicateResult::NotEvaluated,
          None,
          RetryCause::FrameUnavailable {
            message: message.clone(),
          },
          |attempts| FailureReason::FrameAcquisitionExhausted {
            node_id: node_id.to_string(),
            attempts,
            message,
          },
        );
        return;
      }
    };

    let outcome = match self.evaluate(&frame, &node.predicate).await {
      Ok(Outcome::Unsatisfied) => {
        debug!(node_id, attempt, "predicate_unsatisfied");
        self.retry(
          ctx,
          node,
          PredicateResult::Unsatisfied,
          None,
          RetryCause::Unsatisfied,
          |attempts| FailureReason::RetriesExhausted {
            node_id: node_id.to_string(),
            attempts,
          },
        );
        return;
      }
      Ok(outcome) => outcome,
      Err(err) => {
        self.evaluation_failed(ctx, node, attempt, err);
        return;
      }
    };

    let gesture = match action::resolve(
      &self.graph,
      &node.action,
      outcome.best(),
      frame.resolution(),
      ctx.rng(),
    ) {
      Ok(gesture) => gesture,
      Err(message) => {
        self.fail(
          ctx,
          attempt,
          outcome.into_trace(),
          None,
          FailureReason::Configuration {
            node_id: node_id.to_string(),
            message,
          },
        );
        return;
      }
    };

    if let Some(gesture) = gesture {
      if interrupt.is_triggered() {
        self.interrupted(ctx, interrupt.reason(), outcome.into_trace(), None);
        return;
      }
      if let Err(err) = self.input.dispatch(&gesture).await {
        warn!(node_id, attempt, error = %err, "dispatch_rejected");
        let message = err.to_string();
        self.retry(
          ctx,
          node,
          outcome.into_trace(),
          Some(gesture),
          RetryCause::DispatchRejected {
            message: message.clone(),
          },
          |attempts| FailureReason::DispatchExhausted {
            node_id: node_id.to_string(),
            attempts,
            message,
          },
        );
        return;
      }
      info!(node_id, attempt, gesture = ?gesture, "action_dispatched");
      self.notifier.notify(ExecutionEvent::ActionDispatched {
        run_id: ctx.run_id().to_string(),
        node_id: node_id.to_string(),
        gesture,
      });
    }

    let predicate = outcome.into_trace();

    if !node.post_delay.is_zero() {
      let woken = tokio::select! {
        _ = tokio::time::sleep(node.post_delay) => false,
        _ = interrupt.triggered() => true,
      };
      if woken {
        self.interrupted(ctx, interrupt.reason(), predicate, gesture);
        return;
      }
    }

    let next = match self.select_transition(node).await {
      Ok(next) => next,
      Err(err) => {
        self.evaluation_failed(ctx, node, attempt, err);
        return;
      }
    };

    let label = match &next {
      Target::Node(id) => id.clone(),
      Target::Stay => node_id.to_string(),
      Target::Terminal => "terminal".to_string(),
    };
    info!(node_id, next = %label, "node_completed");
    ctx.record(
      attempt,
      predicate,
      gesture,
      TraceEvent::Completed {
        next: label.clone(),
      },
    );
    self.notifier.notify(ExecutionEvent::NodeCompleted {
      run_id: ctx.run_id().to_string(),
      node_id: node_id.to_string(),
      next: label,
    });

    match next {
      Target::Node(next) => self.enter(ctx, &next),
      Target::Stay => self.enter(ctx, node_id),
      Target::Terminal => self.succeed(ctx, attempt),
    }
  }

  /// First satisfied transition, top-down, else the default.
  ///
  /// Conditions without recognition need no frame. The first one that does
  /// acquires a fresh frame shared by the rest; if that fails, every
  /// recognition condition counts as unsatisfied.
  async fn select_transition(&self, node: &TaskNode) -> Result<Target, EvalError> {
    let mut frame: Option<Option<Arc<Frame>>> = None;

    for transition in &node.transitions {
      if !transition.when.has_checks() {
        return Ok(transition.next.clone());
      }

      if frame.is_none() {
        frame = Some(match self.acquire().await {
          Ok(frame) => Some(Arc::new(frame)),
          Err(message) => {
            warn!(node_id = %node.node_id, error = %message, "transition_frame_unavailable");
            None
          }
        });
      }
      let Some(Some(frame)) = &frame else {
        continue;
      };

      if self.evaluate(frame, &transition.when).await?.is_satisfied() {
        return Ok(transition.next.clone());
      }
    }

    Ok(node.default.clone())
  }

  /// Acquire a frame and enforce the staleness bound.
  async fn acquire(&self) -> Result<Frame, String> {
    let frame = self.frames.acquire().await.map_err(|err| err.to_string())?;
    if let Some(max_age) = self.config.max_frame_age {
      let age = frame.age(Utc::now());
      if age > max_age {
        return Err(format!(
          "frame is {}ms old, bound is {}ms",
          age.as_millis(),
          max_age.as_millis()
        ));
      }
    }
    Ok(frame)
  }

  /// Recognition is CPU-bound, so it runs on the blocking pool and never
  /// stalls the worker driving timers, interrupts and other runs.
  async fn evaluate(
    &self,
    frame: &Arc<Frame>,
    predicate: &Predicate,
  ) -> Result<Outcome, EvalError> {
    let graph = self.graph.clone();
    let recognizers = self.recognizers.clone();
    let frame = frame.clone();
    let predicate = predicate.clone();

    tokio::task::spawn_blocking(move || {
      Evaluator {
        graph: graph.as_ref(),
        recognizers: recognizers.as_ref(),
      }
      .evaluate(&frame, &predicate)
    })
    .await
    .unwrap_or_else(|err| {
      error!(error = %err, "recognition_task_failed");
      Err(EvalError::Configuration(format!("recognition task failed: {}", err)))
    })
  }

  /// Count a transient fault against the node's budget, then back off or fail.
  fn retry(
    &self,
    ctx: &mut ExecutionContext,
    node: &TaskNode,
    predicate: PredicateResult,
    action: Option<Gesture>,
    cause: RetryCause,
    exhausted: impl FnOnce(u32) -> FailureReason,
  ) {
    let attempt = ctx.bump_attempt();
    if attempt >= node.retry.max_attempts {
      self.fail(ctx, attempt, predicate, action, exhausted(attempt));
      return;
    }

    let delay = delay_for(&node.retry.backoff, attempt);
    let delay_ms = delay.as_millis() as u64;
    debug!(node_id = %node.node_id, attempt, delay_ms, "retry_scheduled");

    ctx.record(
      attempt,
      predicate,
      action,
      TraceEvent::Retry { cause, delay_ms },
    );
    self.notifier.notify(ExecutionEvent::RetryScheduled {
      run_id: ctx.run_id().to_string(),
      node_id: node.node_id.clone(),
      attempt,
      delay_ms,
    });
    ctx.set_state(RunState::WaitingRetry {
      node: node.node_id.clone(),
      attempt,
      delay,
    });
  }

  /// A predicate could not be answered. Never retried.
  fn evaluation_failed(
    &self,
    ctx: &mut ExecutionContext,
    node: &TaskNode,
    attempt: u32,
    err: EvalError,
  ) {
    let predicate = err.to_trace();
    let reason = match err {
      EvalError::Unavailable(message) => FailureReason::RecognizerUnavailable {
        node_id: node.node_id.clone(),
        message,
      },
      EvalError::Configuration(message) => FailureReason::Configuration {
        node_id: node.node_id.clone(),
        message,
      },
    };
    self.fail(ctx, attempt, predicate, None, reason);
  }

  fn timed_out(&self, ctx: &mut ExecutionContext, node: &TaskNode, attempt: u32) {
    let timeout_ms = node.timeout.as_millis() as u64;
    warn!(node_id = %node.node_id, timeout_ms, on_timeout = ?node.on_timeout, "node_timed_out");
    self.notifier.notify(ExecutionEvent::NodeTimedOut {
      run_id: ctx.run_id().to_string(),
      node_id: node.node_id.clone(),
    });

    match &node.on_timeout {
      Some(next) => {
        ctx.record(
          attempt,
          PredicateResult::NotEvaluated,
          None,
          TraceEvent::TimedOut {
            next: Some(next.clone()),
          },
        );
        self.enter(ctx, next);
      }
      None => self.fail(
        ctx,
        attempt,
        PredicateResult::NotEvaluated,
        None,
        FailureReason::NodeTimeout {
          node_id: node.node_id.clone(),
          timeout_ms,
        },
      ),
    }
  }

  /// Enter a node fresh, enforcing its visit limit.
  fn enter(&self, ctx: &mut ExecutionContext, node_id: &str) {
    let visit = ctx.enter(node_id);
    debug!(node_id, visit, "node_entered");
    self.notifier.notify(ExecutionEvent::NodeEntered {
      run_id: ctx.run_id().to_string(),
      node_id: node_id.to_string(),
      visit,
    });

    let max_visits = self.graph.node(node_id).and_then(|node| node.max_visits);
    if let Some(max_visits) = max_visits
      && visit > max_visits
    {
      self.fail(
        ctx,
        1,
        PredicateResult::NotEvaluated,
        None,
        FailureReason::VisitLimit {
          node_id: node_id.to_string(),
          max_visits,
        },
      );
    }
  }

  fn succeed(&self, ctx: &mut ExecutionContext, attempt: u32) {
    let node_id = ctx.current_node().to_string();
    info!(run_id = %ctx.run_id(), node_id = %node_id, elapsed_ms = ctx.elapsed().as_millis() as u64, "run_succeeded");
    ctx.record(
      attempt,
      PredicateResult::NotEvaluated,
      None,
      TraceEvent::Succeeded,
    );
    self.notifier.notify(ExecutionEvent::RunSucceeded {
      run_id: ctx.run_id().to_string(),
      node_id: node_id.clone(),
    });
    ctx.set_state(RunState::Succeeded(node_id));
  }

  fn fail(
    &self,
    ctx: &mut ExecutionContext,
    attempt: u32,
    predicate: PredicateResult,
    action: Option<Gesture>,
    reason: FailureReason,
  ) {
    error!(run_id = %ctx.run_id(), node_id = %ctx.current_node(), reason = %reason, "run_failed");
    ctx.record(
      attempt,
      predicate,
      action,
      TraceEvent::Failed {
        reason: reason.clone(),
      },
    );
    self.notifier.notify(ExecutionEvent::RunFailed {
      run_id: ctx.run_id().to_string(),
      reason: reason.clone(),
    });
    ctx.set_state(RunState::Failed(reason));
  }

  fn interrupted(
    &self,
    ctx: &mut ExecutionContext,
    reason: String,
    predicate: PredicateResult,
    action: Option<Gesture>,
  ) {
    warn!(run_id = %ctx.run_id(), node_id = %ctx.current_node(), reason = %reason, "run_interrupted");
    let attempt = ctx.attempts(ctx.current_node()) + 1;
    ctx.record(
      attempt,
      predicate,
      action,
      TraceEvent::Interrupted {
        reason: reason.clone(),
      },
    );
    self.notifier.notify(ExecutionEvent::RunInterrupted {
      run_id: ctx.run_id().to_string(),
      reason: reason.clone(),
    });
    ctx.set_state(RunState::Interrupted(reason));
  }
}
