mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::*;
use image::RgbImage;
use sightline_device::{AcquisitionError, Gesture, ScriptedFrameSource};
use sightline_runtime::{
  ChannelNotifier, ExecutionEvent, FailureReason, Interrupt, PredicateResult, RetryCause,
  RunState, TraceEvent,
};
use sightline_vision::{Frame, RecognizerSet};
use tokio::sync::mpsc;

const TWO_STEP: &str = r#"{
  "graph_id": "two-step", "name": "Two step", "start": "A",
  "defaults": { "retry": { "max_attempts": 5, "initial_delay_ms": 100 } },
  "nodes": [
    {
      "node_id": "A",
      "predicate": { "type": "check", "recognizer": { "type": "template_match", "template": "p1" }, "threshold": 0.9 },
      "action": { "type": "tap", "at": { "point": { "x": 10, "y": 10 } } },
      "default": { "goto": "B" }
    },
    {
      "node_id": "B",
      "predicate": { "type": "check", "recognizer": { "type": "template_match", "template": "p2" }, "threshold": 0.9 },
      "default": "terminal"
    }
  ]
}"#;

fn retry_unsatisfied(delay_ms: u64) -> TraceEvent {
  TraceEvent::Retry {
    cause: RetryCause::Unsatisfied,
    delay_ms,
  }
}

#[tokio::test(start_paused = true)]
async fn test_retries_until_predicate_holds_then_walks_to_terminal() {
  let h = harness(
    TWO_STEP,
    ScriptedFrameSource::frames(vec![
      blank(),
      blank(),
      frame_with(&p1(), 40, 30),
      frame_with(&p2(), 90, 60),
    ]),
  );

  let report = h.executor.run(&Interrupt::new()).await;

  assert_eq!(report.state, RunState::Succeeded("B".to_string()));
  assert_eq!(report.state.node(), Some("B"));
  assert_eq!(report.graph_id, "two-step");
  assert_eq!(
    events(&report.trace),
    vec![
      retry_unsatisfied(100),
      retry_unsatisfied(100),
      TraceEvent::Completed {
        next: "B".to_string()
      },
      TraceEvent::Completed {
        next: "terminal".to_string()
      },
      TraceEvent::Succeeded,
    ]
  );

  let attempts: Vec<u32> = report.trace.iter().map(|entry| entry.attempt).collect();
  assert_eq!(attempts, vec![1, 2, 3, 1, 1]);
  assert_eq!(report.trace[2].node_id, "A");
  assert_eq!(report.trace[2].action, Some(Gesture::Tap { x: 10, y: 10 }));
  assert!(matches!(
    report.trace[2].predicate,
    PredicateResult::Satisfied { best: Some(_) }
  ));
  assert_eq!(report.trace[3].node_id, "B");
  assert_eq!(h.sink.gestures().await, vec![Gesture::Tap { x: 10, y: 10 }]);
  assert_eq!(h.frames.acquisitions().await, 4);
}

#[tokio::test(start_paused = true)]
async fn test_fails_after_exactly_max_attempts() {
  let h = harness(
    r#"{
      "graph_id": "g", "name": "g", "start": "A",
      "nodes": [{
        "node_id": "A",
        "predicate": { "type": "check", "recognizer": { "type": "template_match", "template": "p1" } },
        "retry": { "max_attempts": 3, "backoff": "exponential", "initial_delay_ms": 100, "max_delay_ms": 1000 },
        "default": "terminal"
      }]
    }"#,
    ScriptedFrameSource::frames(vec![blank()]),
  );

  let report = h.executor.run(&Interrupt::new()).await;

  let reason = FailureReason::RetriesExhausted {
    node_id: "A".to_string(),
    attempts: 3,
  };
  assert_eq!(report.state, RunState::Failed(reason.clone()));
  assert_eq!(
    events(&report.trace),
    vec![
      retry_unsatisfied(100),
      retry_unsatisfied(200),
      TraceEvent::Failed { reason },
    ]
  );
  assert_eq!(h.frames.acquisitions().await, 3);
  assert!(h.sink.gestures().await.is_empty());
}

#[tokio::test]
async fn test_interrupt_preempts_step() {
  let h = harness(TWO_STEP, ScriptedFrameSource::frames(vec![blank()]));
  let mut ctx = h.executor.context();
  let interrupt = Interrupt::new();
  interrupt.trigger("operator");

  h.executor.step(&mut ctx, &interrupt).await;

  assert_eq!(ctx.state(), &RunState::Interrupted("operator".to_string()));
  assert_eq!(h.frames.acquisitions().await, 0);
  assert_eq!(
    ctx.trace().last().map(|entry| entry.event.clone()),
    Some(TraceEvent::Interrupted {
      reason: "operator".to_string()
    })
  );

  // A finished run does not move again.
  h.executor.step(&mut ctx, &Interrupt::new()).await;
  assert_eq!(ctx.trace().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_wakes_backoff_sleep() {
  let h = harness(
    r#"{
      "graph_id": "g", "name": "g", "start": "A",
      "nodes": [{
        "node_id": "A",
        "predicate": { "type": "check", "recognizer": { "type": "template_match", "template": "p1" } },
        "retry": { "max_attempts": 10, "initial_delay_ms": 60000, "max_delay_ms": 60000 },
        "default": "terminal"
      }]
    }"#,
    ScriptedFrameSource::frames(vec![blank()]),
  );

  let interrupt = Interrupt::new();
  let trigger = interrupt.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_secs(1)).await;
    trigger.trigger("shutdown");
  });

  let started = tokio::time::Instant::now();
  let report = h.executor.run(&interrupt).await;

  assert_eq!(report.state, RunState::Interrupted("shutdown".to_string()));
  assert!(started.elapsed() < Duration::from_secs(60));
  assert_eq!(h.frames.acquisitions().await, 1);
}

const SETTLE_FIRST: &str = r#"{
  "graph_id": "g", "name": "g", "start": "A",
  "nodes": [{
    "node_id": "A",
    "predicate": { "type": "check", "recognizer": { "type": "template_match", "template": "p1" }, "threshold": 0.9 },
    "retry": { "max_attempts": 5, "initial_delay_ms": 100 },
    "pre_delay_ms": 3000,
    "default": "terminal"
  }]
}"#;

#[tokio::test(start_paused = true)]
async fn test_pre_delay_runs_once_per_entry() {
  let h = harness(
    SETTLE_FIRST,
    ScriptedFrameSource::frames(vec![blank(), frame_with(&p1(), 40, 30)]),
  );

  let started = tokio::time::Instant::now();
  let report = h.executor.run(&Interrupt::new()).await;
  let elapsed = started.elapsed();

  assert!(report.succeeded());
  assert_eq!(h.frames.acquisitions().await, 2);
  // Entry wait plus one backoff, not a second entry wait for the retry.
  assert!(elapsed >= Duration::from_millis(3100), "{:?}", elapsed);
  assert!(elapsed < Duration::from_millis(6000), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_wakes_pre_delay() {
  let h = harness(SETTLE_FIRST, ScriptedFrameSource::frames(vec![blank()]));

  let interrupt = Interrupt::new();
  let trigger = interrupt.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_secs(1)).await;
    trigger.trigger("shutdown");
  });

  let started = tokio::time::Instant::now();
  let report = h.executor.run(&interrupt).await;

  assert_eq!(report.state, RunState::Interrupted("shutdown".to_string()));
  assert!(started.elapsed() < Duration::from_secs(3));
  assert_eq!(h.frames.acquisitions().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_moves_to_recovery_node() {
  let h = harness(
    r#"{
      "graph_id": "g", "name": "g", "start": "A",
      "nodes": [
        {
          "node_id": "A",
          "predicate": { "type": "check", "recognizer": { "type": "template_match", "template": "p1" } },
          "retry": { "max_attempts": 100, "initial_delay_ms": 500 },
          "timeout_ms": 2000,
          "on_timeout": "recover",
          "default": "terminal"
        },
        { "node_id": "recover", "default": "terminal" }
      ]
    }"#,
    ScriptedFrameSource::frames(vec![blank()]),
  );

  let report = h.executor.run(&Interrupt::new()).await;

  assert_eq!(report.state, RunState::Succeeded("recover".to_string()));
  let events = events(&report.trace);
  let retries = events
    .iter()
    .filter(|event| matches!(event, TraceEvent::Retry { .. }))
    .count();
  assert!((3..=4).contains(&retries), "retries: {}", retries);
  assert!(events.contains(&TraceEvent::TimedOut {
    next: Some("recover".to_string())
  }));
  assert_eq!(events.last(), Some(&TraceEvent::Succeeded));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_without_recovery_fails() {
  let h = harness(
    r#"{
      "graph_id": "g", "name": "g", "start": "A",
      "nodes": [{
        "node_id": "A",
        "predicate": { "type": "check", "recognizer": { "type": "template_match", "template": "p1" } },
        "retry": { "max_attempts": 100, "initial_delay_ms": 500 },
        "timeout_ms": 2000,
        "default": "terminal"
      }]
    }"#,
    ScriptedFrameSource::frames(vec![blank()]),
  );

  let report = h.executor.run(&Interrupt::new()).await;

  assert_eq!(
    report.state,
    RunState::Failed(FailureReason::NodeTimeout {
      node_id: "A".to_string(),
      timeout_ms: 2000
    })
  );
}

#[tokio::test(start_paused = true)]
async fn test_seeded_runs_replay_identically() {
  const JITTERED: &str = r#"{
    "graph_id": "g", "name": "g", "start": "A",
    "nodes": [
      { "node_id": "A", "action": { "type": "tap", "at": { "point": { "x": 80, "y": 60 } }, "jitter": 10 }, "default": { "goto": "B" } },
      { "node_id": "B", "action": { "type": "tap", "at": { "point": { "x": 80, "y": 60 } }, "jitter": 10 }, "default": { "goto": "C" } },
      { "node_id": "C", "action": { "type": "tap", "at": { "point": { "x": 80, "y": 60 } }, "jitter": 10 }, "default": "terminal" }
    ]
  }"#;

  let first = harness(JITTERED, ScriptedFrameSource::frames(vec![blank()]));
  let second = harness(JITTERED, ScriptedFrameSource::frames(vec![blank()]));

  let a = first.executor.run(&Interrupt::new()).await;
  let b = second.executor.run(&Interrupt::new()).await;

  assert_ne!(a.run_id, b.run_id);
  let strip = |report: &sightline_runtime::RunReport| {
    report
      .trace
      .iter()
      .map(|entry| {
        (
          entry.node_id.clone(),
          entry.attempt,
          entry.predicate.clone(),
          entry.action,
          entry.event.clone(),
        )
      })
      .collect::<Vec<_>>()
  };
  assert_eq!(strip(&a), strip(&b));

  let gestures = first.sink.gestures().await;
  assert_eq!(gestures, second.sink.gestures().await);
  assert_eq!(gestures.len(), 3);
  for gesture in gestures {
    let Gesture::Tap { x, y } = gesture else {
      panic!("expected tap, got {:?}", gesture);
    };
    assert!((70..=90).contains(&x) && (50..=70).contains(&y));
  }
}

#[tokio::test]
async fn test_unavailable_recognizer_fails_without_consuming_attempts() {
  let h = harness(
    r#"{
      "graph_id": "g", "name": "g", "start": "A",
      "nodes": [{
        "node_id": "A",
        "predicate": { "type": "check", "recognizer": { "type": "text_extract" }, "threshold": 0.5 },
        "default": "terminal"
      }]
    }"#,
    ScriptedFrameSource::frames(vec![blank()]),
  );
  let mut ctx = h.executor.context();

  h.executor.step(&mut ctx, &Interrupt::new()).await;

  assert!(matches!(
    ctx.state(),
    RunState::Failed(FailureReason::RecognizerUnavailable { node_id, .. }) if node_id == "A"
  ));
  assert_eq!(ctx.attempts("A"), 0);
  assert_eq!(ctx.trace().len(), 1);
  assert_eq!(ctx.trace()[0].attempt, 1);
  assert!(matches!(
    ctx.trace()[0].predicate,
    PredicateResult::Unavailable { .. }
  ));
}

const TAP_ONCE: &str = r#"{
  "graph_id": "g", "name": "g", "start": "A",
  "nodes": [{
    "node_id": "A",
    "action": { "type": "tap", "at": { "point": { "x": 5, "y": 5 } } },
    "retry": { "max_attempts": 3, "initial_delay_ms": 50 },
    "default": "terminal"
  }]
}"#;

#[tokio::test(start_paused = true)]
async fn test_rejected_dispatch_is_retried() {
  let h = harness(TAP_ONCE, ScriptedFrameSource::frames(vec![blank()]));
  h.sink.reject_next(2).await;

  let report = h.executor.run(&Interrupt::new()).await;

  assert!(report.succeeded());
  assert_eq!(h.sink.rejected().await, 2);
  assert_eq!(h.sink.gestures().await, vec![Gesture::Tap { x: 5, y: 5 }]);
  assert!(matches!(
    &report.trace[0].event,
    TraceEvent::Retry {
      cause: RetryCause::DispatchRejected { .. },
      delay_ms: 50
    }
  ));
  assert_eq!(report.trace[0].action, Some(Gesture::Tap { x: 5, y: 5 }));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_dispatch_exhausts_budget() {
  let h = harness(TAP_ONCE, ScriptedFrameSource::frames(vec![blank()]));
  h.sink.reject_next(10).await;

  let report = h.executor.run(&Interrupt::new()).await;

  assert!(matches!(
    report.state,
    RunState::Failed(FailureReason::DispatchExhausted { attempts: 3, .. })
  ));
  assert_eq!(h.sink.rejected().await, 3);
  assert!(h.sink.gestures().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_frame_failure_is_retried() {
  let h = harness(
    TAP_ONCE,
    ScriptedFrameSource::new(vec![
      Err(AcquisitionError::Capture("usb reset".to_string())),
      Ok(blank()),
    ]),
  );

  let report = h.executor.run(&Interrupt::new()).await;

  assert!(report.succeeded());
  assert!(matches!(
    &report.trace[0].event,
    TraceEvent::Retry {
      cause: RetryCause::FrameUnavailable { message },
      ..
    } if message.contains("usb reset")
  ));
}

#[tokio::test(start_paused = true)]
async fn test_frame_failure_exhausts_budget() {
  let h = harness(TAP_ONCE, ScriptedFrameSource::new(vec![]));

  let report = h.executor.run(&Interrupt::new()).await;

  assert!(matches!(
    report.state,
    RunState::Failed(FailureReason::FrameAcquisitionExhausted { attempts: 3, .. })
  ));
  assert!(h.sink.gestures().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stale_frames_are_rejected() {
  let stale = Frame::new(
    RgbImage::new(WIDTH, HEIGHT),
    Utc::now() - chrono::Duration::seconds(60),
  );
  let h = harness(
    TAP_ONCE,
    ScriptedFrameSource::frames(vec![stale]).preserve_timestamps(),
  );

  let report = h.executor.run(&Interrupt::new()).await;

  assert!(matches!(
    &report.state,
    RunState::Failed(FailureReason::FrameAcquisitionExhausted { message, .. }) if message.contains("old")
  ));
}

#[tokio::test(start_paused = true)]
async fn test_visit_limit_stops_stay_loop() {
  let h = harness(
    r#"{
      "graph_id": "g", "name": "g", "start": "A",
      "nodes": [{
        "node_id": "A",
        "transitions": [{
          "when": { "type": "check", "recognizer": { "type": "template_match", "template": "p1" } },
          "next": "terminal"
        }],
        "default": "stay",
        "max_visits": 3
      }]
    }"#,
    ScriptedFrameSource::frames(vec![blank()]),
  );

  let report = h.executor.run(&Interrupt::new()).await;

  assert_eq!(
    report.state,
    RunState::Failed(FailureReason::VisitLimit {
      node_id: "A".to_string(),
      max_visits: 3
    })
  );
  let completed = events(&report.trace)
    .into_iter()
    .filter(|event| matches!(event, TraceEvent::Completed { .. }))
    .count();
  assert_eq!(completed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_transition_frame_failure_takes_default() {
  let h = harness(
    r#"{
      "graph_id": "g", "name": "g", "start": "A",
      "nodes": [
        {
          "node_id": "A",
          "transitions": [{
            "when": { "type": "check", "recognizer": { "type": "template_match", "template": "p1" } },
            "next": "terminal"
          }],
          "default": { "goto": "B" }
        },
        { "node_id": "B", "default": "terminal" }
      ]
    }"#,
    ScriptedFrameSource::new(vec![
      Ok(frame_with(&p1(), 40, 30)),
      Err(AcquisitionError::Capture("dropped".to_string())),
      Ok(frame_with(&p1(), 40, 30)),
    ]),
  );

  let report = h.executor.run(&Interrupt::new()).await;

  assert_eq!(report.state, RunState::Succeeded("B".to_string()));
  assert_eq!(
    report.trace[0].event,
    TraceEvent::Completed {
      next: "B".to_string()
    }
  );
}

#[tokio::test(start_paused = true)]
async fn test_transition_checks_share_one_frame() {
  let h = harness(
    r#"{
      "graph_id": "g", "name": "g", "start": "A",
      "nodes": [
        {
          "node_id": "A",
          "transitions": [
            { "when": { "type": "check", "recognizer": { "type": "template_match", "template": "p2" }, "threshold": 0.9 }, "next": { "goto": "B" } },
            { "when": { "type": "check", "recognizer": { "type": "template_match", "template": "p1" } }, "next": "terminal" }
          ],
          "default": { "goto": "B" }
        },
        { "node_id": "B", "default": "terminal" }
      ]
    }"#,
    ScriptedFrameSource::frames(vec![blank(), frame_with(&p1(), 40, 30), blank()]),
  );

  let report = h.executor.run(&Interrupt::new()).await;

  assert_eq!(report.state, RunState::Succeeded("A".to_string()));
  assert_eq!(h.frames.acquisitions().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_matched_tap_hits_candidate_centre() {
  let h = harness(
    r#"{
      "graph_id": "g", "name": "g", "start": "A",
      "nodes": [{
        "node_id": "A",
        "predicate": { "type": "check", "recognizer": { "type": "template_match", "template": "p1" }, "threshold": 0.9 },
        "action": { "type": "tap", "at": "matched" },
        "default": "terminal"
      }]
    }"#,
    ScriptedFrameSource::frames(vec![frame_with(&p1(), 40, 30)]),
  );

  let report = h.executor.run(&Interrupt::new()).await;

  assert!(report.succeeded());
  assert_eq!(h.sink.gestures().await, vec![Gesture::Tap { x: 52, y: 39 }]);
}

#[tokio::test(start_paused = true)]
async fn test_any_group_takes_most_confident_branch() {
  let h = harness_with(
    r#"{
      "graph_id": "g", "name": "g", "start": "A",
      "nodes": [{
        "node_id": "A",
        "predicate": { "type": "any", "of": [
          { "type": "check", "recognizer": { "type": "template_match", "template": "p2" }, "threshold": 0.9 },
          { "type": "check", "recognizer": { "type": "template_match", "template": "p1" }, "threshold": 0.9 }
        ] },
        "action": { "type": "tap", "at": "matched" },
        "default": "terminal"
      }]
    }"#,
    ScriptedFrameSource::frames(vec![frame_with(&p1(), 100, 80)]),
    RecognizerSet::new(Arc::new(templates())),
  );

  let report = h.executor.run(&Interrupt::new()).await;

  assert!(report.succeeded());
  assert_eq!(h.sink.gestures().await, vec![Gesture::Tap { x: 112, y: 89 }]);
}

const TEMPLATE_OR_TEXT: &str = r#"{
  "graph_id": "g", "name": "g", "start": "A",
  "nodes": [{
    "node_id": "A",
    "predicate": { "type": "any", "of": [
      { "type": "check", "recognizer": { "type": "template_match", "template": "p1" }, "threshold": 0.9 },
      { "type": "check", "recognizer": { "type": "text_extract" }, "threshold": 0.5 }
    ] },
    "action": { "type": "tap", "at": "matched" },
    "retry": { "max_attempts": 3 },
    "default": "terminal"
  }]
}"#;

#[tokio::test(start_paused = true)]
async fn test_any_group_matches_without_text_backend() {
  let h = harness(
    TEMPLATE_OR_TEXT,
    ScriptedFrameSource::frames(vec![frame_with(&p1(), 40, 30)]),
  );

  let report = h.executor.run(&Interrupt::new()).await;

  assert_eq!(report.state, RunState::Succeeded("A".to_string()));
  assert_eq!(h.sink.gestures().await, vec![Gesture::Tap { x: 52, y: 39 }]);
}

#[tokio::test(start_paused = true)]
async fn test_any_group_without_match_reports_missing_text_backend() {
  let h = harness(TEMPLATE_OR_TEXT, ScriptedFrameSource::frames(vec![blank()]));

  let report = h.executor.run(&Interrupt::new()).await;

  assert!(matches!(
    report.state,
    RunState::Failed(FailureReason::RecognizerUnavailable { ref node_id, .. }) if node_id == "A"
  ));
  assert_eq!(h.frames.acquisitions().await, 1);
  assert!(h.sink.gestures().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_channel_notifier_streams_events() {
  let (tx, mut rx) = mpsc::unbounded_channel();
  let h = harness(
    r#"{
      "graph_id": "g", "name": "g", "start": "A",
      "nodes": [{ "node_id": "A", "default": "terminal" }]
    }"#,
    ScriptedFrameSource::frames(vec![blank()]),
  );
  let executor = h.executor.with_notifier(Arc::new(ChannelNotifier::new(tx)));

  let report = executor.run(&Interrupt::new()).await;

  let mut received = Vec::new();
  while let Ok(event) = rx.try_recv() {
    received.push(event);
  }
  let run_id = report.run_id.clone();
  assert_eq!(
    received,
    vec![
      ExecutionEvent::RunStarted {
        run_id: run_id.clone(),
        graph_id: "g".to_string()
      },
      ExecutionEvent::NodeEntered {
        run_id: run_id.clone(),
        node_id: "A".to_string(),
        visit: 1
      },
      ExecutionEvent::NodeCompleted {
        run_id: run_id.clone(),
        node_id: "A".to_string(),
        next: "terminal".to_string()
      },
      ExecutionEvent::RunSucceeded {
        run_id,
        node_id: "A".to_string()
      },
    ]
  );
}

#[tokio::test]
async fn test_report_serializes_state_and_trace() {
  let h = harness(
    r#"{
      "graph_id": "g", "name": "g", "start": "A",
      "nodes": [{ "node_id": "A", "default": "terminal" }]
    }"#,
    ScriptedFrameSource::frames(vec![blank()]),
  );

  let report = h.executor.run(&Interrupt::new()).await;
  let value = serde_json::to_value(&report).unwrap();

  assert_eq!(value["state"]["succeeded"], "A");
  assert_eq!(value["trace"][0]["event"]["event"], "completed");
  assert_eq!(value["trace"][1]["event"]["event"], "succeeded");
}
