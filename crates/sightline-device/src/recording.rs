use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::InputSink;
use crate::error::DispatchError;
use crate::gesture::{Ack, Gesture};

#[derive(Debug, Default)]
struct Log {
  accepted: Vec<Gesture>,
  rejected: usize,
  reject_next: usize,
}

/// An input sink that records accepted gestures instead of delivering them.
///
/// `Wait` gestures are honoured by sleeping for their duration.
#[derive(Debug, Default)]
pub struct RecordingInputSink {
  log: Mutex<Log>,
}

impl RecordingInputSink {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reject the next `count` dispatches.
  pub async fn reject_next(&self, count: usize) {
    self.log.lock().await.reject_next = count;
  }

  /// Accepted gestures in dispatch order.
  pub async fn gestures(&self) -> Vec<Gesture> {
    self.log.lock().await.accepted.clone()
  }

  pub async fn rejected(&self) -> usize {
    self.log.lock().await.rejected
  }
}

#[async_trait]
impl InputSink for RecordingInputSink {
  async fn dispatch(&self, gesture: &Gesture) -> Result<Ack, DispatchError> {
    {
      let mut log = self.log.lock().await;
      if log.reject_next > 0 {
        log.reject_next -= 1;
        log.rejected += 1;
        return Err(DispatchError::Rejected("scripted rejection".to_string()));
      }
      log.accepted.push(*gesture);
    }

    debug!(gesture = ?gesture, "gesture_recorded");
    if let Gesture::Wait { duration_ms } = gesture {
      tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
    }
    Ok(Ack)
  }
}
