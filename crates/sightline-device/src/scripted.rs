use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use sightline_vision::Frame;
use tokio::sync::Mutex;

use crate::FrameSource;
use crate::error::AcquisitionError;

#[derive(Debug, Default)]
struct Script {
  steps: VecDeque<Result<Frame, AcquisitionError>>,
  last: Option<Frame>,
  acquisitions: usize,
}

/// A frame source that plays back a fixed script of frames and failures.
///
/// Once the script is drained the last successful frame is returned forever.
/// Frames are restamped with the acquisition time unless timestamps are preserved.
#[derive(Debug, Default)]
pub struct ScriptedFrameSource {
  script: Mutex<Script>,
  preserve_timestamps: bool,
}

impl ScriptedFrameSource {
  pub fn new(steps: impl IntoIterator<Item = Result<Frame, AcquisitionError>>) -> Self {
    Self {
      script: Mutex::new(Script {
        steps: steps.into_iter().collect(),
        ..Script::default()
      }),
      preserve_timestamps: false,
    }
  }

  /// A script made only of frames.
  pub fn frames(frames: impl IntoIterator<Item = Frame>) -> Self {
    Self::new(frames.into_iter().map(Ok))
  }

  /// Keep each frame's original capture time instead of restamping it.
  pub fn preserve_timestamps(mut self) -> Self {
    self.preserve_timestamps = true;
    self
  }

  pub async fn push(&self, step: Result<Frame, AcquisitionError>) {
    self.script.lock().await.steps.push_back(step);
  }

  /// Number of `acquire` calls so far.
  pub async fn acquisitions(&self) -> usize {
    self.script.lock().await.acquisitions
  }

  /// Steps not yet played.
  pub async fn remaining(&self) -> usize {
    self.script.lock().await.steps.len()
  }
}

#[async_trait]
impl FrameSource for ScriptedFrameSource {
  async fn acquire(&self) -> Result<Frame, AcquisitionError> {
    let mut script = self.script.lock().await;
    script.acquisitions += 1;

    let frame = match script.steps.pop_front() {
      Some(Ok(frame)) => {
        script.last = Some(frame.clone());
        frame
      }
      Some(Err(err)) => return Err(err),
      None => script.last.clone().ok_or(AcquisitionError::Exhausted)?,
    };

    if self.preserve_timestamps {
      Ok(frame)
    } else {
      Ok(frame.restamped(Utc::now()))
    }
  }
}
