//! Sightline Device
//!
//! The two collaborators a run talks to: a [`FrameSource`] that supplies the
//! current picture of the session, and an [`InputSink`] that delivers gestures.
//!
//! Real transports (screen capture, adb, window input) live outside this crate.
//! What ships here are in-process implementations used for tests and dry runs:
//! - [`ScriptedFrameSource`]: a queue of frames and failures
//! - [`ReplayFrameSource`]: image files from a directory, in name order
//! - [`RecordingInputSink`]: records every gesture and can reject on demand

mod error;
mod gesture;
mod recording;
mod replay;
mod scripted;

pub use error::{AcquisitionError, DispatchError};
pub use gesture::{Ack, Gesture};
pub use recording::RecordingInputSink;
pub use replay::ReplayFrameSource;
pub use scripted::ScriptedFrameSource;

use async_trait::async_trait;
use sightline_vision::Frame;

/// Supplies the current frame on demand.
///
/// Safe to call at the executor's polling cadence. Implementations may cache,
/// but a returned frame carries its true capture time so staleness can be judged.
#[async_trait]
pub trait FrameSource: Send + Sync {
  async fn acquire(&self) -> Result<Frame, AcquisitionError>;
}

/// Delivers gestures to the session.
///
/// `Ok` only means the transport accepted the command, not that it had any effect.
#[async_trait]
pub trait InputSink: Send + Sync {
  async fn dispatch(&self, gesture: &Gesture) -> Result<Ack, DispatchError>;
}
