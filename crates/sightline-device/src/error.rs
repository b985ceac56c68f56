use std::path::PathBuf;

/// Errors from acquiring a frame.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
  /// The source has nothing more to give.
  #[error("frame source exhausted")]
  Exhausted,

  #[error("capture failed: {0}")]
  Capture(String),

  #[error("failed to decode frame {path}: {source}")]
  Decode {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Errors from dispatching a gesture.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
  #[error("gesture rejected: {0}")]
  Rejected(String),

  #[error("input transport disconnected")]
  Disconnected,
}
