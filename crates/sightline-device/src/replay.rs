use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sightline_vision::Frame;
use tokio::sync::Mutex;
use tracing::debug;

use crate::FrameSource;
use crate::error::AcquisitionError;

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Default)]
struct Cursor {
  next: usize,
  last: Option<Frame>,
}

/// Replays image files from a directory in file-name order.
///
/// Each file is decoded when it is acquired and stamped with the acquisition
/// time. After the last file the final frame is repeated.
#[derive(Debug)]
pub struct ReplayFrameSource {
  paths: Vec<PathBuf>,
  cursor: Mutex<Cursor>,
}

impl ReplayFrameSource {
  pub fn new(paths: Vec<PathBuf>) -> Self {
    Self {
      paths,
      cursor: Mutex::new(Cursor::default()),
    }
  }

  pub async fn from_dir(dir: &Path) -> Result<Self, AcquisitionError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      let supported = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)));
      if supported {
        paths.push(path);
      }
    }
    paths.sort();
    debug!(directory = %dir.display(), frames = paths.len(), "replay_source_opened");
    Ok(Self::new(paths))
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }
}

#[async_trait]
impl FrameSource for ReplayFrameSource {
  async fn acquire(&self) -> Result<Frame, AcquisitionError> {
    let mut cursor = self.cursor.lock().await;

    let Some(path) = self.paths.get(cursor.next) else {
      return cursor
        .last
        .as_ref()
        .map(|frame| frame.restamped(Utc::now()))
        .ok_or(AcquisitionError::Exhausted);
    };

    // A file that fails to read or decode is skipped, not retried forever.
    let index = cursor.next;
    cursor.next += 1;

    let bytes = tokio::fs::read(path).await?;
    let image = image::load_from_memory(&bytes)
      .map_err(|source| AcquisitionError::Decode {
        path: path.clone(),
        source,
      })?
      .to_rgb8();

    let frame = Frame::now(image);
    debug!(path = %path.display(), index, "replay_frame_acquired");
    cursor.last = Some(frame.clone());
    Ok(frame)
  }
}
