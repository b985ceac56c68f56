use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::{GrayImage, RgbImage, imageops};
use serde::{Deserialize, Serialize};

use crate::region::Region;

/// Width and height of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
  pub width: u32,
  pub height: u32,
}

impl Resolution {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }
}

/// An immutable snapshot of the observed surface.
///
/// Pixels sit behind an `Arc`, so clones are cheap and share the buffer.
#[derive(Debug, Clone)]
pub struct Frame {
  image: Arc<RgbImage>,
  captured_at: DateTime<Utc>,
}

impl Frame {
  pub fn new(image: RgbImage, captured_at: DateTime<Utc>) -> Self {
    Self {
      image: Arc::new(image),
      captured_at,
    }
  }

  /// A frame stamped with the current time.
  pub fn now(image: RgbImage) -> Self {
    Self::new(image, Utc::now())
  }

  /// The same pixels with a new capture time. The buffer is shared, not copied.
  pub fn restamped(&self, captured_at: DateTime<Utc>) -> Self {
    Self {
      image: Arc::clone(&self.image),
      captured_at,
    }
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn resolution(&self) -> Resolution {
    Resolution::new(self.width(), self.height())
  }

  pub fn captured_at(&self) -> DateTime<Utc> {
    self.captured_at
  }

  /// Age of the frame relative to `now`. Frames stamped in the future have zero age.
  pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
    (now - self.captured_at).to_std().unwrap_or_default()
  }

  /// Grayscale copy of a region. The caller guarantees the region fits the frame.
  pub(crate) fn crop_gray(&self, region: &Region) -> GrayImage {
    let view = imageops::crop_imm(
      self.image.as_ref(),
      region.x,
      region.y,
      region.width,
      region.height,
    )
    .to_image();
    imageops::grayscale(&view)
  }
}
