use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frame::Resolution;

/// A rectangle in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl Region {
  pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// The region covering a whole surface of the given size.
  pub const fn full(resolution: Resolution) -> Self {
    Self::new(0, 0, resolution.width, resolution.height)
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  /// Right edge, exclusive.
  pub fn right(&self) -> u64 {
    self.x as u64 + self.width as u64
  }

  /// Bottom edge, exclusive.
  pub fn bottom(&self) -> u64 {
    self.y as u64 + self.height as u64
  }

  pub fn center(&self) -> (u32, u32) {
    (self.x + self.width / 2, self.y + self.height / 2)
  }

  /// Whether the region is non-empty and lies entirely inside a surface of the given size.
  pub fn fits_within(&self, resolution: Resolution) -> bool {
    !self.is_empty()
      && self.right() <= resolution.width as u64
      && self.bottom() <= resolution.height as u64
  }

  /// Map the region from one resolution to another.
  ///
  /// Edges are scaled independently and floored, so a region inside `from`
  /// stays inside `to`. Width and height never collapse below one pixel.
  pub fn scale(&self, from: Resolution, to: Resolution) -> Region {
    if from == to || from.width == 0 || from.height == 0 {
      return *self;
    }

    let scale_edge = |value: u64, num: u32, den: u32| (value * num as u64 / den as u64) as u32;

    let x0 = scale_edge(self.x as u64, to.width, from.width);
    let y0 = scale_edge(self.y as u64, to.height, from.height);
    let x1 = scale_edge(self.right(), to.width, from.width);
    let y1 = scale_edge(self.bottom(), to.height, from.height);

    Region::new(x0, y0, (x1 - x0).max(1), (y1 - y0).max(1))
  }

  /// Translate a region expressed relative to this one into the outer coordinate space.
  pub fn offset(&self, inner: Region) -> Region {
    Region::new(self.x + inner.x, self.y + inner.y, inner.width, inner.height)
  }
}

impl fmt::Display for Region {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "({}, {}, {}x{})",
      self.x, self.y, self.width, self.height
    )
  }
}
