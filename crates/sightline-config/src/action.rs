use serde::{Deserialize, Serialize};

use crate::geometry::RegionDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointDef {
  pub x: u32,
  pub y: u32,
}

/// Where a tap lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapTargetDef {
  Point(PointDef),
  /// Centre of a fixed region.
  Region(RegionDef),
  /// Centre of the best candidate returned by the node's predicate.
  Matched,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionDef {
  #[default]
  Noop,
  Tap {
    at: TapTargetDef,
    /// Uniform offset radius in pixels, applied on both axes.
    #[serde(default)]
    jitter: u32,
  },
  Swipe {
    from: PointDef,
    to: PointDef,
    #[serde(default = "default_swipe_ms")]
    duration_ms: u64,
  },
  Wait {
    duration_ms: u64,
  },
}

fn default_swipe_ms() -> u64 {
  300
}
