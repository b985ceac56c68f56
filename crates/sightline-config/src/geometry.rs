use serde::{Deserialize, Serialize};

/// A rectangle in reference-resolution coordinates.
///
/// When the graph declares a `reference_resolution`, regions are scaled from it
/// to the size of each captured frame. Otherwise they are frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDef {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

/// The resolution the graph's coordinates were authored against, e.g. 1280x720.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionDef {
  pub width: u32,
  pub height: u32,
}
