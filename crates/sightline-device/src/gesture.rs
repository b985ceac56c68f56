use serde::{Deserialize, Serialize};

/// A positional input command, in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Gesture {
  Tap {
    x: u32,
    y: u32,
  },
  Swipe {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
    duration_ms: u64,
  },
  Wait {
    duration_ms: u64,
  },
}

/// Acknowledgement that the transport accepted a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;
