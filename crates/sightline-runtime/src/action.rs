use rand::Rng;
use rand::rngs::StdRng;
use sightline_device::Gesture;
use sightline_graph::{Action, TapTarget, TaskGraph};
use sightline_vision::{MatchCandidate, Resolution};

/// Turn a node's action into a concrete gesture for a frame of the given size.
///
/// Tap jitter is drawn from `rng` and the result is kept inside the frame.
/// `Noop` yields no gesture.
pub(crate) fn resolve(
  graph: &TaskGraph,
  action: &Action,
  best: Option<&MatchCandidate>,
  frame: Resolution,
  rng: &mut StdRng,
) -> Result<Option<Gesture>, String> {
  let gesture = match action {
    Action::Noop => return Ok(None),
    Action::Tap { target, jitter } => {
      let (x, y) = match target {
        TapTarget::Point(point) => {
          let point = graph.frame_point(*point, frame);
          (point.x, point.y)
        }
        TapTarget::Region(region) => graph.frame_region(Some(region), frame).center(),
        TapTarget::Matched => best
          .map(|candidate| candidate.region.center())
          .ok_or_else(|| "tap at matched location without a matched candidate".to_string())?,
      };
      let (x, y) = jittered(x, y, *jitter, frame, rng);
      Gesture::Tap { x, y }
    }
    Action::Swipe { from, to, duration } => {
      let from = graph.frame_point(*from, frame);
      let to = graph.frame_point(*to, frame);
      Gesture::Swipe {
        x1: from.x,
        y1: from.y,
        x2: to.x,
        y2: to.y,
        duration_ms: duration.as_millis() as u64,
      }
    }
    Action::Wait { duration } => Gesture::Wait {
      duration_ms: duration.as_millis() as u64,
    },
  };
  Ok(Some(gesture))
}

fn jittered(x: u32, y: u32, radius: u32, frame: Resolution, rng: &mut StdRng) -> (u32, u32) {
  if radius == 0 {
    return (x, y);
  }
  let radius = radius as i64;
  let dx = rng.gen_range(-radius..=radius);
  let dy = rng.gen_range(-radius..=radius);
  let clamp = |value: i64, limit: u32| value.clamp(0, limit.saturating_sub(1) as i64) as u32;
  (clamp(x as i64 + dx, frame.width), clamp(y as i64 + dy, frame.height))
}
