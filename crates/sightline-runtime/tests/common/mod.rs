#![allow(dead_code)]

use std::sync::Arc;

use image::{GrayImage, Luma, Rgb, RgbImage};
use sightline_config::GraphDef;
use sightline_device::{FrameSource, InputSink, RecordingInputSink, ScriptedFrameSource};
use sightline_graph::TaskGraph;
use sightline_runtime::{Executor, ExecutorConfig, TraceEntry, TraceEvent};
use sightline_vision::{Frame, RecognizerSet, Template, TemplateSet};

pub const WIDTH: u32 = 160;
pub const HEIGHT: u32 = 120;

/// Deterministic high-entropy texture. Different seeds give unrelated patterns.
pub fn textured(width: u32, height: u32, seed: u32) -> GrayImage {
  GrayImage::from_fn(width, height, |x, y| {
    let mut v = x
      .wrapping_mul(2_654_435_761)
      .wrapping_add(y.wrapping_mul(40_503))
      .wrapping_add(seed.wrapping_mul(97_787));
    v ^= v >> 13;
    v = v.wrapping_mul(2_246_822_519);
    v ^= v >> 16;
    Luma([(v & 0xff) as u8])
  })
}

pub fn p1() -> GrayImage {
  textured(24, 18, 1)
}

pub fn p2() -> GrayImage {
  textured(24, 18, 2)
}

pub fn templates() -> TemplateSet {
  TemplateSet::from_templates(vec![Template::new("p1", p1()), Template::new("p2", p2())]).unwrap()
}

/// A black frame with `patch` pasted at (x, y).
pub fn frame_with(patch: &GrayImage, x: u32, y: u32) -> Frame {
  let mut image = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([0, 0, 0]));
  for (px, py, pixel) in patch.enumerate_pixels() {
    let v = pixel.0[0];
    image.put_pixel(x + px, y + py, Rgb([v, v, v]));
  }
  Frame::now(image)
}

/// A frame no template matches.
pub fn blank() -> Frame {
  Frame::now(RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([0, 0, 0])))
}

pub fn graph(json: &str) -> Arc<TaskGraph> {
  let def: GraphDef = serde_json::from_str(json).unwrap();
  Arc::new(TaskGraph::build(def, &templates()).unwrap())
}

pub struct Harness {
  pub executor: Executor,
  pub frames: Arc<ScriptedFrameSource>,
  pub sink: Arc<RecordingInputSink>,
}

pub fn harness(json: &str, frames: ScriptedFrameSource) -> Harness {
  harness_with(json, frames, RecognizerSet::new(Arc::new(templates())))
}

pub fn harness_with(json: &str, frames: ScriptedFrameSource, recognizers: RecognizerSet) -> Harness {
  let frames = Arc::new(frames);
  let sink = Arc::new(RecordingInputSink::new());
  let executor = Executor::new(
    graph(json),
    Arc::new(recognizers),
    frames.clone() as Arc<dyn FrameSource>,
    sink.clone() as Arc<dyn InputSink>,
  )
  .with_config(ExecutorConfig {
    jitter_seed: Some(7),
    ..ExecutorConfig::default()
  });

  Harness {
    executor,
    frames,
    sink,
  }
}

pub fn events(trace: &[TraceEntry]) -> Vec<TraceEvent> {
  trace.iter().map(|entry| entry.event.clone()).collect()
}
