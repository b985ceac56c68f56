//! Oriented binary keypoint features.
//!
//! FAST-9 corners on a small image pyramid, oriented by intensity centroid and
//! described by 256 steered intensity comparisons on a smoothed image. Matching
//! is brute-force Hamming with a cross-check.

use std::sync::{Arc, LazyLock};

use image::GrayImage;
use image::imageops::{self, FilterType};
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::candidate::MatchCandidate;
use crate::matching::correlation_score;
use crate::region::Region;
use crate::template::Template;

/// Weight of the keypoint score in the blended feature-match confidence.
pub const FEATURE_WEIGHT: f32 = 0.7;
/// Weight of the direct correlation score in the blended feature-match confidence.
pub const CORRELATION_WEIGHT: f32 = 0.3;

const MAX_FEATURES: usize = 500;
const PYRAMID_LEVELS: u32 = 3;
const PYRAMID_SCALE: f32 = 1.25;
const FAST_THRESHOLD: u8 = 20;
const BORDER: u32 = 16;
const ORIENTATION_RADIUS: i32 = 15;
const PATTERN_RADIUS: i32 = 12;
const PATTERN_PAIRS: usize = 256;
const SMOOTHING_SIGMA: f32 = 2.0;
const GOOD_MATCH_DISTANCE: u32 = 64;

type Descriptor = [u64; 4];

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Keypoint {
  /// Position in full-resolution coordinates.
  pub x: f32,
  pub y: f32,
  pub response: f32,
}

/// Keypoints and their descriptors, index-aligned.
#[derive(Debug, Clone, Default)]
pub(crate) struct Features {
  keypoints: Vec<Keypoint>,
  descriptors: Vec<Descriptor>,
}

impl Features {
  pub fn len(&self) -> usize {
    self.keypoints.len()
  }

  pub fn is_empty(&self) -> bool {
    self.keypoints.is_empty()
  }
}

static PATTERN: LazyLock<Vec<[(f32, f32); 2]>> = LazyLock::new(|| {
  let mut rng = StdRng::seed_from_u64(0x5167_4c49_4e45);
  let mut sample = move || loop {
    let x = rng.gen_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
    let y = rng.gen_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
    if x * x + y * y <= PATTERN_RADIUS * PATTERN_RADIUS {
      return (x as f32, y as f32);
    }
  };
  (0..PATTERN_PAIRS).map(|_| [sample(), sample()]).collect()
});

/// Detect and describe keypoints across the pyramid, strongest first.
pub(crate) fn extract(image: &GrayImage) -> Features {
  let mut found: Vec<(Keypoint, Descriptor)> = Vec::new();
  let mut level_image = image.clone();
  let mut scale = 1.0f32;

  for level in 0..PYRAMID_LEVELS {
    if level > 0 {
      scale *= PYRAMID_SCALE;
      let width = (image.width() as f32 / scale).round() as u32;
      let height = (image.height() as f32 / scale).round() as u32;
      if width <= 2 * BORDER || height <= 2 * BORDER {
        break;
      }
      level_image = imageops::resize(image, width, height, FilterType::Triangle);
    }
    if level_image.width() <= 2 * BORDER || level_image.height() <= 2 * BORDER {
      break;
    }

    let smoothed = gaussian_blur_f32(&level_image, SMOOTHING_SIGMA);
    for corner in corners_fast9(&level_image, FAST_THRESHOLD) {
      if !inside_border(corner.x, corner.y, &level_image) {
        continue;
      }
      let angle = orientation(&level_image, corner.x, corner.y);
      let descriptor = describe(&smoothed, corner.x, corner.y, angle);
      let keypoint = Keypoint {
        x: corner.x as f32 * scale,
        y: corner.y as f32 * scale,
        response: corner.score,
      };
      found.push((keypoint, descriptor));
    }
  }

  found.sort_by(|(a, _), (b, _)| {
    b.response
      .total_cmp(&a.response)
      .then_with(|| a.y.total_cmp(&b.y))
      .then_with(|| a.x.total_cmp(&b.x))
  });
  found.truncate(MAX_FEATURES);

  let (keypoints, descriptors) = found.into_iter().unzip();
  Features {
    keypoints,
    descriptors,
  }
}

fn inside_border(x: u32, y: u32, image: &GrayImage) -> bool {
  x >= BORDER && y >= BORDER && x + BORDER < image.width() && y + BORDER < image.height()
}

fn orientation(image: &GrayImage, cx: u32, cy: u32) -> f32 {
  let (mut m10, mut m01) = (0.0f32, 0.0f32);
  for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
    for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
      if dx * dx + dy * dy > ORIENTATION_RADIUS * ORIENTATION_RADIUS {
        continue;
      }
      let px = (cx as i32 + dx) as u32;
      let py = (cy as i32 + dy) as u32;
      let intensity = image.get_pixel(px, py).0[0] as f32;
      m10 += dx as f32 * intensity;
      m01 += dy as f32 * intensity;
    }
  }
  m01.atan2(m10)
}

fn describe(smoothed: &GrayImage, cx: u32, cy: u32, angle: f32) -> Descriptor {
  let (sin, cos) = angle.sin_cos();
  let sample = |(x, y): (f32, f32)| {
    let rx = (x * cos - y * sin).round() as i32;
    let ry = (x * sin + y * cos).round() as i32;
    let px = (cx as i32 + rx) as u32;
    let py = (cy as i32 + ry) as u32;
    smoothed.get_pixel(px, py).0[0]
  };

  let mut descriptor = [0u64; 4];
  for (bit, [a, b]) in PATTERN.iter().enumerate() {
    if sample(*a) < sample(*b) {
      descriptor[bit / 64] |= 1 << (bit % 64);
    }
  }
  descriptor
}

fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
  a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Index and distance of the nearest descriptor in `pool`. Ties go to the lower index.
fn nearest(query: &Descriptor, pool: &[Descriptor]) -> Option<(usize, u32)> {
  pool
    .iter()
    .enumerate()
    .map(|(i, candidate)| (i, hamming(query, candidate)))
    .min_by_key(|&(i, distance)| (distance, i))
}

/// Cross-checked matches as (template index, scene index, distance).
fn cross_checked(template: &Features, scene: &Features) -> Vec<(usize, usize, u32)> {
  template
    .descriptors
    .iter()
    .enumerate()
    .filter_map(|(ti, descriptor)| {
      let (si, distance) = nearest(descriptor, &scene.descriptors)?;
      let (back, _) = nearest(&scene.descriptors[si], &template.descriptors)?;
      (back == ti).then_some((ti, si, distance))
    })
    .collect()
}

/// Score one template against the scene features of a region crop.
fn score_template(
  template: &Template,
  crop: &GrayImage,
  scene: &Features,
  region: &Region,
) -> MatchCandidate {
  let good: Vec<&Keypoint> = if template.features.is_empty() {
    Vec::new()
  } else {
    cross_checked(&template.features, scene)
      .into_iter()
      .filter(|&(_, _, distance)| distance <= GOOD_MATCH_DISTANCE)
      .map(|(_, si, _)| &scene.keypoints[si])
      .collect()
  };

  let feature_score = if template.features.is_empty() {
    0.0
  } else {
    (good.len() as f32 / template.features.len() as f32).min(1.0)
  };
  let correlation = correlation_score(template, crop);
  let confidence = FEATURE_WEIGHT * feature_score + CORRELATION_WEIGHT * correlation;

  let matched = if good.len() >= 2 {
    region.offset(bounding_box(&good, crop))
  } else {
    *region
  };
  MatchCandidate::new(&template.name, matched, confidence)
}

fn bounding_box(points: &[&Keypoint], crop: &GrayImage) -> Region {
  let (mut x0, mut y0) = (f32::MAX, f32::MAX);
  let (mut x1, mut y1) = (f32::MIN, f32::MIN);
  for point in points {
    x0 = x0.min(point.x);
    y0 = y0.min(point.y);
    x1 = x1.max(point.x);
    y1 = y1.max(point.y);
  }

  let x = (x0.floor().max(0.0) as u32).min(crop.width() - 1);
  let y = (y0.floor().max(0.0) as u32).min(crop.height() - 1);
  let right = (x1.ceil() as u32 + 1).min(crop.width());
  let bottom = (y1.ceil() as u32 + 1).min(crop.height());
  Region::new(x, y, (right - x).max(1), (bottom - y).max(1))
}

/// Score every template against the crop in parallel; keep those clearing `min_score`.
pub(crate) fn feature_match(
  templates: &[Arc<Template>],
  crop: &GrayImage,
  region: &Region,
  min_score: f32,
) -> Vec<MatchCandidate> {
  let scene = extract(crop);
  templates
    .par_iter()
    .map(|template| score_template(template, crop, &scene, region))
    .filter(|candidate| candidate.confidence >= min_score)
    .collect()
}
