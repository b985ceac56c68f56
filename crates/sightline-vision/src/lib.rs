//! Sightline Vision
//!
//! The recognition engine: given a [`Frame`], a region of interest and a
//! [`Recognizer`], answer "is this visible, and where?" with confidence-scored
//! [`MatchCandidate`]s, best first.
//!
//! Strategies are a closed set:
//! - template match: normalized cross-correlation against one stored template
//! - feature match: oriented binary keypoints blended with correlation
//! - text extraction: a pluggable [`TextBackend`] plus an optional filter
//!
//! Every strategy is a pure function of (frame, region, parameters). Templates
//! are loaded once into an immutable [`TemplateSet`] and shared read-only.

mod candidate;
mod error;
mod features;
mod frame;
mod matching;
mod recognizer;
mod region;
mod template;
mod text;

pub use candidate::MatchCandidate;
pub use error::{RecognizeError, TemplateError};
pub use features::{CORRELATION_WEIGHT, FEATURE_WEIGHT};
pub use frame::{Frame, Resolution};
pub use recognizer::{
  FeatureMatchParams, Recognizer, RecognizerSet, TemplateMatchParams, TextExtractParams,
};
pub use region::Region;
pub use template::{Template, TemplateMetadata, TemplateSet};
pub use text::{BackendUnavailable, TextBackend, TextFilter, TextReading, similarity};

#[cfg(test)]
pub(crate) mod testing {
  use image::{GrayImage, Luma, Rgb, RgbImage};

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

  /// An RGB frame of the given colour with `patch` pasted at (x, y).
  pub fn frame_with_patch(
    width: u32,
    height: u32,
    fill: u8,
    patch: &GrayImage,
    x: u32,
    y: u32,
  ) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, Rgb([fill, fill, fill]));
    for (px, py, pixel) in patch.enumerate_pixels() {
      let v = pixel.0[0];
      image.put_pixel(x + px, y + py, Rgb([v, v, v]));
    }
    image
  }
}
