use std::collections::HashSet;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::contrast::{equalize_histogram, otsu_level};
use regex::Regex;

use crate::candidate::MatchCandidate;
use crate::region::Region;

/// Raw output of a text-recognition backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TextReading {
  pub text: String,
  pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("text backend unavailable: {message}")]
pub struct BackendUnavailable {
  pub message: String,
}

impl BackendUnavailable {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

/// A text-recognition engine. Receives an already binarized crop.
pub trait TextBackend: Send + Sync {
  fn name(&self) -> &str;

  fn extract(
    &self,
    image: &GrayImage,
    languages: &[String],
  ) -> Result<TextReading, BackendUnavailable>;
}

/// Constraint applied to a raw reading before it becomes a candidate.
#[derive(Debug, Clone)]
pub enum TextFilter {
  NumericRange { min: f64, max: f64 },
  Vocabulary { words: Vec<String>, min_similarity: f32 },
  Pattern(Regex),
}

impl TextFilter {
  /// Returns the accepted text and optional numeric value, or `None` to discard the reading.
  pub fn apply(&self, raw: &str) -> Option<(String, Option<f64>)> {
    match self {
      TextFilter::NumericRange { min, max } => {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let value: f64 = compact.parse().ok()?;
        (value >= *min && value <= *max).then_some((compact, Some(value)))
      }
      TextFilter::Vocabulary {
        words,
        min_similarity,
      } => {
        let (word, score) = words
          .iter()
          .map(|word| (word, similarity(raw, word)))
          .fold(None, |best: Option<(&String, f32)>, (word, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((word, score)),
          })?;
        (score >= *min_similarity).then(|| (word.clone(), None))
      }
      TextFilter::Pattern(regex) => {
        let captures = regex.captures(raw)?;
        let text = captures
          .get(1)
          .or_else(|| captures.get(0))
          .map(|m| m.as_str().to_string())?;
        Some((text, None))
      }
    }
  }
}

/// Similarity between a reading and a vocabulary word, case-insensitive.
///
/// Exact match scores 1.0, containment in either direction 0.9 when the shorter
/// string is at least half the longer one, otherwise the Jaccard index of the
/// two character sets.
pub fn similarity(a: &str, b: &str) -> f32 {
  let a = a.trim().to_lowercase();
  let b = b.trim().to_lowercase();
  if a == b {
    return 1.0;
  }
  if a.is_empty() || b.is_empty() {
    return 0.0;
  }
  let (short, long) = if a.chars().count() <= b.chars().count() {
    (&a, &b)
  } else {
    (&b, &a)
  };
  if long.contains(short.as_str()) && short.chars().count() * 2 >= long.chars().count() {
    return 0.9;
  }

  let left: HashSet<char> = a.chars().collect();
  let right: HashSet<char> = b.chars().collect();
  let union = left.union(&right).count();
  if union == 0 {
    return 0.0;
  }
  left.intersection(&right).count() as f32 / union as f32
}

/// Upscale, equalize and binarize a crop for the backend.
pub(crate) fn preprocess(crop: &GrayImage) -> GrayImage {
  let upscaled = imageops::resize(
    crop,
    crop.width() * 2,
    crop.height() * 2,
    FilterType::CatmullRom,
  );
  let equalized = equalize_histogram(&upscaled);
  let level = otsu_level(&equalized);
  GrayImage::from_fn(equalized.width(), equalized.height(), |x, y| {
    if equalized.get_pixel(x, y).0[0] > level {
      Luma([255])
    } else {
      Luma([0])
    }
  })
}

/// Run the backend over a crop and turn the reading into at most one candidate.
pub(crate) fn text_extract(
  backend: &dyn TextBackend,
  crop: &GrayImage,
  region: &Region,
  languages: &[String],
  filter: Option<&TextFilter>,
  min_score: f32,
) -> Result<Option<MatchCandidate>, BackendUnavailable> {
  let prepared = preprocess(crop);
  let reading = backend.extract(&prepared, languages)?;

  let raw = reading.text.trim();
  if raw.is_empty() {
    return Ok(None);
  }

  let (text, value) = match filter {
    Some(filter) => match filter.apply(raw) {
      Some(accepted) => accepted,
      None => {
        tracing::debug!(backend = backend.name(), reading = raw, "text_reading_filtered");
        return Ok(None);
      }
    },
    None => (raw.to_string(), None),
  };

  if reading.confidence < min_score {
    return Ok(None);
  }

  let mut candidate = MatchCandidate::new("text_extract", *region, reading.confidence).with_text(text);
  if let Some(value) = value {
    candidate = candidate.with_value(value);
  }
  Ok(Some(candidate))
}
