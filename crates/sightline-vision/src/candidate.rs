use serde::Serialize;

use crate::region::Region;

/// One scored answer from a recognizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
  /// Template name, or the strategy name for text extraction.
  pub source: String,
  /// Matched area in frame coordinates.
  pub region: Region,
  /// Score in [0, 1].
  pub confidence: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub value: Option<f64>,
}

impl MatchCandidate {
  pub fn new(source: impl Into<String>, region: Region, confidence: f32) -> Self {
    Self {
      source: source.into(),
      region,
      confidence: confidence.clamp(0.0, 1.0),
      text: None,
      value: None,
    }
  }

  pub fn with_text(mut self, text: impl Into<String>) -> Self {
    self.text = Some(text.into());
    self
  }

  pub fn with_value(mut self, value: f64) -> Self {
    self.value = Some(value);
    self
  }
}

/// Highest confidence first; ties broken by source name so ordering is stable.
pub(crate) fn rank(candidates: &mut [MatchCandidate]) {
  candidates.sort_by(|a, b| {
    b.confidence
      .total_cmp(&a.confidence)
      .then_with(|| a.source.cmp(&b.source))
  });
}
