use std::sync::Arc;

use tracing::trace;

use crate::candidate::{MatchCandidate, rank};
use crate::error::RecognizeError;
use crate::features::feature_match;
use crate::frame::Frame;
use crate::matching::template_match;
use crate::region::Region;
use crate::template::TemplateSet;
use crate::text::{TextBackend, TextFilter, text_extract};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatchParams {
  pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureMatchParams {
  pub templates: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TextExtractParams {
  pub languages: Vec<String>,
  pub filter: Option<TextFilter>,
}

/// The closed set of recognition strategies.
#[derive(Debug, Clone)]
pub enum Recognizer {
  TemplateMatch(TemplateMatchParams),
  FeatureMatch(FeatureMatchParams),
  TextExtract(TextExtractParams),
}

impl Recognizer {
  pub fn strategy(&self) -> &'static str {
    match self {
      Recognizer::TemplateMatch(_) => "template_match",
      Recognizer::FeatureMatch(_) => "feature_match",
      Recognizer::TextExtract(_) => "text_extract",
    }
  }

  /// Template names this recognizer depends on.
  pub fn template_names(&self) -> Vec<&str> {
    match self {
      Recognizer::TemplateMatch(params) => vec![params.template.as_str()],
      Recognizer::FeatureMatch(params) => params.templates.iter().map(String::as_str).collect(),
      Recognizer::TextExtract(_) => Vec::new(),
    }
  }
}

/// Shared, read-only recognition context: loaded templates plus the optional text backend.
#[derive(Clone)]
pub struct RecognizerSet {
  templates: Arc<TemplateSet>,
  text_backend: Option<Arc<dyn TextBackend>>,
}

impl std::fmt::Debug for RecognizerSet {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RecognizerSet")
      .field("templates", &self.templates.len())
      .field("text_backend", &self.text_backend.as_ref().map(|b| b.name().to_string()))
      .finish()
  }
}

impl RecognizerSet {
  pub fn new(templates: Arc<TemplateSet>) -> Self {
    Self {
      templates,
      text_backend: None,
    }
  }

  pub fn with_text_backend(mut self, backend: Arc<dyn TextBackend>) -> Self {
    self.text_backend = Some(backend);
    self
  }

  pub fn templates(&self) -> &TemplateSet {
    &self.templates
  }

  pub fn has_text_backend(&self) -> bool {
    self.text_backend.is_some()
  }

  /// Evaluate one recognizer over `region` of `frame`.
  ///
  /// Returns candidates clearing `min_score`, highest confidence first. An empty
  /// result means "not visible"; errors mean the question could not be answered.
  pub fn evaluate(
    &self,
    frame: &Frame,
    recognizer: &Recognizer,
    region: &Region,
    min_score: f32,
  ) -> Result<Vec<MatchCandidate>, RecognizeError> {
    if !region.fits_within(frame.resolution()) {
      return Err(RecognizeError::RegionOutOfBounds {
        region: *region,
        frame_width: frame.width(),
        frame_height: frame.height(),
      });
    }

    let mut candidates = match recognizer {
      Recognizer::TemplateMatch(params) => {
        let template = self
          .templates
          .get(&params.template)
          .ok_or_else(|| RecognizeError::UnknownTemplate(params.template.clone()))?;
        let crop = frame.crop_gray(region);
        template_match(template, &crop, region, min_score)?
          .into_iter()
          .collect()
      }
      Recognizer::FeatureMatch(params) => {
        let templates = params
          .templates
          .iter()
          .map(|name| {
            self
              .templates
              .get(name)
              .cloned()
              .ok_or_else(|| RecognizeError::UnknownTemplate(name.clone()))
          })
          .collect::<Result<Vec<_>, _>>()?;
        let crop = frame.crop_gray(region);
        feature_match(&templates, &crop, region, min_score)
      }
      Recognizer::TextExtract(params) => {
        let backend = self
          .text_backend
          .as_deref()
          .ok_or_else(|| RecognizeError::Unavailable {
            strategy: "text_extract",
            message: "no text backend configured".to_string(),
          })?;
        let crop = frame.crop_gray(region);
        text_extract(
          backend,
          &crop,
          region,
          &params.languages,
          params.filter.as_ref(),
          min_score,
        )
        .map_err(|err| RecognizeError::Unavailable {
          strategy: "text_extract",
          message: err.message,
        })?
        .into_iter()
        .collect()
      }
    };

    rank(&mut candidates);
    trace!(
      strategy = recognizer.strategy(),
      region = %region,
      candidates = candidates.len(),
      best = candidates.first().map(|c| c.confidence).unwrap_or(0.0),
      "recognizer_evaluated"
    );
    Ok(candidates)
  }
}
