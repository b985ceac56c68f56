use serde::{Deserialize, Serialize};

use crate::geometry::RegionDef;

/// A recognition condition.
///
/// `all` is a logical AND over its branches and `any` a logical OR; a bare
/// `check` is a single recognizer invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredicateDef {
  /// Always satisfied, no frame inspection.
  #[default]
  Always,
  Check(CheckDef),
  All {
    of: Vec<PredicateDef>,
  },
  Any {
    of: Vec<PredicateDef>,
  },
}

/// One recognizer invocation with its own confidence threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDef {
  pub recognizer: RecognizerDef,
  /// Region of interest. The whole frame when absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub roi: Option<RegionDef>,
  #[serde(default = "default_threshold")]
  pub threshold: f32,
}

fn default_threshold() -> f32 {
  0.8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecognizerDef {
  /// Direct pixel correlation against a single template.
  TemplateMatch { template: String },
  /// Keypoint matching blended with correlation, one candidate per template.
  FeatureMatch { templates: Vec<String> },
  /// Text recognition through the configured backend.
  TextExtract {
    #[serde(default)]
    languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filter: Option<TextFilterDef>,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextFilterDef {
  NumericRange {
    min: f64,
    max: f64,
  },
  Vocabulary {
    words: Vec<String>,
    #[serde(default = "default_min_similarity")]
    min_similarity: f32,
  },
  Pattern {
    regex: String,
  },
}

fn default_min_similarity() -> f32 {
  0.6
}
