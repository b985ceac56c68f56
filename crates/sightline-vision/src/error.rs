use std::path::PathBuf;

use crate::region::Region;

/// Errors from evaluating a recognizer against a frame.
#[derive(Debug, thiserror::Error)]
pub enum RecognizeError {
  #[error("region {region} is outside the {frame_width}x{frame_height} frame")]
  RegionOutOfBounds {
    region: Region,
    frame_width: u32,
    frame_height: u32,
  },

  #[error("template '{template}' ({template_width}x{template_height}) does not fit region {region}")]
  TemplateLargerThanRegion {
    template: String,
    template_width: u32,
    template_height: u32,
    region: Region,
  },

  #[error("unknown template: {0}")]
  UnknownTemplate(String),

  /// The strategy's backend cannot be reached. Distinct from an empty result.
  #[error("{strategy} recognizer unavailable: {message}")]
  Unavailable {
    strategy: &'static str,
    message: String,
  },
}

impl RecognizeError {
  pub fn is_unavailable(&self) -> bool {
    matches!(self, RecognizeError::Unavailable { .. })
  }
}

/// Errors from loading templates.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to decode image {path}: {source}")]
  Image {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },

  #[error("invalid template metadata {path}: {source}")]
  Metadata {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("duplicate template name: {name}")]
  Duplicate { name: String },
}
