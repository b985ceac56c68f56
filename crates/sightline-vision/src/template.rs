use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::TemplateError;
use crate::features::{self, Features};
use crate::region::Region;

/// A named reference image with its precomputed keypoint features.
#[derive(Debug, Clone)]
pub struct Template {
  pub name: String,
  pub image: GrayImage,
  pub created_at: DateTime<Utc>,
  pub source_region: Option<Region>,
  pub label: Option<String>,
  pub(crate) features: Features,
}

impl Template {
  pub fn new(name: impl Into<String>, image: GrayImage) -> Self {
    let features = features::extract(&image);
    Self {
      name: name.into(),
      image,
      created_at: Utc::now(),
      source_region: None,
      label: None,
      features,
    }
  }

  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.label = Some(label.into());
    self
  }

  pub fn with_source_region(mut self, region: Region) -> Self {
    self.source_region = Some(region);
    self
  }

  pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
    self.created_at = created_at;
    self
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// Number of keypoints detected at load time.
  pub fn keypoint_count(&self) -> usize {
    self.features.len()
  }
}

/// Sidecar metadata stored next to a template image as `<name>.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateMetadata {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_region: Option<Region>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
}

/// Immutable set of templates keyed by name.
#[derive(Debug, Default)]
pub struct TemplateSet {
  templates: HashMap<String, Arc<Template>>,
}

impl TemplateSet {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn from_templates(
    templates: impl IntoIterator<Item = Template>,
  ) -> Result<Self, TemplateError> {
    let mut map = HashMap::new();
    for template in templates {
      let name = template.name.clone();
      if map.insert(name.clone(), Arc::new(template)).is_some() {
        return Err(TemplateError::Duplicate { name });
      }
    }
    Ok(Self { templates: map })
  }

  /// Load every `*.png` in `dir`, keyed by file stem.
  ///
  /// Decoding and feature extraction run in parallel.
  pub fn load_dir(dir: &Path) -> Result<Self, TemplateError> {
    let entries = fs::read_dir(dir).map_err(|source| TemplateError::Io {
      path: dir.to_path_buf(),
      source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
      let entry = entry.map_err(|source| TemplateError::Io {
        path: dir.to_path_buf(),
        source,
      })?;
      let path = entry.path();
      let is_png = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
      if is_png {
        paths.push(path);
      }
    }
    paths.sort();

    let templates = paths
      .par_iter()
      .map(|path| load_template(path))
      .collect::<Result<Vec<_>, _>>()?;

    let set = Self::from_templates(templates)?;
    info!(directory = %dir.display(), count = set.len(), "templates_loaded");
    Ok(set)
  }

  pub fn get(&self, name: &str) -> Option<&Arc<Template>> {
    self.templates.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.templates.contains_key(name)
  }

  /// Template names in sorted order.
  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }

  pub fn len(&self) -> usize {
    self.templates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.templates.is_empty()
  }
}

fn load_template(path: &Path) -> Result<Template, TemplateError> {
  let name = path
    .file_stem()
    .and_then(|stem| stem.to_str())
    .unwrap_or_default()
    .to_string();

  let image = image::open(path)
    .map_err(|source| TemplateError::Image {
      path: path.to_path_buf(),
      source,
    })?
    .to_luma8();

  let metadata = load_metadata(&path.with_extension("json"))?;
  let created_at = match metadata.created_at {
    Some(created_at) => created_at,
    None => modified_time(path).unwrap_or_else(Utc::now),
  };

  let mut template = Template::new(name, image).with_created_at(created_at);
  template.label = metadata.label;
  template.source_region = metadata.source_region;

  debug!(
    template = %template.name,
    width = template.width(),
    height = template.height(),
    keypoints = template.keypoint_count(),
    "template_loaded"
  );
  Ok(template)
}

fn load_metadata(path: &PathBuf) -> Result<TemplateMetadata, TemplateError> {
  if !path.exists() {
    return Ok(TemplateMetadata::default());
  }
  let raw = fs::read_to_string(path).map_err(|source| TemplateError::Io {
    path: path.clone(),
    source,
  })?;
  serde_json::from_str(&raw).map_err(|source| TemplateError::Metadata {
    path: path.clone(),
    source,
  })
}

fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
  let modified = fs::metadata(path).ok()?.modified().ok()?;
  Some(DateTime::<Utc>::from(modified))
}
