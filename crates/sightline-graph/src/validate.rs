use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use sightline_config::{
  ActionDef, CheckDef, DefaultsDef, GraphDef, NodeDef, PointDef, PredicateDef, RecognizerDef,
  RegionDef, RetryDef, TapTargetDef, TargetDef, TextFilterDef, TransitionDef,
};
use sightline_vision::{
  FeatureMatchParams, Recognizer, Region, Resolution, TemplateMatchParams, TemplateSet,
  TextExtractParams, TextFilter,
};

use crate::error::GraphError;
use crate::graph::Graph;
use crate::node::{
  Action, Backoff, Check, Point, Predicate, RetryPolicy, TapTarget, Target, TaskNode, Transition,
};

/// Every node id a node can progress to, with `Stay` and `Terminal` excluded.
fn referenced_nodes(node: &NodeDef) -> impl Iterator<Item = &str> {
  node
    .transitions
    .iter()
    .map(|t| &t.next)
    .chain(node.default.iter())
    .filter_map(|target| match target {
      TargetDef::Goto(id) => Some(id.as_str()),
      TargetDef::Stay | TargetDef::Terminal => None,
    })
    .chain(node.on_timeout.as_deref())
}

fn ends_run(node: &NodeDef) -> bool {
  node
    .transitions
    .iter()
    .map(|t| &t.next)
    .chain(node.default.iter())
    .any(|target| *target == TargetDef::Terminal)
}

/// Structural rules, checked in order: unique ids, known targets, start exists,
/// every node has somewhere to go, and a terminal is reachable from start.
pub(crate) fn check_structure(def: &GraphDef) -> Result<Graph, GraphError> {
  let mut node_ids = HashSet::new();
  for node in &def.nodes {
    if !node_ids.insert(node.node_id.as_str()) {
      return Err(GraphError::DuplicateNodeId {
        node_id: node.node_id.clone(),
      });
    }
  }

  let mut edges = Vec::new();
  for node in &def.nodes {
    for target in referenced_nodes(node) {
      if !node_ids.contains(target) {
        return Err(GraphError::UnknownTarget {
          node_id: node.node_id.clone(),
          target: target.to_string(),
        });
      }
      edges.push((node.node_id.clone(), target.to_string()));
    }
  }

  if !node_ids.contains(def.start.as_str()) {
    return Err(GraphError::StartNotFound {
      start: def.start.clone(),
    });
  }

  for node in &def.nodes {
    if node.transitions.is_empty() && node.default.is_none() {
      return Err(GraphError::NoOutgoing {
        node_id: node.node_id.clone(),
      });
    }
  }

  let terminals = def
    .nodes
    .iter()
    .filter(|node| ends_run(node))
    .map(|node| node.node_id.as_str());
  let graph = Graph::new(node_ids.iter().copied(), &edges, terminals);

  if !graph.terminal_reachable(&def.start) {
    return Err(GraphError::NoReachableTerminal {
      start: def.start.clone(),
    });
  }

  Ok(graph)
}

/// Converts configuration nodes into validated task nodes.
pub(crate) struct Lowering<'a> {
  pub templates: &'a TemplateSet,
  pub reference: Option<Resolution>,
  pub defaults: DefaultsDef,
}

impl Lowering<'_> {
  pub fn node(&self, def: NodeDef) -> Result<TaskNode, GraphError> {
    let node_id = def.node_id;

    let predicate = self.predicate(&node_id, def.predicate)?;
    let action = self.action(&node_id, def.action)?;
    if matches!(
      action,
      Action::Tap {
        target: TapTarget::Matched,
        ..
      }
    ) && !predicate.has_checks()
    {
      return Err(GraphError::MatchedTapWithoutPredicate { node_id });
    }

    let transitions = def
      .transitions
      .into_iter()
      .map(|TransitionDef { when, next }| {
        Ok(Transition {
          when: self.predicate(&node_id, when)?,
          next: target(next),
        })
      })
      .collect::<Result<Vec<_>, GraphError>>()?;

    let retry = retry_policy(&node_id, def.retry.unwrap_or(self.defaults.retry))?;

    let timeout_ms = def.timeout_ms.unwrap_or(self.defaults.timeout_ms);
    if timeout_ms == 0 {
      return Err(GraphError::InvalidTimeout { node_id });
    }

    if def.max_visits == Some(0) {
      return Err(GraphError::InvalidVisitLimit { node_id });
    }

    Ok(TaskNode {
      predicate,
      action,
      transitions,
      default: def.default.map(target).unwrap_or(Target::Stay),
      retry,
      timeout: Duration::from_millis(timeout_ms),
      on_timeout: def.on_timeout,
      pre_delay: Duration::from_millis(def.pre_delay_ms.unwrap_or(0)),
      post_delay: Duration::from_millis(def.post_delay_ms.unwrap_or(0)),
      max_visits: def.max_visits,
      node_id,
    })
  }

  fn predicate(&self, node_id: &str, def: PredicateDef) -> Result<Predicate, GraphError> {
    match def {
      PredicateDef::Always => Ok(Predicate::Always),
      PredicateDef::Check(check) => self.check(node_id, check).map(Predicate::Check),
      PredicateDef::All { of } => self.branches(node_id, "all", of).map(Predicate::All),
      PredicateDef::Any { of } => self.branches(node_id, "any", of).map(Predicate::Any),
    }
  }

  fn branches(
    &self,
    node_id: &str,
    kind: &str,
    of: Vec<PredicateDef>,
  ) -> Result<Vec<Predicate>, GraphError> {
    if of.is_empty() {
      return Err(GraphError::InvalidPredicate {
        node_id: node_id.to_string(),
        message: format!("'{}' group has no branches", kind),
      });
    }
    of.into_iter()
      .map(|branch| self.predicate(node_id, branch))
      .collect()
  }

  fn check(&self, node_id: &str, def: CheckDef) -> Result<Check, GraphError> {
    if !(0.0..=1.0).contains(&def.threshold) {
      return Err(GraphError::InvalidThreshold {
        node_id: node_id.to_string(),
        threshold: def.threshold,
      });
    }

    let region = def.roi.map(|roi| self.region(node_id, roi)).transpose()?;
    let recognizer = self.recognizer(node_id, def.recognizer)?;

    Ok(Check {
      recognizer,
      region,
      threshold: def.threshold,
    })
  }

  fn recognizer(&self, node_id: &str, def: RecognizerDef) -> Result<Recognizer, GraphError> {
    let recognizer = match def {
      RecognizerDef::TemplateMatch { template } => {
        Recognizer::TemplateMatch(TemplateMatchParams { template })
      }
      RecognizerDef::FeatureMatch { templates } => {
        if templates.is_empty() {
          return Err(GraphError::InvalidPredicate {
            node_id: node_id.to_string(),
            message: "feature match lists no templates".to_string(),
          });
        }
        Recognizer::FeatureMatch(FeatureMatchParams { templates })
      }
      RecognizerDef::TextExtract { languages, filter } => {
        Recognizer::TextExtract(TextExtractParams {
          languages,
          filter: filter.map(|f| text_filter(node_id, f)).transpose()?,
        })
      }
    };

    for name in recognizer.template_names() {
      if !self.templates.contains(name) {
        return Err(GraphError::UnknownTemplate {
          node_id: node_id.to_string(),
          template: name.to_string(),
        });
      }
    }
    Ok(recognizer)
  }

  fn region(&self, node_id: &str, def: RegionDef) -> Result<Region, GraphError> {
    let region = Region::new(def.x, def.y, def.width, def.height);
    if region.is_empty() {
      return Err(GraphError::InvalidRegion {
        node_id: node_id.to_string(),
        message: format!("{} has zero area", region),
      });
    }
    if let Some(reference) = self.reference
      && !region.fits_within(reference)
    {
      return Err(GraphError::InvalidRegion {
        node_id: node_id.to_string(),
        message: format!(
          "{} extends past the {}x{} reference resolution",
          region, reference.width, reference.height
        ),
      });
    }
    Ok(region)
  }

  fn point(&self, node_id: &str, def: PointDef) -> Result<Point, GraphError> {
    if let Some(reference) = self.reference
      && (def.x >= reference.width || def.y >= reference.height)
    {
      return Err(GraphError::InvalidPoint {
        node_id: node_id.to_string(),
        message: format!(
          "({}, {}) is outside the {}x{} reference resolution",
          def.x, def.y, reference.width, reference.height
        ),
      });
    }
    Ok(Point { x: def.x, y: def.y })
  }

  fn action(&self, node_id: &str, def: ActionDef) -> Result<Action, GraphError> {
    Ok(match def {
      ActionDef::Noop => Action::Noop,
      ActionDef::Tap { at, jitter } => {
        let target = match at {
          TapTargetDef::Point(point) => TapTarget::Point(self.point(node_id, point)?),
          TapTargetDef::Region(region) => TapTarget::Region(self.region(node_id, region)?),
          TapTargetDef::Matched => TapTarget::Matched,
        };
        Action::Tap { target, jitter }
      }
      ActionDef::Swipe {
        from,
        to,
        duration_ms,
      } => Action::Swipe {
        from: self.point(node_id, from)?,
        to: self.point(node_id, to)?,
        duration: Duration::from_millis(duration_ms),
      },
      ActionDef::Wait { duration_ms } => Action::Wait {
        duration: Duration::from_millis(duration_ms),
      },
    })
  }
}

fn target(def: TargetDef) -> Target {
  match def {
    TargetDef::Goto(id) => Target::Node(id),
    TargetDef::Stay => Target::Stay,
    TargetDef::Terminal => Target::Terminal,
  }
}

fn text_filter(node_id: &str, def: TextFilterDef) -> Result<TextFilter, GraphError> {
  let invalid = |message: String| GraphError::InvalidFilter {
    node_id: node_id.to_string(),
    message,
  };

  match def {
    TextFilterDef::NumericRange { min, max } => {
      if !min.is_finite() || !max.is_finite() || min > max {
        return Err(invalid(format!("range [{}, {}] is not ordered", min, max)));
      }
      Ok(TextFilter::NumericRange { min, max })
    }
    TextFilterDef::Vocabulary {
      words,
      min_similarity,
    } => {
      if words.is_empty() {
        return Err(invalid("vocabulary is empty".to_string()));
      }
      if !(0.0..=1.0).contains(&min_similarity) {
        return Err(invalid(format!(
          "min_similarity {} outside [0, 1]",
          min_similarity
        )));
      }
      Ok(TextFilter::Vocabulary {
        words,
        min_similarity,
      })
    }
    TextFilterDef::Pattern { regex } => Regex::new(&regex)
      .map(TextFilter::Pattern)
      .map_err(|err| invalid(format!("regex does not compile: {}", err))),
  }
}

fn retry_policy(node_id: &str, def: RetryDef) -> Result<RetryPolicy, GraphError> {
  let invalid = |message: &str| GraphError::InvalidRetryPolicy {
    node_id: node_id.to_string(),
    message: message.to_string(),
  };

  if def.max_attempts == 0 {
    return Err(invalid("max_attempts must be at least 1"));
  }
  if def.max_delay_ms < def.initial_delay_ms {
    return Err(invalid("max_delay_ms is smaller than initial_delay_ms"));
  }

  Ok(RetryPolicy {
    max_attempts: def.max_attempts,
    backoff: Backoff {
      kind: def.backoff,
      initial: Duration::from_millis(def.initial_delay_ms),
      max: Duration::from_millis(def.max_delay_ms),
    },
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{GrayImage, Luma};
  use sightline_vision::Template;

  fn templates() -> TemplateSet {
    TemplateSet::from_templates(vec![Template::new(
      "confirm",
      GrayImage::from_pixel(4, 4, Luma([200])),
    )])
    .unwrap()
  }

  /// One node `a` with the given fields merged in, ending in a terminal default.
  fn single_node(fields: &str) -> GraphDef {
    let json = format!(
      r#"{{ "graph_id": "g", "name": "g", "start": "a",
           "reference_resolution": {{ "width": 1280, "height": 720 }},
           "nodes": [{{ "node_id": "a", "default": "terminal" {} }}] }}"#,
      fields
    );
    serde_json::from_str(&json).unwrap()
  }

  fn lower(def: GraphDef) -> Result<TaskNode, GraphError> {
    check_structure(&def)?;
    let templates = templates();
    let lowering = Lowering {
      templates: &templates,
      reference: Some(Resolution::new(1280, 720)),
      defaults: def.defaults,
    };
    let node = def.nodes.into_iter().next().unwrap();
    lowering.node(node)
  }

  #[test]
  fn test_unknown_template() {
    let err = lower(single_node(
      r#", "predicate": { "type": "check", "recognizer": { "type": "template_match", "template": "nope" } }"#,
    ))
    .unwrap_err();
    assert_eq!(
      err,
      GraphError::UnknownTemplate {
        node_id: "a".to_string(),
        template: "nope".to_string()
      }
    );
  }

  #[test]
  fn test_unknown_template_inside_feature_match() {
    let err = lower(single_node(
      r#", "predicate": { "type": "any", "of": [
            { "type": "check", "recognizer": { "type": "feature_match", "templates": ["confirm", "other"] } }
          ] }"#,
    ))
    .unwrap_err();
    assert!(matches!(err, GraphError::UnknownTemplate { template, .. } if template == "other"));
  }

  #[test]
  fn test_region_outside_reference() {
    let err = lower(single_node(
      r#", "predicate": { "type": "check", "recognizer": { "type": "template_match", "template": "confirm" },
                          "roi": { "x": 1200, "y": 0, "width": 100, "height": 10 } }"#,
    ))
    .unwrap_err();
    assert!(matches!(err, GraphError::InvalidRegion { .. }));
  }

  #[test]
  fn test_empty_region() {
    let err = lower(single_node(
      r#", "action": { "type": "tap", "at": { "region": { "x": 0, "y": 0, "width": 0, "height": 10 } } }"#,
    ))
    .unwrap_err();
    assert!(matches!(err, GraphError::InvalidRegion { .. }));
  }

  #[test]
  fn test_point_outside_reference() {
    let err = lower(single_node(
      r#", "action": { "type": "swipe", "from": { "x": 10, "y": 10 }, "to": { "x": 10, "y": 720 } }"#,
    ))
    .unwrap_err();
    assert!(matches!(err, GraphError::InvalidPoint { .. }));
  }

  #[test]
  fn test_threshold_out_of_range() {
    let err = lower(single_node(
      r#", "predicate": { "type": "check", "recognizer": { "type": "template_match", "template": "confirm" }, "threshold": 1.5 }"#,
    ))
    .unwrap_err();
    assert!(matches!(err, GraphError::InvalidThreshold { threshold, .. } if threshold == 1.5));
  }

  #[test]
  fn test_invalid_filters() {
    let cases = [
      r#"{ "type": "numeric_range", "min": 10, "max": 1 }"#,
      r#"{ "type": "vocabulary", "words": [] }"#,
      r#"{ "type": "vocabulary", "words": ["a"], "min_similarity": 2.0 }"#,
      r#"{ "type": "pattern", "regex": "(unclosed" }"#,
    ];
    for filter in cases {
      let fields = format!(
        r#", "predicate": {{ "type": "check", "recognizer": {{ "type": "text_extract", "filter": {} }} }}"#,
        filter
      );
      let err = lower(single_node(&fields)).unwrap_err();
      assert!(matches!(err, GraphError::InvalidFilter { .. }), "{}", filter);
    }
  }

  #[test]
  fn test_matched_tap_requires_recognition() {
    let err = lower(single_node(r#", "action": { "type": "tap", "at": "matched" }"#)).unwrap_err();
    assert_eq!(
      err,
      GraphError::MatchedTapWithoutPredicate {
        node_id: "a".to_string()
      }
    );
  }

  #[test]
  fn test_empty_group() {
    let err = lower(single_node(r#", "predicate": { "type": "all", "of": [] }"#)).unwrap_err();
    assert!(matches!(err, GraphError::InvalidPredicate { .. }));
  }

  #[test]
  fn test_retry_policy_checks() {
    let err = lower(single_node(r#", "retry": { "max_attempts": 0 }"#)).unwrap_err();
    assert!(matches!(err, GraphError::InvalidRetryPolicy { .. }));

    let err = lower(single_node(
      r#", "retry": { "max_attempts": 3, "initial_delay_ms": 900, "max_delay_ms": 100 }"#,
    ))
    .unwrap_err();
    assert!(matches!(err, GraphError::InvalidRetryPolicy { .. }));
  }

  #[test]
  fn test_zero_timeout_and_visits() {
    let err = lower(single_node(r#", "timeout_ms": 0"#)).unwrap_err();
    assert!(matches!(err, GraphError::InvalidTimeout { .. }));

    let err = lower(single_node(r#", "max_visits": 0"#)).unwrap_err();
    assert!(matches!(err, GraphError::InvalidVisitLimit { .. }));
  }

  #[test]
  fn test_valid_text_node() {
    let node = lower(single_node(
      r#", "predicate": { "type": "check", "recognizer": { "type": "text_extract", "languages": ["en"],
            "filter": { "type": "pattern", "regex": "LP (\\d+)" } }, "roi": { "x": 0, "y": 0, "width": 200, "height": 40 } },
          "action": { "type": "tap", "at": "matched", "jitter": 4 }"#,
    ))
    .unwrap();
    assert!(node.predicate.has_checks());
    assert_eq!(node.predicate.checks().len(), 1);
  }

  #[test]
  fn test_on_timeout_target_must_exist() {
    let def = single_node(r#", "on_timeout": "recover""#);
    let err = check_structure(&def).unwrap_err();
    assert_eq!(
      err,
      GraphError::UnknownTarget {
        node_id: "a".to_string(),
        target: "recover".to_string()
      }
    );
  }
}
