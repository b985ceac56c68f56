use std::collections::HashMap;

use sightline_config::GraphDef;
use sightline_vision::{Region, Resolution, TemplateSet};
use tracing::{info, warn};

use crate::error::GraphError;
use crate::graph::Graph;
use crate::node::{Point, TaskNode};
use crate::validate::{Lowering, check_structure};

/// A validated task graph ready for execution.
#[derive(Debug, Clone)]
pub struct TaskGraph {
  pub graph_id: String,
  pub name: String,
  start: String,
  reference_resolution: Option<Resolution>,
  nodes: HashMap<String, TaskNode>,
  graph: Graph,
}

impl TaskGraph {
  /// Validate a graph document against the loaded templates.
  ///
  /// Structural rules are checked first, in order, then each node's contents.
  pub fn build(def: GraphDef, templates: &TemplateSet) -> Result<Self, GraphError> {
    let graph = check_structure(&def)?;

    let lowering = Lowering {
      templates,
      reference: def
        .reference_resolution
        .map(|r| Resolution::new(r.width, r.height)),
      defaults: def.defaults,
    };

    let mut nodes = HashMap::with_capacity(def.nodes.len());
    for node in def.nodes {
      let node = lowering.node(node)?;
      nodes.insert(node.node_id.clone(), node);
    }

    let reachable = graph.reachable_from(&def.start);
    let mut unreachable: Vec<&str> = nodes
      .keys()
      .map(String::as_str)
      .filter(|id| !reachable.contains(id))
      .collect();
    if !unreachable.is_empty() {
      unreachable.sort_unstable();
      warn!(graph_id = %def.graph_id, nodes = ?unreachable, "unreachable_nodes");
    }

    info!(graph_id = %def.graph_id, nodes = nodes.len(), start = %def.start, "graph_validated");

    Ok(Self {
      graph_id: def.graph_id,
      name: def.name,
      start: def.start,
      reference_resolution: lowering.reference,
      nodes,
      graph,
    })
  }

  pub fn start(&self) -> &str {
    &self.start
  }

  pub fn node(&self, node_id: &str) -> Option<&TaskNode> {
    self.nodes.get(node_id)
  }

  pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
    self.nodes.values()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  pub fn reference_resolution(&self) -> Option<Resolution> {
    self.reference_resolution
  }

  /// Map a check region into coordinates of a frame with the given size.
  ///
  /// No region means the whole frame. The result is not clamped.
  pub fn frame_region(&self, region: Option<&Region>, frame: Resolution) -> Region {
    match (region, self.reference_resolution) {
      (None, _) => Region::full(frame),
      (Some(region), Some(reference)) => region.scale(reference, frame),
      (Some(region), None) => *region,
    }
  }

  /// Map a point into coordinates of a frame with the given size.
  pub fn frame_point(&self, point: Point, frame: Resolution) -> Point {
    match self.reference_resolution {
      Some(reference) if reference != frame && reference.width > 0 && reference.height > 0 => {
        Point {
          x: (point.x as u64 * frame.width as u64 / reference.width as u64) as u32,
          y: (point.y as u64 * frame.height as u64 / reference.height as u64) as u32,
        }
      }
      _ => point,
    }
  }
}
