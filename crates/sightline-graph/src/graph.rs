use std::collections::{HashMap, HashSet};

/// Static structure of a task graph, for reachability analysis.
///
/// Edges are every possible progression out of a node: transition targets,
/// the default target and the timeout node. `Stay` adds no edge.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  /// Adjacency list: node_id -> list of downstream node_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Nodes with at least one target that ends the run.
  terminals: HashSet<String>,
}

impl Graph {
  /// Build a graph from node ids, edges, and the ids of nodes that can end the run.
  pub fn new<'a>(
    node_ids: impl IntoIterator<Item = &'a str>,
    edges: &[(String, String)],
    terminals: impl IntoIterator<Item = &'a str>,
  ) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for node_id in node_ids {
      adjacency.entry(node_id.to_string()).or_default();
    }

    for (from, to) in edges {
      let downstream = adjacency.entry(from.clone()).or_default();
      if !downstream.contains(to) {
        downstream.push(to.clone());
      }
    }

    Self {
      adjacency,
      terminals: terminals.into_iter().map(str::to_string).collect(),
    }
  }

  /// Get downstream nodes for a given node.
  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Whether the node has a target that ends the run.
  pub fn is_terminal(&self, node_id: &str) -> bool {
    self.terminals.contains(node_id)
  }

  /// Every node reachable from `start`, including `start` itself.
  pub fn reachable_from<'a>(&'a self, start: &'a str) -> HashSet<&'a str> {
    let mut seen: HashSet<&str> = HashSet::new();
    if !self.adjacency.contains_key(start) {
      return seen;
    }

    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
      if !seen.insert(node) {
        continue;
      }
      for next in self.downstream(node) {
        if !seen.contains(next.as_str()) {
          stack.push(next.as_str());
        }
      }
    }
    seen
  }

  /// Whether some node reachable from `start` can end the run.
  pub fn terminal_reachable(&self, start: &str) -> bool {
    self
      .reachable_from(start)
      .iter()
      .any(|node| self.is_terminal(node))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn edges(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
      .iter()
      .map(|(a, b)| (a.to_string(), b.to_string()))
      .collect()
  }

  #[test]
  fn test_reachable_through_cycle() {
    let graph = Graph::new(
      ["a", "b", "c", "d"],
      &edges(&[("a", "b"), ("b", "a"), ("b", "c")]),
      ["c"],
    );

    let reachable = graph.reachable_from("a");
    assert_eq!(reachable, HashSet::from(["a", "b", "c"]));
    assert!(graph.terminal_reachable("a"));
    assert!(!graph.terminal_reachable("d"));
  }

  #[test]
  fn test_terminal_only_in_unreachable_node() {
    let graph = Graph::new(["a", "b", "z"], &edges(&[("a", "b"), ("b", "a")]), ["z"]);
    assert!(!graph.terminal_reachable("a"));
  }

  #[test]
  fn test_duplicate_edges_collapse() {
    let graph = Graph::new(["a", "b"], &edges(&[("a", "b"), ("a", "b")]), ["b"]);
    assert_eq!(graph.downstream("a"), &["b".to_string()]);
    assert!(graph.downstream("missing").is_empty());
  }
}
