//! Dependency graph: cycle detection and activation ordering.
//!
//! Edges point from a dependent to its dependency. Edges to names outside
//! the graph are ignored.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::error::{PluginError, PluginResult};

#[derive(Debug, Clone)]
struct Node {
    name: String,
    sequence: u64,
    dependencies: Vec<String>,
}

/// Dependency graph over a set of extensions.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Nodes sorted by registration sequence.
    nodes: Vec<Node>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an extension with its registration sequence and dependency names.
    pub fn add(&mut self, name: impl Into<String>, sequence: u64, dependencies: Vec<String>) {
        let node = Node {
            name: name.into(),
            sequence,
            dependencies,
        };
        let at = self.nodes.partition_point(|n| n.sequence <= node.sequence);
        self.nodes.insert(at, node);
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn index(&self) -> HashMap<&str, usize> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.as_str(), i))
            .collect()
    }

    /// Finds the first cycle reachable in a depth-first walk.
    ///
    /// Roots are visited in registration order, edges in declaration order.
    /// The returned members start at the node the back-edge points to and
    /// follow traversal order.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let index = self.index();
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut stack = Vec::new();

        for root in 0..self.nodes.len() {
            if marks[root] == Mark::Unvisited {
                if let Some(cycle) = self.visit(root, &index, &mut marks, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit(
        &self,
        node: usize,
        index: &HashMap<&str, usize>,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        marks[node] = Mark::OnStack;
        stack.push(node);

        for dep in &self.nodes[node].dependencies {
            let Some(&next) = index.get(dep.as_str()) else {
                continue;
            };
            match marks[next] {
                Mark::OnStack => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    return Some(
                        stack[start..]
                            .iter()
                            .map(|&n| self.nodes[n].name.clone())
                            .collect(),
                    );
                }
                Mark::Unvisited => {
                    if let Some(cycle) = self.visit(next, index, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        stack.pop();
        marks[node] = Mark::Done;
        None
    }

    /// Returns every name with its dependencies placed before it.
    ///
    /// Among extensions with no ordering constraint between them, the one
    /// registered first comes first.
    pub fn activation_order(&self) -> PluginResult<Vec<String>> {
        if let Some(members) = self.find_cycle() {
            return Err(PluginError::CircularDependency { members });
        }

        let index = self.index();
        let mut pending = vec![0usize; self.nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];

        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                if let Some(&d) = index.get(dep.as_str()) {
                    pending[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<(u64, usize)>> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| pending[*i] == 0)
            .map(|(i, n)| Reverse((n.sequence, i)))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, i))) = ready.pop() {
            order.push(self.nodes[i].name.clone());
            for &dependent in &dependents[i] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push(Reverse((self.nodes[dependent].sequence, dependent)));
                }
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[(&str, &[&str])]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (seq, (name, deps)) in nodes.iter().enumerate() {
            graph.add(
                *name,
                seq as u64,
                deps.iter().map(|d| d.to_string()).collect(),
            );
        }
        graph
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let g = graph(&[
            ("audit", &["slug", "search"]),
            ("search", &["slug"]),
            ("slug", &[]),
            ("theme", &[]),
        ]);
        let order = g.activation_order().unwrap();

        assert_eq!(order.len(), 4);
        assert!(position(&order, "slug") < position(&order, "search"));
        assert!(position(&order, "search") < position(&order, "audit"));
    }

    #[test]
    fn test_unconstrained_extensions_keep_registration_order() {
        let g = graph(&[("c", &[]), ("a", &[]), ("b", &["c"]), ("d", &[])]);
        assert_eq!(g.activation_order().unwrap(), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_cycle_names_exactly_its_members() {
        let g = graph(&[
            ("standalone", &[]),
            ("entry", &["a"]),
            ("a", &["b"]),
            ("b", &["c"]),
            ("c", &["a"]),
        ]);
        assert_eq!(
            g.activation_order(),
            Err(PluginError::CircularDependency {
                members: vec!["a".into(), "b".into(), "c".into()],
            })
        );
    }

    #[test]
    fn test_edges_outside_the_graph_are_ignored() {
        let g = graph(&[("seo", &["already-active"]), ("core", &[])]);
        assert_eq!(g.activation_order().unwrap(), vec!["seo", "core"]);
        assert!(g.find_cycle().is_none());
    }

    #[test]
    fn test_sequence_not_insertion_order_drives_ties() {
        let mut g = DependencyGraph::new();
        g.add("late", 9, vec![]);
        g.add("early", 1, vec![]);
        assert_eq!(g.activation_order().unwrap(), vec!["early", "late"]);
        assert_eq!(g.len(), 2);
    }
}
