//! Deterministic topological ordering of named nodes.
//!
//! An edge `a -> b` means `a` depends on `b`; [`DependencyOrder::sort`]
//! lists every node after the nodes it depends on. Cycles are tolerated:
//! nodes on a cycle are emitted in the order the search closes them.
//!
//! The result depends only on the order nodes and edges were added. The
//! search starts from the nodes deepest below the sources (nodes nothing
//! depends on), so long chains are emitted before the shallow nodes that
//! only hang off their ends. Ties go to the node registered first, and
//! each node's dependencies are searched in the order their edges were
//! added.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, VecDeque};

/// Collects nodes and dependency edges, then orders them.
#[derive(Debug, Default)]
pub struct DependencyOrder {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyOrder {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` if it is not known yet.
    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.index.get(name) {
            return index;
        }
        let index = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), index);
        index
    }

    /// Records that `from` depends on `to`, registering both. Repeated
    /// edges are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let a = self.add_node(from);
        let b = self.add_node(to);
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, ());
        }
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns every node, dependencies first.
    pub fn sort(&self) -> Vec<String> {
        let count = self.graph.node_count();
        let successors: Vec<Vec<NodeIndex>> = self
            .graph
            .node_indices()
            .map(|node| {
                let mut edges: Vec<_> = self.graph.edges(node).collect();
                edges.sort_by_key(|edge| edge.id());
                edges.into_iter().map(|edge| edge.target()).collect()
            })
            .collect();

        let levels = self.levels(&successors);
        let mut roots: Vec<NodeIndex> = self.graph.node_indices().collect();
        // Stable: equal levels keep registration order.
        roots.sort_by(|a, b| levels[b.index()].cmp(&levels[a.index()]));

        let mut visited = vec![false; count];
        let mut order = Vec::with_capacity(count);
        let mut stack: Vec<(NodeIndex, usize)> = Vec::new();
        for root in roots {
            if visited[root.index()] {
                continue;
            }
            visited[root.index()] = true;
            stack.push((root, 0));
            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                if let Some(&succ) = successors[node.index()].get(*next) {
                    *next += 1;
                    if !visited[succ.index()] {
                        visited[succ.index()] = true;
                        stack.push((succ, 0));
                    }
                } else {
                    stack.pop();
                    order.push(self.graph[node].clone());
                }
            }
        }
        order
    }

    /// Breadth-first distance of every node from the nearest source. Nodes
    /// only reachable through cycles get level 0.
    fn levels(&self, successors: &[Vec<NodeIndex>]) -> Vec<usize> {
        let mut level = vec![usize::MAX; self.graph.node_count()];
        let mut queue = VecDeque::new();
        for node in self.graph.node_indices() {
            if self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .next()
                .is_none()
            {
                level[node.index()] = 0;
                queue.push_back(node);
            }
        }
        while let Some(node) = queue.pop_front() {
            for &succ in &successors[node.index()] {
                if level[succ.index()] == usize::MAX {
                    level[succ.index()] = level[node.index()] + 1;
                    queue.push_back(succ);
                }
            }
        }
        level
            .into_iter()
            .map(|l| if l == usize::MAX { 0 } else { l })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn fairly_large_graph() {
        let mut g = DependencyOrder::new();
        g.add_edge("C", "F");
        g.add_edge("C", "G");
        g.add_edge("C", "A");
        g.add_edge("C", "B");
        g.add_edge("A", "D");
        g.add_edge("A", "E");
        g.add_edge("B", "E");
        g.add_edge("D", "E");
        g.add_edge("D", "F");
        g.add_edge("F", "H");
        g.add_edge("E", "F");
        assert_eq!(g.sort(), vec!["H", "F", "E", "D", "G", "A", "B", "C"]);
    }

    #[test]
    fn dependencies_come_first() {
        let mut g = DependencyOrder::new();
        g.add_edge("app", "lib");
        g.add_edge("lib", "core");
        g.add_edge("app", "core");
        g.add_node("standalone");
        let order = g.sort();
        assert_eq!(order.len(), 4);
        assert!(position(&order, "core") < position(&order, "lib"));
        assert!(position(&order, "lib") < position(&order, "app"));
    }

    #[test]
    fn cycle_is_tolerated() {
        let mut g = DependencyOrder::new();
        g.add_edge("A", "B");
        g.add_edge("B", "C");
        g.add_edge("C", "A");
        g.add_edge("C", "D");
        assert_eq!(g.sort(), vec!["D", "C", "B", "A"]);
    }

    #[test]
    fn repeated_edges_collapse() {
        let mut g = DependencyOrder::new();
        g.add_edge("A", "B");
        g.add_edge("B", "C");
        g.add_edge("C", "D");
        g.add_edge("A", "B");
        g.add_edge("C", "D");
        assert_eq!(g.len(), 4);
        assert_eq!(g.sort(), vec!["D", "C", "B", "A"]);
    }

    #[test]
    fn same_input_same_order() {
        let build = || {
            let mut g = DependencyOrder::new();
            for (a, b) in [("x", "y"), ("y", "z"), ("w", "z"), ("v", "x")] {
                g.add_edge(a, b);
            }
            g.sort()
        };
        assert_eq!(build(), build());
        assert!(DependencyOrder::new().sort().is_empty());
    }
}
