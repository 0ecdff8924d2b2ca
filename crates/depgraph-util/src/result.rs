// depgraph: The dependency graph resolution engine.
// Copyright (C) 2024 International Digital Economy Academy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// For inquiries, you can contact us via e-mail at jichuruanjian@idea.edu.cn.

//! The resolved dependency graph.

use indexmap::IndexMap;
use petgraph::graphmap::DiGraphMap;
use serde::Serialize;

use crate::ids::{ComponentId, ModuleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeIndex(u32);

impl NodeIndex {
    pub fn new_usize(id: usize) -> Self {
        Self(id as u32)
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedNode {
    pub component: ComponentId,
    pub variant: String,
    /// Why this component version was selected, most significant first.
    pub reasons: Vec<String>,
}

impl ResolvedNode {
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.component, self.variant)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedEdge {
    pub from: NodeIndex,
    /// The requested selector, as declared.
    pub requested: String,
    pub to: Vec<NodeIndex>,
    pub constraint: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// The outcome of a resolution, in the order the graph visitor reported it.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedGraph {
    root: NodeIndex,
    nodes: Vec<ResolvedNode>,
    edges: Vec<ResolvedEdge>,
    failures: Vec<String>,
    #[serde(skip)]
    dep_graph: DiGraphMap<NodeIndex, usize>,
}

impl ResolvedGraph {
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn node(&self, id: NodeIndex) -> &ResolvedNode {
        &self.nodes[id.as_usize()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &ResolvedNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeIndex::new_usize(i), n))
    }

    pub fn edges(&self) -> &[ResolvedEdge] {
        &self.edges
    }

    pub fn edges_from(&self, id: NodeIndex) -> impl Iterator<Item = &ResolvedEdge> {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// Direct dependencies of a node, in edge emission order.
    pub fn dependencies_of(&self, id: NodeIndex) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = vec![];
        for edge in self.edges_from(id) {
            for to in &edge.to {
                if !out.contains(to) {
                    out.push(*to);
                }
            }
        }
        out
    }

    pub fn dependents_of(&self, id: NodeIndex) -> Vec<NodeIndex> {
        self.dep_graph
            .neighbors_directed(id, petgraph::Direction::Incoming)
            .collect()
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn is_successful(&self) -> bool {
        self.failures.is_empty() && self.edges.iter().all(|e| e.failure.is_none())
    }

    /// The selected version of every module, keyed by module.
    pub fn selected_versions(&self) -> IndexMap<ModuleId, String> {
        let mut map = IndexMap::new();
        for node in &self.nodes {
            map.entry(node.component.module().clone())
                .or_insert_with(|| node.component.version().to_string());
        }
        map
    }

    pub fn find(&self, module: &ModuleId) -> Option<(NodeIndex, &ResolvedNode)> {
        self.nodes().find(|(_, n)| n.component.module() == module)
    }
}

/// Accumulates a [`ResolvedGraph`] as nodes and edges are reported.
#[derive(Debug, Default)]
pub struct ResolvedGraphBuilder {
    nodes: Vec<ResolvedNode>,
    edges: Vec<ResolvedEdge>,
    failures: Vec<String>,
}

impl ResolvedGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node. The first node added is the root.
    pub fn add_node(&mut self, node: ResolvedNode) -> NodeIndex {
        let id = NodeIndex::new_usize(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn add_edge(&mut self, edge: ResolvedEdge) {
        self.edges.push(edge);
    }

    pub fn add_failure(&mut self, failure: String) {
        if !self.failures.contains(&failure) {
            self.failures.push(failure);
        }
    }

    pub fn build(self) -> ResolvedGraph {
        let mut dep_graph = DiGraphMap::new();
        for i in 0..self.nodes.len() {
            dep_graph.add_node(NodeIndex::new_usize(i));
        }
        for (i, edge) in self.edges.iter().enumerate() {
            for to in &edge.to {
                if !dep_graph.contains_edge(edge.from, *to) {
                    dep_graph.add_edge(edge.from, *to, i);
                }
            }
        }
        ResolvedGraph {
            root: NodeIndex::new_usize(0),
            nodes: self.nodes,
            edges: self.edges,
            failures: self.failures,
            dep_graph,
        }
    }
}
