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

//! The callbacks receiving the resolved graph.

use depgraph_util::{
    ids::{ComponentId, ModuleId},
    result::{NodeIndex, ResolvedEdge, ResolvedGraph, ResolvedGraphBuilder, ResolvedNode},
    selector::ComponentSelector,
};
use indexmap::IndexMap;

use crate::{
    error::{GraphResolveErrors, ResolveFailure},
    graph::{component::SelectionCause, NodeKey},
};

/// A selected node, as handed to visitors.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub key: NodeKey,
    pub component: ComponentId,
    pub variant: String,
    pub reasons: Vec<SelectionCause>,
    pub root: bool,
}

/// An outgoing edge of a visited node. `targets` only holds nodes that are
/// part of the result.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub from: NodeKey,
    pub requested: ComponentSelector,
    pub targets: Vec<NodeKey>,
    pub constraint: bool,
    pub failure: Option<ResolveFailure>,
}

/// A distinct requested selector and what became of it.
#[derive(Debug, Clone)]
pub struct GraphSelector {
    pub requested: ComponentSelector,
    pub module: ModuleId,
    pub failure: Option<ResolveFailure>,
}

/// Receives the graph once traversal and validation are done.
///
/// Every node is visited before any edge. Edges are visited per node, in
/// consumer-first order.
pub trait DependencyGraphVisitor {
    fn start(&mut self, _root: &GraphNode) {}

    fn visit_selector(&mut self, _selector: &GraphSelector) {}

    fn visit_node(&mut self, node: &GraphNode);

    fn visit_edges(&mut self, node: &GraphNode, edges: &[GraphEdge]);

    fn finish(&mut self, _root: &GraphNode) {}
}

/// Forwards every callback to each visitor, in order.
pub struct CompositeVisitor<'v> {
    visitors: Vec<&'v mut dyn DependencyGraphVisitor>,
}

impl<'v> CompositeVisitor<'v> {
    pub fn new(visitors: Vec<&'v mut dyn DependencyGraphVisitor>) -> Self {
        CompositeVisitor { visitors }
    }
}

impl DependencyGraphVisitor for CompositeVisitor<'_> {
    fn start(&mut self, root: &GraphNode) {
        self.visitors.iter_mut().for_each(|v| v.start(root));
    }

    fn visit_selector(&mut self, selector: &GraphSelector) {
        self.visitors.iter_mut().for_each(|v| v.visit_selector(selector));
    }

    fn visit_node(&mut self, node: &GraphNode) {
        self.visitors.iter_mut().for_each(|v| v.visit_node(node));
    }

    fn visit_edges(&mut self, node: &GraphNode, edges: &[GraphEdge]) {
        self.visitors.iter_mut().for_each(|v| v.visit_edges(node, edges));
    }

    fn finish(&mut self, root: &GraphNode) {
        self.visitors.iter_mut().for_each(|v| v.finish(root));
    }
}

/// Builds a [`ResolvedGraph`] and collects the failures found on edges.
#[derive(Debug, Default)]
pub struct ResolvedGraphVisitor {
    builder: ResolvedGraphBuilder,
    indices: IndexMap<NodeKey, NodeIndex>,
    failures: Vec<ResolveFailure>,
}

impl ResolvedGraphVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_node(&mut self, node: &GraphNode) {
        if self.indices.contains_key(&node.key) {
            return;
        }
        let index = self.builder.add_node(ResolvedNode {
            component: node.component.clone(),
            variant: node.variant.clone(),
            reasons: node.reasons.iter().map(|r| r.to_string()).collect(),
        });
        self.indices.insert(node.key, index);
    }

    pub fn failures(&self) -> &[ResolveFailure] {
        &self.failures
    }

    pub fn into_graph(self) -> ResolvedGraph {
        self.builder.build()
    }

    /// The graph, or every failure found if there was any.
    pub fn into_result(self) -> Result<ResolvedGraph, GraphResolveErrors> {
        if self.failures.is_empty() {
            Ok(self.builder.build())
        } else {
            Err(GraphResolveErrors(self.failures))
        }
    }
}

impl DependencyGraphVisitor for ResolvedGraphVisitor {
    fn start(&mut self, root: &GraphNode) {
        self.add_node(root);
    }

    fn visit_node(&mut self, node: &GraphNode) {
        self.add_node(node);
    }

    fn visit_edges(&mut self, node: &GraphNode, edges: &[GraphEdge]) {
        let Some(&from) = self.indices.get(&node.key) else {
            return;
        };
        for edge in edges {
            if let Some(failure) = &edge.failure {
                self.builder.add_failure(failure.to_string());
                if !self.failures.contains(failure) {
                    self.failures.push(failure.clone());
                }
            }
            let to = edge
                .targets
                .iter()
                .filter_map(|t| self.indices.get(t).copied())
                .collect();
            self.builder.add_edge(ResolvedEdge {
                from,
                requested: edge.requested.to_string(),
                to,
                constraint: edge.constraint,
                failure: edge.failure.as_ref().map(|f| f.to_string()),
            });
        }
    }
}
