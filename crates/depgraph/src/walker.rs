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

//! Depth-first walks over a resolved graph.
//!
//! The walk recurses, so it is meant for reports and tests rather than for
//! graphs of arbitrary depth.

use std::collections::HashSet;

use depgraph_util::result::{NodeIndex, ResolvedEdge, ResolvedGraph};

/// What the walker reports for every edge it follows.
pub struct WalkStep<'g> {
    pub depth: usize,
    pub edge: &'g ResolvedEdge,
    /// `None` for an edge without any target, typically a failed one.
    pub target: Option<NodeIndex>,
    /// The target was already expanded elsewhere; its dependencies are not
    /// walked again.
    pub repeated: bool,
    /// Whether this is the last step among its siblings.
    pub last: bool,
}

pub trait GraphWalkVisitor {
    fn visit(&mut self, step: &WalkStep<'_>);
}

pub struct GraphWalker<'g> {
    graph: &'g ResolvedGraph,
}

impl<'g> GraphWalker<'g> {
    pub fn new(graph: &'g ResolvedGraph) -> Self {
        GraphWalker { graph }
    }

    /// Walks from the root. Every node is expanded at most once.
    pub fn walk(&self, visitor: &mut dyn GraphWalkVisitor) {
        let mut expanded = HashSet::new();
        let root = self.graph.root();
        expanded.insert(root);
        self.walk_node(root, 0, &mut expanded, visitor);
    }

    fn walk_node(
        &self,
        node: NodeIndex,
        depth: usize,
        expanded: &mut HashSet<NodeIndex>,
        visitor: &mut dyn GraphWalkVisitor,
    ) {
        let mut steps: Vec<(&'g ResolvedEdge, Option<NodeIndex>)> = vec![];
        for edge in self.graph.edges_from(node) {
            if edge.to.is_empty() {
                if edge.failure.is_some() {
                    steps.push((edge, None));
                }
                continue;
            }
            steps.extend(edge.to.iter().map(|t| (edge, Some(*t))));
        }

        let count = steps.len();
        for (i, (edge, target)) in steps.into_iter().enumerate() {
            let repeated = target.is_some_and(|t| !expanded.insert(t));
            visitor.visit(&WalkStep {
                depth,
                edge,
                target,
                repeated,
                last: i + 1 == count,
            });
            if let (Some(target), false) = (target, repeated) {
                self.walk_node(target, depth + 1, expanded, visitor);
            }
        }
    }
}

struct TreeRenderer<'g> {
    graph: &'g ResolvedGraph,
    /// Whether each open ancestor level still has siblings to come.
    open: Vec<bool>,
    out: String,
}

impl GraphWalkVisitor for TreeRenderer<'_> {
    fn visit(&mut self, step: &WalkStep<'_>) {
        self.open.truncate(step.depth);
        for &more in &self.open {
            self.out.push_str(if more { "|    " } else { "     " });
        }
        self.out.push_str(if step.last { "\\--- " } else { "+--- " });
        self.out.push_str(&step.edge.requested);

        if let Some(target) = step.target {
            let component = &self.graph.node(target).component;
            let requested_module = step.edge.requested.split(':').take(2).collect::<Vec<_>>().join(":");
            if step.edge.requested != component.to_string() {
                if requested_module == component.module().to_string() {
                    self.out.push_str(&format!(" -> {}", component.version()));
                } else {
                    self.out.push_str(&format!(" -> {}", component));
                }
            }
        }
        if step.edge.constraint {
            self.out.push_str(" (c)");
        }
        if step.repeated {
            self.out.push_str(" (*)");
        }
        if step.edge.failure.is_some() {
            self.out.push_str(" FAILED");
        }
        self.out.push('\n');
        self.open.push(!step.last);
    }
}

/// Renders the graph as an indented tree. Nodes expanded earlier in the
/// tree are marked `(*)`, constraints `(c)`.
pub fn render_tree(graph: &ResolvedGraph) -> String {
    let root = graph.node(graph.root());
    let mut renderer = TreeRenderer {
        graph,
        open: vec![],
        out: format!("{}\n", root.component),
    };
    GraphWalker::new(graph).walk(&mut renderer);
    renderer.out
}

#[cfg(test)]
mod test {
    use depgraph_util::{
        ids::ComponentId,
        result::{ResolvedEdge, ResolvedGraphBuilder, ResolvedNode},
    };
    use expect_test::expect;
    use test_log::test;

    use super::*;

    fn node(component: ComponentId) -> ResolvedNode {
        ResolvedNode {
            component,
            variant: "default".to_string(),
            reasons: vec![],
        }
    }

    fn edge(from: NodeIndex, requested: &str, to: Vec<NodeIndex>) -> ResolvedEdge {
        ResolvedEdge {
            from,
            requested: requested.to_string(),
            to,
            constraint: false,
            failure: None,
        }
    }

    #[test]
    fn cycles_and_failures() {
        let mut builder = ResolvedGraphBuilder::new();
        let root = builder.add_node(node(ComponentId::Project {
            path: ":".to_string(),
            module: "test:root:1.0".parse().unwrap(),
        }));
        let a = builder.add_node(node(ComponentId::Module("org:a:1.0".parse().unwrap())));
        let b = builder.add_node(node(ComponentId::Module("org:b:1.0".parse().unwrap())));
        builder.add_edge(edge(root, "org:a:1.0", vec![a]));
        builder.add_edge(edge(a, "org:b:1.0", vec![b]));
        builder.add_edge(edge(b, "org:a:1.0", vec![a]));
        builder.add_edge(ResolvedEdge {
            failure: Some("Could not find org:x:1.0.".to_string()),
            ..edge(root, "org:x:1.0", vec![])
        });
        builder.add_failure("Could not find org:x:1.0.".to_string());
        let graph = builder.build();

        expect![[r#"
            project :
            +--- org:a:1.0
            |    \--- org:b:1.0
            |         \--- org:a:1.0 (*)
            \--- org:x:1.0 FAILED
        "#]]
        .assert_eq(&render_tree(&graph));
        assert!(!graph.is_successful());
    }
}
