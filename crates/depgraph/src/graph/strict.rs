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

//! Strict version propagation along the graph.

use std::collections::BTreeSet;

use depgraph_util::ids::ModuleId;

use super::{state::ResolveState, EdgeKey, NodeKey};

/// The modules whose version is dictated by a strict constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StrictVersionConstraints(BTreeSet<ModuleId>);

impl StrictVersionConstraints {
    pub fn of(modules: impl IntoIterator<Item = ModuleId>) -> Self {
        StrictVersionConstraints(modules.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, module: &ModuleId) -> bool {
        self.0.contains(module)
    }

    pub fn union(&self, other: &StrictVersionConstraints) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        StrictVersionConstraints(self.0.union(&other.0).cloned().collect())
    }

    pub fn intersect(&self, other: &StrictVersionConstraints) -> Self {
        if self.is_empty() || other.is_empty() {
            return StrictVersionConstraints::default();
        }
        StrictVersionConstraints(self.0.intersection(&other.0).cloned().collect())
    }

    pub fn minus(&self, other: &StrictVersionConstraints) -> Self {
        StrictVersionConstraints(self.0.difference(&other.0).cloned().collect())
    }

    /// Modules present in exactly one of the two sets.
    pub fn changed(&self, other: &StrictVersionConstraints) -> BTreeSet<ModuleId> {
        self.0.symmetric_difference(&other.0).cloned().collect()
    }
}

impl ResolveState<'_> {
    /// Strict versions declared by the node itself, computed on first use.
    pub(crate) fn own_strict_versions(&mut self, node: NodeKey) -> StrictVersionConstraints {
        if let Some(own) = &self.nodes[node].own_strict_versions {
            return own.clone();
        }
        let mut modules = vec![];
        for dependency in self.node_dependency_states(node) {
            if dependency.is_strict() {
                modules.push(dependency.module.clone());
            }
        }
        let own = StrictVersionConstraints::of(modules);
        self.nodes[node].own_strict_versions = Some(own.clone());
        own
    }

    /// Strict versions every path into `node` agrees on. Each incoming edge
    /// contributes the strict versions of its source, those inherited by the
    /// source, and those endorsed by the source's other dependencies.
    pub(crate) fn collect_ancestors_strict_versions(&mut self, node: NodeKey) -> StrictVersionConstraints {
        let incoming = self.nodes[node].incoming.clone();
        let mut result: Option<StrictVersionConstraints> = None;
        for edge in incoming {
            let from = self.edges[edge].from;
            let mut inherited = self.own_strict_versions(from);
            inherited = inherited.union(&self.nodes[from].ancestors_strict_versions.clone());
            inherited = inherited.union(&self.endorsed_strict_versions(from, edge));
            result = Some(match result {
                None => inherited,
                Some(previous) => previous.intersect(&inherited),
            });
            if result.as_ref().is_some_and(|r| r.is_empty()) {
                break;
            }
        }
        result.unwrap_or_default()
    }

    /// Strict versions `node` passes down the edge `incoming` through its
    /// endorsing dependencies. An endorsing edge does not endorse into itself.
    fn endorsed_strict_versions(&mut self, node: NodeKey, incoming: EdgeKey) -> StrictVersionConstraints {
        let endorsing = self.nodes[node].endorses_strict_versions_from.clone();
        let mut filter_own = false;
        let mut result = StrictVersionConstraints::default();
        for edge in endorsing {
            if edge == incoming {
                filter_own = true;
                continue;
            }
            for target in self.edges[edge].target_nodes.clone() {
                let own = self.own_strict_versions(target);
                result = result.union(&own);
            }
        }
        if filter_own {
            let target = self.edges[incoming].target_nodes.clone();
            for t in target {
                let own = self.own_strict_versions(t);
                result = result.minus(&own);
            }
        }
        result
    }

    /// Records the endorsing edges among the outgoing edges of `node`. Nodes
    /// reached through the other edges are requeued when the set changes.
    pub(crate) fn collect_endorsed_strict_versions(&mut self, node: NodeKey) {
        let endorsing: Vec<EdgeKey> = self.nodes[node]
            .outgoing
            .iter()
            .copied()
            .filter(|&e| self.edges[e].dependency.is_endorsing())
            .collect();
        if endorsing == self.nodes[node].endorses_strict_versions_from {
            return;
        }
        self.nodes[node].endorses_strict_versions_from = endorsing;
        for edge in self.nodes[node].outgoing.clone() {
            if self.edges[edge].dependency.is_endorsing() {
                continue;
            }
            for target in self.edges[edge].target_nodes.clone() {
                self.on_more_selected(target);
            }
        }
    }

    /// Whether the version of `module` is already dictated to `node`.
    pub(crate) fn version_provided_by_ancestors(
        &self,
        node: NodeKey,
        module: &ModuleId,
        forced: bool,
    ) -> bool {
        !forced && self.nodes[node].ancestors_strict_versions.contains(module)
    }

    /// Requeues the nodes reached through endorsing edges into `node`, after
    /// the strict versions of `node` changed.
    pub(crate) fn invalidate_endorsing_sources(&mut self, node: NodeKey) {
        for edge in self.nodes[node].incoming.clone() {
            if !self.edges[edge].dependency.is_endorsing() {
                continue;
            }
            let from = self.edges[edge].from;
            for sibling in self.nodes[from].outgoing.clone() {
                if sibling == edge {
                    continue;
                }
                for target in self.edges[sibling].target_nodes.clone() {
                    self.on_more_selected(target);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn set(ids: &[&str]) -> StrictVersionConstraints {
        StrictVersionConstraints::of(ids.iter().map(|s| s.parse().unwrap()))
    }

    #[test]
    fn algebra() {
        let a = set(&["org:a", "org:b"]);
        let b = set(&["org:b", "org:c"]);
        assert_eq!(a.union(&b), set(&["org:a", "org:b", "org:c"]));
        assert_eq!(a.intersect(&b), set(&["org:b"]));
        assert_eq!(a.minus(&b), set(&["org:a"]));
        assert!(a.intersect(&StrictVersionConstraints::default()).is_empty());
        assert_eq!(a.changed(&b).len(), 2);
    }

    #[test]
    fn disjoint_paths_keep_nothing() {
        let left = set(&["org:f"]);
        let right = set(&["org:g"]);
        assert!(left.intersect(&right).is_empty());
    }
}
