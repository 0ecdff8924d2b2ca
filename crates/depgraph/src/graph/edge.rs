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

//! One declared dependency of a node, and the nodes it currently targets.

use std::{rc::Rc, sync::Arc};

use depgraph_util::{
    attributes::{AttributeMergeError, Attributes},
    exclude::{ExcludeSpec, ModuleExclusions},
    metadata::{ComponentMetadata, DependencyKind},
};

use crate::error::ResolveFailure;

use super::{dependency::DependencyState, state::ResolveState, ComponentKey, EdgeKey, NodeKey};

#[derive(Debug)]
pub(crate) struct EdgeState {
    pub from: NodeKey,
    pub dependency: Rc<DependencyState>,
    /// The exclusions in effect on the path leading to `from`.
    pub transitive_exclusions: ExcludeSpec,
    pub selector: Option<super::SelectorKey>,
    pub target_nodes: Vec<NodeKey>,
    pub target_node_selection_failure: Option<ResolveFailure>,
    pub used: bool,
    pub constraint: bool,
    pub transitive: bool,
}

impl EdgeState {
    pub fn new(from: NodeKey, dependency: Rc<DependencyState>, transitive_exclusions: ExcludeSpec) -> Self {
        EdgeState {
            from,
            constraint: dependency.is_constraint(),
            // Plain constraints never carry the path into their target.
            transitive: dependency.dependency.transitive
                && dependency.dependency.kind != DependencyKind::Constraint,
            dependency,
            transitive_exclusions,
            selector: None,
            target_nodes: vec![],
            target_node_selection_failure: None,
            used: false,
        }
    }

    /// Exclusions declared on the dependency itself.
    pub fn edge_exclusions(&self) -> ExcludeSpec {
        ModuleExclusions::from_rules(&self.dependency.dependency.excludes)
    }

    /// Exclusions applying to everything reached through this edge.
    pub fn exclusions(&self) -> ExcludeSpec {
        ModuleExclusions::exclude_any([self.edge_exclusions(), self.transitive_exclusions.clone()])
    }
}

fn attribute_inconsistency(error: &AttributeMergeError) -> String {
    format!(
        "Inconsistency between attributes of a constraint and a dependency, on attribute '{}' : \
         dependency requires '{}' while constraint required '{}'",
        error.key, error.right, error.left
    )
}

impl ResolveState<'_> {
    pub(crate) fn create_edge(
        &mut self,
        from: NodeKey,
        dependency: Rc<DependencyState>,
        transitive_exclusions: ExcludeSpec,
    ) -> EdgeKey {
        self.edges
            .insert(EdgeState::new(from, dependency, transitive_exclusions))
    }

    /// Resolves the selector of `edge`, which depends on whether an ancestor
    /// already dictates the version. Returns whether the selector changed.
    pub(crate) fn compute_edge_selector(&mut self, edge: EdgeKey, defer: bool) -> bool {
        let state = &self.edges[edge];
        let from = state.from;
        let dependency = state.dependency.clone();
        let ignore_version =
            self.version_provided_by_ancestors(from, &dependency.module, dependency.is_forced());
        let selector = self.compute_selector_for(&dependency, ignore_version);
        let previous = self.edges[edge].selector;
        if previous == Some(selector) {
            return false;
        }
        self.edges[edge].selector = Some(selector);
        if self.edges[edge].used {
            if let Some(previous) = previous {
                self.release_selector(previous);
            }
            self.use_selector(selector, defer);
        }
        true
    }

    /// The component selected for the target module, unless the selector
    /// failed or has not been resolved yet.
    pub(crate) fn edge_target_component(&self, edge: EdgeKey) -> Option<ComponentKey> {
        let selector = &self.selectors[self.edges[edge].selector?];
        if !selector.resolved || selector.failure.is_some() {
            return None;
        }
        self.modules[selector.target_module].selected
    }

    pub(crate) fn attach_edge(&mut self, edge: EdgeKey) {
        let Some(target) = self.edge_target_component(edge) else {
            return;
        };
        if !self.edges[edge].used {
            return;
        }
        let Some(selector) = self.edges[edge].selector else {
            return;
        };
        let selector_module = self.selectors[selector].target_module;
        let target_module = self.components[target].module;

        if self.edges[edge].constraint && self.modules[target_module].pending.is_pending() {
            // The module lost its last hard edge: park the constraint again.
            self.remove_unattached_edge(selector_module, edge);
            let from = self.edges[edge].from;
            self.remove_outgoing_edge(from, edge);
            let from_virtual_platform = self.is_virtual_platform_node(from);
            self.modules[target_module]
                .pending
                .register_constraint_provider(from, from_virtual_platform);
            return;
        }

        self.calculate_target_nodes(edge, target);
        let targets = self.edges[edge].target_nodes.clone();
        for &node in &targets {
            self.add_incoming_edge(node, edge);
        }
        if !targets.is_empty() {
            self.remove_unattached_edge(selector_module, edge);
        }
    }

    fn calculate_target_nodes(&mut self, edge: EdgeKey, target: ComponentKey) {
        let state = &mut self.edges[edge];
        state.target_nodes.clear();
        state.target_node_selection_failure = None;

        let Some(metadata) = self.component_metadata(target) else {
            // Missing metadata: a synthesized platform may provide it later.
            let module = self.components[target].module;
            self.add_orphan_edge(module, edge);
            return;
        };

        let dependency = self.edges[edge].dependency.clone();
        if self.edges[edge].constraint && !dependency.dependency.is_lenient_platform() {
            // A constraint targets what hard dependencies already selected.
            let module = self.components[target].module;
            for other in self.modules[module].unattached_edges.clone() {
                if self.edges[other].constraint {
                    continue;
                }
                self.attach_edge(other);
                if let Some(failure) = self.edges[other].target_node_selection_failure.clone() {
                    self.edges[edge].target_node_selection_failure = Some(failure);
                    return;
                }
            }
            let targets: Vec<NodeKey> = self.components[target]
                .nodes
                .iter()
                .copied()
                .filter(|&n| self.is_node_selected(n) && !self.nodes[n].root)
                .collect();
            self.edges[edge].target_nodes = targets;
            return;
        }

        match self.select_target_variants(edge, &metadata) {
            Ok((variants, attribute_aware)) => {
                let nodes: Vec<NodeKey> = variants
                    .into_iter()
                    .map(|v| self.get_node(target, v, attribute_aware))
                    .collect();
                self.edges[edge].target_nodes = nodes;
            }
            Err(failure) => {
                self.edges[edge].target_node_selection_failure = Some(failure);
            }
        }
    }

    /// Variant indexes of `metadata` targeted by `edge`, and whether they were
    /// picked by attribute matching.
    fn select_target_variants(
        &self,
        edge: EdgeKey,
        metadata: &Arc<ComponentMetadata>,
    ) -> Result<(Vec<usize>, bool), ResolveFailure> {
        let state = &self.edges[edge];
        let dependency = &state.dependency.dependency;
        let requested = &state.dependency.requested;
        if dependency.overrides_variant_selection() && metadata.virtual_platform {
            return Ok((vec![0], false));
        }

        let module = state
            .selector
            .map(|s| self.selectors[s].target_module)
            .map(|m| &self.modules[m]);
        let constraint_attributes = module
            .map(|m| m.merged_constraint_attributes.clone())
            .unwrap_or_default();
        if let Some(error) = module.and_then(|m| m.attribute_merge_error.as_ref()) {
            return Err(ResolveFailure::unresolvable(requested, attribute_inconsistency(error)));
        }
        let edge_attributes: Attributes = constraint_attributes
            .concat_safe(dependency.selector.attributes())
            .map_err(|e| ResolveFailure::unresolvable(requested, attribute_inconsistency(&e)))?;
        let attributes = self.strategy.root_attributes.overlay(&edge_attributes);

        let selector = self.services.variant_selector;
        if metadata.is_attribute_aware() {
            selector
                .select_by_attribute_matching(
                    &attributes,
                    dependency.selector.requested_capabilities(),
                    metadata,
                    &self.strategy.attributes_schema,
                )
                .map(|v| (v, true))
                .map_err(|msg| ResolveFailure::unresolvable(requested, msg))
        } else {
            selector
                .select_legacy(metadata)
                .map(|v| (v, false))
                .map_err(|msg| ResolveFailure::unresolvable(requested, msg))
        }
    }

    pub(crate) fn detach_edge(&mut self, edge: EdgeKey) {
        let targets = std::mem::take(&mut self.edges[edge].target_nodes);
        for node in targets {
            self.remove_incoming_edge(node, edge);
        }
        self.edges[edge].target_node_selection_failure = None;
    }

    /// Moves `edge` to whatever its target module selects now.
    pub(crate) fn retarget_edge(&mut self, edge: EdgeKey) {
        self.detach_edge(edge);
        if !self.edges[edge].used {
            return;
        }
        self.attach_edge(edge);
        if self.edges[edge].target_nodes.is_empty() {
            if let Some(selector) = self.edges[edge].selector {
                let module = self.selectors[selector].target_module;
                self.add_unattached_edge(module, edge);
            }
        }
    }

    /// Retargets `edge` when its source still takes part in the graph.
    pub(crate) fn restart_edge(&mut self, edge: EdgeKey) {
        if self.is_node_selected(self.edges[edge].from) {
            self.retarget_edge(edge);
        } else {
            self.detach_edge(edge);
        }
    }

    /// Undoes what linking the edge did on the target side.
    pub(crate) fn cleanup_on_source_change(&mut self, edge: EdgeKey, source: NodeKey) {
        self.detach_edge(edge);
        let Some(selector) = self.edges[edge].selector else {
            return;
        };
        if !self.edges[edge].constraint {
            let module = self.selectors[selector].target_module;
            self.decrease_hard_edge_count(module, source);
        }
        self.release_selector(selector);
    }

    /// Attaches a failure found after traversal, typically by validation.
    pub(crate) fn fail_edge(&mut self, edge: EdgeKey, failure: ResolveFailure) {
        self.edges[edge].target_node_selection_failure = Some(failure);
    }

    pub(crate) fn edge_failure(&self, edge: EdgeKey) -> Option<ResolveFailure> {
        let state = &self.edges[edge];
        if let Some(failure) = &state.target_node_selection_failure {
            return Some(failure.clone());
        }
        let selector = &self.selectors[state.selector?];
        if let Some(failure) = &selector.failure {
            return Some(failure.clone());
        }
        let module = &self.modules[selector.target_module];
        match module.selected {
            None => module
                .selectors
                .iter()
                .find_map(|s| self.selectors[*s].failure.clone()),
            Some(component) => self.components[component].metadata_failure.clone(),
        }
    }

    /// Refreshes the path exclusions of a constraint-free edge. Target nodes
    /// are requeued when the exclusions changed.
    pub(crate) fn update_transitive_excludes(&mut self, edge: EdgeKey, exclusions: &ExcludeSpec) {
        let state = &mut self.edges[edge];
        if state.constraint || state.transitive_exclusions == *exclusions {
            return;
        }
        state.transitive_exclusions = exclusions.clone();
        for node in state.target_nodes.clone() {
            self.on_more_selected(node);
        }
    }

    /// Recomputes the selector after the strict versions inherited by the
    /// source changed, and requeues the edge when it did.
    pub(crate) fn recompute_selector_and_requeue_target_nodes(
        &mut self,
        edge: EdgeKey,
        discovered: &mut Vec<EdgeKey>,
    ) {
        if !self.compute_edge_selector(edge, false) {
            return;
        }
        let targets = self.edges[edge].target_nodes.clone();
        self.detach_edge(edge);
        for node in targets {
            self.on_more_selected(node);
        }
        if !discovered.contains(&edge) {
            discovered.push(edge);
        }
    }
}
