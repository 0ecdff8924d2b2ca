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

//! Graph nodes and the incremental discovery of their outgoing edges.
//!
//! A node is visited every time something that may change its dependencies
//! happens: an incoming edge appears or disappears, a parked constraint
//! becomes active, or the strict versions inherited from its ancestors
//! change. Each visit picks the cheapest of three paths:
//!
//! 1. no transitive incoming edge: drop the outgoing edges, keep only the
//!    platform edges;
//! 2. the new exclusion filter keeps exactly the same dependencies as the
//!    last visit: patch what changed and replay deferred work;
//! 3. otherwise: rebuild every outgoing edge.

use std::{rc::Rc, sync::Arc};

use depgraph_util::{
    constraint::VersionConstraint,
    exclude::{ExcludeSpec, ModuleExclusions},
    ids::{Capability, ComponentId, ModuleId, ModuleVersionId},
    metadata::{DependencyMetadata, VariantMetadata},
    selector::ComponentSelector,
};
use indexmap::{IndexMap, IndexSet};
use slotmap::Key;

use super::{
    dependency::DependencyState,
    pending::PendingDependenciesVisitor,
    platform::lenient_platform_metadata,
    state::ResolveState,
    strict::StrictVersionConstraints,
    ComponentKey, EdgeKey, ModuleKey, NodeKey,
};

/// The resolution filter computed for a given set of incoming edges.
#[derive(Debug)]
struct CachedFilter {
    incoming_count: usize,
    incoming_hash: u64,
    spec: ExcludeSpec,
}

#[derive(Debug)]
pub(crate) struct NodeState {
    pub component: ComponentKey,
    pub variant: usize,
    pub root: bool,
    pub selected_by_variant_aware: bool,
    /// Set for virtual platforms, whose dependencies follow their members.
    pub dependencies_may_change: bool,

    pub incoming: Vec<EdgeKey>,
    incoming_hash: u64,
    pub transitive_edge_count: usize,
    pub outgoing: Vec<EdgeKey>,
    /// Edges to the platforms this node belongs to.
    pub virtual_edges: Vec<EdgeKey>,
    edges_cache: IndexMap<Rc<DependencyState>, EdgeKey>,

    cached_dependency_states: Option<Vec<Rc<DependencyState>>>,
    cached_filtered: Option<Vec<Rc<DependencyState>>>,
    does_not_have_dependencies: bool,
    previous_traversal_exclusions: Option<ExcludeSpec>,
    node_exclusions: Option<ExcludeSpec>,
    cached_filter: Option<CachedFilter>,

    upcoming_no_longer_pending: IndexSet<ModuleId>,
    potentially_activated_constraints: IndexMap<ModuleId, Vec<Rc<DependencyState>>>,
    edges_to_recompute: IndexSet<EdgeKey>,

    pub own_strict_versions: Option<StrictVersionConstraints>,
    pub ancestors_strict_versions: StrictVersionConstraints,
    pub endorses_strict_versions_from: Vec<EdgeKey>,

    virtual_platform_needs_refresh: bool,
    removing_outgoing_edges: bool,
    pub queued: bool,
}

impl NodeState {
    pub fn new(
        component: ComponentKey,
        variant: usize,
        selected_by_variant_aware: bool,
        dependencies_may_change: bool,
    ) -> Self {
        NodeState {
            component,
            variant,
            root: false,
            selected_by_variant_aware,
            dependencies_may_change,
            incoming: vec![],
            incoming_hash: 0,
            transitive_edge_count: 0,
            outgoing: vec![],
            virtual_edges: vec![],
            edges_cache: IndexMap::new(),
            cached_dependency_states: None,
            cached_filtered: None,
            does_not_have_dependencies: false,
            previous_traversal_exclusions: None,
            node_exclusions: None,
            cached_filter: None,
            upcoming_no_longer_pending: IndexSet::new(),
            potentially_activated_constraints: IndexMap::new(),
            edges_to_recompute: IndexSet::new(),
            own_strict_versions: None,
            ancestors_strict_versions: StrictVersionConstraints::default(),
            endorses_strict_versions_from: vec![],
            virtual_platform_needs_refresh: false,
            removing_outgoing_edges: false,
            queued: false,
        }
    }

    fn clear_incoming(&mut self) -> Vec<EdgeKey> {
        self.incoming_hash = 0;
        self.transitive_edge_count = 0;
        std::mem::take(&mut self.incoming)
    }
}

fn edge_hash(edge: EdgeKey) -> u64 {
    edge.data().as_ffi()
}

impl ResolveState<'_> {
    fn node_variant(&mut self, node: NodeKey) -> Option<VariantMetadata> {
        let (component, variant) = (self.nodes[node].component, self.nodes[node].variant);
        let metadata = self.component_metadata(component)?;
        metadata.variants.get(variant).cloned()
    }

    fn is_external_variant(&self, node: NodeKey) -> bool {
        let state = &self.nodes[node];
        self.components[state.component]
            .metadata
            .as_ref()
            .and_then(|m| m.variants.get(state.variant))
            .is_some_and(|v| v.external)
    }

    /// Visits the dependencies of `node`, collecting every edge that needs its
    /// target resolved into `discovered`.
    pub(crate) fn visit_outgoing_dependencies(&mut self, node: NodeKey, discovered: &mut Vec<EdgeKey>) {
        let component = self.nodes[node].component;
        if !self.components[component].is_selected() {
            log::debug!("version for {} is not selected. ignoring.", self.node_display(node));
            self.cleanup_constraints(node);
            return;
        }

        let state = &self.nodes[node];
        if state.transitive_edge_count == 0 && !state.root && !self.is_external_variant(node) {
            self.handle_non_transitive_node(node, discovered);
            return;
        }

        let filter = self.compute_module_resolution_filter(node);

        if !self.nodes[node].virtual_platform_needs_refresh
            && self.excludes_same_dependencies_as_previous_traversal(node, &filter)
        {
            self.refresh_ancestors_strict_versions(node, discovered);
            let new_constraints = self.handle_new_constraints(node, discovered);
            let recomputed = self.handle_edges_to_recompute(node, discovered);
            if !new_constraints && !recomputed {
                log::debug!(
                    "changed edges for {} select the same versions as the previous traversal",
                    self.node_display(node)
                );
            }
            self.nodes[node].previous_traversal_exclusions = Some(filter);
            return;
        }

        let mut previous_own = None;
        if self.nodes[node].previous_traversal_exclusions.is_some() {
            self.remove_outgoing_edges(node);
            let state = &mut self.nodes[node];
            state.edges_to_recompute.clear();
            state.potentially_activated_constraints.clear();
            previous_own = state.own_strict_versions.take();
        }
        self.nodes[node].upcoming_no_longer_pending.clear();

        self.visit_dependencies(node, filter, discovered, previous_own);
        self.visit_owners(node, discovered);
    }

    /// Recomputes the strict versions inherited by a node whose dependencies
    /// did not change. Edges towards the modules that gained or lost a strict
    /// version get a new selector.
    fn refresh_ancestors_strict_versions(&mut self, node: NodeKey, discovered: &mut Vec<EdgeKey>) {
        let ancestors = self.collect_ancestors_strict_versions(node);
        let previous = std::mem::replace(&mut self.nodes[node].ancestors_strict_versions, ancestors.clone());
        let changed = previous.changed(&ancestors);
        if changed.is_empty() {
            return;
        }
        for edge in self.nodes[node].outgoing.clone() {
            if changed.contains(&self.edges[edge].dependency.module) {
                self.recompute_selector_and_requeue_target_nodes(edge, discovered);
            }
        }
    }

    fn handle_non_transitive_node(&mut self, node: NodeKey, discovered: &mut Vec<EdgeKey>) {
        self.cleanup_constraints(node);
        if self.nodes[node].previous_traversal_exclusions.is_some() {
            self.remove_outgoing_edges(node);
        }
        if self.nodes[node].incoming.is_empty() {
            log::debug!("{} has no incoming edges. ignoring.", self.node_display(node));
        } else {
            log::debug!(
                "{} has no transitive incoming edges. ignoring outgoing edges.",
                self.node_display(node)
            );
            self.visit_owners(node, discovered);
        }
    }

    /// Undoes the traces a node left on other modules once it leaves the
    /// graph: selections deferred on its behalf and its registrations as a
    /// constraint provider.
    fn cleanup_constraints(&mut self, node: NodeKey) {
        let upcoming = std::mem::take(&mut self.nodes[node].upcoming_no_longer_pending);
        for id in upcoming {
            let Some(module) = self.find_module(&id) else {
                continue;
            };
            for edge in self.modules[module].unattached_edges.clone() {
                let resolved = self.edges[edge]
                    .selector
                    .is_some_and(|s| self.selectors[s].resolved);
                if !resolved {
                    let from = self.edges[edge].from;
                    self.prepare_to_recompute_edge(from, edge);
                }
            }
        }

        let Some(filtered) = self.nodes[node].cached_filtered.clone() else {
            return;
        };
        for dependency in filtered {
            if !dependency.is_constraint() {
                continue;
            }
            if let Some(module) = self.find_module(&dependency.module) {
                let pending = &mut self.modules[module].pending;
                if pending.is_pending() {
                    pending.unregister_constraint_provider(node);
                }
            }
        }
    }

    fn excludes_same_dependencies_as_previous_traversal(&mut self, node: NodeKey, filter: &ExcludeSpec) -> bool {
        let state = &mut self.nodes[node];
        let (Some(previous), Some(old)) = (
            state.previous_traversal_exclusions.clone(),
            state.cached_filtered.clone(),
        ) else {
            return false;
        };
        if previous == *filter {
            return true;
        }
        if state.does_not_have_dependencies && !state.dependencies_may_change {
            return true;
        }
        // Equivalent filters are not enough: the exact dependency list has
        // to match, or the order of the graph would change.
        state.cached_filtered = None;
        let same = self.dependencies(node, filter) == old;
        if same {
            for edge in self.nodes[node].outgoing.clone() {
                self.update_transitive_excludes(edge, filter);
            }
        }
        log::debug!(
            "filter {:?} {} the same dependencies as {:?} for {}",
            filter,
            if same { "keeps" } else { "does not keep" },
            previous,
            self.node_display(node)
        );
        same
    }

    pub(crate) fn prepare_to_recompute_edge(&mut self, node: NodeKey, edge: EdgeKey) {
        self.nodes[node].edges_to_recompute.insert(edge);
        self.on_more_selected(node);
    }

    fn handle_edges_to_recompute(&mut self, node: NodeKey, discovered: &mut Vec<EdgeKey>) -> bool {
        let edges = std::mem::take(&mut self.nodes[node].edges_to_recompute);
        if edges.is_empty() {
            return false;
        }
        discovered.extend(edges);
        true
    }

    fn handle_new_constraints(&mut self, node: NodeKey, discovered: &mut Vec<EdgeKey>) -> bool {
        if self.nodes[node].upcoming_no_longer_pending.is_empty() {
            return false;
        }
        self.visit_additional_constraints(node, discovered);
        true
    }

    /// Links the constraints parked on modules that just got a hard edge.
    fn visit_additional_constraints(&mut self, node: NodeKey, discovered: &mut Vec<EdgeKey>) {
        let state = &mut self.nodes[node];
        let modules = std::mem::take(&mut state.upcoming_no_longer_pending);
        let filter = state
            .previous_traversal_exclusions
            .clone()
            .unwrap_or_else(ModuleExclusions::nothing);
        for module in modules {
            let Some(dependencies) = self.nodes[node]
                .potentially_activated_constraints
                .get(&module)
                .cloned()
            else {
                continue;
            };
            for dependency in dependencies {
                self.create_and_link_edge(node, dependency, discovered, &filter, false);
            }
        }
    }

    fn visit_dependencies(
        &mut self,
        node: NodeKey,
        filter: ExcludeSpec,
        discovered: &mut Vec<EdgeKey>,
        previous_own: Option<StrictVersionConstraints>,
    ) {
        let mut visitor = PendingDependenciesVisitor::default();
        let compute_own = self.nodes[node].own_strict_versions.is_none();
        let ancestors = self.collect_ancestors_strict_versions(node);
        self.nodes[node].ancestors_strict_versions = ancestors;

        let mut strict = vec![];
        for dependency in self.dependencies(node, &filter) {
            let pending = visitor.maybe_add_as_pending_dependency(self, node, &dependency);
            if dependency.is_constraint() {
                self.nodes[node]
                    .potentially_activated_constraints
                    .entry(dependency.module.clone())
                    .or_default()
                    .push(dependency.clone());
            }
            if compute_own && dependency.is_strict() {
                strict.push(dependency.module.clone());
            }
            if !pending.is_pending() {
                self.create_and_link_edge(node, dependency, discovered, &filter, pending.defer_selection());
            }
        }
        self.nodes[node].previous_traversal_exclusions = Some(filter);
        visitor.complete(self);

        if compute_own {
            let own = StrictVersionConstraints::of(strict);
            let changed = previous_own.is_some_and(|previous| previous != own);
            self.nodes[node].own_strict_versions = Some(own);
            if changed {
                self.invalidate_endorsing_sources(node);
            }
        }
    }

    /// The declared dependencies of the node, before exclusions.
    fn raw_dependencies(&mut self, node: NodeKey) -> Vec<Arc<DependencyMetadata>> {
        let component = self.nodes[node].component;
        let Some(metadata) = self.component_metadata(component) else {
            return vec![];
        };
        let mut dependencies: Vec<Arc<DependencyMetadata>> = if metadata.virtual_platform {
            self.lenient_platform_dependencies(component)
        } else {
            metadata
                .variants
                .get(self.nodes[node].variant)
                .map(|v| v.dependencies.iter().cloned().map(Arc::new).collect())
                .unwrap_or_default()
        };
        let state = &self.nodes[node];
        if state.root {
            dependencies.extend(self.synthetic_dependencies.iter().cloned());
        }
        if state.transitive_edge_count == 0 && !state.root && self.is_external_variant(node) {
            // Reached through non-transitive edges only: so is the delegate.
            dependencies = dependencies
                .into_iter()
                .map(|d| Arc::new((*d).clone().non_transitive()))
                .collect();
        }
        dependencies
    }

    /// Dependency states of the node surviving `filter`, substitutions
    /// applied. Both the raw and the filtered lists are cached.
    fn dependencies(&mut self, node: NodeKey, filter: &ExcludeSpec) -> Vec<Rc<DependencyState>> {
        if self.nodes[node].dependencies_may_change {
            let state = &mut self.nodes[node];
            state.cached_dependency_states = None;
            state.cached_filtered = None;
        }
        if self.nodes[node].cached_dependency_states.is_none() {
            let raw = self.raw_dependencies(node);
            let states: Vec<Rc<DependencyState>> = raw.iter().map(|d| self.dependency_state(d)).collect();
            let state = &mut self.nodes[node];
            state.does_not_have_dependencies = states.is_empty();
            state.cached_dependency_states = Some(states);
        }
        if let Some(filtered) = &self.nodes[node].cached_filtered {
            return filtered.clone();
        }
        let all = self.nodes[node].cached_dependency_states.clone().unwrap_or_default();
        let mut filtered = Vec::with_capacity(all.len());
        for dependency in all {
            if self.is_excluded(node, filter, &dependency) {
                continue;
            }
            let dependency = self.maybe_substitute(&dependency);
            if !self.is_excluded(node, filter, &dependency) {
                filtered.push(dependency);
            }
        }
        self.nodes[node].cached_filtered = Some(filtered.clone());
        filtered
    }

    /// Dependency states currently in effect for `node`.
    pub(crate) fn node_dependency_states(&mut self, node: NodeKey) -> Vec<Rc<DependencyState>> {
        let filter = self.compute_module_resolution_filter(node);
        self.dependencies(node, &filter)
    }

    fn is_excluded(&self, node: NodeKey, filter: &ExcludeSpec, dependency: &DependencyState) -> bool {
        if let Some(edge_filter) = self.services.edge_filter {
            if !edge_filter(&dependency.dependency) {
                log::debug!("{} is filtered.", dependency.requested);
                return true;
            }
        }
        if filter.is_nothing() {
            return false;
        }
        if filter.excludes(&dependency.module) {
            log::debug!(
                "{} is excluded from {} by {:?}.",
                dependency.module,
                self.node_display(node),
                filter
            );
            return true;
        }
        false
    }

    fn create_and_link_edge(
        &mut self,
        node: NodeKey,
        dependency: Rc<DependencyState>,
        discovered: &mut Vec<EdgeKey>,
        filter: &ExcludeSpec,
        defer_selection: bool,
    ) {
        let edge = match self.nodes[node].edges_cache.get(&dependency) {
            Some(&edge) => {
                if self.edges[edge].used {
                    // Declared twice.
                    return;
                }
                self.edges[edge].transitive_exclusions = filter.clone();
                edge
            }
            None => {
                let edge = self.create_edge(node, dependency.clone(), filter.clone());
                self.nodes[node].edges_cache.insert(dependency, edge);
                edge
            }
        };
        self.compute_edge_selector(edge, defer_selection);
        let state = &mut self.nodes[node];
        if !state.outgoing.contains(&edge) {
            state.outgoing.push(edge);
        }
        self.edges[edge].used = true;
        discovered.push(edge);
        if let Some(selector) = self.edges[edge].selector {
            self.use_selector(selector, defer_selection);
        }
    }

    /// Links the node to every platform its component belongs to. A platform
    /// without published metadata is synthesized.
    fn visit_owners(&mut self, node: NodeKey, discovered: &mut Vec<EdgeKey>) {
        let component = self.nodes[node].component;
        let owners = self
            .component_metadata(component)
            .map(|m| m.platform_owners.clone())
            .unwrap_or_default();

        let mut wanted = Vec::with_capacity(owners.len());
        let mut visitor = PendingDependenciesVisitor::default();
        for owner in &owners {
            let (edge, platform) = self.platform_edge(node, owner);
            wanted.push((edge, platform));
        }

        for edge in self.nodes[node].virtual_edges.clone() {
            if !wanted.iter().any(|(e, _)| *e == edge) {
                self.release_virtual_edge(node, edge);
            }
        }
        for (edge, platform) in wanted {
            if self.edges[edge].used {
                continue;
            }
            visitor.mark_not_pending(self, platform);
            self.nodes[node].virtual_edges.push(edge);
            self.edges[edge].used = true;
            discovered.push(edge);
            if let Some(selector) = self.edges[edge].selector {
                self.use_selector(selector, false);
            }
        }
        visitor.complete(self);
    }

    /// The edge from `node` to the platform `owner`, created on first use.
    fn platform_edge(&mut self, node: NodeKey, owner: &ModuleVersionId) -> (EdgeKey, ModuleKey) {
        let member = self.components[self.nodes[node].component].module;
        let platform = self.module_key(&owner.module);
        let id = ComponentId::Module(owner.clone());
        let component = self.get_version(platform, &id);
        let metadata = self.component_metadata(component);
        if metadata.as_ref().is_none_or(|m| m.virtual_platform) {
            self.participating_module(platform, member);
        }
        if metadata.is_none() {
            let state = &mut self.components[component];
            state.metadata = Some(Arc::new(lenient_platform_metadata(id)));
            state.metadata_failure = None;
            self.maybe_create_virtual_metadata(platform);
        }

        let forced = self.nodes[node].incoming.iter().any(|e| {
            self.edges[*e]
                .selector
                .is_some_and(|s| self.selectors[s].has_strong_opinion())
        });
        let selector = ComponentSelector::module(
            owner.module.clone(),
            VersionConstraint::require(owner.version.as_str()),
        );
        let metadata = Arc::new(
            DependencyMetadata::lenient_platform(selector, owner.clone(), forced)
                .because(format!("belongs to platform {}", owner)),
        );
        let dependency = self.dependency_state(&metadata);
        let edge = match self.nodes[node].edges_cache.get(&dependency) {
            Some(&edge) => edge,
            None => {
                let exclusions = self.nodes[node]
                    .previous_traversal_exclusions
                    .clone()
                    .unwrap_or_else(ModuleExclusions::nothing);
                let edge = self.create_edge(node, dependency.clone(), exclusions);
                self.nodes[node].edges_cache.insert(dependency, edge);
                edge
            }
        };
        if !self.edges[edge].used {
            self.compute_edge_selector(edge, false);
        }
        (edge, platform)
    }

    fn release_virtual_edge(&mut self, node: NodeKey, edge: EdgeKey) {
        self.nodes[node].virtual_edges.retain(|e| *e != edge);
        self.edges[edge].used = false;
        self.detach_edge(edge);
        if let Some(selector) = self.edges[edge].selector {
            let platform = self.selectors[selector].target_module;
            self.decrease_hard_edge_count(platform, node);
            self.release_selector(selector);
        }
    }

    /// The exclusion filter applying to the dependencies of `node`.
    ///
    /// Transitive incoming edges must all exclude a module for it to be
    /// excluded. Constraints add their own declared exclusions to those of
    /// the node.
    pub(crate) fn compute_module_resolution_filter(&mut self, node: NodeKey) -> ExcludeSpec {
        let incoming = self.nodes[node].incoming.clone();
        if self.is_external_variant(node) {
            return ModuleExclusions::exclude_any(
                incoming
                    .iter()
                    .map(|e| self.edges[*e].transitive_exclusions.clone()),
            );
        }
        if let [edge] = incoming.as_slice() {
            let from = self.edges[*edge].from;
            if self.is_external_variant(from) {
                return self.compute_module_resolution_filter(from);
            }
        }

        let node_exclusions = self.node_exclusions(node);
        if incoming.is_empty() {
            return node_exclusions;
        }
        let state = &self.nodes[node];
        if let Some(cached) = &state.cached_filter {
            if cached.incoming_count == incoming.len() && cached.incoming_hash == state.incoming_hash {
                return cached.spec.clone();
            }
        }

        let spec = if let [edge] = incoming.as_slice() {
            let edge = &self.edges[*edge];
            let exclusions = if edge.transitive {
                edge.exclusions()
            } else if edge.constraint {
                edge.edge_exclusions()
            } else {
                ModuleExclusions::nothing()
            };
            ModuleExclusions::exclude_any([exclusions, node_exclusions])
        } else {
            let mut excluded_by_all = vec![];
            let mut excluded_by_either = vec![];
            for &edge in &incoming {
                let edge = &self.edges[edge];
                if edge.transitive {
                    excluded_by_all.push(edge.exclusions());
                } else if edge.constraint {
                    let exclusions = edge.edge_exclusions();
                    if !exclusions.is_nothing() && exclusions != node_exclusions {
                        excluded_by_either.push(exclusions);
                    }
                }
            }
            let edge_exclusions = if excluded_by_all.is_empty() {
                ModuleExclusions::nothing()
            } else {
                ModuleExclusions::exclude_all(excluded_by_all)
            };
            excluded_by_either.push(node_exclusions);
            ModuleExclusions::exclude_any([edge_exclusions, ModuleExclusions::exclude_any(excluded_by_either)])
        };

        let state = &mut self.nodes[node];
        state.cached_filter = Some(CachedFilter {
            incoming_count: incoming.len(),
            incoming_hash: state.incoming_hash,
            spec: spec.clone(),
        });
        spec
    }

    fn node_exclusions(&mut self, node: NodeKey) -> ExcludeSpec {
        if let Some(spec) = &self.nodes[node].node_exclusions {
            return spec.clone();
        }
        let spec = self
            .node_variant(node)
            .map(|v| ModuleExclusions::from_rules(&v.excludes))
            .unwrap_or_else(ModuleExclusions::nothing);
        self.nodes[node].node_exclusions = Some(spec.clone());
        spec
    }

    /// Releases every outgoing edge of the node, platform edges included.
    pub(crate) fn remove_outgoing_edges(&mut self, node: NodeKey) {
        let already_removing = self.nodes[node].removing_outgoing_edges;
        self.nodes[node].removing_outgoing_edges = true;
        if !already_removing {
            for edge in std::mem::take(&mut self.nodes[node].outgoing) {
                self.edges[edge].used = false;
                self.cleanup_on_source_change(edge, node);
            }
        }
        for edge in self.nodes[node].virtual_edges.clone() {
            self.release_virtual_edge(node, edge);
        }
        let state = &mut self.nodes[node];
        state.previous_traversal_exclusions = None;
        state.cached_filtered = None;
        state.virtual_platform_needs_refresh = false;
        state.removing_outgoing_edges = already_removing;
    }

    /// Drops a single outgoing edge, unless all of them are being dropped.
    pub(crate) fn remove_outgoing_edge(&mut self, node: NodeKey, edge: EdgeKey) {
        if self.nodes[node].removing_outgoing_edges {
            return;
        }
        self.nodes[node].outgoing.retain(|e| *e != edge);
        self.edges[edge].used = false;
        if let Some(selector) = self.edges[edge].selector {
            self.release_selector(selector);
        }
    }

    /// Takes the node out of the graph after its component lost selection.
    pub(crate) fn deselect_node(&mut self, node: NodeKey) {
        self.remove_outgoing_edges(node);
        self.reselect_endorsing_node(node);
    }

    /// Sources endorsing the strict versions of a deselected node have to
    /// rebuild the strict versions they hand down.
    fn reselect_endorsing_node(&mut self, node: NodeKey) {
        for edge in self.nodes[node].incoming.clone() {
            if !self.edges[edge].dependency.is_endorsing() {
                continue;
            }
            let from = self.edges[edge].from;
            self.on_more_selected(from);
            self.remove_outgoing_edges(from);
        }
    }

    /// Called on every node of a module after its selection changed. Nodes
    /// of the winner are queued; the incoming edges of the others move over
    /// to the winner.
    pub(crate) fn restart_node(&mut self, node: NodeKey, selected: ComponentKey) {
        if self.nodes[node].component == selected {
            self.on_more_selected(node);
            return;
        }
        for edge in self.nodes[node].incoming.clone() {
            self.restart_edge(edge);
        }
        self.nodes[node].clear_incoming();
    }

    pub(crate) fn prepare_for_constraint_no_longer_pending(&mut self, node: NodeKey, module: &ModuleId) {
        self.nodes[node]
            .upcoming_no_longer_pending
            .insert(module.clone());
        self.on_fewer_selected(node);
    }

    pub(crate) fn mark_for_virtual_platform_refresh(&mut self, node: NodeKey) {
        self.nodes[node].virtual_platform_needs_refresh = true;
        self.on_fewer_selected(node);
    }

    /// The module of this node went back to pending after losing its last
    /// hard edge from `source`. The remaining incoming edges are constraints:
    /// they are dropped and their sources parked as constraint providers.
    pub(crate) fn clear_constraint_edges(&mut self, node: NodeKey, module: ModuleKey, source: NodeKey) {
        if self.nodes[node].incoming.is_empty() {
            return;
        }
        for edge in self.nodes[node].clear_incoming() {
            debug_assert!(self.edges[edge].constraint);
            self.edges[edge].target_nodes.retain(|n| *n != node);
            let from = self.edges[edge].from;
            if from != source {
                self.remove_outgoing_edge(from, edge);
            }
            let from_virtual_platform = self.is_virtual_platform_node(from);
            self.modules[module]
                .pending
                .register_constraint_provider(from, from_virtual_platform);
        }
    }

    pub(crate) fn add_incoming_edge(&mut self, node: NodeKey, edge: EdgeKey) {
        let state = &mut self.nodes[node];
        if state.incoming.contains(&edge) {
            return;
        }
        state.incoming.push(edge);
        state.incoming_hash = state.incoming_hash.wrapping_add(edge_hash(edge));
        if self.edges[edge].transitive {
            state.transitive_edge_count += 1;
        }
        self.on_more_selected(node);
    }

    pub(crate) fn remove_incoming_edge(&mut self, node: NodeKey, edge: EdgeKey) {
        let state = &mut self.nodes[node];
        let Some(index) = state.incoming.iter().position(|e| *e == edge) else {
            return;
        };
        state.incoming.remove(index);
        state.incoming_hash = state.incoming_hash.wrapping_sub(edge_hash(edge));
        if self.edges[edge].transitive {
            state.transitive_edge_count = state.transitive_edge_count.saturating_sub(1);
        }
        self.on_fewer_selected(node);
    }

    /// Capabilities explicitly declared by the variant of the node.
    pub(crate) fn declared_capabilities(&mut self, node: NodeKey) -> Vec<Capability> {
        self.node_variant(node)
            .map(|v| v.capabilities)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn incoming_hash_is_order_independent() {
        let mut edges: SlotMap<EdgeKey, ()> = SlotMap::with_key();
        let a = edges.insert(());
        let b = edges.insert(());
        let forward = edge_hash(a).wrapping_add(edge_hash(b));
        let backward = edge_hash(b).wrapping_add(edge_hash(a));
        assert_eq!(forward, backward);
        assert_eq!(forward.wrapping_sub(edge_hash(a)), edge_hash(b));
    }
}
