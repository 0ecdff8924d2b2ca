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

//! The traversal driving a resolution from the root to a stable graph.
//!
//! Resolution runs in three phases:
//!
//! 1. *Traversal*: nodes are taken from the queue one at a time, their
//!    outgoing edges are created, selectors resolved and edges attached to
//!    the selected target variants. When the queue runs dry, one pending
//!    module or capability conflict is resolved, which usually requeues
//!    nodes.
//! 2. *Validation*: failures that only make sense on the final graph, such
//!    as rejected selections or forbidden dynamic versions, are attached to
//!    the edges they concern.
//! 3. *Assembly*: the graph is reported to a [`DependencyGraphVisitor`],
//!    with consumers before their dependencies.

use std::{collections::VecDeque, sync::Arc};

use depgraph_util::{
    ids::ComponentId,
    metadata::{ComponentMetadata, DependencyMetadata},
    version::VersionSelector,
};

use crate::{
    error::ResolveFailure,
    strategy::ResolutionStrategy,
    visitor::{DependencyGraphVisitor, GraphEdge, GraphNode, GraphSelector},
};

use super::{
    component::VisitState,
    state::{ResolveServices, ResolveState},
    ComponentKey, EdgeKey, ModuleKey, NodeKey,
};

#[cfg(test)]
mod tests;

const DYNAMIC_VERSIONS_DISALLOWED: &str = "Resolution strategy disallows usage of dynamic versions";
const CHANGING_VERSIONS_DISALLOWED: &str = "Resolution strategy disallows usage of changing versions";

pub struct DependencyGraphBuilder<'a> {
    services: ResolveServices<'a>,
    strategy: ResolutionStrategy,
}

impl<'a> DependencyGraphBuilder<'a> {
    pub fn new(services: ResolveServices<'a>, strategy: ResolutionStrategy) -> Self {
        DependencyGraphBuilder { services, strategy }
    }

    /// Resolves the graph below variant `root_variant` of `root`.
    ///
    /// `synthetic_dependencies` are added to the root as if it declared them,
    /// typically the constraints of a lock file. Failures never abort the
    /// resolution; they end up on the edges reported to `visitor`.
    pub fn resolve(
        self,
        root: Arc<ComponentMetadata>,
        root_variant: usize,
        synthetic_dependencies: Vec<DependencyMetadata>,
        visitor: &mut dyn DependencyGraphVisitor,
    ) {
        let mut state = ResolveState::new(
            self.services,
            self.strategy,
            root,
            root_variant,
            synthetic_dependencies,
        );
        traverse_graph(&mut state);
        validate_graph(&mut state);
        assemble_result(&mut state, visitor);
    }
}

fn traverse_graph(state: &mut ResolveState<'_>) {
    let root = state.root();
    state.on_more_selected(root);
    let mut dependencies: Vec<EdgeKey> = vec![];

    while state.peek().is_some() || state.has_pending_conflicts() {
        let Some(node) = state.pop() else {
            state.resolve_next_conflict();
            continue;
        };
        log::debug!("visiting configuration {}", state.node_display(node));

        if state.register_capabilities(node) {
            // The node was deselected along with the other providers.
            continue;
        }

        dependencies.clear();
        state.visit_outgoing_dependencies(node, &mut dependencies);

        // Endorsing edges go first so that the strict versions they bring are
        // known before the remaining selectors are computed.
        let endorsing: Vec<EdgeKey> = dependencies
            .iter()
            .copied()
            .filter(|e| state.edges[*e].dependency.is_endorsing())
            .collect();
        let processed = resolve_edges(state, &endorsing, false);
        state.collect_endorsed_strict_versions(node);

        let remaining: Vec<EdgeKey> = dependencies
            .iter()
            .copied()
            .filter(|e| !state.edges[*e].dependency.is_endorsing())
            .collect();
        resolve_edges(state, &remaining, processed);
    }
}

/// Returns whether any edge was processed.
fn resolve_edges(state: &mut ResolveState<'_>, edges: &[EdgeKey], recompute_selectors: bool) -> bool {
    if edges.is_empty() {
        return false;
    }
    perform_selection_serially(state, edges, recompute_selectors);
    maybe_download_metadata_in_parallel(state, edges);
    attach_to_target_revisions_serially(state, edges);
    true
}

fn perform_selection_serially(state: &mut ResolveState<'_>, edges: &[EdgeKey], recompute_selectors: bool) {
    for &edge in edges {
        if recompute_selectors {
            state.compute_edge_selector(edge, false);
        }
        let Some(selector) = state.edges[edge].selector else {
            continue;
        };
        let module = state.selectors[selector].target_module;
        if state.selectors[selector].can_affect_selection() && !state.modules[module].selectors.is_empty() {
            perform_selection(state, module);
        }
        if state.edges[edge].used {
            state.add_unattached_edge(module, edge);
        }
    }
}

fn perform_selection(state: &mut ResolveState<'_>, module: ModuleKey) {
    let current = state.modules[module].selected;
    state.maybe_update_selection(module);
    if current.is_none() {
        state.register_module_candidate(module);
    }
}

/// Fetches in one batch the metadata of the selected targets that are
/// expensive to fetch. A single target is left to the serial path.
fn maybe_download_metadata_in_parallel(state: &mut ResolveState<'_>, edges: &[EdgeKey]) {
    let mut requiring: Vec<ComponentKey> = vec![];
    for &edge in edges {
        let Some(target) = state.edge_target_component(edge) else {
            continue;
        };
        let component = &state.components[target];
        if !component.is_selected()
            || component.is_resolved()
            || state.services.metadata_resolver.is_fetching_metadata_cheap(&component.id)
            || requiring.contains(&target)
        {
            continue;
        }
        requiring.push(target);
    }
    if requiring.len() < 2 {
        return;
    }

    let ids: Vec<ComponentId> = requiring
        .iter()
        .map(|c| state.components[*c].id.clone())
        .collect();
    log::debug!("submitting {} metadata fetches in a batch", ids.len());
    let results = state
        .services
        .executor
        .fetch_all(state.services.metadata_resolver, &ids);
    for (component, result) in requiring.into_iter().zip(results) {
        state.set_metadata_result(component, result);
    }
}

fn attach_to_target_revisions_serially(state: &mut ResolveState<'_>, edges: &[EdgeKey]) {
    for &edge in edges {
        state.attach_edge(edge);
    }
}

fn validate_graph(state: &mut ResolveState<'_>) {
    for module in state.all_modules() {
        let Some(selected) = state.modules[module].selected else {
            if state.is_virtual_platform(module) {
                attach_multiple_force_on_platform_failure(state, module);
            }
            continue;
        };

        if let Some(message) = state.rejected_error_message(selected) {
            let failure = ResolveFailure::Rejected(message);
            let mut edges = state.module_incoming_edges(module);
            edges.extend(state.modules[module].unattached_edges.iter().copied());
            for edge in edges {
                state.fail_edge(edge, failure.clone());
            }
            continue;
        }

        if state.is_virtual_platform(module) {
            attach_multiple_force_on_platform_failure(state, module);
        } else {
            validate_multiple_node_selection(state, module, selected);
        }
        if state.strategy.fail_on_dynamic_versions {
            validate_dynamic_selectors(state, module, selected);
        }
        if state.strategy.fail_on_changing_versions {
            validate_changing_versions(state, selected);
        }
    }

    let root = state.root();
    if !state.nodes[root].incoming.is_empty() {
        log::warn!(
            "{} is both the root of the resolution and one of its dependencies. \
             Depending on the root is deprecated and will fail in a future version.",
            state.node_display(root)
        );
    }
}

/// Fails every hard forced edge into a member of the platform when those
/// forces ask for different versions of the platform.
fn attach_multiple_force_on_platform_failure(state: &mut ResolveState<'_>, platform: ModuleKey) {
    let Some(platform_state) = state.modules[platform].platform.as_ref() else {
        return;
    };
    let participants: Vec<ModuleKey> = platform_state.participating_modules.iter().copied().collect();

    let mut current = state.maybe_find_forced_platform_version(platform);
    let mut multiple = false;
    let mut forced_edges = vec![];
    for module in participants {
        for edge in state.module_incoming_edges(module) {
            let edge_state = &state.edges[edge];
            let dependency = &edge_state.dependency.dependency;
            if !dependency.force || dependency.is_lenient_platform() {
                continue;
            }
            let source = state.components[state.nodes[edge_state.from].component].module;
            if source == platform {
                continue;
            }
            let Some(version) = edge_state
                .dependency
                .requested
                .version_constraint()
                .and_then(|c| c.strictly.clone().or_else(|| c.require.clone()))
            else {
                continue;
            };
            forced_edges.push(edge);
            match &current {
                None => current = Some(version),
                Some(v) if *v != version => multiple = true,
                Some(_) => {}
            }
        }
    }

    if multiple {
        let failure = ResolveFailure::PlatformForces(state.modules[platform].id.clone());
        for edge in forced_edges {
            state.fail_edge(edge, failure.clone());
        }
    }
}

/// Fails the edges into a component when several of its variants were
/// selected through attribute matching and their attributes disagree.
fn validate_multiple_node_selection(state: &mut ResolveState<'_>, module: ModuleKey, selected: ComponentKey) {
    let nodes: Vec<NodeKey> = state.components[selected]
        .nodes
        .iter()
        .copied()
        .filter(|n| state.is_node_selected(*n) && state.nodes[*n].selected_by_variant_aware)
        .collect();
    if nodes.len() < 2 {
        return;
    }
    let Some(metadata) = state.components[selected].metadata.clone() else {
        return;
    };

    let mut incompatible: Vec<NodeKey> = vec![];
    for (i, &a) in nodes.iter().enumerate() {
        for &b in &nodes[i + 1..] {
            let (Some(va), Some(vb)) = (
                metadata.variants.get(state.nodes[a].variant),
                metadata.variants.get(state.nodes[b].variant),
            ) else {
                continue;
            };
            if state
                .strategy
                .attributes_schema
                .mutually_compatible(&va.attributes, &vb.attributes)
            {
                continue;
            }
            for node in [a, b] {
                if !incompatible.contains(&node) {
                    incompatible.push(node);
                }
            }
        }
    }
    if incompatible.is_empty() {
        return;
    }

    let failure = ResolveFailure::IncompatibleVariants {
        component: state.components[selected].id.to_string(),
        details: crate::messages::incompatible_variants_details(state, &incompatible),
    };
    for edge in state.module_incoming_edges(module) {
        state.fail_edge(edge, failure.clone());
    }
}

/// A selection is dynamic when only dynamic selectors took part in it, or
/// when no fixed selector accepts the selected version.
fn validate_dynamic_selectors(state: &mut ResolveState<'_>, module: ModuleKey, selected: ComponentKey) {
    let version = state.components[selected].id.version().to_string();
    let mut has_dynamic = false;
    let mut all_dynamic = true;
    let mut accepted_by_fixed = false;
    for &selector in &state.modules[module].selectors {
        let Some(required) = state.selectors[selector]
            .version_constraint()
            .and_then(|c| c.required.as_ref())
        else {
            continue;
        };
        if required.is_dynamic() {
            has_dynamic = true;
            if matches!(required, VersionSelector::Latest) {
                // `latest` can be satisfied by nothing but the newest version.
                accepted_by_fixed = false;
                break;
            }
        } else {
            all_dynamic = false;
            if required.accept_str(&version) {
                accepted_by_fixed = true;
            }
        }
    }
    if !has_dynamic || (!all_dynamic && accepted_by_fixed) {
        return;
    }

    for node in state.components[selected].nodes.clone() {
        for edge in state.nodes[node].incoming.clone() {
            let requested = state.edges[edge].dependency.requested.clone();
            state.fail_edge(edge, ResolveFailure::unresolvable(requested, DYNAMIC_VERSIONS_DISALLOWED));
        }
    }
}

fn validate_changing_versions(state: &mut ResolveState<'_>, selected: ComponentKey) {
    let changing = state.components[selected]
        .metadata
        .as_ref()
        .is_some_and(|m| m.changing);
    for node in state.components[selected].nodes.clone() {
        for edge in state.nodes[node].incoming.clone() {
            if !changing && !state.edges[edge].dependency.dependency.changing {
                continue;
            }
            let requested = state.edges[edge].dependency.requested.clone();
            state.fail_edge(edge, ResolveFailure::unresolvable(requested, CHANGING_VERSIONS_DISALLOWED));
        }
    }
}

fn graph_node(state: &ResolveState<'_>, node: NodeKey) -> GraphNode {
    let node_state = &state.nodes[node];
    let component = &state.components[node_state.component];
    let variant = component
        .metadata
        .as_ref()
        .and_then(|m| m.variants.get(node_state.variant))
        .map(|v| v.name.clone())
        .unwrap_or_default();
    GraphNode {
        key: node,
        component: component.id.clone(),
        variant,
        reasons: state.selection_reason(node_state.component),
        root: node_state.root,
    }
}

fn graph_edges(state: &ResolveState<'_>, node: NodeKey) -> Vec<GraphEdge> {
    let mut edges = vec![];
    for &edge in &state.nodes[node].outgoing {
        let edge_state = &state.edges[edge];
        if !edge_state.used {
            continue;
        }
        let targets: Vec<NodeKey> = edge_state
            .target_nodes
            .iter()
            .copied()
            .filter(|t| state.should_include(*t))
            .collect();
        let failure = state.edge_failure(edge);
        if targets.is_empty() && failure.is_none() {
            continue;
        }
        edges.push(GraphEdge {
            from: node,
            requested: edge_state.dependency.requested.clone(),
            targets,
            constraint: edge_state.constraint,
            failure,
        });
    }
    edges
}

/// Reports the graph. Nodes come first, then the edges of every selected
/// component, consumers before the components they depend on. Cycles are
/// broken at the component met twice.
fn assemble_result(state: &mut ResolveState<'_>, visitor: &mut dyn DependencyGraphVisitor) {
    let root = graph_node(state, state.root());
    visitor.start(&root);

    for (_, selector) in &state.selectors {
        if selector.use_count == 0 {
            continue;
        }
        visitor.visit_selector(&GraphSelector {
            requested: selector.selector().clone(),
            module: state.modules[selector.target_module].id.clone(),
            failure: selector.failure.clone(),
        });
    }

    let included: Vec<NodeKey> = state
        .nodes
        .keys()
        .filter(|n| state.should_include(*n))
        .collect();
    for &node in &included {
        visitor.visit_node(&graph_node(state, node));
    }

    let mut queue: VecDeque<ComponentKey> = VecDeque::new();
    for module in state.all_modules() {
        if state.is_virtual_platform(module) {
            continue;
        }
        if let Some(selected) = state.modules[module].selected {
            if !queue.contains(&selected) {
                queue.push_back(selected);
            }
        }
    }

    while let Some(&component) = queue.front() {
        match state.components[component].visit_state {
            VisitState::NotSeen => {
                state.components[component].visit_state = VisitState::Visiting;
                let mut inserted = 0;
                for consumer in consumers_of(state, component) {
                    if state.components[consumer].visit_state == VisitState::NotSeen {
                        queue.insert(inserted, consumer);
                        inserted += 1;
                    }
                }
                if inserted == 0 {
                    state.components[component].visit_state = VisitState::Visited;
                    queue.pop_front();
                    visit_component_edges(state, component, visitor);
                }
            }
            VisitState::Visiting => {
                state.components[component].visit_state = VisitState::Visited;
                queue.pop_front();
                visit_component_edges(state, component, visitor);
            }
            VisitState::Visited => {
                queue.pop_front();
            }
        }
    }

    visitor.finish(&root);
}

/// Selected components owning an edge into one of the nodes of `component`.
fn consumers_of(state: &ResolveState<'_>, component: ComponentKey) -> Vec<ComponentKey> {
    let mut consumers = vec![];
    for &node in &state.components[component].nodes {
        if !state.should_include(node) {
            continue;
        }
        for &edge in &state.nodes[node].incoming {
            let from = state.edges[edge].from;
            if !state.should_include(from) {
                continue;
            }
            let owner = state.nodes[from].component;
            if owner != component && !consumers.contains(&owner) {
                consumers.push(owner);
            }
        }
    }
    consumers
}

fn visit_component_edges(
    state: &ResolveState<'_>,
    component: ComponentKey,
    visitor: &mut dyn DependencyGraphVisitor,
) {
    for &node in &state.components[component].nodes {
        if !state.should_include(node) {
            continue;
        }
        let edges = graph_edges(state, node);
        visitor.visit_edges(&graph_node(state, node), &edges);
    }
}
