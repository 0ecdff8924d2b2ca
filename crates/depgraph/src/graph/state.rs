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

//! The owner of every state object of one resolution.

use std::{collections::VecDeque, rc::Rc, sync::Arc};

use depgraph_util::{
    ids::{ComponentId, ModuleId},
    metadata::{ComponentMetadata, DependencyMetadata},
    selector::ComponentSelector,
};
use indexmap::IndexMap;
use slotmap::SlotMap;

use crate::{
    conflicts::{
        CapabilityConflictResolver, LatestModuleConflictResolver, ModuleConflictResolver,
        ProjectDependencyResolver,
    },
    error::ResolveFailure,
    executor::{BatchExecutor, SerialBatchExecutor},
    resolver::{ComponentIdResolver, ComponentMetadataResolver},
    strategy::ResolutionStrategy,
    substitution::{DependencySubstitutions, ModuleReplacements, SubstitutionResult},
    variants::{AttributeMatchingVariantSelector, VariantSelector},
};

use super::{
    component::ComponentState,
    conflict::{CapabilitiesConflictHandler, ModuleConflictHandler},
    dependency::DependencyState,
    edge::EdgeState,
    module::ModuleResolveState,
    node::NodeState,
    selector::SelectorState,
    ComponentKey, EdgeKey, ModuleKey, NodeKey, SelectorKey,
};

/// Decides whether a declared dependency takes part in the resolution at all.
pub type EdgeFilter<'a> = &'a dyn Fn(&DependencyMetadata) -> bool;

/// The collaborators consulted during one resolution. Only the two resolvers
/// are mandatory; everything else has a neutral default.
pub struct ResolveServices<'a> {
    pub id_resolver: &'a dyn ComponentIdResolver,
    pub metadata_resolver: &'a dyn ComponentMetadataResolver,
    pub variant_selector: &'a dyn VariantSelector,
    pub substitutions: Option<&'a dyn DependencySubstitutions>,
    pub replacements: Option<&'a ModuleReplacements>,
    /// Consulted before the built-in resolvers, in order.
    pub module_conflict_resolvers: Vec<&'a dyn ModuleConflictResolver>,
    pub capability_conflict_resolvers: Vec<&'a dyn CapabilityConflictResolver>,
    pub executor: &'a dyn BatchExecutor,
    pub edge_filter: Option<EdgeFilter<'a>>,
}

impl<'a> ResolveServices<'a> {
    pub fn new(
        id_resolver: &'a dyn ComponentIdResolver,
        metadata_resolver: &'a dyn ComponentMetadataResolver,
    ) -> Self {
        ResolveServices {
            id_resolver,
            metadata_resolver,
            variant_selector: &AttributeMatchingVariantSelector,
            substitutions: None,
            replacements: None,
            module_conflict_resolvers: vec![],
            capability_conflict_resolvers: vec![],
            executor: &SerialBatchExecutor,
            edge_filter: None,
        }
    }

    pub fn with_substitutions(mut self, substitutions: &'a dyn DependencySubstitutions) -> Self {
        self.substitutions = Some(substitutions);
        self
    }

    pub fn with_replacements(mut self, replacements: &'a ModuleReplacements) -> Self {
        self.replacements = Some(replacements);
        self
    }

    pub fn with_module_conflict_resolver(mut self, resolver: &'a dyn ModuleConflictResolver) -> Self {
        self.module_conflict_resolvers.push(resolver);
        self
    }

    pub fn with_capability_conflict_resolver(
        mut self,
        resolver: &'a dyn CapabilityConflictResolver,
    ) -> Self {
        self.capability_conflict_resolvers.push(resolver);
        self
    }

    pub fn with_executor(mut self, executor: &'a dyn BatchExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_variant_selector(mut self, selector: &'a dyn VariantSelector) -> Self {
        self.variant_selector = selector;
        self
    }

    pub fn with_edge_filter(mut self, filter: EdgeFilter<'a>) -> Self {
        self.edge_filter = Some(filter);
        self
    }
}

/// Identity of a [`SelectorState`]: the effective selector, whether the
/// version is provided by ancestors, and whether it is a virtual platform edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SelectorIdentity {
    selector: ComponentSelector,
    ignore_version: bool,
    virtual_platform_edge: bool,
}

pub struct ResolveState<'a> {
    pub(crate) services: ResolveServices<'a>,
    pub(crate) strategy: ResolutionStrategy,
    pub(crate) module_resolvers: Vec<&'a dyn ModuleConflictResolver>,

    pub(crate) modules: SlotMap<ModuleKey, ModuleResolveState>,
    pub(crate) components: SlotMap<ComponentKey, ComponentState>,
    pub(crate) nodes: SlotMap<NodeKey, NodeState>,
    pub(crate) edges: SlotMap<EdgeKey, EdgeState>,
    pub(crate) selectors: SlotMap<SelectorKey, SelectorState>,

    module_index: IndexMap<ModuleId, ModuleKey>,
    node_index: IndexMap<(ComponentKey, usize), NodeKey>,
    selector_index: IndexMap<SelectorIdentity, SelectorKey>,
    dependency_cache: IndexMap<Arc<DependencyMetadata>, Rc<DependencyState>>,
    substitution_cache: IndexMap<Rc<DependencyState>, Rc<DependencyState>>,

    queue: VecDeque<NodeKey>,
    pub(crate) root: NodeKey,
    pub(crate) synthetic_dependencies: Vec<Arc<DependencyMetadata>>,

    pub(crate) module_conflicts: ModuleConflictHandler,
    pub(crate) capability_conflicts: CapabilitiesConflictHandler,
}

impl<'a> ResolveState<'a> {
    /// Creates the state and its root node. The root component is selected
    /// up front and never takes part in conflict resolution.
    pub fn new(
        services: ResolveServices<'a>,
        strategy: ResolutionStrategy,
        root: Arc<ComponentMetadata>,
        root_variant: usize,
        synthetic_dependencies: Vec<DependencyMetadata>,
    ) -> Self {
        let mut module_resolvers = services.module_conflict_resolvers.clone();
        if strategy.prefer_project_modules() {
            module_resolvers.push(&ProjectDependencyResolver);
        }
        module_resolvers.push(&LatestModuleConflictResolver);

        let mut state = ResolveState {
            services,
            strategy,
            module_resolvers,
            modules: SlotMap::with_key(),
            components: SlotMap::with_key(),
            nodes: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            selectors: SlotMap::with_key(),
            module_index: IndexMap::new(),
            node_index: IndexMap::new(),
            selector_index: IndexMap::new(),
            dependency_cache: IndexMap::new(),
            substitution_cache: IndexMap::new(),
            queue: VecDeque::new(),
            root: NodeKey::default(),
            synthetic_dependencies: synthetic_dependencies.into_iter().map(Arc::new).collect(),
            module_conflicts: ModuleConflictHandler::default(),
            capability_conflicts: CapabilitiesConflictHandler::default(),
        };

        let module = state.module_key(root.module());
        state.modules[module].root = true;
        let component = state.get_version(module, &root.id);
        state.components[component].root = true;
        state.components[component].metadata = Some(root);
        state.select(module, component);
        let node = state.get_node(component, root_variant, false);
        state.nodes[node].root = true;
        state.root = node;
        state
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// Returns the state of `id`, creating it on first use.
    pub(crate) fn module_key(&mut self, id: &ModuleId) -> ModuleKey {
        if let Some(&key) = self.module_index.get(id) {
            return key;
        }
        let key = self.modules.insert(ModuleResolveState::new(id.clone()));
        self.module_index.insert(id.clone(), key);
        key
    }

    pub(crate) fn find_module(&self, id: &ModuleId) -> Option<ModuleKey> {
        self.module_index.get(id).copied()
    }

    /// Returns the component for `id` in `module`, creating it on first use.
    /// Versions keep their insertion order.
    pub(crate) fn get_version(&mut self, module: ModuleKey, id: &ComponentId) -> ComponentKey {
        if let Some(&key) = self.modules[module].versions.get(id) {
            return key;
        }
        let key = self
            .components
            .insert(ComponentState::new(id.clone(), module));
        self.modules[module].versions.insert(id.clone(), key);
        key
    }

    /// Returns the node for a variant of `component`, creating it on first use.
    pub(crate) fn get_node(
        &mut self,
        component: ComponentKey,
        variant: usize,
        selected_by_variant_aware: bool,
    ) -> NodeKey {
        if let Some(&key) = self.node_index.get(&(component, variant)) {
            if selected_by_variant_aware {
                self.nodes[key].selected_by_variant_aware = true;
            }
            return key;
        }
        let module = self.components[component].module;
        let dependencies_may_change = self.is_virtual_platform(module);
        let key = self.nodes.insert(NodeState::new(
            component,
            variant,
            selected_by_variant_aware,
            dependencies_may_change,
        ));
        self.node_index.insert((component, variant), key);
        self.components[component].nodes.push(key);
        key
    }

    pub(crate) fn on_more_selected(&mut self, node: NodeKey) {
        let state = &mut self.nodes[node];
        if !state.queued {
            state.queued = true;
            self.queue.push_back(node);
        }
    }

    pub(crate) fn on_fewer_selected(&mut self, node: NodeKey) {
        let state = &mut self.nodes[node];
        if !state.queued {
            state.queued = true;
            self.queue.push_front(node);
        }
    }

    pub(crate) fn peek(&self) -> Option<NodeKey> {
        self.queue.front().copied()
    }

    pub(crate) fn pop(&mut self) -> Option<NodeKey> {
        let node = self.queue.pop_front()?;
        self.nodes[node].queued = false;
        Some(node)
    }

    /// The cached, unsubstituted state of a declared dependency.
    pub(crate) fn dependency_state(&mut self, dependency: &Arc<DependencyMetadata>) -> Rc<DependencyState> {
        if let Some(state) = self.dependency_cache.get(dependency) {
            return state.clone();
        }
        let state = Rc::new(match self.services.id_resolver.module_of(&dependency.selector) {
            Some(module) => DependencyState::new(dependency.clone(), module),
            None => DependencyState::unknown_project(dependency.clone()),
        });
        self.dependency_cache
            .insert(dependency.clone(), state.clone());
        state
    }

    /// Applies dependency substitution rules, caching the outcome per
    /// dependency state.
    pub(crate) fn maybe_substitute(&mut self, dependency: &Rc<DependencyState>) -> Rc<DependencyState> {
        let Some(substitutions) = self.services.substitutions else {
            return dependency.clone();
        };
        if let Some(state) = self.substitution_cache.get(dependency) {
            return state.clone();
        }
        let substituted = match substitutions.substitute(&dependency.dependency) {
            SubstitutionResult::Unchanged => dependency.clone(),
            SubstitutionResult::Substituted { target, reason } => {
                let module = self
                    .services
                    .id_resolver
                    .module_of(&target)
                    .unwrap_or_else(|| dependency.module.clone());
                log::debug!(
                    "substituted {} with {} ({})",
                    dependency.requested,
                    target,
                    reason
                );
                Rc::new(dependency.substitute(target, module, reason))
            }
            SubstitutionResult::Failed(reason) => Rc::new(dependency.failed(
                ResolveFailure::unresolvable(&dependency.requested, reason),
            )),
        };
        self.substitution_cache
            .insert(dependency.clone(), substituted.clone());
        substituted
    }

    /// Returns the selector shared by every edge with the same effective
    /// target, creating it on first use.
    pub(crate) fn compute_selector_for(
        &mut self,
        dependency: &Rc<DependencyState>,
        ignore_version: bool,
    ) -> SelectorKey {
        let identity = SelectorIdentity {
            selector: dependency.dependency.selector.clone(),
            ignore_version,
            virtual_platform_edge: dependency.dependency.is_lenient_platform(),
        };
        if let Some(&key) = self.selector_index.get(&identity) {
            self.selectors[key].update(dependency);
            return key;
        }
        let module = self.module_key(&dependency.module);
        let selector = SelectorState::new(
            dependency.clone(),
            module,
            ignore_version,
            identity.virtual_platform_edge,
        );
        let key = self.selectors.insert(selector);
        self.selector_index.insert(identity, key);
        key
    }

    /// Metadata of `component`, resolved on first access. A failure is cached
    /// on the component and never retried.
    pub(crate) fn component_metadata(&mut self, component: ComponentKey) -> Option<Arc<ComponentMetadata>> {
        let state = &self.components[component];
        if let Some(metadata) = &state.metadata {
            return Some(metadata.clone());
        }
        if state.metadata_failure.is_some() {
            return None;
        }
        let id = state.id.clone();
        let result = self.services.metadata_resolver.resolve(&id);
        self.set_metadata_result(component, result)
    }

    pub(crate) fn set_metadata_result(
        &mut self,
        component: ComponentKey,
        result: Result<Arc<ComponentMetadata>, ResolveFailure>,
    ) -> Option<Arc<ComponentMetadata>> {
        match result {
            Ok(metadata) => {
                self.components[component].metadata = Some(metadata.clone());
                Some(metadata)
            }
            Err(failure) => {
                log::debug!("metadata of {} failed: {}", self.components[component].id, failure);
                self.components[component].metadata_failure = Some(failure);
                None
            }
        }
    }

    pub(crate) fn is_virtual_platform(&self, module: ModuleKey) -> bool {
        self.modules[module]
            .platform
            .as_ref()
            .is_some_and(|p| !p.participating_modules.is_empty())
    }

    pub(crate) fn is_virtual_platform_node(&self, node: NodeKey) -> bool {
        let component = self.nodes[node].component;
        self.is_virtual_platform(self.components[component].module)
    }

    pub(crate) fn all_modules(&self) -> Vec<ModuleKey> {
        self.module_index.values().copied().collect()
    }

    pub(crate) fn node_display(&self, node: NodeKey) -> String {
        let state = &self.nodes[node];
        let component = &self.components[state.component];
        match &component.metadata {
            Some(m) => match m.variants.get(state.variant) {
                Some(v) => format!("{}({})", component.id, v.name),
                None => component.id.to_string(),
            },
            None => component.id.to_string(),
        }
    }
}
