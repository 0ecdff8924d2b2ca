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

//! The per module selection state machine.

use std::cmp::Ordering;

use depgraph_util::{
    attributes::{AttributeMergeError, Attributes},
    ids::{ComponentId, ModuleId},
    version::compare_versions,
};
use indexmap::IndexMap;

use super::{
    pending::PendingDependencies, platform::VirtualPlatformState, state::ResolveState,
    ComponentKey, EdgeKey, ModuleKey, NodeKey, SelectorKey,
};

#[derive(Debug)]
pub(crate) struct ModuleResolveState {
    pub id: ModuleId,
    pub versions: IndexMap<ComponentId, ComponentKey>,
    pub selectors: Vec<SelectorKey>,
    /// May belong to another module once this one has been replaced.
    pub selected: Option<ComponentKey>,
    pub replaced: bool,
    pub overridden_selection: bool,
    pub changing_selection: bool,
    pub unattached_edges: Vec<EdgeKey>,
    pub pending: PendingDependencies,
    /// Set when this module is a platform other modules align on.
    pub platform: Option<VirtualPlatformState>,
    /// The platforms this module participates in.
    pub platform_owners: Vec<ModuleKey>,
    pub merged_constraint_attributes: Attributes,
    pub attribute_merge_error: Option<AttributeMergeError>,
    pub selection_changes: usize,
    defer_selection: bool,
    pub root: bool,
}

impl ModuleResolveState {
    pub fn new(id: ModuleId) -> Self {
        ModuleResolveState {
            id,
            versions: IndexMap::new(),
            selectors: vec![],
            selected: None,
            replaced: false,
            overridden_selection: false,
            changing_selection: false,
            unattached_edges: vec![],
            pending: PendingDependencies::new(),
            platform: None,
            platform_owners: vec![],
            merged_constraint_attributes: Attributes::new(),
            attribute_merge_error: None,
            selection_changes: 0,
            defer_selection: false,
            root: false,
        }
    }

    /// One-shot: returns whether a selector asked to defer selection since
    /// the last check.
    fn check_defer_selection(&mut self) -> bool {
        std::mem::take(&mut self.defer_selection)
    }
}

impl ResolveState<'_> {
    /// First selection of `module`. Every other version is evicted.
    pub(crate) fn select(&mut self, module: ModuleKey, component: ComponentKey) {
        debug_assert!(self.modules[module].selected.is_none());
        let state = &mut self.modules[module];
        state.selected = Some(component);
        state.replaced = false;
        self.select_and_evict_others(module, component);
    }

    fn select_and_evict_others(&mut self, module: ModuleKey, component: ComponentKey) {
        for version in self.modules[module].versions.values() {
            self.components[*version].evict();
        }
        self.components[component].select();
    }

    /// Overturns a standing selection after conflict resolution.
    fn change_selection(&mut self, module: ModuleKey, component: ComponentKey) {
        let Some(previous) = self.modules[module].selected else {
            return;
        };
        debug_assert_ne!(previous, component);
        log::debug!(
            "changing selection of {} from {} to {}",
            self.modules[module].id,
            self.components[previous].id,
            self.components[component].id
        );
        self.modules[module].changing_selection = true;
        self.remove_component_outgoing_edges(previous);
        let state = &mut self.modules[module];
        state.selected = Some(component);
        state.replaced = false;
        self.do_restart(module, component);
        self.modules[module].changing_selection = false;
    }

    /// Detaches the current selection and makes every selected version
    /// selectable again, ahead of a conflict resolution pass.
    pub(crate) fn clear_selection(&mut self, module: ModuleKey) {
        if let Some(selected) = self.modules[module].selected {
            self.remove_component_outgoing_edges(selected);
        }
        for version in self.modules[module].versions.values() {
            let component = &mut self.components[*version];
            if component.is_selected() {
                component.make_selectable();
            }
        }
        let state = &mut self.modules[module];
        state.selected = None;
        state.replaced = false;
    }

    /// Redirects `module` to `component`, which may belong to another module.
    pub(crate) fn replace_with(&mut self, module: ModuleKey, component: ComponentKey) {
        if self.modules[module].selected.is_some() {
            self.clear_selection(module);
        }
        let target = self.components[component].module;
        let state = &mut self.modules[module];
        if target != module {
            state.overridden_selection = true;
        }
        state.selected = Some(component);
        state.replaced = target != module;
        if target != module {
            // The replacement inherits what this module knew about hard edges.
            let mut pending = std::mem::replace(&mut state.pending, PendingDependencies::new());
            self.modules[target].pending.retarget(&mut pending);
        }
        self.do_restart(module, component);
    }

    fn do_restart(&mut self, module: ModuleKey, component: ComponentKey) {
        self.select_and_evict_others(module, component);
        let versions: Vec<ComponentKey> = self.modules[module].versions.values().copied().collect();
        for version in versions {
            for node in self.components[version].nodes.clone() {
                self.restart_node(node, component);
            }
        }
        for selector in self.modules[module].selectors.clone() {
            self.override_selection(selector, component);
        }
        for edge in self.modules[module].unattached_edges.clone() {
            self.retarget_edge(edge);
        }
    }

    /// Deselects every node of `component`.
    pub(crate) fn remove_component_outgoing_edges(&mut self, component: ComponentKey) {
        for node in self.components[component].nodes.clone() {
            self.deselect_node(node);
        }
    }

    pub(crate) fn add_selector(&mut self, module: ModuleKey, selector: SelectorKey, defer: bool) {
        let state = &mut self.modules[module];
        if !state.selectors.contains(&selector) {
            state.selectors.push(selector);
        }
        if defer {
            state.defer_selection = true;
        }
        self.recompute_merged_constraint_attributes(module);
        if self.modules[module].overridden_selection {
            if let Some(selected) = self.modules[module].selected {
                self.override_selection(selector, selected);
            }
        }
    }

    pub(crate) fn remove_selector(&mut self, module: ModuleKey, selector: SelectorKey) {
        self.modules[module].selectors.retain(|s| *s != selector);
        let already_reused = self.selectors[selector].mark_for_reuse();
        self.selectors[selector].resolved = false;
        self.recompute_merged_constraint_attributes(module);
        let state = &self.modules[module];
        // A module in the middle of a selection change restarts on its own.
        if state.changing_selection {
            return;
        }
        if !already_reused && !state.selectors.is_empty() && state.selected.is_some() {
            self.maybe_update_selection(module);
        }
    }

    /// Attributes requested by every constraint on the module, merged. A
    /// conflicting pair is kept as an error and reported on the edges.
    fn recompute_merged_constraint_attributes(&mut self, module: ModuleKey) {
        let mut merged = Attributes::new();
        let mut error = None;
        for selector in &self.modules[module].selectors {
            let dependency = &self.selectors[*selector].dependency.dependency;
            if !dependency.is_constraint() {
                continue;
            }
            match merged.concat_safe(dependency.selector.attributes()) {
                Ok(m) => merged = m,
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }
        let state = &mut self.modules[module];
        state.merged_constraint_attributes = merged;
        state.attribute_merge_error = error;
    }

    /// Picks the best version among the selectors of `module` and switches
    /// to it. Failures stay on the selectors and are reported by the edges.
    pub(crate) fn maybe_update_selection(&mut self, module: ModuleKey) {
        let state = &mut self.modules[module];
        if state.replaced {
            return;
        }
        if !state.root && state.check_defer_selection() {
            log::trace!("selection of {} deferred", state.id);
            return;
        }
        let current = state.selected;
        let best = match self.select_best(module) {
            Ok(Some(best)) => best,
            Ok(None) => return,
            Err(failure) => {
                log::debug!("selection of {} failed: {}", self.modules[module].id, failure);
                return;
            }
        };

        let Some(current) = current else {
            if !self.has_known_conflict(module) {
                self.select(module, best);
            }
            return;
        };
        if current == best {
            return;
        }

        let state = &mut self.modules[module];
        state.selection_changes += 1;
        if state.selection_changes > self.strategy.max_selection_changes
            && self.maybe_skip_selection_change(module, current, best)
        {
            return;
        }
        self.change_selection(module, best);
    }

    /// Past the change limit the selection only moves to a higher version, or
    /// to a project component when projects are preferred.
    fn maybe_skip_selection_change(
        &self,
        module: ModuleKey,
        current: ComponentKey,
        candidate: ComponentKey,
    ) -> bool {
        let state = &self.modules[module];
        if state.selection_changes == self.strategy.max_selection_changes + 1 {
            log::warn!(
                "The dependency resolution engine wasn't able to find a version of module {} \
                 which satisfied all requirements because the graph wasn't stable enough. \
                 The highest version was selected in order to stabilize selection.",
                state.id
            );
        }
        let current = &self.components[current].id;
        let candidate = &self.components[candidate].id;
        if self.strategy.prefer_project_modules() {
            if current.is_project() {
                return true;
            }
            if candidate.is_project() {
                return false;
            }
        }
        compare_versions(candidate.version(), current.version()) != Ordering::Greater
    }

    pub(crate) fn add_unattached_edge(&mut self, module: ModuleKey, edge: EdgeKey) {
        let state = &mut self.modules[module];
        if !state.unattached_edges.contains(&edge) {
            state.unattached_edges.push(edge);
        }
    }

    pub(crate) fn remove_unattached_edge(&mut self, module: ModuleKey, edge: EdgeKey) {
        self.modules[module].unattached_edges.retain(|e| *e != edge);
    }

    /// One hard edge into `module` went away. When the module becomes
    /// pending again, the constraint edges still attached to its selection
    /// are parked on their sources.
    pub(crate) fn decrease_hard_edge_count(&mut self, module: ModuleKey, source: NodeKey) {
        self.modules[module].pending.decrease_hard_edge_count();
        if !self.modules[module].pending.is_pending() {
            return;
        }
        if let Some(selected) = self.modules[module].selected {
            for node in self.components[selected].nodes.clone() {
                self.clear_constraint_edges(node, module, source);
            }
        }
    }

    /// Called once the first hard edge reaches `module`: every node that
    /// parked a constraint on it replays its constraints.
    pub(crate) fn turn_into_hard_dependencies(&mut self, module: ModuleKey) {
        let providers = self.modules[module].pending.take_constraint_providers();
        let id = self.modules[module].id.clone();
        for node in providers {
            self.prepare_for_constraint_no_longer_pending(node, &id);
        }
    }

    /// Incoming edges of every node of the selected component.
    pub(crate) fn module_incoming_edges(&self, module: ModuleKey) -> Vec<EdgeKey> {
        let Some(selected) = self.modules[module].selected else {
            return vec![];
        };
        self.components[selected]
            .nodes
            .iter()
            .flat_map(|n| self.nodes[*n].incoming.iter().copied())
            .collect()
    }

    pub(crate) fn register_platform_owner(&mut self, module: ModuleKey, platform: ModuleKey) {
        let owners = &mut self.modules[module].platform_owners;
        if !owners.contains(&platform) {
            owners.push(platform);
        }
    }
}
