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

//! Version alignment through platforms, published or synthesized.
//!
//! A component names the platforms it belongs to in its metadata. Every
//! member gets an edge to its platform; a platform nobody published is
//! synthesized with lenient metadata whose dependencies pull each member up
//! to the highest version the platform was seen at.

use std::{cmp::Ordering, sync::Arc};

use depgraph_util::{
    constraint::VersionConstraint,
    ids::ComponentId,
    metadata::{ComponentMetadata, DependencyMetadata, VariantMetadata},
    selector::ComponentSelector,
    version::compare_versions,
};
use indexmap::IndexSet;

use super::{state::ResolveState, ComponentKey, EdgeKey, ModuleKey};

pub(crate) const PLATFORM_VARIANT: &str = "platform";

#[derive(Debug, Default)]
pub(crate) struct VirtualPlatformState {
    pub participating_modules: IndexSet<ModuleKey>,
    pub orphan_edges: Vec<EdgeKey>,
}

/// Metadata standing in for a platform version that was never published.
pub(crate) fn lenient_platform_metadata(id: ComponentId) -> ComponentMetadata {
    let mut metadata = ComponentMetadata::new(id).with_variant(VariantMetadata::new(PLATFORM_VARIANT));
    metadata.virtual_platform = true;
    metadata
}

impl ResolveState<'_> {
    pub(crate) fn platform_state(&mut self, platform: ModuleKey) -> &mut VirtualPlatformState {
        self.modules[platform].platform.get_or_insert_with(VirtualPlatformState::default)
    }

    /// Adds `module` to the members of `platform`. Selected platform nodes
    /// recompute their dependencies to cover the new member.
    pub(crate) fn participating_module(&mut self, platform: ModuleKey, module: ModuleKey) {
        if !self.platform_state(platform).participating_modules.insert(module) {
            return;
        }
        log::debug!(
            "{} participates in platform {}",
            self.modules[module].id,
            self.modules[platform].id
        );
        if let Some(selected) = self.modules[platform].selected {
            for node in self.components[selected].nodes.clone() {
                if self.is_node_selected(node) {
                    self.mark_for_virtual_platform_refresh(node);
                }
            }
        }
        self.register_platform_owner(module, platform);
    }

    /// Known versions of the platform up to the selected one, highest first.
    pub(crate) fn candidate_versions(&self, platform: ModuleKey) -> Vec<String> {
        let state = &self.modules[platform];
        let Some(selected) = state.selected else {
            return vec![];
        };
        let selected = self.components[selected].id.version();
        let mut versions: Vec<String> = state
            .versions
            .keys()
            .map(|id| id.version().to_string())
            .filter(|v| compare_versions(v, selected) != Ordering::Greater)
            .collect();
        versions.sort_by(|a, b| compare_versions(b, a));
        versions.dedup();
        versions
    }

    /// Whether a hard force applies to the platform or one of its members.
    pub(crate) fn is_platform_forced(&self, platform: ModuleKey) -> bool {
        let hard_forced = |module: ModuleKey| {
            self.modules[module]
                .selectors
                .iter()
                .any(|s| self.selectors[*s].forced && !self.selectors[*s].soft_forced)
        };
        if hard_forced(platform) {
            return true;
        }
        self.modules[platform]
            .platform
            .as_ref()
            .is_some_and(|p| p.participating_modules.iter().any(|m| hard_forced(*m)))
    }

    pub(crate) fn selected_platform_id(&self, platform: ModuleKey) -> Option<ComponentId> {
        self.modules[platform]
            .selected
            .map(|c| self.components[c].id.clone())
    }

    /// The version of the platform a hard force on one of its selected nodes
    /// asks for.
    pub(crate) fn maybe_find_forced_platform_version(&self, platform: ModuleKey) -> Option<String> {
        let selected = self.modules[platform].selected?;
        for &node in &self.components[selected].nodes {
            if !self.is_node_selected(node) {
                continue;
            }
            for &edge in &self.nodes[node].incoming {
                let dependency = &self.edges[edge].dependency.dependency;
                if !dependency.is_lenient_platform() && dependency.force {
                    return Some(self.components[selected].id.version().to_string());
                }
            }
        }
        None
    }

    pub(crate) fn add_orphan_edge(&mut self, platform: ModuleKey, edge: EdgeKey) {
        let state = self.platform_state(platform);
        if !state.orphan_edges.contains(&edge) {
            state.orphan_edges.push(edge);
        }
    }

    /// Retries edges that reached the platform before it had metadata.
    pub(crate) fn attach_orphan_edges(&mut self, platform: ModuleKey) {
        let Some(state) = self.modules[platform].platform.as_mut() else {
            return;
        };
        for edge in std::mem::take(&mut state.orphan_edges) {
            self.attach_edge(edge);
        }
    }

    /// Gives lenient metadata to every version of `platform` that has none.
    pub(crate) fn maybe_create_virtual_metadata(&mut self, platform: ModuleKey) {
        let versions: Vec<ComponentKey> = self.modules[platform].versions.values().copied().collect();
        for version in versions {
            let component = &mut self.components[version];
            if component.metadata.is_none() {
                component.metadata = Some(Arc::new(lenient_platform_metadata(component.id.clone())));
                component.metadata_failure = None;
            }
        }
    }

    /// Dependencies of a synthesized platform: one lenient constraint per
    /// selected member, on the highest candidate version the member
    /// actually has.
    pub(crate) fn lenient_platform_dependencies(
        &mut self,
        component: ComponentKey,
    ) -> Vec<Arc<DependencyMetadata>> {
        let platform = self.components[component].module;
        let platform_id = self
            .selected_platform_id(platform)
            .unwrap_or_else(|| self.components[component].id.clone())
            .module_version()
            .clone();
        let candidates = self.candidate_versions(platform);
        let forced = self.is_platform_forced(platform);
        let participants: Vec<ModuleKey> = self
            .modules[platform]
            .platform
            .as_ref()
            .map(|p| p.participating_modules.iter().copied().collect())
            .unwrap_or_default();

        let mut dependencies = vec![];
        for module in participants {
            let Some(selected) = self.modules[module].selected else {
                continue;
            };
            let current = self.components[selected].id.version().to_string();
            let module_id = self.modules[module].id.clone();
            for target in &candidates {
                let exists = *target == current || {
                    let id = ComponentId::Module(module_id.with_version(target.as_str()));
                    let candidate = self.get_version(module, &id);
                    self.component_metadata(candidate).is_some()
                };
                if exists {
                    let selector = ComponentSelector::module(
                        module_id.clone(),
                        VersionConstraint::require(target.as_str()),
                    );
                    dependencies.push(Arc::new(DependencyMetadata::lenient_platform(
                        selector,
                        platform_id.clone(),
                        forced,
                    )));
                    break;
                }
            }
        }
        self.attach_orphan_edges(platform);
        dependencies
    }
}
