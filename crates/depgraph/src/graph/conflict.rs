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

//! Conflicts found while traversing: module replacements and capabilities.
//!
//! Detecting a conflict deselects every participant. Conflicts are queued
//! and only resolved once the work queue runs dry, so that every candidate
//! has had a chance to show up.

use std::collections::VecDeque;

use depgraph_util::ids::Capability;
use indexmap::{IndexMap, IndexSet};

use crate::conflicts::{CapabilityCandidate, ConflictCandidate};

use super::{
    component::{Rejection, SelectionCause},
    state::ResolveState,
    ComponentKey, ModuleKey, NodeKey,
};

#[derive(Debug)]
struct ModuleConflict {
    /// Participating modules with the component each one had selected.
    candidates: Vec<(ModuleKey, ComponentKey)>,
}

/// Conflicts between a module and the module replacing it.
#[derive(Debug, Default)]
pub(crate) struct ModuleConflictHandler {
    conflicts: VecDeque<ModuleConflict>,
    in_conflict: IndexSet<ModuleKey>,
}

impl ModuleConflictHandler {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn has_known_conflict(&self, module: ModuleKey) -> bool {
        self.in_conflict.contains(&module)
    }
}

#[derive(Debug)]
struct CapabilityConflict {
    key: String,
    providers: Vec<(NodeKey, Capability)>,
}

/// Conflicts between nodes providing the same capability.
#[derive(Debug, Default)]
pub(crate) struct CapabilitiesConflictHandler {
    /// Every provider registered so far, per capability key.
    providers: IndexMap<String, Vec<(NodeKey, Capability)>>,
    conflicts: VecDeque<CapabilityConflict>,
    in_conflict: IndexSet<ModuleKey>,
    /// Keys whose conflict no resolver could settle.
    unresolved: IndexSet<String>,
}

impl CapabilitiesConflictHandler {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn has_known_conflict(&self, module: ModuleKey) -> bool {
        self.in_conflict.contains(&module)
    }

    pub fn has_seen_capability(&self, capability: &Capability) -> bool {
        self.providers.contains_key(&capability.key())
    }

    fn is_queued(&self, key: &str) -> bool {
        self.conflicts.iter().any(|c| c.key == key)
    }
}

impl ResolveState<'_> {
    /// Whether `module` takes part in a conflict that is not resolved yet.
    pub(crate) fn has_known_conflict(&self, module: ModuleKey) -> bool {
        self.module_conflicts.has_known_conflict(module)
            || self.capability_conflicts.has_known_conflict(module)
    }

    pub(crate) fn has_pending_conflicts(&self) -> bool {
        self.module_conflicts.has_conflicts() || self.capability_conflicts.has_conflicts()
    }

    /// Registers a module that was just selected for the first time. When it
    /// replaces, or is replaced by, a module already in the graph, both are
    /// deselected and the conflict is queued.
    pub(crate) fn register_module_candidate(&mut self, module: ModuleKey) {
        let Some(replacements) = self.services.replacements else {
            return;
        };
        let Some(selected) = self.modules[module].selected else {
            return;
        };
        let id = self.modules[module].id.clone();

        let mut related = vec![];
        if let Some(target) = replacements.replacement_for(&id) {
            related.push(target.clone());
        }
        related.extend(replacements.sources_of(&id).cloned());

        let mut candidates = vec![(module, selected)];
        for other in related {
            let Some(key) = self.find_module(&other) else {
                continue;
            };
            if self.modules[key].replaced || self.module_conflicts.in_conflict.contains(&key) {
                continue;
            }
            if let Some(component) = self.modules[key].selected {
                candidates.push((key, component));
            }
        }
        if candidates.len() < 2 {
            return;
        }

        log::debug!(
            "found new conflicting modules: {}",
            candidates
                .iter()
                .map(|(m, _)| self.modules[*m].id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        for &(m, _) in &candidates {
            self.module_conflicts.in_conflict.insert(m);
            self.clear_selection(m);
        }
        self.module_conflicts
            .conflicts
            .push_back(ModuleConflict { candidates });
    }

    /// Resolves the oldest module conflict: every participant is redirected
    /// to the winning component.
    pub(crate) fn resolve_next_module_conflict(&mut self) {
        let Some(conflict) = self.module_conflicts.conflicts.pop_front() else {
            return;
        };
        let ids: Vec<_> = conflict
            .candidates
            .iter()
            .map(|(_, c)| self.components[*c].id.clone())
            .collect();
        let views: Vec<ConflictCandidate> = conflict
            .candidates
            .iter()
            .zip(&ids)
            .map(|((_, c), id)| ConflictCandidate {
                id,
                rejected: self.components[*c].rejection.is_some(),
            })
            .collect();
        let winner = self
            .module_resolvers
            .iter()
            .find_map(|r| r.select(&views))
            .filter(|i| *i < conflict.candidates.len())
            .unwrap_or(0);
        let (winner_module, winner) = conflict.candidates[winner];
        let winner_id = self.modules[winner_module].id.clone();

        for &(module, _) in &conflict.candidates {
            self.module_conflicts.in_conflict.shift_remove(&module);
            if module == winner_module {
                continue;
            }
            let id = self.modules[module].id.clone();
            let reason = self
                .services
                .replacements
                .and_then(|r| r.reason_for(&id).or_else(|| r.reason_for(&winner_id)))
                .map(|r| format!(": {}", r))
                .unwrap_or_default();
            self.components[winner].add_cause(SelectionCause::ConflictResolution(format!(
                "module {} replaced with {}{}",
                id, winner_id, reason
            )));
        }
        log::debug!("module conflict resolved in favor of {}", self.components[winner].id);
        for (module, _) in conflict.candidates {
            self.replace_with(module, winner);
        }
    }

    /// Capabilities a node registers: the ones its variant declares, or its
    /// implicit capability once some other node declared the same one.
    fn node_capabilities(&mut self, node: NodeKey) -> Vec<Capability> {
        let declared = self.declared_capabilities(node);
        if !declared.is_empty() {
            return declared;
        }
        let component = self.nodes[node].component;
        let implicit = Capability::implicit(self.components[component].id.module_version());
        if self.capability_conflicts.has_seen_capability(&implicit) {
            vec![implicit]
        } else {
            vec![]
        }
    }

    /// Registers the capabilities of a node about to be visited. Returns
    /// `true` when a conflict was found, in which case every participant has
    /// been deselected and the node must not be expanded.
    pub(crate) fn register_capabilities(&mut self, node: NodeKey) -> bool {
        let mut found = false;
        for capability in self.node_capabilities(node) {
            let implicit = self.implicit_providers(node, &capability);
            let key = capability.key();
            let providers = self.capability_conflicts.providers.entry(key.clone()).or_default();
            for (n, c) in std::iter::once((node, capability)).chain(implicit) {
                if !providers.iter().any(|(p, _)| *p == n) {
                    providers.push((n, c));
                }
            }
            if self.capability_conflicts.unresolved.contains(&key)
                || self.capability_conflicts.is_queued(&key)
            {
                continue;
            }

            let live = self.live_providers(&key);
            let mut components: IndexSet<ComponentKey> = IndexSet::new();
            for (n, _) in &live {
                components.insert(self.nodes[*n].component);
            }
            if components.len() < 2 {
                continue;
            }

            log::debug!(
                "capability conflict on {} between {}",
                key,
                live.iter()
                    .map(|(n, _)| self.node_display(*n))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            found = true;
            for component in components {
                let module = self.components[component].module;
                self.capability_conflicts.in_conflict.insert(module);
                self.clear_selection(module);
            }
            self.capability_conflicts.conflicts.push_back(CapabilityConflict {
                key,
                providers: live,
            });
        }
        found
    }

    /// Selected nodes of the module named like `capability` that rely on
    /// their implicit capability.
    fn implicit_providers(&mut self, node: NodeKey, capability: &Capability) -> Vec<(NodeKey, Capability)> {
        let Some(module) = self
            .all_modules()
            .into_iter()
            .find(|m| {
                let id = &self.modules[*m].id;
                id.group == capability.group && id.name == capability.name
            })
        else {
            return vec![];
        };
        let mut providers = vec![];
        let versions: Vec<ComponentKey> = self.modules[module].versions.values().copied().collect();
        for version in versions {
            for other in self.components[version].nodes.clone() {
                if other == node || !self.is_node_selected(other) {
                    continue;
                }
                if self.declared_capabilities(other).is_empty() {
                    let implicit = Capability::implicit(self.components[version].id.module_version());
                    providers.push((other, implicit));
                }
            }
        }
        providers
    }

    /// Registered providers of `key` that are still part of the graph.
    fn live_providers(&self, key: &str) -> Vec<(NodeKey, Capability)> {
        let Some(providers) = self.capability_conflicts.providers.get(key) else {
            return vec![];
        };
        providers
            .iter()
            .filter(|(n, _)| {
                let component = &self.components[self.nodes[*n].component];
                component.is_selected() && self.is_node_selected(*n)
            })
            .cloned()
            .collect()
    }

    /// Resolves the oldest capability conflict through the configured
    /// resolvers. Without a winner every participant is rejected.
    pub(crate) fn resolve_next_capability_conflict(&mut self) {
        let Some(conflict) = self.capability_conflicts.conflicts.pop_front() else {
            return;
        };
        let ids: Vec<_> = conflict
            .providers
            .iter()
            .map(|(n, _)| self.components[self.nodes[*n].component].id.clone())
            .collect();
        let variants: Vec<String> = conflict
            .providers
            .iter()
            .map(|(n, _)| {
                let state = &self.nodes[*n];
                self.components[state.component]
                    .metadata
                    .as_ref()
                    .and_then(|m| m.variants.get(state.variant))
                    .map(|v| v.name.clone())
                    .unwrap_or_default()
            })
            .collect();
        let views: Vec<CapabilityCandidate> = conflict
            .providers
            .iter()
            .enumerate()
            .map(|(i, (_, capability))| CapabilityCandidate {
                component: &ids[i],
                variant: &variants[i],
                capability,
            })
            .collect();
        let winner = self
            .services
            .capability_conflict_resolvers
            .iter()
            .find_map(|r| r.select(&conflict.key, &views))
            .filter(|i| *i < conflict.providers.len());

        let mut participants: IndexMap<ModuleKey, ComponentKey> = IndexMap::new();
        for (node, _) in &conflict.providers {
            let component = self.nodes[*node].component;
            participants
                .entry(self.components[component].module)
                .or_insert(component);
        }
        for module in participants.keys() {
            self.capability_conflicts.in_conflict.shift_remove(module);
        }

        match winner {
            Some(winner) => {
                let (node, capability) = &conflict.providers[winner];
                let winner = self.nodes[*node].component;
                let winner_id = self.components[winner].id.clone();
                log::debug!(
                    "capability conflict on {} resolved in favor of {}",
                    conflict.key,
                    winner_id
                );
                self.components[winner].add_cause(SelectionCause::CapabilityConflict(format!(
                    "on capability {} {} wins",
                    capability, winner_id
                )));
                for module in participants.into_keys() {
                    self.replace_with(module, winner);
                }
            }
            None => {
                log::debug!("capability conflict on {} cannot be resolved", conflict.key);
                self.capability_conflicts.unresolved.insert(conflict.key.clone());
                for (i, (node, capability)) in conflict.providers.iter().enumerate() {
                    let others: Vec<String> = conflict
                        .providers
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, (n, _))| self.node_display(*n))
                        .collect();
                    let message = format!(
                        "Cannot select module with conflict on capability '{}' also provided by [{}]",
                        capability,
                        others.join(", ")
                    );
                    let component = self.nodes[*node].component;
                    self.components[component].reject(Rejection::Message(message.clone()));
                    self.components[component].add_cause(SelectionCause::Rejection(message));
                }
                for (module, component) in participants {
                    self.replace_with(module, component);
                }
            }
        }
    }

    pub(crate) fn resolve_next_conflict(&mut self) {
        if self.module_conflicts.has_conflicts() {
            self.resolve_next_module_conflict();
        } else {
            self.resolve_next_capability_conflict();
        }
    }
}
