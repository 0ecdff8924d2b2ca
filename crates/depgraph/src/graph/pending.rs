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

//! Tracks whether a module is only targeted by constraints.

use indexmap::IndexSet;

use super::{dependency::DependencyState, state::ResolveState, ModuleKey, NodeKey};

/// Per module ledger. A module is pending while no hard (non-constraint)
/// dependency points at it; constraints on a pending module are parked on
/// the nodes that declared them.
#[derive(Debug)]
pub(crate) struct PendingDependencies {
    hard_edges: usize,
    constraint_providers: IndexSet<NodeKey>,
    report_active_pending: bool,
}

impl PendingDependencies {
    pub fn new() -> Self {
        PendingDependencies {
            hard_edges: 0,
            constraint_providers: IndexSet::new(),
            report_active_pending: true,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.hard_edges == 0
    }

    pub fn hard_edge_count(&self) -> usize {
        self.hard_edges
    }

    /// `from_virtual_platform` is set when the provider is a node of a virtual
    /// platform; such constraints never count as activating.
    pub fn register_constraint_provider(&mut self, node: NodeKey, from_virtual_platform: bool) {
        debug_assert!(
            self.is_pending(),
            "constraint provider registered on a module with hard edges"
        );
        self.constraint_providers.insert(node);
        if from_virtual_platform {
            self.report_active_pending = false;
        }
    }

    pub fn unregister_constraint_provider(&mut self, node: NodeKey) {
        self.constraint_providers.shift_remove(&node);
    }

    pub fn increase_hard_edge_count(&mut self) {
        self.hard_edges += 1;
    }

    pub fn decrease_hard_edge_count(&mut self) {
        if self.hard_edges == 0 {
            log::warn!("hard edge count of a module dropped below zero");
            return;
        }
        self.hard_edges -= 1;
    }

    /// Whether turning this module into a hard dependency will re-expand some
    /// parked constraints.
    pub fn has_pending_components(&self) -> bool {
        self.report_active_pending && !self.constraint_providers.is_empty()
    }

    pub fn take_constraint_providers(&mut self) -> Vec<NodeKey> {
        self.report_active_pending = true;
        std::mem::take(&mut self.constraint_providers)
            .into_iter()
            .collect()
    }

    /// Folds the ledger of a module replaced by this one.
    pub fn retarget(&mut self, other: &mut PendingDependencies) {
        self.hard_edges += other.hard_edges;
        self.constraint_providers
            .extend(other.constraint_providers.drain(..));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingState {
    Pending,
    NotPending,
    /// A hard dependency that turns parked constraints into edges. Selection
    /// for its module waits until those constraints arrive.
    NotPendingActivating,
}

impl PendingState {
    pub fn is_pending(self) -> bool {
        self == PendingState::Pending
    }

    pub fn defer_selection(self) -> bool {
        self == PendingState::NotPendingActivating
    }
}

/// Classifies the dependencies of one node visit. Modules that stop being
/// pending are only notified in [`PendingDependenciesVisitor::complete`], once
/// the whole node has been visited.
#[derive(Default)]
pub(crate) struct PendingDependenciesVisitor {
    no_longer_pending: Vec<ModuleKey>,
}

impl PendingDependenciesVisitor {
    pub fn maybe_add_as_pending_dependency(
        &mut self,
        state: &mut ResolveState<'_>,
        node: NodeKey,
        dependency: &DependencyState,
    ) -> PendingState {
        let module = state.module_key(&dependency.module);
        if !dependency.is_constraint() {
            return if self.mark_not_pending(state, module) {
                PendingState::NotPendingActivating
            } else {
                PendingState::NotPending
            };
        }

        if !state.modules[module].pending.is_pending() {
            return PendingState::NotPending;
        }

        let from_virtual_platform = state.is_virtual_platform_node(node);
        state.modules[module]
            .pending
            .register_constraint_provider(node, from_virtual_platform);
        PendingState::Pending
    }

    /// Counts one more hard edge into `module`. Returns whether parked
    /// constraints will be activated by it.
    pub fn mark_not_pending(&mut self, state: &mut ResolveState<'_>, module: ModuleKey) -> bool {
        let pending = &mut state.modules[module].pending;
        let mut activated = false;
        if pending.is_pending() {
            self.no_longer_pending.push(module);
            activated = pending.has_pending_components();
        }
        pending.increase_hard_edge_count();
        activated
    }

    pub fn complete(&mut self, state: &mut ResolveState<'_>) {
        for module in std::mem::take(&mut self.no_longer_pending) {
            state.turn_into_hard_dependencies(module);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn ledger() {
        let mut nodes: SlotMap<NodeKey, ()> = SlotMap::with_key();
        let a = nodes.insert(());
        let b = nodes.insert(());

        let mut pending = PendingDependencies::new();
        assert!(pending.is_pending());
        pending.register_constraint_provider(a, false);
        pending.register_constraint_provider(b, false);
        pending.unregister_constraint_provider(a);
        assert!(pending.has_pending_components());

        pending.increase_hard_edge_count();
        assert!(!pending.is_pending());
        assert_eq!(pending.take_constraint_providers(), vec![b]);
        assert!(!pending.has_pending_components());

        pending.decrease_hard_edge_count();
        assert!(pending.is_pending());
        pending.decrease_hard_edge_count();
        assert_eq!(pending.hard_edge_count(), 0);
    }

    #[test]
    fn virtual_platform_providers_do_not_activate() {
        let mut nodes: SlotMap<NodeKey, ()> = SlotMap::with_key();
        let a = nodes.insert(());
        let mut pending = PendingDependencies::new();
        pending.register_constraint_provider(a, true);
        assert!(!pending.has_pending_components());
    }
}
