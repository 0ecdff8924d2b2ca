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

use std::sync::Arc;

use depgraph_util::{ids::ComponentId, metadata::ComponentMetadata};

use crate::{error::ResolveFailure, messages};

use super::{state::ResolveState, ComponentKey, ModuleKey, NodeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SelectionState {
    Selectable,
    Selected,
    Evicted,
}

/// Marks used while assembling the result in consumer-first order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VisitState {
    NotSeen,
    Visiting,
    Visited,
}

/// Why a component ended up selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionCause {
    Root,
    Requested(Option<String>),
    Constraint(Option<String>),
    Forced,
    ByAncestor,
    SelectedByRule(String),
    ConflictResolution(String),
    CapabilityConflict(String),
    Rejection(String),
}

impl std::fmt::Display for SelectionCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionCause::Root => write!(f, "root"),
            SelectionCause::Requested(None) => write!(f, "requested"),
            SelectionCause::Requested(Some(r)) => write!(f, "requested: {}", r),
            SelectionCause::Constraint(None) => write!(f, "constraint"),
            SelectionCause::Constraint(Some(r)) => write!(f, "constraint: {}", r),
            SelectionCause::Forced => write!(f, "forced"),
            SelectionCause::ByAncestor => write!(f, "by ancestor"),
            SelectionCause::SelectedByRule(r) => write!(f, "selected by rule: {}", r),
            SelectionCause::ConflictResolution(r) => write!(f, "conflict resolution: {}", r),
            SelectionCause::CapabilityConflict(r) => write!(f, "capability conflict: {}", r),
            SelectionCause::Rejection(r) => write!(f, "rejection: {}", r),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rejection {
    /// Rejected by the version constraints of the selectors.
    Constraints,
    /// Rejected with a ready-made message.
    Message(String),
}

/// One version of a module.
#[derive(Debug)]
pub(crate) struct ComponentState {
    pub id: ComponentId,
    pub module: ModuleKey,
    pub metadata: Option<Arc<ComponentMetadata>>,
    pub metadata_failure: Option<ResolveFailure>,
    pub nodes: Vec<NodeKey>,
    pub selection: SelectionState,
    pub rejection: Option<Rejection>,
    pub causes: Vec<SelectionCause>,
    pub root: bool,
    pub visit_state: VisitState,
}

impl ComponentState {
    pub fn new(id: ComponentId, module: ModuleKey) -> Self {
        ComponentState {
            id,
            module,
            metadata: None,
            metadata_failure: None,
            nodes: vec![],
            selection: SelectionState::Selectable,
            rejection: None,
            causes: vec![],
            root: false,
            visit_state: VisitState::NotSeen,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.selection == SelectionState::Selected
    }

    pub fn select(&mut self) {
        self.selection = SelectionState::Selected;
    }

    pub fn evict(&mut self) {
        self.selection = SelectionState::Evicted;
    }

    pub fn make_selectable(&mut self) {
        self.selection = SelectionState::Selectable;
    }

    pub fn is_resolved(&self) -> bool {
        self.metadata.is_some() || self.metadata_failure.is_some()
    }

    pub fn reject(&mut self, rejection: Rejection) {
        self.rejection = Some(rejection);
    }

    pub fn add_cause(&mut self, cause: SelectionCause) {
        if !self.causes.contains(&cause) {
            self.causes.push(cause);
        }
    }
}

impl ResolveState<'_> {
    /// Every cause recorded for `component`: the causes of the selectors of
    /// its module followed by those recorded during conflict resolution.
    pub(crate) fn selection_reason(&self, component: ComponentKey) -> Vec<SelectionCause> {
        let state = &self.components[component];
        let mut causes = vec![];
        if state.root {
            causes.push(SelectionCause::Root);
        }
        for module in self.modules_selecting(component) {
            for &selector in &self.modules[module].selectors {
                for cause in &self.selectors[selector].causes {
                    if !causes.contains(cause) {
                        causes.push(cause.clone());
                    }
                }
            }
        }
        for cause in &state.causes {
            if !causes.contains(cause) {
                causes.push(cause.clone());
            }
        }
        causes
    }

    /// The component's own module and every module replaced by it.
    fn modules_selecting(&self, component: ComponentKey) -> Vec<ModuleKey> {
        let own = self.components[component].module;
        let mut modules = vec![own];
        for (key, module) in &self.modules {
            if key != own && module.selected == Some(component) {
                modules.push(key);
            }
        }
        modules
    }

    pub(crate) fn rejected_error_message(&self, component: ComponentKey) -> Option<String> {
        match self.components[component].rejection.as_ref()? {
            Rejection::Message(msg) => Some(msg.clone()),
            Rejection::Constraints => Some(messages::rejection_message(self, component)),
        }
    }

    pub(crate) fn is_node_selected(&self, node: NodeKey) -> bool {
        let state = &self.nodes[node];
        state.root || !state.incoming.is_empty()
    }

    /// Whether the node belongs in the result graph.
    pub(crate) fn should_include(&self, node: NodeKey) -> bool {
        let module = self.components[self.nodes[node].component].module;
        self.is_node_selected(node) && !self.is_virtual_platform(module)
    }
}
