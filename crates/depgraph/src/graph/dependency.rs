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

use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

use depgraph_util::{
    ids::ModuleId, metadata::DependencyMetadata, selector::ComponentSelector,
};

use crate::error::ResolveFailure;

/// A declared dependency after substitution. `requested` keeps the selector
/// as declared, `dependency` carries the effective one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DependencyState {
    pub dependency: Arc<DependencyMetadata>,
    pub requested: ComponentSelector,
    pub module: ModuleId,
    pub substitution_reason: Option<String>,
    pub failure: Option<ResolveFailure>,
}

impl Hash for DependencyState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dependency.hash(state);
        self.requested.hash(state);
        self.module.hash(state);
        self.substitution_reason.hash(state);
    }
}

impl DependencyState {
    pub fn new(dependency: Arc<DependencyMetadata>, module: ModuleId) -> Self {
        DependencyState {
            requested: dependency.selector.clone(),
            dependency,
            module,
            substitution_reason: None,
            failure: None,
        }
    }

    /// A dependency on a project path nobody knows about. Resolution of its
    /// selector fails later; the module id only has to be stable.
    pub fn unknown_project(dependency: Arc<DependencyMetadata>) -> Self {
        let name = match &dependency.selector {
            ComponentSelector::Project { path, .. } => path.trim_start_matches(':').to_string(),
            ComponentSelector::Module { module, .. } => module.name.clone(),
        };
        DependencyState::new(dependency, ModuleId::new("", name))
    }

    pub fn substitute(&self, target: ComponentSelector, module: ModuleId, reason: String) -> Self {
        DependencyState {
            dependency: Arc::new(self.dependency.with_target(target)),
            requested: self.requested.clone(),
            module,
            substitution_reason: Some(reason),
            failure: None,
        }
    }

    pub fn failed(&self, failure: ResolveFailure) -> Self {
        DependencyState {
            failure: Some(failure),
            ..self.clone()
        }
    }

    pub fn is_constraint(&self) -> bool {
        self.dependency.is_constraint()
    }

    pub fn is_forced(&self) -> bool {
        self.dependency.force
    }

    pub fn is_strict(&self) -> bool {
        self.dependency.is_strict()
    }

    pub fn is_endorsing(&self) -> bool {
        self.dependency.endorse_strict_versions
    }
}
