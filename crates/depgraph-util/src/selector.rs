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

use serde::{Deserialize, Serialize};

use crate::{
    attributes::Attributes,
    constraint::VersionConstraint,
    ids::{Capability, ComponentId, ModuleId},
};

/// What a dependency asks for.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentSelector {
    Module {
        module: ModuleId,
        #[serde(default)]
        constraint: VersionConstraint,
        #[serde(default, skip_serializing_if = "Attributes::is_empty")]
        attributes: Attributes,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        capabilities: Vec<Capability>,
    },
    Project {
        path: String,
        #[serde(default, skip_serializing_if = "Attributes::is_empty")]
        attributes: Attributes,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        capabilities: Vec<Capability>,
    },
}

impl ComponentSelector {
    pub fn module(module: ModuleId, constraint: VersionConstraint) -> Self {
        ComponentSelector::Module {
            module,
            constraint,
            attributes: Attributes::new(),
            capabilities: vec![],
        }
    }

    pub fn project(path: impl Into<String>) -> Self {
        ComponentSelector::Project {
            path: path.into(),
            attributes: Attributes::new(),
            capabilities: vec![],
        }
    }

    pub fn with_attributes(mut self, attrs: Attributes) -> Self {
        match &mut self {
            ComponentSelector::Module { attributes, .. }
            | ComponentSelector::Project { attributes, .. } => *attributes = attrs,
        }
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        match &mut self {
            ComponentSelector::Module { capabilities, .. }
            | ComponentSelector::Project { capabilities, .. } => capabilities.push(capability),
        }
        self
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            ComponentSelector::Module { attributes, .. }
            | ComponentSelector::Project { attributes, .. } => attributes,
        }
    }

    pub fn requested_capabilities(&self) -> &[Capability] {
        match self {
            ComponentSelector::Module { capabilities, .. }
            | ComponentSelector::Project { capabilities, .. } => capabilities,
        }
    }

    pub fn version_constraint(&self) -> Option<&VersionConstraint> {
        match self {
            ComponentSelector::Module { constraint, .. } => Some(constraint),
            ComponentSelector::Project { .. } => None,
        }
    }

    /// Whether `id` is what this selector literally names.
    pub fn matches(&self, id: &ComponentId) -> bool {
        match (self, id) {
            (ComponentSelector::Module { module, constraint, .. }, ComponentId::Module(mv)) => {
                *module == mv.module
                    && constraint
                        .resolve()
                        .ok()
                        .and_then(|c| c.required)
                        .is_none_or(|r| r.accept_str(&mv.version))
            }
            (ComponentSelector::Project { path, .. }, ComponentId::Project { path: p, .. }) => {
                path == p
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for ComponentSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for ComponentSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentSelector::Module {
                module, constraint, ..
            } => {
                if constraint.is_empty() {
                    write!(f, "{}", module)
                } else {
                    write!(f, "{}:{}", module, constraint)
                }
            }
            ComponentSelector::Project { path, .. } => write!(f, "project {}", path),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ids::ModuleVersionId;
    use expect_test::expect;

    #[test]
    fn display_and_match() {
        let sel = ComponentSelector::module("org:a".parse().unwrap(), VersionConstraint::strictly("1.5"));
        expect!["org:a:{strictly 1.5}"].assert_eq(&sel.to_string());
        assert!(sel.matches(&ComponentId::Module(ModuleVersionId::new("org", "a", "1.5"))));
        assert!(!sel.matches(&ComponentId::Module(ModuleVersionId::new("org", "a", "1.6"))));
        assert!(!sel.matches(&ComponentId::Module(ModuleVersionId::new("org", "b", "1.5"))));
    }
}
