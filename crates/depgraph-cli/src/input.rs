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

//! The JSON files the binary reads.

use std::path::Path;

use anyhow::Context;
use depgraph::{
    registry::MemoryRegistry,
    substitution::{ModuleReplacements, SubstitutionRules},
};
use depgraph_util::{
    attributes::{Attributes, AttributesSchema},
    ids::ModuleId,
    metadata::{ComponentMetadata, DependencyMetadata},
    selector::ComponentSelector,
};
use serde::{Deserialize, de::DeserializeOwned};

/// Every component the registry knows about, projects included.
#[derive(Debug, Deserialize)]
pub struct RepositoryFile {
    pub components: Vec<ComponentMetadata>,
    /// Treat metadata as remote, so that it is prefetched in batches.
    #[serde(default)]
    pub remote: bool,
}

impl RepositoryFile {
    pub fn into_registry(self) -> MemoryRegistry {
        let mut registry = MemoryRegistry::new();
        if self.remote {
            registry = registry.with_remote_metadata();
        }
        for component in self.components {
            registry.add_component(component);
        }
        registry
    }
}

#[derive(Debug, Deserialize)]
pub struct Replacement {
    pub from: ModuleId,
    pub to: ModuleId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Substitution {
    pub from: ModuleId,
    /// Only substitute this requested version.
    #[serde(default)]
    pub version: Option<String>,
    pub to: ComponentSelector,
    #[serde(default = "default_substitution_reason")]
    pub reason: String,
}

fn default_substitution_reason() -> String {
    "substituted".to_string()
}

/// What to resolve.
#[derive(Debug, Deserialize)]
pub struct RequestFile {
    /// The root component. Its first variant is resolved.
    pub root: ComponentMetadata,
    /// Extra dependencies of the root, typically constraints from a lock file.
    #[serde(default)]
    pub constraints: Vec<DependencyMetadata>,
    #[serde(default)]
    pub replacements: Vec<Replacement>,
    #[serde(default)]
    pub substitutions: Vec<Substitution>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub schema: AttributesSchema,
}

impl RequestFile {
    pub fn module_replacements(&self) -> ModuleReplacements {
        let mut replacements = ModuleReplacements::new();
        for r in &self.replacements {
            replacements.replace(r.from.clone(), r.to.clone(), r.reason.as_deref());
        }
        replacements
    }

    pub fn substitution_rules(&self) -> SubstitutionRules {
        let mut rules = SubstitutionRules::new();
        for s in &self.substitutions {
            rules.substitute_module(
                s.from.clone(),
                s.version.as_deref(),
                s.to.clone(),
                s.reason.clone(),
            );
        }
        rules
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse `{}`", path.display()))
}
