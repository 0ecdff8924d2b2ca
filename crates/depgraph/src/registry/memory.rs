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

use std::{collections::HashMap, sync::Arc};

use anyhow::bail;
use depgraph_util::{
    constraint::VersionConstraint,
    ids::{ComponentId, ModuleId, ModuleVersionId},
    metadata::{ComponentMetadata, DependencyMetadata, VariantMetadata},
    selector::ComponentSelector,
    version::compare_versions,
};

use super::Registry;

/// Name of the variant created by the shorthand helpers.
pub const DEFAULT_VARIANT: &str = "default";

/// An in-memory registry, filled either programmatically or from a
/// repository description file.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    modules: HashMap<ModuleId, Vec<Arc<ComponentMetadata>>>,
    projects: HashMap<String, Arc<ComponentMetadata>>,
    remote: bool,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        MemoryRegistry::default()
    }

    /// Marks metadata as expensive to fetch, so the engine prefetches it in
    /// batches.
    pub fn with_remote_metadata(mut self) -> Self {
        self.remote = true;
        self
    }

    pub fn add_component(&mut self, metadata: ComponentMetadata) -> &mut Self {
        match &metadata.id {
            ComponentId::Project { path, .. } => {
                self.projects.insert(path.clone(), Arc::new(metadata));
            }
            ComponentId::Module(id) => {
                let versions = self.modules.entry(id.module.clone()).or_default();
                versions.retain(|m| m.module_version().version != id.version);
                versions.push(Arc::new(metadata));
                versions.sort_by(|a, b| {
                    compare_versions(&a.module_version().version, &b.module_version().version)
                });
            }
        }
        self
    }

    /// Adds `id` (`group:name:version`) with a single default variant
    /// depending on each of `deps` (`group:name:version`).
    ///
    /// Panics on malformed ids; meant for fixtures.
    pub fn add_module<'a>(
        &mut self,
        id: &str,
        deps: impl IntoIterator<Item = &'a str>,
    ) -> &mut Self {
        let id: ModuleVersionId = id.parse().expect("malformed module version id");
        let mut variant = VariantMetadata::new(DEFAULT_VARIANT);
        for dep in deps {
            variant = variant.with_dependency(parse_dependency(dep));
        }
        self.add_component(ComponentMetadata::new(ComponentId::Module(id)).with_variant(variant))
    }

    pub fn add_module_with(
        &mut self,
        id: &str,
        deps: impl IntoIterator<Item = DependencyMetadata>,
    ) -> &mut Self {
        let id: ModuleVersionId = id.parse().expect("malformed module version id");
        let mut variant = VariantMetadata::new(DEFAULT_VARIANT);
        for dep in deps {
            variant = variant.with_dependency(dep);
        }
        self.add_component(ComponentMetadata::new(ComponentId::Module(id)).with_variant(variant))
    }

    pub fn get(&self, id: &ModuleVersionId) -> Option<Arc<ComponentMetadata>> {
        self.modules
            .get(&id.module)?
            .iter()
            .find(|m| m.module_version().version == id.version)
            .cloned()
    }
}

/// Parses `group:name:version` into a plain dependency on that version.
///
/// Panics on malformed ids; meant for fixtures.
pub fn parse_dependency(s: &str) -> DependencyMetadata {
    let id: ModuleVersionId = s.parse().expect("malformed dependency");
    DependencyMetadata::new(ComponentSelector::module(
        id.module,
        VersionConstraint::require(id.version),
    ))
}

impl Registry for MemoryRegistry {
    fn all_versions_of(&self, module: &ModuleId) -> Option<Vec<String>> {
        self.modules.get(module).map(|versions| {
            versions
                .iter()
                .map(|m| m.module_version().version.clone())
                .collect()
        })
    }

    fn component_metadata(&self, id: &ModuleVersionId) -> anyhow::Result<Arc<ComponentMetadata>> {
        match self.get(id) {
            Some(m) => Ok(m),
            None => bail!("{} is not published", id),
        }
    }

    fn project(&self, path: &str) -> Option<Arc<ComponentMetadata>> {
        self.projects.get(path).cloned()
    }

    fn is_local(&self) -> bool {
        !self.remote
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use expect_test::expect;

    #[test]
    fn versions_are_sorted() {
        let mut registry = MemoryRegistry::new();
        registry
            .add_module("org:a:1.10", [])
            .add_module("org:a:1.2", [])
            .add_module("org:a:1.9", ["org:b:1.0"]);
        let versions = registry.all_versions_of(&"org:a".parse().unwrap()).unwrap();
        expect![[r#"["1.2", "1.9", "1.10"]"#]].assert_eq(&format!("{:?}", versions));

        let m = registry
            .component_metadata(&"org:a:1.9".parse().unwrap())
            .unwrap();
        assert_eq!(m.variants[0].dependencies.len(), 1);
        assert!(registry
            .component_metadata(&"org:a:2.0".parse().unwrap())
            .is_err());
    }
}
