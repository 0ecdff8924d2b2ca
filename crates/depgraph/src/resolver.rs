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

//! Resolution of selectors to component ids, and of ids to metadata.

use std::sync::Arc;

use depgraph_util::{
    constraint::ResolvedVersionConstraint,
    ids::{ComponentId, ModuleId},
    metadata::ComponentMetadata,
    selector::ComponentSelector,
    version::{parse_version, VersionSelector},
};

use crate::{error::ResolveFailure, registry::Registry};

/// Outcome of resolving one selector to a component id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdResolveResult {
    pub id: Option<ComponentId>,
    /// The id was found but is rejected by a constraint.
    pub rejected: bool,
    pub failure: Option<ResolveFailure>,
    pub unmatched_versions: Vec<String>,
    pub rejected_versions: Vec<String>,
}

impl IdResolveResult {
    pub fn resolved(id: ComponentId) -> Self {
        IdResolveResult {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn rejected(id: ComponentId) -> Self {
        IdResolveResult {
            id: Some(id),
            rejected: true,
            ..Default::default()
        }
    }

    pub fn failed(failure: ResolveFailure) -> Self {
        IdResolveResult {
            failure: Some(failure),
            ..Default::default()
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.id.as_ref().map(|id| id.version())
    }
}

/// Turns a requested selector into a candidate component id.
pub trait ComponentIdResolver {
    /// `rejector` accepts the versions that must not be selected.
    fn resolve(
        &self,
        selector: &ComponentSelector,
        constraint: &ResolvedVersionConstraint,
        rejector: Option<&VersionSelector>,
    ) -> IdResolveResult;

    /// Maps a selector to the module it targets.
    fn module_of(&self, selector: &ComponentSelector) -> Option<ModuleId>;
}

/// Fetches component metadata. Called from prefetch worker threads.
pub trait ComponentMetadataResolver: Send + Sync {
    fn resolve(&self, id: &ComponentId) -> Result<Arc<ComponentMetadata>, ResolveFailure>;

    fn is_fetching_metadata_cheap(&self, id: &ComponentId) -> bool;
}

/// Both resolvers, backed by a [`Registry`].
pub struct RegistryResolver<'r> {
    registry: &'r dyn Registry,
}

impl<'r> RegistryResolver<'r> {
    pub fn new(registry: &'r dyn Registry) -> Self {
        RegistryResolver { registry }
    }

    fn resolve_module(
        &self,
        selector: &ComponentSelector,
        module: &ModuleId,
        constraint: &ResolvedVersionConstraint,
        rejector: Option<&VersionSelector>,
    ) -> IdResolveResult {
        let Some(versions) = self.registry.all_versions_of(module) else {
            return IdResolveResult::failed(ResolveFailure::NotFound(selector.to_string()));
        };
        let required = constraint
            .required
            .clone()
            .unwrap_or(VersionSelector::Latest);
        let is_rejected = |v: &str| rejector.is_some_and(|r| r.accept_str(v));

        if let VersionSelector::Exact(wanted) = &required {
            let found = versions
                .iter()
                .find(|v| parse_version(v).is_ok_and(|p| p == *wanted));
            return match found {
                Some(v) => {
                    let id = ComponentId::Module(module.with_version(v.as_str()));
                    if is_rejected(v) {
                        IdResolveResult::rejected(id)
                    } else {
                        IdResolveResult::resolved(id)
                    }
                }
                None => IdResolveResult::failed(ResolveFailure::NotFound(selector.to_string())),
            };
        }

        let mut result = IdResolveResult::default();
        let mut best: Option<&String> = None;
        for v in versions.iter().rev() {
            if !required.accept_str(v) {
                result.unmatched_versions.push(v.clone());
            } else if is_rejected(v) {
                result.rejected_versions.push(v.clone());
            } else if best.is_none() {
                best = Some(v);
            }
        }
        if let Some(preferred) = &constraint.preferred {
            let preferred = versions
                .iter()
                .rev()
                .find(|v| preferred.accept_str(v) && required.accept_str(v) && !is_rejected(v));
            if preferred.is_some() {
                best = preferred;
            }
        }
        match best {
            Some(v) => {
                result.id = Some(ComponentId::Module(module.with_version(v.as_str())));
                result
            }
            None => IdResolveResult::failed(ResolveFailure::NoMatchingVersion {
                selector: selector.to_string(),
                unmatched: result.unmatched_versions,
                rejected: result.rejected_versions,
            }),
        }
    }
}

impl ComponentIdResolver for RegistryResolver<'_> {
    fn resolve(
        &self,
        selector: &ComponentSelector,
        constraint: &ResolvedVersionConstraint,
        rejector: Option<&VersionSelector>,
    ) -> IdResolveResult {
        match selector {
            ComponentSelector::Module { module, .. } => {
                self.resolve_module(selector, module, constraint, rejector)
            }
            ComponentSelector::Project { path, .. } => match self.registry.project(path) {
                Some(m) => IdResolveResult::resolved(m.id.clone()),
                None => IdResolveResult::failed(ResolveFailure::NotFound(selector.to_string())),
            },
        }
    }

    fn module_of(&self, selector: &ComponentSelector) -> Option<ModuleId> {
        match selector {
            ComponentSelector::Module { module, .. } => Some(module.clone()),
            ComponentSelector::Project { path, .. } => {
                self.registry.project(path).map(|m| m.module().clone())
            }
        }
    }
}

impl ComponentMetadataResolver for RegistryResolver<'_> {
    fn resolve(&self, id: &ComponentId) -> Result<Arc<ComponentMetadata>, ResolveFailure> {
        match id {
            ComponentId::Module(mv) => {
                self.registry
                    .component_metadata(mv)
                    .map_err(|e| ResolveFailure::Metadata {
                        id: id.to_string(),
                        reason: format!("{:#}", e),
                    })
            }
            ComponentId::Project { path, .. } => self
                .registry
                .project(path)
                .ok_or_else(|| ResolveFailure::NotFound(id.to_string())),
        }
    }

    fn is_fetching_metadata_cheap(&self, id: &ComponentId) -> bool {
        id.is_project() || self.registry.is_local()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::MemoryRegistry;
    use depgraph_util::constraint::VersionConstraint;
    use expect_test::expect;

    fn registry() -> MemoryRegistry {
        let mut registry = MemoryRegistry::new();
        registry
            .add_module("org:a:1.0", [])
            .add_module("org:a:1.5", [])
            .add_module("org:a:2.0", []);
        registry
    }

    fn resolve(registry: &MemoryRegistry, c: VersionConstraint, reject: Option<&str>) -> IdResolveResult {
        let resolver = RegistryResolver::new(registry);
        let selector = ComponentSelector::module("org:a".parse().unwrap(), c.clone());
        let rejector = reject.map(|r| VersionSelector::parse(r).unwrap());
        ComponentIdResolver::resolve(&resolver, &selector, &c.resolve().unwrap(), rejector.as_ref())
    }

    #[test]
    fn dynamic_picks_highest_accepted() {
        let registry = registry();
        let r = resolve(&registry, VersionConstraint::require("[1.0,2.0)"), None);
        expect!["Some(org:a:1.5)"].assert_eq(&format!("{:?}", r.id));
        expect![[r#"["2.0"]"#]].assert_eq(&format!("{:?}", r.unmatched_versions));

        let r = resolve(&registry, VersionConstraint::require("+"), Some("2.0"));
        expect!["Some(org:a:1.5)"].assert_eq(&format!("{:?}", r.id));
        expect![[r#"["2.0"]"#]].assert_eq(&format!("{:?}", r.rejected_versions));
    }

    #[test]
    fn exact_versions() {
        let registry = registry();
        let r = resolve(&registry, VersionConstraint::require("1.5.0"), Some("1.5"));
        assert!(r.rejected);
        expect!["Some(org:a:1.5)"].assert_eq(&format!("{:?}", r.id));

        let r = resolve(&registry, VersionConstraint::require("3.0"), None);
        expect![[r#"Some(NotFound("org:a:3.0"))"#]].assert_eq(&format!("{:?}", r.failure));
    }

    #[test]
    fn preferred_within_range() {
        let registry = registry();
        let mut c = VersionConstraint::require("+");
        c.prefer = Some("1.0".to_string());
        let r = resolve(&registry, c, None);
        expect!["Some(org:a:1.0)"].assert_eq(&format!("{:?}", r.id));
    }
}
