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

//! Fixtures shared by the tests of the engine.

use std::sync::Arc;

use depgraph_util::{
    constraint::VersionConstraint,
    ids::{ComponentId, ModuleVersionId},
    metadata::{ComponentMetadata, DependencyMetadata, VariantMetadata},
    result::ResolvedGraph,
    selector::ComponentSelector,
};

use crate::{
    error::ResolveFailure,
    graph::{builder::DependencyGraphBuilder, state::ResolveServices},
    registry::{memory::DEFAULT_VARIANT, MemoryRegistry},
    resolver::RegistryResolver,
    strategy::ResolutionStrategy,
    visitor::ResolvedGraphVisitor,
};

pub(crate) use crate::registry::memory::parse_dependency as dep;

/// The root project `:` declaring `deps`.
pub(crate) fn root(deps: impl IntoIterator<Item = DependencyMetadata>) -> ComponentMetadata {
    let mut variant = VariantMetadata::new(DEFAULT_VARIANT);
    for dep in deps {
        variant = variant.with_dependency(dep);
    }
    ComponentMetadata::new(ComponentId::Project {
        path: ":".to_string(),
        module: ModuleVersionId::new("test", "root", "1.0"),
    })
    .with_variant(variant)
}

fn selector(s: &str, constraint: impl FnOnce(String) -> VersionConstraint) -> ComponentSelector {
    let id: ModuleVersionId = s.parse().expect("malformed dependency");
    ComponentSelector::module(id.module, constraint(id.version))
}

/// `group:name:version` with a strict version.
pub(crate) fn strict(s: &str) -> DependencyMetadata {
    DependencyMetadata::new(selector(s, |v| VersionConstraint::strictly(v)))
}

pub(crate) fn constraint(s: &str) -> DependencyMetadata {
    DependencyMetadata::constraint(selector(s, |v| VersionConstraint::require(v)))
}

/// Runs a resolution and returns the graph along with every failure found.
pub(crate) fn run(
    services: ResolveServices<'_>,
    strategy: ResolutionStrategy,
    root: ComponentMetadata,
) -> (ResolvedGraph, Vec<ResolveFailure>) {
    let mut visitor = ResolvedGraphVisitor::new();
    DependencyGraphBuilder::new(services, strategy).resolve(Arc::new(root), 0, vec![], &mut visitor);
    let failures = visitor.failures().to_vec();
    (visitor.into_graph(), failures)
}

pub(crate) fn resolve(
    registry: &MemoryRegistry,
    strategy: ResolutionStrategy,
    root: ComponentMetadata,
) -> (ResolvedGraph, Vec<ResolveFailure>) {
    let resolver = RegistryResolver::new(registry);
    run(ResolveServices::new(&resolver, &resolver), strategy, root)
}

/// Selected `module:version` pairs, root excluded, one per line.
pub(crate) fn versions(graph: &ResolvedGraph) -> String {
    let root = graph.node(graph.root()).component.module().clone();
    let mut lines: Vec<String> = graph
        .selected_versions()
        .into_iter()
        .filter(|(m, _)| *m != root)
        .map(|(m, v)| format!("{}:{}", m, v))
        .collect();
    lines.sort();
    lines.join("\n")
}

pub(crate) fn failures(failures: &[ResolveFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
