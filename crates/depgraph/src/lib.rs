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

//! Resolution of a dependency graph: starting from a root component, picks
//! one version of every reachable module, one variant of every selected
//! component, and reports the result to a visitor.

pub mod conflicts;
pub mod error;
pub mod executor;
pub mod graph;
pub(crate) mod messages;
pub mod registry;
pub mod resolver;
pub mod strategy;
pub mod substitution;
#[cfg(test)]
mod testing;
pub mod variants;
pub mod visitor;
pub mod walker;

use std::sync::Arc;

use depgraph_util::{
    metadata::{ComponentMetadata, DependencyMetadata},
    result::ResolvedGraph,
};

pub use error::{GraphResolveErrors, ResolveFailure};
pub use graph::{
    builder::DependencyGraphBuilder,
    component::SelectionCause,
    state::{EdgeFilter, ResolveServices},
    ComponentKey, EdgeKey, ModuleKey, NodeKey, SelectorKey,
};
pub use strategy::{ConflictResolution, ResolutionStrategy, ResolutionStrategyBuilder};
pub use visitor::ResolvedGraphVisitor;

use executor::ThreadedBatchExecutor;
use registry::Registry;
use resolver::RegistryResolver;

/// Resolves the first variant of `root` against `registry`, with the
/// default services.
///
/// Metadata is prefetched on `strategy.max_parallelism` threads when it is
/// greater than one. Returns the graph, or every failure found.
pub fn resolve_graph(
    registry: &dyn Registry,
    root: ComponentMetadata,
    synthetic_dependencies: Vec<DependencyMetadata>,
    strategy: ResolutionStrategy,
) -> Result<ResolvedGraph, GraphResolveErrors> {
    let resolver = RegistryResolver::new(registry);
    let executor = ThreadedBatchExecutor::new(strategy.max_parallelism);
    let mut services = ResolveServices::new(&resolver, &resolver);
    if strategy.max_parallelism > 1 {
        services = services.with_executor(&executor);
    }

    let mut visitor = ResolvedGraphVisitor::new();
    DependencyGraphBuilder::new(services, strategy).resolve(
        Arc::new(root),
        0,
        synthetic_dependencies,
        &mut visitor,
    );
    visitor.into_result()
}
