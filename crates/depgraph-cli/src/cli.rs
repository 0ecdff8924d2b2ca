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

use std::path::PathBuf;

use anyhow::Context;
use depgraph::{
    ConflictResolution, DependencyGraphBuilder, ResolutionStrategy, ResolutionStrategyBuilder,
    ResolveServices, ResolvedGraphVisitor,
    conflicts::HighestCapabilityVersionResolver,
    executor::ThreadedBatchExecutor,
    resolver::RegistryResolver,
    walker::render_tree,
};
use depgraph_util::result::ResolvedGraph;

use crate::input::{RepositoryFile, RequestFile, read_json};

#[derive(Debug, clap::Parser)]
#[clap(
    name = "depgraph",
    about = "Resolve the dependency graph of a component against a repository."
)]
pub struct DepgraphCli {
    /// JSON file listing every published component
    #[clap(long, short = 'r')]
    pub repository: PathBuf,

    /// JSON file describing the root component to resolve
    pub request: PathBuf,

    #[clap(long, value_enum, default_value_t = OutputFormat::Tree)]
    pub format: OutputFormat,

    #[clap(flatten)]
    pub strategy: StrategyFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Tree,
    Json,
}

#[derive(Debug, clap::Args)]
pub struct StrategyFlags {
    /// Fail when a module is selected through dynamic versions only
    #[clap(long)]
    pub fail_on_dynamic: bool,

    /// Fail when a changing version is selected
    #[clap(long)]
    pub fail_on_changing: bool,

    /// Prefer project components over published ones in version conflicts
    #[clap(long, conflicts_with = "strict")]
    pub prefer_project_modules: bool,

    /// Fail on any version conflict instead of picking the highest version
    #[clap(long)]
    pub strict: bool,

    /// Resolve capability conflicts by keeping the highest capability version
    #[clap(long)]
    pub highest_capability: bool,

    /// Number of metadata fetches to run concurrently
    #[clap(long, short = 'j', env = "DEPGRAPH_JOBS", default_value_t = 1)]
    pub jobs: usize,
}

impl StrategyFlags {
    pub fn to_strategy(&self, request: &RequestFile) -> anyhow::Result<ResolutionStrategy> {
        let conflict_resolution = if self.strict {
            ConflictResolution::Strict
        } else if self.prefer_project_modules {
            ConflictResolution::PreferProjectModules
        } else {
            ConflictResolution::Latest
        };
        ResolutionStrategyBuilder::default()
            .conflict_resolution(conflict_resolution)
            .fail_on_dynamic_versions(self.fail_on_dynamic)
            .fail_on_changing_versions(self.fail_on_changing)
            .max_parallelism(self.jobs.max(1))
            .root_attributes(request.attributes.clone())
            .attributes_schema(request.schema.clone())
            .build()
            .context("invalid resolution strategy")
    }
}

/// The printed graph and whether resolution succeeded.
pub struct ResolveOutput {
    pub rendered: String,
    pub failures: Vec<String>,
}

pub fn resolve(cli: &DepgraphCli) -> anyhow::Result<ResolveOutput> {
    let repository: RepositoryFile = read_json(&cli.repository)?;
    let request: RequestFile = read_json(&cli.request)?;
    let strategy = cli.strategy.to_strategy(&request)?;

    let registry = repository.into_registry();
    let resolver = RegistryResolver::new(&registry);
    let replacements = request.module_replacements();
    let substitutions = request.substitution_rules();
    let executor = ThreadedBatchExecutor::new(strategy.max_parallelism);

    let mut services = ResolveServices::new(&resolver, &resolver);
    if !replacements.is_empty() {
        services = services.with_replacements(&replacements);
    }
    if !substitutions.is_empty() {
        services = services.with_substitutions(&substitutions);
    }
    if cli.strategy.highest_capability {
        services = services.with_capability_conflict_resolver(&HighestCapabilityVersionResolver);
    }
    if strategy.max_parallelism > 1 {
        services = services.with_executor(&executor);
    }

    let span = tracing::info_span!("resolve", root = %request.root.id);
    let _enter = span.enter();
    log::info!(
        "resolving {} against {} with {:?}",
        request.root.id,
        cli.repository.display(),
        strategy.conflict_resolution
    );

    let mut visitor = ResolvedGraphVisitor::new();
    DependencyGraphBuilder::new(services, strategy).resolve(
        std::sync::Arc::new(request.root.clone()),
        0,
        request.constraints.clone(),
        &mut visitor,
    );
    let failures: Vec<String> = visitor.failures().iter().map(|f| f.to_string()).collect();
    let graph = visitor.into_graph();

    Ok(ResolveOutput {
        rendered: render(&graph, cli.format)?,
        failures,
    })
}

fn render(graph: &ResolvedGraph, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Tree => Ok(render_tree(graph)),
        OutputFormat::Json => {
            let mut out =
                serde_json::to_string_pretty(graph).context("failed to serialize the graph")?;
            out.push('\n');
            Ok(out)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;
    use expect_test::expect;

    const REPOSITORY: &str = r#"{
        "components": [
            { "id": { "module": "org:a:1.0" }, "variants": [{ "name": "default", "dependencies": [
                { "selector": { "kind": "module", "module": "org:c", "constraint": { "require": "1.0" } } }
            ] }] },
            { "id": { "module": "org:b:1.0" }, "variants": [{ "name": "default", "dependencies": [
                { "selector": { "kind": "module", "module": "org:c", "constraint": { "require": "2.0" } } }
            ] }] },
            { "id": { "module": "org:c:1.0" }, "variants": [{ "name": "default" }] },
            { "id": { "module": "org:c:2.0" }, "variants": [{ "name": "default" }] }
        ]
    }"#;

    const REQUEST: &str = r#"{
        "root": {
            "id": { "project": { "path": ":", "module": "test:app:1.0" } },
            "variants": [{ "name": "default", "dependencies": [
                { "selector": { "kind": "module", "module": "org:a", "constraint": { "require": "1.0" } } },
                { "selector": { "kind": "module", "module": "org:b", "constraint": { "require": "1.0" } } }
            ] }]
        }
    }"#;

    fn write_fixture(dir: &tempfile::TempDir) -> (PathBuf, PathBuf) {
        let repository = dir.path().join("repository.json");
        let request = dir.path().join("request.json");
        std::fs::write(&repository, REPOSITORY).unwrap();
        std::fs::write(&request, REQUEST).unwrap();
        (repository, request)
    }

    fn parse(args: &[&str]) -> DepgraphCli {
        DepgraphCli::try_parse_from(std::iter::once("depgraph").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn print_tree() {
        let dir = tempfile::tempdir().unwrap();
        let (repository, request) = write_fixture(&dir);
        let cli = parse(&[
            "-r",
            repository.to_str().unwrap(),
            request.to_str().unwrap(),
        ]);

        let output = resolve(&cli).unwrap();
        assert!(output.failures.is_empty());
        expect![[r#"
            project :
            +--- org:a:1.0
            |    \--- org:c:1.0 -> 2.0
            \--- org:b:1.0
                 \--- org:c:2.0 (*)
        "#]]
        .assert_eq(&output.rendered);
    }

    #[test]
    fn strict_reports_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let (repository, request) = write_fixture(&dir);
        let cli = parse(&[
            "--strict",
            "-r",
            repository.to_str().unwrap(),
            request.to_str().unwrap(),
        ]);

        let output = resolve(&cli).unwrap();
        expect![[r#"
            [
                "Conflict found for module org:c between versions 1.0 and 2.0",
            ]
        "#]]
        .assert_debug_eq(&output.failures);
    }

    #[test]
    fn strategy_flags() {
        let request: RequestFile = serde_json::from_str(REQUEST).unwrap();
        let cli = parse(&["--prefer-project-modules", "-j", "4", "-r", "repo.json", "req.json"]);
        let strategy = cli.strategy.to_strategy(&request).unwrap();
        assert_eq!(strategy.conflict_resolution, ConflictResolution::PreferProjectModules);
        assert_eq!(strategy.max_parallelism, 4);

        assert!(
            DepgraphCli::try_parse_from([
                "depgraph",
                "--strict",
                "--prefer-project-modules",
                "-r",
                "repo.json",
                "req.json"
            ])
            .is_err()
        );
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let cli = parse(&["-r", missing.to_str().unwrap(), "req.json"]);
        let err = resolve(&cli).err().unwrap();
        assert!(format!("{:?}", err).starts_with("failed to read"));
    }
}
