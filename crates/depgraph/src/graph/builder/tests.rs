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

use depgraph_util::{
    constraint::VersionConstraint,
    exclude::ExcludeRule,
    ids::{ComponentId, ModuleId},
    metadata::{ComponentMetadata, DependencyMetadata, VariantMetadata},
    result::{NodeIndex, ResolvedGraph},
    selector::ComponentSelector,
};
use expect_test::expect;
use test_log::test;

use crate::{
    conflicts::HighestCapabilityVersionResolver,
    graph::state::ResolveServices,
    registry::{memory::DEFAULT_VARIANT, MemoryRegistry},
    resolver::RegistryResolver,
    strategy::{ConflictResolution, ResolutionStrategy, ResolutionStrategyBuilder},
    substitution::ModuleReplacements,
    testing::{constraint, dep, failures, resolve, root, run, strict, versions},
    walker::render_tree,
};

fn strict_constraint(module: &str, version: &str) -> DependencyMetadata {
    DependencyMetadata::constraint(ComponentSelector::module(
        module.parse().unwrap(),
        VersionConstraint::strictly(version),
    ))
}

fn node_of(graph: &ResolvedGraph, module: &str) -> NodeIndex {
    graph.find(&module.parse().unwrap()).unwrap().0
}

fn with_capability(id: &str, capability: &str) -> ComponentMetadata {
    let id = ComponentId::Module(id.parse().unwrap());
    ComponentMetadata::new(id).with_variant(
        VariantMetadata::new(DEFAULT_VARIANT).with_capability(capability.parse().unwrap()),
    )
}

#[test]
fn highest_version_wins() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:a:1.0", ["org:c:1.0"])
        .add_module("org:b:1.0", ["org:c:2.0"])
        .add_module("org:c:1.0", [])
        .add_module("org:c:2.0", []);

    let (graph, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([dep("org:a:1.0"), dep("org:b:1.0")]),
    );
    assert!(errs.is_empty());
    expect![[r#"
        org:a:1.0
        org:b:1.0
        org:c:2.0"#]]
    .assert_eq(&versions(&graph));
    expect![[r#"
        project :
        +--- org:a:1.0
        |    \--- org:c:1.0 -> 2.0
        \--- org:b:1.0
             \--- org:c:2.0 (*)
    "#]]
    .assert_eq(&render_tree(&graph));

    let (_, c) = graph.find(&"org:c".parse().unwrap()).unwrap();
    expect![[r#"["requested", "conflict resolution: between versions 1.0 and 2.0"]"#]]
        .assert_eq(&format!("{:?}", c.reasons));
}

#[test]
fn missing_module_fails_its_edge() {
    let mut registry = MemoryRegistry::new();
    registry.add_module("org:a:1.0", ["org:b:1.0"]);
    registry.add_module("org:b:2.0", []);

    let (graph, errs) = resolve(&registry, ResolutionStrategy::default(), root([dep("org:a:1.0")]));
    expect!["Could not find org:b:1.0."].assert_eq(&failures(&errs));
    expect![[r#"
        project :
        \--- org:a:1.0
             \--- org:b:1.0 FAILED
    "#]]
    .assert_eq(&render_tree(&graph));
}

#[test]
fn constraint_alone_selects_nothing() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:a:1.0", ["org:c:1.0"])
        .add_module("org:c:1.0", [])
        .add_module("org:c:2.0", [])
        .add_module("org:d:1.0", []);

    let (graph, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([dep("org:a:1.0"), constraint("org:c:2.0"), constraint("org:d:1.0")]),
    );
    assert!(errs.is_empty());
    expect![[r#"
        org:a:1.0
        org:c:2.0"#]]
    .assert_eq(&versions(&graph));
}

#[test]
fn excluded_modules_are_not_traversed() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:a:1.0", ["org:b:1.0", "org:c:1.0"])
        .add_module("org:b:1.0", [])
        .add_module("org:c:1.0", []);

    let (graph, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([dep("org:a:1.0").excluding(ExcludeRule::module("org", "c"))]),
    );
    assert!(errs.is_empty());
    expect![[r#"
        org:a:1.0
        org:b:1.0"#]]
    .assert_eq(&versions(&graph));
}

#[test]
fn strict_version_of_ancestor_downgrades() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:a:1.0", [])
        .add_module("org:a:2.0", [])
        .add_module("org:b:1.0", ["org:a:2.0"]);

    let (graph, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([strict("org:a:1.0"), dep("org:b:1.0")]),
    );
    assert!(errs.is_empty());
    expect![[r#"
        org:a:1.0
        org:b:1.0"#]]
    .assert_eq(&versions(&graph));
    expect![[r#"
        project :
        +--- org:a:{strictly 1.0} -> 1.0
        \--- org:b:1.0
             \--- org:a:2.0 -> 1.0 (*)
    "#]]
    .assert_eq(&render_tree(&graph));

    let (_, a) = graph.find(&"org:a".parse().unwrap()).unwrap();
    assert!(a.reasons.iter().any(|r| r == "by ancestor"));
}

#[test]
fn strict_version_of_ancestor_reaches_every_dependent() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:f:1.0", [])
        .add_module("org:f:2.0", [])
        .add_module("org:n:1.0", ["org:f:2.0"])
        .add_module_with("org:p:1.0", [dep("org:n:1.0"), strict_constraint("org:f", "1.0")]);

    let (graph, errs) = resolve(&registry, ResolutionStrategy::default(), root([dep("org:p:1.0")]));
    assert!(errs.is_empty());
    expect![[r#"
        org:f:1.0
        org:n:1.0
        org:p:1.0"#]]
    .assert_eq(&versions(&graph));
    expect![[r#"
        project :
        \--- org:p:1.0
             +--- org:n:1.0
             |    \--- org:f:2.0 -> 1.0
             \--- org:f:{strictly 1.0} -> 1.0 (c) (*)
    "#]]
    .assert_eq(&render_tree(&graph));
}

#[test]
fn endorsed_strict_versions_apply_to_siblings() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:f:1.5", [])
        .add_module("org:f:1.6", [])
        .add_module_with("org:bom:1.0", [strict_constraint("org:f", "1.5")])
        .add_module("org:x:1.0", ["org:f:1.6"])
        .add_module("org:y:1.0", ["org:f:1.6"]);

    let (graph, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([dep("org:bom:1.0").endorsing(), dep("org:x:1.0"), dep("org:y:1.0")]),
    );
    assert!(errs.is_empty(), "{}", failures(&errs));
    expect![[r#"
        org:bom:1.0
        org:f:1.5
        org:x:1.0
        org:y:1.0"#]]
    .assert_eq(&versions(&graph));

    let f = node_of(&graph, "org:f");
    for consumer in ["org:x", "org:y"] {
        let consumer = node_of(&graph, consumer);
        assert_eq!(graph.dependencies_of(consumer), vec![f]);
    }
}

#[test]
fn strict_versions_need_every_path_to_agree() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:m:1.0", [])
        .add_module("org:m:2.0", [])
        .add_module("org:n:1.0", ["org:m:2.0"])
        .add_module_with("org:p1:1.0", [strict("org:m:1.0"), dep("org:n:1.0")])
        .add_module("org:p2:1.0", ["org:n:1.0"]);

    // Through p1 alone, n inherits the strict version of m.
    let (graph, errs) = resolve(&registry, ResolutionStrategy::default(), root([dep("org:p1:1.0")]));
    assert!(errs.is_empty());
    expect![[r#"
        org:m:1.0
        org:n:1.0
        org:p1:1.0"#]]
    .assert_eq(&versions(&graph));

    // p2 reaches n without any strict version, so n asks for m:2.0 again and
    // clashes with the strict version of p1.
    let (_, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([dep("org:p1:1.0"), dep("org:p2:1.0")]),
    );
    assert!(!errs.is_empty());
    for failure in &errs {
        assert!(
            failure.to_string().starts_with("Cannot find a version of 'org:m'"),
            "{}",
            failure
        );
    }
}

#[test]
fn locked_versions_are_reported() {
    let mut registry = MemoryRegistry::new();
    registry.add_module("org:a:1.0", []);

    let (graph, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([dep("org:a:1.0"), constraint("org:a:1.0").from_lock()]),
    );
    assert!(errs.is_empty());
    let (_, a) = graph.find(&"org:a".parse().unwrap()).unwrap();
    assert!(
        a.reasons
            .iter()
            .any(|r| r == "constraint: dependency was locked to version '1.0'"),
        "{:?}",
        a.reasons
    );
}

#[test]
fn resolution_is_deterministic() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:a:1.0", ["org:c:1.0", "org:d:1.0"])
        .add_module("org:b:1.0", ["org:c:2.0"])
        .add_module("org:c:1.0", [])
        .add_module("org:c:2.0", ["org:d:2.0"])
        .add_module("org:d:1.0", [])
        .add_module("org:d:2.0", []);

    let run_once = || {
        let (graph, errs) = resolve(
            &registry,
            ResolutionStrategy::default(),
            root([dep("org:a:1.0"), dep("org:b:1.0")]),
        );
        assert!(errs.is_empty());
        (render_tree(&graph), format!("{:?}", graph.edges()))
    };
    let first = run_once();
    for _ in 0..5 {
        assert_eq!(first, run_once());
    }
}

#[test]
fn shared_dependency_is_visited_once() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:a:1.0", ["org:c:1.0"])
        .add_module("org:b:1.0", ["org:c:1.0"])
        .add_module("org:c:1.0", ["org:d:1.0"])
        .add_module("org:d:1.0", []);

    let (graph, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([
            dep("org:a:1.0").excluding(ExcludeRule::module("org", "z")),
            dep("org:b:1.0"),
        ]),
    );
    assert!(errs.is_empty());
    expect![[r#"
        project :
        +--- org:a:1.0
        |    \--- org:c:1.0
        |         \--- org:d:1.0
        \--- org:b:1.0
             \--- org:c:1.0 (*)
    "#]]
    .assert_eq(&render_tree(&graph));
    assert_eq!(
        graph.edges().iter().filter(|e| e.requested == "org:d:1.0").count(),
        1
    );
}

#[test]
fn exclusion_keeps_modules_reached_another_way() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:c:1.0", ["org:d:1.0"])
        .add_module("org:d:1.0", ["org:e:1.0"])
        .add_module("org:e:1.0", [])
        .add_module("org:x:1.0", ["org:e:1.0"]);

    let (graph, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([
            dep("org:c:1.0").excluding(ExcludeRule::module("org", "e")),
            dep("org:x:1.0"),
        ]),
    );
    assert!(errs.is_empty());
    expect![[r#"
        project :
        +--- org:c:1.0
        |    \--- org:d:1.0
        \--- org:x:1.0
             \--- org:e:1.0
    "#]]
    .assert_eq(&render_tree(&graph));
}

#[test]
fn evicted_version_leaves_no_node() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:a:1.0", ["org:c:1.0"])
        .add_module("org:b:1.0", ["org:c:2.0"])
        .add_module("org:c:1.0", [])
        .add_module("org:c:2.0", []);

    let (graph, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([dep("org:a:1.0"), dep("org:b:1.0")]),
    );
    assert!(errs.is_empty());
    assert!(graph.nodes().all(|(_, n)| n.component.to_string() != "org:c:1.0"));

    let c = node_of(&graph, "org:c");
    let mut dependents = graph.dependents_of(c);
    dependents.sort();
    let mut expected = vec![node_of(&graph, "org:a"), node_of(&graph, "org:b")];
    expected.sort();
    assert_eq!(dependents, expected);
}

#[test]
fn selection_changes_past_the_limit_only_go_up() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:a:1.0", [])
        .add_module("org:a:2.0", [])
        .add_module("org:b:1.0", ["org:a:2.0"])
        .add_module_with("org:c:1.0", [dep("org:a:1.0").forced()]);
    let request = || root([dep("org:b:1.0"), dep("org:c:1.0")]);

    let (graph, errs) = resolve(&registry, ResolutionStrategy::default(), request());
    assert!(errs.is_empty());
    expect![[r#"
        org:a:1.0
        org:b:1.0
        org:c:1.0"#]]
    .assert_eq(&versions(&graph));

    let strategy = ResolutionStrategyBuilder::default()
        .max_selection_changes(0usize)
        .build()
        .unwrap();
    let (graph, errs) = resolve(&registry, strategy, request());
    assert!(errs.is_empty());
    expect![[r#"
        org:a:2.0
        org:b:1.0
        org:c:1.0"#]]
    .assert_eq(&versions(&graph));
}

#[test]
fn strict_version_elsewhere_rejects_the_winner() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:a:1.0", [])
        .add_module("org:a:2.0", [])
        .add_module("org:b:1.0", ["org:a:2.0"])
        .add_module_with("org:c:1.0", [strict("org:a:1.0")]);

    let (_, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([dep("org:c:1.0"), dep("org:b:1.0")]),
    );
    expect![[r#"
        Cannot find a version of 'org:a' that satisfies the version constraints:
           Dependency path 'project :' --> 'org:c:1.0' --> 'org:a:{strictly 1.0}'
           Dependency path 'project :' --> 'org:b:1.0' --> 'org:a:2.0'"#]]
    .assert_eq(&failures(&errs));
}

#[test]
fn strict_conflict_resolution_reports_conflicts() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:a:1.0", ["org:c:1.0"])
        .add_module("org:b:1.0", ["org:c:2.0"])
        .add_module("org:c:1.0", [])
        .add_module("org:c:2.0", []);

    let strategy = ResolutionStrategyBuilder::default()
        .conflict_resolution(ConflictResolution::Strict)
        .build()
        .unwrap();
    let (_, errs) = resolve(&registry, strategy, root([dep("org:a:1.0"), dep("org:b:1.0")]));
    expect!["Conflict found for module org:c between versions 1.0 and 2.0"]
        .assert_eq(&failures(&errs));
}

#[test]
fn virtual_platform_aligns_members() {
    let mut registry = MemoryRegistry::new();
    for version in ["1.0", "2.0"] {
        for name in ["a", "b"] {
            let mut metadata = ComponentMetadata::new(ComponentId::Module(
                format!("org:{}:{}", name, version).parse().unwrap(),
            ))
            .with_variant(VariantMetadata::new(DEFAULT_VARIANT));
            metadata.platform_owners = vec![format!("org:platform:{}", version).parse().unwrap()];
            registry.add_component(metadata);
        }
    }

    let (graph, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([dep("org:a:1.0"), dep("org:b:2.0")]),
    );
    assert!(errs.is_empty());
    expect![[r#"
        org:a:2.0
        org:b:2.0"#]]
    .assert_eq(&versions(&graph));
    assert!(graph.find(&"org:platform".parse().unwrap()).is_none());
}

#[test]
fn capability_conflict_without_resolver_rejects_both() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_component(with_capability("org:a:1.0", "org:logging:1.0"))
        .add_component(with_capability("org:b:1.0", "org:logging:2.0"));

    let (_, errs) = resolve(
        &registry,
        ResolutionStrategy::default(),
        root([dep("org:a:1.0"), dep("org:b:1.0")]),
    );
    expect![[r#"
        Cannot select module with conflict on capability 'org:logging:1.0' also provided by [org:b:1.0(default)]
        Cannot select module with conflict on capability 'org:logging:2.0' also provided by [org:a:1.0(default)]"#]]
    .assert_eq(&failures(&errs));
}

#[test]
fn capability_conflict_keeps_highest_capability() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_component(with_capability("org:a:1.0", "org:logging:1.0"))
        .add_component(with_capability("org:b:1.0", "org:logging:2.0"));

    let resolver = RegistryResolver::new(&registry);
    let services = ResolveServices::new(&resolver, &resolver)
        .with_capability_conflict_resolver(&HighestCapabilityVersionResolver);
    let (graph, errs) = run(
        services,
        ResolutionStrategy::default(),
        root([dep("org:a:1.0"), dep("org:b:1.0")]),
    );
    assert!(errs.is_empty());
    expect![[r#"
        project :
        +--- org:a:1.0 -> org:b:1.0
        \--- org:b:1.0 (*)
    "#]]
    .assert_eq(&render_tree(&graph));
}

#[test]
fn replaced_module_is_redirected() {
    let mut registry = MemoryRegistry::new();
    registry.add_module("org:old:1.0", []).add_module("org:new:2.0", []);
    let mut replacements = ModuleReplacements::new();
    replacements.replace(
        ModuleId::new("org", "old"),
        ModuleId::new("org", "new"),
        Some("renamed"),
    );

    let resolver = RegistryResolver::new(&registry);
    let services = ResolveServices::new(&resolver, &resolver).with_replacements(&replacements);
    let (graph, errs) = run(
        services,
        ResolutionStrategy::default(),
        root([dep("org:old:1.0"), dep("org:new:2.0")]),
    );
    assert!(errs.is_empty());
    expect![[r#"
        project :
        +--- org:old:1.0 -> org:new:2.0
        \--- org:new:2.0 (*)
    "#]]
    .assert_eq(&render_tree(&graph));

    let (_, new) = graph.find(&ModuleId::new("org", "new")).unwrap();
    expect![[r#"["requested", "conflict resolution: module org:old replaced with org:new: renamed"]"#]]
        .assert_eq(&format!("{:?}", new.reasons));
}

#[test]
fn dynamic_versions_can_be_disallowed() {
    let mut registry = MemoryRegistry::new();
    registry.add_module("org:a:1.0", []).add_module("org:a:1.1", []);

    let (graph, errs) = resolve(&registry, ResolutionStrategy::default(), root([dep("org:a:1.+")]));
    assert!(errs.is_empty());
    expect!["org:a:1.1"].assert_eq(&versions(&graph));

    let strategy = ResolutionStrategyBuilder::default()
        .fail_on_dynamic_versions(true)
        .build()
        .unwrap();
    let (_, errs) = resolve(&registry, strategy, root([dep("org:a:1.+")]));
    expect!["Could not resolve org:a:1.+: Resolution strategy disallows usage of dynamic versions"]
        .assert_eq(&failures(&errs));
}

#[test]
fn fixed_selector_makes_dynamic_selection_stable() {
    let mut registry = MemoryRegistry::new();
    registry
        .add_module("org:a:1.0", [])
        .add_module("org:a:1.1", [])
        .add_module("org:b:1.0", ["org:a:1.1"]);

    let strategy = ResolutionStrategyBuilder::default()
        .fail_on_dynamic_versions(true)
        .build()
        .unwrap();
    let (graph, errs) = resolve(&registry, strategy, root([dep("org:a:1.+"), dep("org:b:1.0")]));
    assert!(errs.is_empty());
    expect![[r#"
        org:a:1.1
        org:b:1.0"#]]
    .assert_eq(&versions(&graph));
}

#[test]
fn changing_versions_can_be_disallowed() {
    let mut registry = MemoryRegistry::new();
    registry.add_module("org:a:1.0", []);

    let strategy = ResolutionStrategyBuilder::default()
        .fail_on_changing_versions(true)
        .build()
        .unwrap();
    let (_, errs) = resolve(&registry, strategy, root([dep("org:a:1.0").changing()]));
    expect!["Could not resolve org:a:1.0: Resolution strategy disallows usage of changing versions"]
        .assert_eq(&failures(&errs));
}

#[test]
fn remote_metadata_is_fetched_in_batches() {
    let mut registry = MemoryRegistry::new().with_remote_metadata();
    registry
        .add_module("org:a:1.0", ["org:c:1.0"])
        .add_module("org:b:1.0", [])
        .add_module("org:c:1.0", []);

    let strategy = ResolutionStrategyBuilder::default()
        .max_parallelism(4usize)
        .build()
        .unwrap();
    let graph = crate::resolve_graph(
        &registry,
        root([dep("org:a:1.0"), dep("org:b:1.0")]),
        vec![],
        strategy,
    )
    .unwrap();
    expect![[r#"
        org:a:1.0
        org:b:1.0
        org:c:1.0"#]]
    .assert_eq(&versions(&graph));
}
