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

//! Component, variant and dependency metadata as consumed by the engine.

use serde::{Deserialize, Serialize};

use crate::{
    attributes::Attributes,
    exclude::ExcludeRule,
    ids::{Capability, ComponentId, ModuleId, ModuleVersionId},
    selector::ComponentSelector,
};

/// The flavour of a dependency declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DependencyKind {
    #[default]
    Normal,
    /// Only takes effect when something else depends on the target module.
    Constraint,
    /// A synthesized constraint between a module and the virtual platform it
    /// belongs to, in either direction.
    LenientPlatform { platform: ModuleVersionId },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyMetadata {
    pub selector: ComponentSelector,
    #[serde(default)]
    pub kind: DependencyKind,
    #[serde(default = "default_true")]
    pub transitive: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub changing: bool,
    #[serde(default)]
    pub from_lock: bool,
    #[serde(default)]
    pub endorse_strict_versions: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<ExcludeRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DependencyMetadata {
    pub fn new(selector: ComponentSelector) -> Self {
        DependencyMetadata {
            selector,
            kind: DependencyKind::Normal,
            transitive: true,
            force: false,
            changing: false,
            from_lock: false,
            endorse_strict_versions: false,
            excludes: vec![],
            reason: None,
        }
    }

    pub fn constraint(selector: ComponentSelector) -> Self {
        DependencyMetadata {
            kind: DependencyKind::Constraint,
            ..DependencyMetadata::new(selector)
        }
    }

    pub fn lenient_platform(
        selector: ComponentSelector,
        platform: ModuleVersionId,
        force: bool,
    ) -> Self {
        DependencyMetadata {
            kind: DependencyKind::LenientPlatform { platform },
            force,
            ..DependencyMetadata::new(selector)
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn non_transitive(mut self) -> Self {
        self.transitive = false;
        self
    }

    pub fn endorsing(mut self) -> Self {
        self.endorse_strict_versions = true;
        self
    }

    pub fn changing(mut self) -> Self {
        self.changing = true;
        self
    }

    pub fn from_lock(mut self) -> Self {
        self.from_lock = true;
        self
    }

    pub fn excluding(mut self, rule: ExcludeRule) -> Self {
        self.excludes.push(rule);
        self
    }

    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// The same declaration pointing at another target, as produced by a
    /// dependency substitution.
    pub fn with_target(&self, selector: ComponentSelector) -> Self {
        DependencyMetadata {
            selector,
            ..self.clone()
        }
    }

    pub fn is_constraint(&self) -> bool {
        !matches!(self.kind, DependencyKind::Normal)
    }

    pub fn is_lenient_platform(&self) -> bool {
        matches!(self.kind, DependencyKind::LenientPlatform { .. })
    }

    /// Lenient platform edges pick their target variant themselves instead of
    /// going through attribute matching.
    pub fn overrides_variant_selection(&self) -> bool {
        self.is_lenient_platform()
    }

    pub fn is_strict(&self) -> bool {
        self.selector
            .version_constraint()
            .is_some_and(|c| c.is_strict())
    }
}

/// A named subset of a component's dependencies, tagged with attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantMetadata {
    pub name: String,
    #[serde(default)]
    pub attributes: Attributes,
    /// Explicit capabilities; empty means the component's implicit capability.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<ExcludeRule>,
    /// Variants whose content lives in another component; they keep their
    /// dependencies even when reached only through non-transitive edges.
    #[serde(default)]
    pub external: bool,
}

impl VariantMetadata {
    pub fn new(name: &str) -> Self {
        VariantMetadata {
            name: name.to_string(),
            attributes: Attributes::new(),
            capabilities: vec![],
            dependencies: vec![],
            excludes: vec![],
            external: false,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_dependency(mut self, dependency: DependencyMetadata) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_exclude(mut self, rule: ExcludeRule) -> Self {
        self.excludes.push(rule);
        self
    }
}

/// Metadata of one component version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub id: ComponentId,
    pub variants: Vec<VariantMetadata>,
    /// Virtual platforms this component aligns with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platform_owners: Vec<ModuleVersionId>,
    #[serde(default)]
    pub changing: bool,
    /// Set on metadata synthesized for a virtual platform that was never
    /// published.
    #[serde(default)]
    pub virtual_platform: bool,
}

impl ComponentMetadata {
    pub fn new(id: ComponentId) -> Self {
        ComponentMetadata {
            id,
            variants: vec![],
            platform_owners: vec![],
            changing: false,
            virtual_platform: false,
        }
    }

    pub fn with_variant(mut self, variant: VariantMetadata) -> Self {
        self.variants.push(variant);
        self
    }

    pub fn module_version(&self) -> &ModuleVersionId {
        self.id.module_version()
    }

    pub fn module(&self) -> &ModuleId {
        self.id.module()
    }

    pub fn variant(&self, name: &str) -> Option<&VariantMetadata> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Attribute matching applies once any variant carries attributes.
    pub fn is_attribute_aware(&self) -> bool {
        self.variants.iter().any(|v| !v.attributes.is_empty())
    }

    /// Capabilities provided by a variant, the implicit one included when no
    /// explicit capability is declared.
    pub fn capabilities_of(&self, variant: &VariantMetadata) -> Vec<Capability> {
        if variant.capabilities.is_empty() {
            vec![Capability::implicit(self.module_version())]
        } else {
            variant.capabilities.clone()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use expect_test::expect;
    use test_log::test;

    #[test]
    fn read_component_from_json() {
        let metadata: ComponentMetadata = serde_json::from_str(
            r#"{
                "id": { "module": "org:a:1.0" },
                "platform_owners": ["org:platform:1.0"],
                "variants": [{
                    "name": "runtime",
                    "attributes": { "usage": "runtime" },
                    "dependencies": [
                        { "selector": { "kind": "module", "module": "org:b", "constraint": { "require": "1.+" } } },
                        {
                            "selector": { "kind": "module", "module": "org:c", "constraint": { "strictly": "2.0" } },
                            "kind": { "type": "constraint" },
                            "reason": "security fix"
                        }
                    ]
                }]
            }"#,
        )
        .unwrap();

        expect!["org:a:1.0"].assert_eq(&metadata.id.to_string());
        let variant = metadata.variant("runtime").unwrap();
        expect!["{usage=runtime}"].assert_eq(&variant.attributes.to_string());
        let deps: Vec<String> = variant
            .dependencies
            .iter()
            .map(|d| format!("{} constraint={} transitive={}", d.selector, d.is_constraint(), d.transitive))
            .collect();
        expect![[r#"
            [
                "org:b:1.+ constraint=false transitive=true",
                "org:c:{strictly 2.0} constraint=true transitive=true",
            ]
        "#]]
        .assert_debug_eq(&deps);
        expect![[r#"["org:logging:1.0"]"#]].assert_eq(&format!(
            "{:?}",
            metadata
                .capabilities_of(&variant.clone().with_capability("org:logging:1.0".parse().unwrap()))
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
        ));
        expect![[r#"{"module":"org:a:1.0"}"#]]
            .assert_eq(&serde_json::to_string(&metadata.id).unwrap());
    }
}
